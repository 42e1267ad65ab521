use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use super::error::TemplateError;
use super::types::ToolCommand;

fn placeholder_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("valid regex"))
}

/// A configured command line with `{name}` placeholders in its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .args
            .iter()
            .flat_map(|arg| placeholder_regex().captures_iter(arg))
            .map(|caps| caps[1].to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn check_placeholders(&self, allowed: &[&str]) -> Result<(), TemplateError> {
        match self
            .placeholders()
            .into_iter()
            .find(|name| !allowed.contains(&name.as_str()))
        {
            Some(placeholder) => Err(TemplateError::UnknownPlaceholder { placeholder }),
            None => Ok(()),
        }
    }

    /// Substitutes every placeholder argument by argument. A list value
    /// replaces an argument that consists of nothing but its placeholder and
    /// may expand to zero arguments.
    pub fn render(&self, context: &TemplateContext) -> Result<ToolCommand, TemplateError> {
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            if let Some(values) = standalone_placeholder(arg).and_then(|name| context.lists.get(name)) {
                args.extend(values.iter().cloned());
                continue;
            }
            let mut failure = None;
            let rendered = placeholder_regex().replace_all(arg, |caps: &Captures<'_>| {
                let name = &caps[1];
                if let Some(value) = context.scalars.get(name) {
                    return value.clone();
                }
                if failure.is_none() {
                    failure = Some(if context.lists.contains_key(name) {
                        TemplateError::ListNotStandalone {
                            placeholder: name.to_string(),
                        }
                    } else {
                        TemplateError::UnknownPlaceholder {
                            placeholder: name.to_string(),
                        }
                    });
                }
                String::new()
            });
            let rendered = rendered.into_owned();
            if let Some(err) = failure {
                return Err(err);
            }
            args.push(rendered);
        }
        Ok(ToolCommand::new(self.program.clone(), args))
    }
}

fn standalone_placeholder(arg: &str) -> Option<&str> {
    let inner = arg.strip_prefix('{')?.strip_suffix('}')?;
    (!inner.is_empty() && inner.chars().all(|c| c.is_ascii_lowercase() || c == '_')).then_some(inner)
}

/// Values available to a template render.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    scalars: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<String>>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.scalars.insert(name.to_string(), value.into());
        self
    }

    pub fn with_list(mut self, name: &str, values: Vec<String>) -> Self {
        self.lists.insert(name.to_string(), values);
        self
    }
}
