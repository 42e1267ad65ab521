use super::types::ToolOutput;

const CONTENT_UNAVAILABLE: &str = "ERROR: 'NoneType' object is not subscriptable";
const INITIALIZATION_RACE: &str = "ERROR: 'NoneType' object does not support item assignment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientSignature {
    /// A fragment file vanished while the downloader was still writing it.
    FragmentRace,
    InitializationRace,
}

impl TransientSignature {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientSignature::FragmentRace => "fragment_race",
            TransientSignature::InitializationRace => "initialization_race",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    Transient(TransientSignature),
    ContentUnavailable,
    Unknown,
}

/// Classifies a finished tool run against the known stderr signatures.
/// `file_name` is the record's base name, used by the fragment race patterns.
pub fn classify(output: &ToolOutput, file_name: &str) -> ToolOutcome {
    if output.succeeded() {
        return ToolOutcome::Success;
    }
    let stderr = output.stderr.as_str();
    let posix_fragment =
        format!("[Errno 2] No such file or directory: '{file_name}.mp4.part-Frag");
    let windows_fragment =
        format!("[WinError 2] The system cannot find the file specified: '{file_name}.mp4.part-Frag");
    if stderr.contains(&posix_fragment) || stderr.contains(&windows_fragment) {
        ToolOutcome::Transient(TransientSignature::FragmentRace)
    } else if stderr.contains(INITIALIZATION_RACE) {
        ToolOutcome::Transient(TransientSignature::InitializationRace)
    } else if stderr.contains(CONTENT_UNAVAILABLE) {
        ToolOutcome::ContentUnavailable
    } else {
        ToolOutcome::Unknown
    }
}
