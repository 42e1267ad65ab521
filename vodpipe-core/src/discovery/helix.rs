use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::channel::ChannelContext;
use crate::config::EnvKeysSection;

use super::error::{DiscoveryError, DiscoveryResult};
use super::source::{RawRecording, VodSource, VodSourceFactory};

const API_BASE: &str = "https://api.twitch.tv/helix/";
const ID_BASE: &str = "https://id.twitch.tv/oauth2/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HelixCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// User token; when present, videos are requested with it so private
    /// recordings are listed too.
    pub oauth: Option<String>,
}

impl HelixCredentials {
    pub fn from_env(keys: &EnvKeysSection) -> DiscoveryResult<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| DiscoveryError::Credential(name.to_string()))
        };
        let oauth = match keys.oauth.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => Some(read(name)?),
            None => None,
        };
        Ok(Self {
            client_id: read(&keys.client_id)?,
            client_secret: read(&keys.client_secret)?,
            oauth,
        })
    }
}

#[derive(Debug, Clone)]
struct Session {
    authorization: String,
    user_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct HelixUser {
    id: String,
}

#[derive(Deserialize)]
struct HelixStream {
    id: String,
}

#[derive(Deserialize)]
struct ValidateResponse {
    client_id: String,
}

/// Twitch Helix client for one channel's credentials.
#[derive(Debug)]
pub struct HelixClient {
    http: Client,
    credentials: HelixCredentials,
    api_base: Url,
    id_base: Url,
    session: OnceCell<Session>,
}

impl HelixClient {
    pub fn new(credentials: HelixCredentials) -> DiscoveryResult<Self> {
        Self::with_bases(credentials, Url::parse(API_BASE)?, Url::parse(ID_BASE)?)
    }

    pub fn with_bases(
        credentials: HelixCredentials,
        api_base: Url,
        id_base: Url,
    ) -> DiscoveryResult<Self> {
        let http = Client::builder()
            .user_agent("vodpipe/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            api_base,
            id_base,
            session: OnceCell::new(),
        })
    }

    async fn session(&self, channel: &str) -> DiscoveryResult<&Session> {
        self.session
            .get_or_try_init(|| async {
                let authorization = self.app_token().await?;
                let user_id = self.user_id(&authorization, channel).await?;
                Ok::<_, DiscoveryError>(Session {
                    authorization,
                    user_id,
                })
            })
            .await
    }

    async fn app_token(&self) -> DiscoveryResult<String> {
        let url = self.id_base.join("token")?;
        let request = self.http.post(url).query(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ]);
        let token: TokenResponse = send_json("oauth2/token", request).await?;
        Ok(format!("Bearer {}", token.access_token))
    }

    async fn user_id(&self, authorization: &str, channel: &str) -> DiscoveryResult<String> {
        let url = self.api_base.join("users")?;
        let login = channel.to_lowercase();
        let request = self
            .authorized(self.http.get(url), &self.credentials.client_id, authorization)
            .query(&[("login", login.as_str())]);
        let users: DataEnvelope<HelixUser> = send_json("helix/users", request).await?;
        users
            .data
            .into_iter()
            .next()
            .map(|user| user.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DiscoveryError::Response(format!("no user id for channel {channel}")))
    }

    /// Client id and authorization used for the videos request.
    async fn video_auth(&self, session: &Session) -> DiscoveryResult<(String, String)> {
        let Some(raw_token) = self.credentials.oauth.as_deref() else {
            return Ok((
                self.credentials.client_id.clone(),
                session.authorization.clone(),
            ));
        };
        let token = raw_token.trim().trim_start_matches("oauth:");
        let url = self.id_base.join("validate")?;
        let request = self
            .http
            .get(url)
            .header("Authorization", format!("OAuth {token}"));
        let validated: ValidateResponse = send_json("oauth2/validate", request).await?;
        Ok((validated.client_id, format!("Bearer {token}")))
    }

    fn authorized(
        &self,
        request: RequestBuilder,
        client_id: &str,
        authorization: &str,
    ) -> RequestBuilder {
        request
            .header("Client-ID", client_id)
            .header("Authorization", authorization)
    }
}

#[async_trait]
impl VodSource for HelixClient {
    async fn fetch_recordings(&self, channel: &str) -> DiscoveryResult<Vec<RawRecording>> {
        let session = self.session(channel).await?;
        let (client_id, authorization) = self.video_auth(session).await?;
        let url = self.api_base.join("videos")?;
        let request = self
            .authorized(self.http.get(url), &client_id, &authorization)
            .query(&[("user_id", session.user_id.as_str()), ("first", "100")]);
        let videos: DataEnvelope<RawRecording> = send_json("helix/videos", request).await?;
        debug!(channel, count = videos.data.len(), "fetched recordings");
        Ok(videos.data)
    }

    async fn fetch_active_stream_ids(&self, channel: &str) -> DiscoveryResult<HashSet<String>> {
        let session = self.session(channel).await?;
        let url = self.api_base.join("streams")?;
        let request = self
            .authorized(
                self.http.get(url),
                &self.credentials.client_id,
                &session.authorization,
            )
            .query(&[("user_id", session.user_id.as_str())]);
        let streams: DataEnvelope<HelixStream> = send_json("helix/streams", request).await?;
        Ok(streams.data.into_iter().map(|stream| stream.id).collect())
    }
}

async fn send_json<T: DeserializeOwned>(
    endpoint: &str,
    request: RequestBuilder,
) -> DiscoveryResult<T> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DiscoveryError::Api {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

/// Creates a [`HelixClient`] from each channel's environment credentials.
#[derive(Debug, Clone, Default)]
pub struct HelixSourceFactory;

impl VodSourceFactory for HelixSourceFactory {
    fn source_for(&self, channel: &ChannelContext) -> DiscoveryResult<Arc<dyn VodSource>> {
        let credentials = HelixCredentials::from_env(&channel.env_keys)?;
        Ok(Arc::new(HelixClient::new(credentials)?))
    }
}
