//! Authenticated REST calls against the platform and the rate-limit retry primitive.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, AUTHORIZATION, RETRY_AFTER},
    Client, Method, Request, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AccountIdentity, ChannelId, GuildId, MessageId},
    error::ApiErrorBody,
    protocol::{
        MessagePage, RateLimitBody, RawChannel, RawGuild, RawMessage, RawUser, MESSAGE_PAGE_LIMIT,
    },
};
use tracing::{debug, warn};

use crate::{
    error::ClientError,
    pacing::{Sleeper, TokioSleeper},
    session::Credential,
};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v9";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

pub type ApiResult<T> = std::result::Result<T, ClientError>;

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_current_user(&self) -> ApiResult<AccountIdentity>;
    async fn list_dm_channels(&self) -> ApiResult<Vec<RawChannel>>;
    async fn list_guilds(&self) -> ApiResult<Vec<RawGuild>>;
    async fn list_guild_channels(&self, guild_id: GuildId) -> ApiResult<Vec<RawChannel>>;
    /// Up to 100 messages strictly older than `before`, newest first.
    async fn fetch_message_page(
        &self,
        channel_id: ChannelId,
        before: Option<MessageId>,
    ) -> ApiResult<MessagePage>;
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> ApiResult<()>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("purge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpApiClient {
    http: Client,
    base_url: String,
    credential: Credential,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpApiClient {
    pub fn new(config: &ClientConfig, credential: Credential) -> ApiResult<Self> {
        Self::with_sleeper(config, credential, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        config: &ClientConfig,
        credential: Credential,
        sleeper: Arc<dyn Sleeper>,
    ) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credential,
            sleeper,
        })
    }

    fn request(&self, method: Method, route: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{route}", self.base_url))
            .header(AUTHORIZATION, self.credential.expose())
    }

    /// Executes `request`, re-issuing an identical copy after every 429 until the server relents.
    async fn execute_with_rate_limit(&self, route: &str, request: Request) -> ApiResult<Response> {
        loop {
            let attempt = match request.try_clone() {
                Some(attempt) => attempt,
                None => return Ok(self.http.execute(request).await?),
            };
            let response = self.http.execute(attempt).await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let delay = retry_after(response).await;
            warn!(
                route,
                retry_after_secs = delay.as_secs_f64(),
                "rate limited; backing off before retrying"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let request = self.request(Method::GET, route).query(query).build()?;
        let response = self.execute_with_rate_limit(route, request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                route: route.to_string(),
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            route: route.to_string(),
            source,
        })
    }
}

#[async_trait]
impl PlatformApi for HttpApiClient {
    async fn get_current_user(&self) -> ApiResult<AccountIdentity> {
        let route = "/users/@me";
        let response = self.request(Method::GET, route).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Auth {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let body = response.bytes().await?;
        let user: RawUser = serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            route: route.to_string(),
            source,
        })?;
        Ok(user.into_identity())
    }

    async fn list_dm_channels(&self) -> ApiResult<Vec<RawChannel>> {
        self.get_json("/users/@me/channels", &[]).await
    }

    async fn list_guilds(&self) -> ApiResult<Vec<RawGuild>> {
        self.get_json("/users/@me/guilds", &[]).await
    }

    async fn list_guild_channels(&self, guild_id: GuildId) -> ApiResult<Vec<RawChannel>> {
        self.get_json(&format!("/guilds/{guild_id}/channels"), &[]).await
    }

    async fn fetch_message_page(
        &self,
        channel_id: ChannelId,
        before: Option<MessageId>,
    ) -> ApiResult<MessagePage> {
        let mut query = vec![("limit", MESSAGE_PAGE_LIMIT.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        let messages: Vec<RawMessage> = self
            .get_json(&format!("/channels/{channel_id}/messages"), &query)
            .await?;
        debug!(
            channel_id = channel_id.0,
            before = before.map(|id| id.0),
            fetched = messages.len(),
            "fetched message page"
        );
        Ok(MessagePage::from(messages))
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> ApiResult<()> {
        let route = format!("/channels/{channel_id}/messages/{message_id}");
        let request = self.request(Method::DELETE, &route).build()?;
        let response = self.execute_with_rate_limit(&route, request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ClientError::Delete {
            message_id,
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }
}

async fn retry_after(response: Response) -> Duration {
    let header_hint = retry_after_header(response.headers());
    let body = response.text().await.unwrap_or_default();
    let seconds = serde_json::from_str::<RateLimitBody>(&body)
        .ok()
        .map(|body| body.retry_after)
        .or(header_hint);
    seconds
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn retry_after_header(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match ApiErrorBody::from_body(&body) {
        Some(body) => body.to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
