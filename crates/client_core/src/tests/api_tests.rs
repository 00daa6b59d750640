use super::*;
use crate::pacing::RecordingSleeper;
use axum::{
    extract::State,
    http::{HeaderMap as AxumHeaders, Method as AxumMethod, StatusCode as AxumStatus, Uri},
    response::{IntoResponse, Response as AxumResponse},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use tokio::{net::TcpListener, sync::Mutex};

const GOOD_TOKEN: &str = "good-token";

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedRequest {
    method: String,
    uri: String,
    authorization: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// path -> (429s still to send, retry_after in the body)
    throttled: Arc<Mutex<HashMap<String, (u32, Option<f64>)>>>,
}

impl MockState {
    async fn throttle(&self, path: &str, times: u32, retry_after: Option<f64>) {
        self.throttled
            .lock()
            .await
            .insert(path.to_string(), (times, retry_after));
    }

    async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn handle_any(
    State(state): State<MockState>,
    method: AxumMethod,
    uri: Uri,
    headers: AxumHeaders,
) -> AxumResponse {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().await.push(RecordedRequest {
        method: method.to_string(),
        uri: uri.to_string(),
        authorization: authorization.clone(),
    });

    let path = uri.path().to_string();
    if let Some((remaining, retry_after)) = state.throttled.lock().await.get_mut(&path) {
        if *remaining > 0 {
            *remaining -= 1;
            return match retry_after {
                Some(seconds) => (
                    AxumStatus::TOO_MANY_REQUESTS,
                    Json(json!({ "message": "You are being rate limited.", "retry_after": *seconds, "global": false })),
                )
                    .into_response(),
                None => AxumStatus::TOO_MANY_REQUESTS.into_response(),
            };
        }
    }

    if authorization.as_deref() != Some(GOOD_TOKEN) {
        return (
            AxumStatus::UNAUTHORIZED,
            Json(json!({ "message": "401: Unauthorized", "code": 0 })),
        )
            .into_response();
    }

    match (method.as_str(), path.as_str()) {
        ("GET", "/api/v9/users/@me") => Json(json!({
            "id": "42",
            "username": "purger",
            "global_name": "The Purger",
        }))
        .into_response(),
        ("GET", "/api/v9/users/@me/channels") => Json(json!([
            {
                "id": "700",
                "type": 1,
                "last_message_id": "701",
                "recipients": [{ "id": "9", "username": "bob", "global_name": null }],
            },
            { "id": "800", "type": 3, "name": "group", "last_message_id": null },
        ]))
        .into_response(),
        ("GET", "/api/v9/users/@me/guilds") => {
            Json(json!([{ "id": "5", "name": "rustaceans", "icon": null }])).into_response()
        }
        ("GET", "/api/v9/guilds/5/channels") => Json(json!([
            { "id": "51", "type": 0, "guild_id": "5", "name": "general" },
            { "id": "52", "type": 2, "guild_id": "5", "name": "voice" },
        ]))
        .into_response(),
        ("GET", "/api/v9/channels/7/messages") => Json(json!([
            { "id": "98", "author": { "id": "42", "username": "purger" }, "content": "mine" },
            { "id": "97", "author": { "id": "9", "username": "bob" }, "content": "theirs" },
        ]))
        .into_response(),
        ("DELETE", "/api/v9/channels/7/messages/403") => (
            AxumStatus::FORBIDDEN,
            Json(json!({ "message": "Cannot execute action on a DM channel", "code": 50003 })),
        )
            .into_response(),
        ("DELETE", p) if p.starts_with("/api/v9/channels/7/messages/") => {
            AxumStatus::NO_CONTENT.into_response()
        }
        _ => AxumStatus::NOT_FOUND.into_response(),
    }
}

async fn spawn_platform_server() -> anyhow::Result<(String, MockState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockState::default();
    let app = Router::new().fallback(handle_any).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api/v9/"), state))
}

fn client_for(base_url: &str, token: &str) -> (HttpApiClient, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let config = ClientConfig {
        api_base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    let client = HttpApiClient::with_sleeper(
        &config,
        Credential::new(token).expect("credential"),
        Arc::new(sleeper.clone()),
    )
    .expect("client");
    (client, sleeper)
}

#[tokio::test]
async fn current_user_sends_credential_verbatim() {
    let (base_url, state) = spawn_platform_server().await.expect("spawn server");
    let (client, _sleeper) = client_for(&base_url, GOOD_TOKEN);

    let identity = client.get_current_user().await.expect("identity");
    assert_eq!(identity.id, shared::domain::UserId(42));
    assert_eq!(identity.display_name, "The Purger");

    let requests = state.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some(GOOD_TOKEN));
}

#[tokio::test]
async fn rejected_credential_is_an_auth_error_without_retry() {
    let (base_url, state) = spawn_platform_server().await.expect("spawn server");
    let (client, sleeper) = client_for(&base_url, "expired-token");

    let err = client.get_current_user().await.expect_err("must fail");
    assert!(err.is_auth(), "unexpected error: {err}");
    assert!(err.to_string().contains("401"));
    assert_eq!(state.requests().await.len(), 1);
    assert!(sleeper.recorded().await.is_empty());
}

#[tokio::test]
async fn rate_limited_page_is_retried_identically_after_retry_after() {
    let (base_url, state) = spawn_platform_server().await.expect("spawn server");
    state
        .throttle("/api/v9/channels/7/messages", 1, Some(2.0))
        .await;
    let (client, sleeper) = client_for(&base_url, GOOD_TOKEN);

    let page = client
        .fetch_message_page(ChannelId(7), Some(MessageId(99)))
        .await
        .expect("page");

    assert_eq!(page.len(), 2);
    assert_eq!(page.messages[0].author_id, shared::domain::UserId(42));
    assert_eq!(sleeper.recorded().await, vec![Duration::from_secs(2)]);

    let requests = state.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(requests[0].uri, "/api/v9/channels/7/messages?limit=100&before=99");
}

#[tokio::test]
async fn delete_waits_out_repeated_rate_limits() {
    let (base_url, state) = spawn_platform_server().await.expect("spawn server");
    state
        .throttle("/api/v9/channels/7/messages/11", 3, Some(0.25))
        .await;
    let (client, sleeper) = client_for(&base_url, GOOD_TOKEN);

    client
        .delete_message(ChannelId(7), MessageId(11))
        .await
        .expect("delete");

    assert_eq!(sleeper.recorded().await, vec![Duration::from_millis(250); 3]);
    let requests = state.requests().await;
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|request| request == &requests[0]));
    assert_eq!(requests[0].method, "DELETE");
}

#[tokio::test]
async fn missing_retry_after_defaults_to_one_second() {
    let (base_url, state) = spawn_platform_server().await.expect("spawn server");
    state.throttle("/api/v9/channels/7/messages/12", 1, None).await;
    let (client, sleeper) = client_for(&base_url, GOOD_TOKEN);

    client
        .delete_message(ChannelId(7), MessageId(12))
        .await
        .expect("delete");

    assert_eq!(sleeper.recorded().await, vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn failed_delete_carries_platform_error() {
    let (base_url, _state) = spawn_platform_server().await.expect("spawn server");
    let (client, _sleeper) = client_for(&base_url, GOOD_TOKEN);

    let err = client
        .delete_message(ChannelId(7), MessageId(403))
        .await
        .expect_err("must fail");
    match err {
        ClientError::Delete {
            message_id,
            status,
            message,
        } => {
            assert_eq!(message_id, MessageId(403));
            assert_eq!(status, 403);
            assert_eq!(message, "Cannot execute action on a DM channel (code 50003)");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn listing_routes_decode_channels_and_guilds() {
    let (base_url, _state) = spawn_platform_server().await.expect("spawn server");
    let (client, _sleeper) = client_for(&base_url, GOOD_TOKEN);

    let dms = client.list_dm_channels().await.expect("dms");
    assert_eq!(dms.len(), 2);
    assert_eq!(dms[0].recipients[0].username, "bob");
    assert_eq!(dms[1].last_message_id, None);

    let guilds = client.list_guilds().await.expect("guilds");
    assert_eq!(guilds[0].id, GuildId(5));
    assert_eq!(guilds[0].name.as_deref(), Some("rustaceans"));

    let channels = client.list_guild_channels(GuildId(5)).await.expect("channels");
    let text: Vec<_> = channels
        .iter()
        .filter(|channel| channel.kind.is_guild_text())
        .map(|channel| channel.id)
        .collect();
    assert_eq!(text, vec![ChannelId(51)]);
}

#[tokio::test]
async fn non_success_listing_is_a_status_error() {
    let (base_url, _state) = spawn_platform_server().await.expect("spawn server");
    let (client, _sleeper) = client_for(&base_url, GOOD_TOKEN);

    let err = client
        .list_guild_channels(GuildId(6))
        .await
        .expect_err("unknown guild");
    assert!(matches!(err, ClientError::Status { status: 404, .. }), "{err}");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let (client, _sleeper) = client_for(&format!("http://{addr}/api/v9"), GOOD_TOKEN);
    let err = client
        .fetch_message_page(ChannelId(7), None)
        .await
        .expect_err("nothing listening");
    assert!(err.is_transport(), "unexpected error: {err}");
}
