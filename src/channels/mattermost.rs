//! Mattermost Channel
//!
//! Mattermost self-hosted messaging platform integration. Posts go through
//! the v4 REST API; events arrive over the API websocket.

use super::{
    ChannelError, ChannelEvent, ChannelResult, ChatTransport, Connection, IncomingMessage,
    OutgoingMessage,
};
use crate::logging::sanitize_log_message;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the server gets to answer the websocket authentication challenge
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sequence number of the authentication challenge
const AUTH_SEQ: i64 = 1;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Mattermost configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MattermostConfig {
    /// Mattermost server URL
    #[serde(default)]
    pub server_url: String,
    /// Personal access token of the bot account
    #[serde(default)]
    pub access_token: String,
    /// Team the bot serves
    #[serde(default)]
    pub team_name: String,
    /// Expected bot username, checked at login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Mattermost user record
#[derive(Debug, Clone, Deserialize)]
pub struct MattermostUser {
    pub id: String,
    pub username: String,
}

/// Mattermost team record
#[derive(Debug, Clone, Deserialize)]
pub struct MattermostTeam {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
}

/// Mattermost channel implementation
pub struct MattermostChannel {
    config: MattermostConfig,
    client: reqwest::Client,
    api_url: String,
    ws_url: Url,
    user_id: RwLock<Option<String>>,
}

impl MattermostChannel {
    /// Create a new Mattermost channel
    pub fn new(config: MattermostConfig) -> ChannelResult<Self> {
        let server = Url::parse(&config.server_url).map_err(|e| {
            ChannelError::InvalidConfig(format!("invalid server URL {}: {}", config.server_url, e))
        })?;
        let ws_url = websocket_url(&server)?;
        let api_url = format!("{}/api/v4", server.as_str().trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            api_url,
            ws_url,
            user_id: RwLock::new(None),
        })
    }

    /// Websocket endpoint derived from the server URL
    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    /// Send a request to the Mattermost API
    async fn api_request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> ChannelResult<T> {
        let mut request = self
            .client
            .request(method, format!("{}/{}", self.api_url, endpoint))
            .bearer_auth(&self.config.access_token);

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let error_text = sanitize_log_message(&error_text);
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    ChannelError::AuthenticationFailed(error_text)
                }
                _ => ChannelError::Protocol(format!("HTTP {}: {}", status, error_text)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ChannelError::Protocol(e.to_string()))
    }

    /// Verify the token and learn the bot's own user ID
    pub async fn login(&self) -> ChannelResult<MattermostUser> {
        info!(server_url = %self.config.server_url, "Logging in to Mattermost");

        let user: MattermostUser = self
            .api_request(reqwest::Method::GET, "users/me", None)
            .await?;

        if let Some(expected) = &self.config.username {
            if expected != &user.username {
                warn!(
                    expected = %expected,
                    actual = %user.username,
                    "Token belongs to a different user than configured"
                );
            }
        }

        *self.user_id.write() = Some(user.id.clone());
        info!(user_id = %user.id, username = %user.username, "Logged in to Mattermost");
        Ok(user)
    }

    /// Look up the configured team
    pub async fn find_team(&self) -> ChannelResult<MattermostTeam> {
        let endpoint = format!("teams/name/{}", urlencoding::encode(&self.config.team_name));
        let team: MattermostTeam = self
            .api_request(reqwest::Method::GET, &endpoint, None)
            .await
            .map_err(|e| match e {
                ChannelError::Protocol(msg) => ChannelError::InvalidConfig(format!(
                    "team {} not found: {}",
                    self.config.team_name, msg
                )),
                other => other,
            })?;

        info!(team_id = %team.id, team = %team.name, "Found Mattermost team");
        Ok(team)
    }
}

#[async_trait]
impl ChatTransport for MattermostChannel {
    async fn connect(&self) -> ChannelResult<Box<dyn Connection>> {
        debug!(url = %self.ws_url, "Opening Mattermost websocket");

        let (mut stream, _response) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let challenge = serde_json::json!({
            "seq": AUTH_SEQ,
            "action": "authentication_challenge",
            "data": { "token": self.config.access_token },
        });
        stream
            .send(Message::Text(challenge.to_string().into()))
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        tokio::time::timeout(AUTH_TIMEOUT, await_auth_reply(&mut stream))
            .await
            .map_err(|_| {
                ChannelError::ConnectionFailed("no answer to authentication challenge".to_string())
            })??;

        info!("Mattermost websocket connected");
        Ok(Box::new(MattermostConnection { stream }))
    }

    async fn send_message(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let body = serde_json::json!({
            "channel_id": message.chat_id,
            "message": message.text,
            "root_id": message.reply_to.unwrap_or_default(),
        });

        self.api_request::<PostResponse>(reqwest::Method::POST, "posts", Some(body))
            .await
            .map(|post| post.id)
            .map_err(|e| match e {
                ChannelError::ConnectionFailed(msg) | ChannelError::Protocol(msg) => {
                    ChannelError::SendFailed(msg)
                }
                other => other,
            })
    }

    fn self_user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }
}

/// Live Mattermost websocket
struct MattermostConnection {
    stream: WsStream,
}

#[async_trait]
impl Connection for MattermostConnection {
    async fn next_event(&mut self) -> Option<ChannelResult<ChannelEvent>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ChannelError::ConnectionFailed(e.to_string()))),
            };

            match message {
                Message::Text(text) => match parse_event(text.as_str()) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        warn!(error = %e, "Skipping unparsable websocket frame");
                    }
                },
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Mattermost closed the websocket");
                    return None;
                }
                // Pings are answered by tungstenite on the next read
                _ => {}
            }
        }
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WsEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Server answer to a client request, matched by `seq_reply`
#[derive(Debug, Deserialize)]
struct WsReply {
    seq_reply: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Read frames until the server answers the authentication challenge.
/// Frames sent before the answer carry nothing the bot needs and are dropped.
async fn await_auth_reply(stream: &mut WsStream) -> ChannelResult<()> {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(ChannelError::ConnectionFailed(e.to_string())),
            None => {
                return Err(ChannelError::ConnectionFailed(
                    "websocket closed during authentication".to_string(),
                ))
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                return Err(ChannelError::ConnectionFailed(format!(
                    "websocket closed during authentication: {:?}",
                    frame
                )))
            }
            _ => continue,
        };

        let Ok(reply) = serde_json::from_str::<WsReply>(text.as_str()) else {
            continue;
        };
        if reply.seq_reply != AUTH_SEQ {
            continue;
        }
        if reply.status == "OK" {
            return Ok(());
        }

        let detail = reply
            .error
            .map(|error| error.to_string())
            .unwrap_or(reply.status);
        return Err(ChannelError::AuthenticationFailed(sanitize_log_message(&detail)));
    }
}

#[derive(Debug, Deserialize)]
struct WsPost {
    id: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    root_id: String,
}

/// Decode one websocket frame
///
/// `posted` events carry the post as a JSON document embedded in a string.
fn parse_event(text: &str) -> ChannelResult<ChannelEvent> {
    let event: WsEvent =
        serde_json::from_str(text).map_err(|e| ChannelError::Protocol(e.to_string()))?;

    let Some(kind) = event.event else {
        return Ok(ChannelEvent::Other {
            kind: "reply".to_string(),
        });
    };
    if kind != "posted" {
        return Ok(ChannelEvent::Other { kind });
    }

    let raw = event
        .data
        .get("post")
        .and_then(|post| post.as_str())
        .ok_or_else(|| ChannelError::Protocol("posted event without post".to_string()))?;
    let post: WsPost =
        serde_json::from_str(raw).map_err(|e| ChannelError::Protocol(e.to_string()))?;

    Ok(ChannelEvent::Posted(IncomingMessage {
        id: post.id,
        chat_id: post.channel_id,
        sender_id: post.user_id,
        text: post.message,
        root_id: Some(post.root_id).filter(|root| !root.is_empty()),
    }))
}

fn websocket_url(server: &Url) -> ChannelResult<Url> {
    let scheme = match server.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ChannelError::InvalidConfig(format!(
                "unsupported server URL scheme: {}",
                other
            )))
        }
    };

    let mut ws = server.clone();
    ws.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidConfig("cannot derive websocket URL".to_string()))?;
    let path = format!("{}/api/v4/websocket", server.path().trim_end_matches('/'));
    ws.set_path(&path);
    Ok(ws)
}
