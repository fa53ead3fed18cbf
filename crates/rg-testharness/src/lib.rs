//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scripted mock of the inverter dongle for integration tests."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! A mock dongle speaking the websocket control API and the plain HTTP endpoints.
//!
//! Tests script canned replies per service, then bend the protocol: inject
//! unsolicited frames, fail the next call with a code, hang up mid-call, refuse
//! handshakes, or expire the session token. Every request is journaled.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use rg_common::{DeviceConfig, SessionConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod fixtures;

pub const SOCKET_PATH: &str = "/ws/home/overview";
pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "pw1111";

/// Result code the mock uses for unknown services and bad credentials.
pub const UNSUPPORTED_CODE: i64 = 2;
/// Result code answered when a request carries a stale token.
pub const TOKEN_EXPIRED_CODE: i64 = 106;

/// Build a response envelope as the dongle sends it.
pub fn envelope(code: i64, message: &str, data: Value) -> Value {
    json!({
        "result_code": code,
        "result_msg": message,
        "result_data": data,
    })
}

fn tagged(service: &str, data: &Value) -> Value {
    let mut data = match data {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    data.insert("service".to_owned(), Value::from(service));
    Value::Object(data)
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Value>,
    device_replies: HashMap<(String, String), Value>,
    http_replies: HashMap<String, Value>,
    translations: HashMap<String, String>,
    injections: HashMap<String, VecDeque<Value>>,
    failures: HashMap<String, VecDeque<i64>>,
    hangups: HashMap<String, usize>,
    silent: HashSet<String>,
    refused_connects: usize,
    issued: u64,
    session_token: Option<String>,
}

#[derive(Default)]
struct Journal {
    connections: usize,
    calls: HashMap<String, usize>,
    requests: Vec<Value>,
    http_queries: Vec<(String, HashMap<String, String>)>,
    i18n_fetches: HashMap<String, usize>,
}

#[derive(Default)]
struct DeviceState {
    script: Mutex<Script>,
    journal: Mutex<Journal>,
}

enum Action {
    Reply(Vec<Value>),
    Hangup,
    Silent,
}

impl DeviceState {
    fn respond(&self, service: &str, request: &Value) -> Action {
        {
            let mut journal = self.journal.lock();
            *journal.calls.entry(service.to_owned()).or_default() += 1;
            journal.requests.push(request.clone());
        }

        let mut script = self.script.lock();
        if let Some(remaining) = script.hangups.get_mut(service).filter(|n| **n > 0) {
            *remaining -= 1;
            return Action::Hangup;
        }
        if script.silent.contains(service) {
            return Action::Silent;
        }

        let mut frames: Vec<Value> = script
            .injections
            .remove(service)
            .map(Vec::from)
            .unwrap_or_default();
        if let Some(code) = script
            .failures
            .get_mut(service)
            .and_then(VecDeque::pop_front)
        {
            frames.push(envelope(code, "injected failure", json!({ "service": service })));
            return Action::Reply(frames);
        }

        let reply = match service {
            "connect" => {
                if script.refused_connects > 0 {
                    script.refused_connects -= 1;
                    return Action::Hangup;
                }
                script.issued += 1;
                let token = format!("connect-{}", script.issued);
                envelope(1, "success", json!({"service": "connect", "token": token}))
            }
            "login" => {
                let expected = format!("connect-{}", script.issued);
                let authorized = request["token"] == expected.as_str()
                    && request["username"] == USERNAME
                    && request["passwd"] == PASSWORD;
                if authorized {
                    let token = format!("session-{}", script.issued);
                    script.session_token = Some(token.clone());
                    envelope(1, "success", json!({"service": "login", "token": token}))
                } else {
                    envelope(UNSUPPORTED_CODE, "login failed", json!({"service": "login"}))
                }
            }
            "ping" => envelope(1, "success", Value::Null),
            _ if request["token"].as_str() != script.session_token.as_deref() => envelope(
                TOKEN_EXPIRED_CODE,
                "token expired",
                json!({ "service": service }),
            ),
            _ => {
                let dev_id = request["dev_id"].as_str().unwrap_or_default().to_owned();
                let data = script
                    .device_replies
                    .get(&(service.to_owned(), dev_id))
                    .or_else(|| script.replies.get(service));
                match data {
                    Some(data) => envelope(1, "success", tagged(service, data)),
                    None => envelope(
                        UNSUPPORTED_CODE,
                        "unsupported service",
                        json!({ "service": service }),
                    ),
                }
            }
        };
        frames.push(reply);
        Action::Reply(frames)
    }
}

/// Running mock device bound to a loopback port.
pub struct MockDevice {
    address: SocketAddr,
    state: Arc<DeviceState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MockDevice {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let state = Arc::new(DeviceState::default());

        let app = Router::new()
            .route(SOCKET_PATH, get(upgrade_handler))
            .route("/i18n/:file", get(i18n_handler))
            .fallback(http_handler)
            .with_state(state.clone());

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "mock device exited with error");
            }
        });
        info!(address = %address, "mock device listening");

        Ok(Self {
            address,
            state,
            shutdown,
            task,
        })
    }

    /// Start a device pre-loaded with [`fixtures::load_hybrid_inverter`].
    pub async fn hybrid_inverter() -> anyhow::Result<Self> {
        let device = Self::start().await?;
        fixtures::load_hybrid_inverter(&device);
        Ok(device)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Plain-text device configuration pointing at this mock.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            host: self.address.to_string(),
            username: USERNAME.to_owned(),
            password: PASSWORD.to_owned(),
            secure: false,
            ..DeviceConfig::default()
        }
    }

    /// Session timings shortened for tests; the heartbeat stays out of the way.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(600),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(10),
            read_timeout: Duration::from_secs(2),
            http_timeout: Duration::from_secs(5),
        }
    }

    pub fn set_reply(&self, service: &str, data: Value) {
        self.state
            .script
            .lock()
            .replies
            .insert(service.to_owned(), data);
    }

    /// Reply used when the request carries `dev_id == device_id`.
    pub fn set_device_reply(&self, service: &str, device_id: i64, data: Value) {
        self.state
            .script
            .lock()
            .device_replies
            .insert((service.to_owned(), device_id.to_string()), data);
    }

    pub fn set_http_reply(&self, path: &str, data: Value) {
        self.state
            .script
            .lock()
            .http_replies
            .insert(path.to_owned(), data);
    }

    /// Serve `body` at `/i18n/{tag}.properties`.
    pub fn set_translations(&self, tag: &str, body: &str) {
        self.state
            .script
            .lock()
            .translations
            .insert(tag.to_owned(), body.to_owned());
    }

    /// Send `frame` ahead of the next reply to `service`.
    pub fn inject_before(&self, service: &str, frame: Value) {
        self.state
            .script
            .lock()
            .injections
            .entry(service.to_owned())
            .or_default()
            .push_back(frame);
    }

    /// Answer the next call to `service` with `code` instead of the scripted reply.
    pub fn fail_next(&self, service: &str, code: i64) {
        self.state
            .script
            .lock()
            .failures
            .entry(service.to_owned())
            .or_default()
            .push_back(code);
    }

    /// Close the socket instead of answering the next call to `service`.
    pub fn hang_up_on(&self, service: &str) {
        *self
            .state
            .script
            .lock()
            .hangups
            .entry(service.to_owned())
            .or_default() += 1;
    }

    /// Never answer `service`.
    pub fn stay_silent_on(&self, service: &str) {
        self.state
            .script
            .lock()
            .silent
            .insert(service.to_owned());
    }

    pub fn clear_silence(&self) {
        self.state.script.lock().silent.clear();
    }

    /// Hang up on the next `count` connect requests.
    pub fn refuse_connects(&self, count: usize) {
        self.state.script.lock().refused_connects = count;
    }

    /// Invalidate the current session token; further calls answer code 106.
    pub fn expire_session(&self) {
        self.state.script.lock().session_token = None;
    }

    pub fn session_token(&self) -> Option<String> {
        self.state.script.lock().session_token.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.journal.lock().connections
    }

    pub fn calls(&self, service: &str) -> usize {
        self.state
            .journal
            .lock()
            .calls
            .get(service)
            .copied()
            .unwrap_or_default()
    }

    /// Every request received for `service`, oldest first.
    pub fn requests(&self, service: &str) -> Vec<Value> {
        self.state
            .journal
            .lock()
            .requests
            .iter()
            .filter(|request| request["service"] == service)
            .cloned()
            .collect()
    }

    pub fn http_queries(&self, path: &str) -> Vec<HashMap<String, String>> {
        self.state
            .journal
            .lock()
            .http_queries
            .iter()
            .filter(|(requested, _)| requested == path)
            .map(|(_, query)| query.clone())
            .collect()
    }

    pub fn i18n_fetches(&self, tag: &str) -> usize {
        self.state
            .journal
            .lock()
            .i18n_fetches
            .get(tag)
            .copied()
            .unwrap_or_default()
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        let abort = self.task.abort_handle();
        match tokio::time::timeout(Duration::from_secs(2), self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::anyhow!(err)),
            Err(_) => {
                warn!("mock device still draining connections; aborting");
                abort.abort();
                Ok(())
            }
        }
    }
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DeviceState>>,
) -> Response {
    state.journal.lock().connections += 1;
    ws.on_upgrade(|socket| socket_loop(socket, state))
}

async fn socket_loop(mut socket: WebSocket, state: Arc<DeviceState>) {
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Ping(payload) => {
                if socket.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
                continue;
            }
            Message::Close(_) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            Message::Binary(_) | Message::Pong(_) => continue,
        };

        let request: Value = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "mock device received invalid frame");
                continue;
            }
        };
        let service = request["service"].as_str().unwrap_or_default().to_owned();
        debug!(service = %service, "mock device request");

        match state.respond(&service, &request) {
            Action::Reply(frames) => {
                for frame in frames {
                    if socket.send(Message::Text(frame.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Action::Hangup => {
                debug!(service = %service, "mock device hanging up");
                return;
            }
            Action::Silent => {}
        }
    }
}

async fn http_handler(
    State(state): State<Arc<DeviceState>>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let path = uri.path().to_owned();
    state
        .journal
        .lock()
        .http_queries
        .push((path.clone(), query.clone()));

    let script = state.script.lock();
    if query.get("token").map(String::as_str) != script.session_token.as_deref() {
        return Json(envelope(TOKEN_EXPIRED_CODE, "token expired", Value::Null)).into_response();
    }
    match script.http_replies.get(&path) {
        Some(data) => Json(envelope(1, "success", data.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn i18n_handler(
    State(state): State<Arc<DeviceState>>,
    Path(file): Path<String>,
) -> Response {
    let tag = file.strip_suffix(".properties").unwrap_or(&file).to_owned();
    *state
        .journal
        .lock()
        .i18n_fetches
        .entry(tag.clone())
        .or_default() += 1;

    match state.script.lock().translations.get(&tag) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

    async fn exchange(
        socket: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        request: Value,
    ) -> Value {
        socket
            .send(WsMessage::Text(request.to_string()))
            .await
            .unwrap();
        match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => serde_json::from_str(&payload).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_then_scripted_reply() {
        let device = MockDevice::start().await.unwrap();
        device.set_reply("state", json!({"total_fault": "0"}));
        let url = format!("ws://{}{}", device.address(), SOCKET_PATH);
        let (mut socket, _response) = connect_async(&url).await.unwrap();

        let connect = exchange(
            &mut socket,
            json!({"lang": "zh_cn", "token": "nonce", "service": "connect"}),
        )
        .await;
        assert_eq!(connect["result_code"], 1);
        let token = connect["result_data"]["token"].as_str().unwrap().to_owned();

        let login = exchange(
            &mut socket,
            json!({"lang": "zh_cn", "token": token, "service": "login",
                   "username": USERNAME, "passwd": PASSWORD}),
        )
        .await;
        let session = login["result_data"]["token"].as_str().unwrap().to_owned();
        assert_eq!(device.session_token().as_deref(), Some(session.as_str()));

        let state = exchange(
            &mut socket,
            json!({"lang": "zh_cn", "token": session, "service": "state"}),
        )
        .await;
        assert_eq!(state["result_data"]["service"], "state");
        assert_eq!(state["result_data"]["total_fault"], "0");

        let stale = exchange(
            &mut socket,
            json!({"lang": "zh_cn", "token": "stale", "service": "state"}),
        )
        .await;
        assert_eq!(stale["result_code"], TOKEN_EXPIRED_CODE);

        assert_eq!(device.connections(), 1);
        assert_eq!(device.calls("state"), 2);
        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn injected_frames_precede_reply() {
        let device = MockDevice::start().await.unwrap();
        device.inject_before("connect", envelope(103, "web session timeout", Value::Null));
        let url = format!("ws://{}{}", device.address(), SOCKET_PATH);
        let (mut socket, _response) = connect_async(&url).await.unwrap();

        let first = exchange(&mut socket, json!({"service": "connect", "token": ""})).await;
        assert_eq!(first["result_code"], 103);
        match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => {
                let reply: Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(reply["result_data"]["service"], "connect");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        device.shutdown().await.unwrap();
    }
}
