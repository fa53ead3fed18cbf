//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Authenticated request/response session over the device websocket."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Session lifecycle: `connect` opens the socket and runs the two-step handshake,
//! `call` performs one serialized round trip (reconnecting when the device reports
//! a lost session), `close` tears everything down.
//!
//! The session mutex is held for a whole round trip, so frames of concurrent
//! callers never interleave on the socket.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use rg_common::{DeviceConfig, SessionConfig};
use rg_logging::{
    log_session_event, rg_debug, rg_info, rg_warn, SessionContext, SessionEventOutcome,
};
use rg_metrics::SessionMetrics;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;
use uuid::Uuid;

use crate::envelope::{
    build_request, classify_frame, is_handshake, FrameDisposition, Response, ResponseStatus,
    CONNECT, LOGIN, PING,
};
use crate::error::{ClientError, ErrorKind};
use crate::heartbeat::Heartbeat;
use crate::retry::ReconnectPolicy;
use crate::transport::{http_client, http_url, FrameSocket};

#[derive(Debug, Deserialize)]
struct TokenReply {
    token: String,
}

#[derive(Default)]
struct Session {
    socket: Option<FrameSocket>,
    token: String,
    connected: bool,
    /// Bumped on every completed handshake.
    generation: u64,
    heartbeat: Option<Heartbeat>,
}

impl Session {
    fn permits(&self, service: &str) -> bool {
        if !self.connected {
            service == CONNECT
        } else if self.token.is_empty() {
            service == LOGIN
        } else {
            true
        }
    }
}

struct Inner {
    device: DeviceConfig,
    config: SessionConfig,
    policy: ReconnectPolicy,
    http: reqwest::Client,
    metrics: Option<SessionMetrics>,
    session: Mutex<Session>,
    handshake_lock: Mutex<()>,
    reconnect_lock: Mutex<()>,
}

/// Client for the dongle's websocket control API. Cloning shares the session.
#[derive(Clone)]
pub struct ProtocolClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("host", &self.inner.device.host)
            .field("secure", &self.inner.device.secure)
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    pub fn new(
        device: DeviceConfig,
        config: SessionConfig,
        metrics: Option<SessionMetrics>,
    ) -> Result<Self, ClientError> {
        let http = http_client(&device, &config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                policy: ReconnectPolicy::from_config(&config),
                device,
                config,
                http,
                metrics,
                session: Mutex::new(Session::default()),
                handshake_lock: Mutex::new(()),
                reconnect_lock: Mutex::new(()),
            }),
        })
    }

    pub fn host(&self) -> &str {
        &self.inner.device.host
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.inner.device
    }

    pub fn metrics(&self) -> Option<&SessionMetrics> {
        self.inner.metrics.as_ref()
    }

    /// Whether the handshake completed and a token is held.
    pub async fn is_connected(&self) -> bool {
        let session = self.inner.session.lock().await;
        session.connected && !session.token.is_empty()
    }

    /// Open the socket and authenticate. A no-op when already connected.
    ///
    /// On handshake failure the session is closed again before the error is returned.
    pub async fn connect(&self) -> Result<(), ClientError> {
        trace!("ProtocolClient::connect()");
        let _handshake = self.inner.handshake_lock.lock().await;
        {
            let mut session = self.inner.session.lock().await;
            let context = SessionContext::new().with_host(self.host());
            if session.connected {
                rg_debug!(context = context, "already connected");
                return Ok(());
            }
            rg_info!(context = context, "connecting");
            let socket = FrameSocket::open(&self.inner.device, self.inner.config.read_timeout)
                .await
                .map_err(|source| ClientError::Transport {
                    service: CONNECT.to_owned(),
                    source,
                })?;
            session.socket = Some(socket);
            session.token.clear();
        }

        if let Err(err) = self.handshake().await {
            self.close().await;
            return Err(err);
        }
        Ok(())
    }

    async fn handshake(&self) -> Result<(), ClientError> {
        let nonce = hex::encode(rand::random::<[u8; 32]>());
        let reply: TokenReply = self
            .call_as(
                CONNECT,
                json!({"token": nonce, "id": Uuid::new_v4().to_string()}),
            )
            .await?;
        self.inner.session.lock().await.connected = true;
        self.start_heartbeat().await;

        let reply: TokenReply = self
            .call_as(
                LOGIN,
                json!({
                    "token": reply.token,
                    "username": self.inner.device.username,
                    "passwd": self.inner.device.password,
                }),
            )
            .await?;
        {
            let mut session = self.inner.session.lock().await;
            session.token = reply.token;
            session.generation += 1;
        }

        if let Some(metrics) = &self.inner.metrics {
            metrics.set_connected(true);
        }
        log_session_event(
            Some(&SessionContext::new().with_host(self.host())),
            "session.connect",
            "connected",
            SessionEventOutcome::Success,
        );
        Ok(())
    }

    async fn start_heartbeat(&self) {
        let owner = Arc::downgrade(&self.inner);
        let heartbeat = Heartbeat::spawn(self.inner.config.heartbeat_interval, move || {
            let inner = owner.upgrade()?;
            Some(async move { ProtocolClient { inner }.ping().await })
        });
        if let Some(previous) = self.inner.session.lock().await.heartbeat.replace(heartbeat) {
            previous.stop();
        }
    }

    /// Stop the heartbeat, drop the token, and close the socket. Never fails.
    pub async fn close(&self) {
        trace!("ProtocolClient::close()");
        let mut session = self.inner.session.lock().await;
        if let Some(heartbeat) = session.heartbeat.take() {
            heartbeat.stop();
        }
        session.token.clear();
        session.connected = false;
        let Some(socket) = session.socket.take() else {
            rg_debug!(
                context = SessionContext::new().with_host(self.host()),
                "already disconnected"
            );
            return;
        };
        socket.close().await;
        drop(session);

        if let Some(metrics) = &self.inner.metrics {
            metrics.set_connected(false);
        }
        log_session_event(
            Some(&SessionContext::new().with_host(self.host())),
            "session.disconnect",
            "disconnected",
            SessionEventOutcome::Success,
        );
    }

    /// Keep-alive round trip; the reply payload is ignored.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call(PING, json!({"token": ":", "id": Uuid::new_v4().to_string()}))
            .await
            .map(|_| ())
    }

    /// Issue `service` with `params` and return the reply's `result_data`.
    ///
    /// A lost session triggers one reconnect cycle and a retry, except for the
    /// handshake verbs. `ping` resolves to `Value::Null`.
    pub async fn call(&self, service: &str, params: Value) -> Result<Value, ClientError> {
        trace!(service, "ProtocolClient::call()");
        let mut recoveries = 0;
        loop {
            let started = Instant::now();
            let (generation, outcome) = self.exchange(service, &params).await;
            let lost = match outcome {
                Ok(response) => match response.status() {
                    ResponseStatus::Success => {
                        self.observe(service, "success", started);
                        return Ok(if service == PING {
                            Value::Null
                        } else {
                            response.data
                        });
                    }
                    ResponseStatus::SessionLost => ClientError::SessionLost {
                        service: service.to_owned(),
                        code: response.code,
                        message: response.message,
                    },
                    ResponseStatus::Fatal => {
                        self.observe(service, "server_error", started);
                        return Err(ClientError::Server {
                            service: service.to_owned(),
                            code: response.code,
                            message: response.message,
                        });
                    }
                },
                Err(ClientError::NotConnected)
                    if !is_handshake(service) && self.reconnect_in_progress() =>
                {
                    rg_debug!(
                        context = SessionContext::new()
                            .with_host(self.host())
                            .with_service(service),
                        "waiting for reconnect in progress"
                    );
                    drop(self.inner.reconnect_lock.lock().await);
                    continue;
                }
                Err(err) if err.kind() == ErrorKind::SessionLost => err,
                Err(err) => {
                    self.observe(service, "error", started);
                    return Err(err);
                }
            };

            self.observe(service, "session_lost", started);
            if is_handshake(service) {
                return Err(lost);
            }
            if recoveries == self.inner.policy.max_attempts {
                return Err(ClientError::Disconnected {
                    attempts: recoveries,
                    reason: lost.to_string(),
                });
            }
            recoveries += 1;
            rg_warn!(
                context = SessionContext::new()
                    .with_host(self.host())
                    .with_service(service),
                "{lost}; reconnecting"
            );
            self.reconnect_after(generation).await?;
        }
    }

    pub async fn call_as<T: DeserializeOwned>(
        &self,
        service: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let data = self.call(service, params).await?;
        decode(service, data)
    }

    /// Tear down and re-establish the session with bounded attempts.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let _guard = self.inner.reconnect_lock.lock().await;
        self.reconnect_cycle().await
    }

    /// Reconnect unless another caller already replaced the session observed at `generation`.
    fn reconnect_after(&self, generation: u64) -> BoxFuture<'_, Result<(), ClientError>> {
        async move {
            let _guard = self.inner.reconnect_lock.lock().await;
            if self.inner.session.lock().await.generation != generation {
                rg_debug!(
                    context = SessionContext::new().with_host(self.host()),
                    "session already re-established"
                );
                return Ok(());
            }
            self.reconnect_cycle().await
        }
        .boxed()
    }

    fn reconnect_in_progress(&self) -> bool {
        self.inner.reconnect_lock.try_lock().is_err()
    }

    async fn reconnect_cycle(&self) -> Result<(), ClientError> {
        rg_info!(
            context = SessionContext::new().with_host(self.host()),
            "reconnecting"
        );
        self.close().await;
        let policy = self.inner.policy;
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Ok(()) => {
                    if let Some(metrics) = &self.inner.metrics {
                        metrics.record_reconnect("success");
                    }
                    log_session_event(
                        Some(
                            &SessionContext::new()
                                .with_host(self.host())
                                .with_attempt(attempt),
                        ),
                        "session.reconnect",
                        "session re-established",
                        SessionEventOutcome::Success,
                    );
                    return Ok(());
                }
                Err(err) => {
                    log_session_event(
                        Some(
                            &SessionContext::new()
                                .with_host(self.host())
                                .with_attempt(attempt),
                        ),
                        "session.reconnect",
                        &format!("reconnect attempt failed: {err}"),
                        SessionEventOutcome::Fault,
                    );
                    match policy.delay_after(attempt) {
                        Some(delay) => {
                            sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            if let Some(metrics) = &self.inner.metrics {
                                metrics.record_reconnect("failure");
                            }
                            return Err(ClientError::Disconnected {
                                attempts: policy.max_attempts,
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn exchange(&self, service: &str, params: &Value) -> (u64, Result<Response, ClientError>) {
        let mut session = self.inner.session.lock().await;
        let generation = session.generation;
        if !session.permits(service) {
            return (generation, Err(ClientError::NotConnected));
        }
        let request = match build_request(
            &self.inner.device.language_tag,
            &session.token,
            service,
            params,
        ) {
            Ok(request) => request,
            Err(err) => return (generation, Err(err)),
        };
        let Some(socket) = session.socket.as_mut() else {
            return (generation, Err(ClientError::NotConnected));
        };
        let outcome = round_trip(
            socket,
            &self.inner.device.host,
            service,
            request,
            self.inner.metrics.as_ref(),
        )
        .await;
        (generation, outcome)
    }

    /// Plain HTTP GET carrying the session token. Failures surface without reconnecting.
    ///
    /// `params` override the default query (`lang`, `token`, `page=1`, `limit=10`).
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ClientError> {
        trace!(path, "ProtocolClient::get()");
        let token = self.inner.session.lock().await.token.clone();
        if token.is_empty() {
            return Err(ClientError::NotConnected);
        }

        let mut query: IndexMap<&str, &str> = IndexMap::new();
        query.insert("lang", self.inner.device.language_tag.as_str());
        query.insert("token", token.as_str());
        query.insert("page", "1");
        query.insert("limit", "10");
        for &(key, value) in params {
            query.insert(key, value);
        }

        let http_error = |source: reqwest::Error| ClientError::Http {
            path: path.to_owned(),
            source,
        };
        let body = self
            .inner
            .http
            .get(http_url(&self.inner.device, path))
            .query(&query)
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?
            .text()
            .await
            .map_err(http_error)?;

        let response: Response =
            serde_json::from_str(&body).map_err(|source| ClientError::Decode {
                context: format!("response of {path}"),
                payload: body.clone(),
                source,
            })?;
        match response.status() {
            ResponseStatus::Success => Ok(response.data),
            ResponseStatus::SessionLost | ResponseStatus::Fatal => Err(ClientError::Server {
                service: path.to_owned(),
                code: response.code,
                message: response.message,
            }),
        }
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let data = self.get(path, params).await?;
        decode(path, data)
    }

    fn observe(&self, service: &str, outcome: &str, started: Instant) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.observe_call(service, outcome, started.elapsed());
        }
    }
}

async fn round_trip(
    socket: &mut FrameSocket,
    host: &str,
    service: &str,
    request: String,
    metrics: Option<&SessionMetrics>,
) -> Result<Response, ClientError> {
    let transport = |source| ClientError::Transport {
        service: service.to_owned(),
        source,
    };
    let context = SessionContext::new().with_host(host).with_service(service);
    socket.send_text(request).await.map_err(transport)?;
    loop {
        let text = socket.next_text().await.map_err(transport)?;
        // Frames without an envelope are device pushes; the reply is still pending.
        let response: Response = match serde_json::from_str(&text) {
            Ok(response) => response,
            Err(err) => {
                rg_debug!(context = context, "malformed frame dropped ({err}): {text}");
                record_drop(metrics, "malformed");
                continue;
            }
        };
        match classify_frame(service, &response) {
            FrameDisposition::Accept => return Ok(response),
            FrameDisposition::DropCode(code) => {
                rg_debug!(context = context, "frame with code {code} dropped");
                record_drop(metrics, "code");
            }
            FrameDisposition::ServiceMismatch(read) => {
                rg_debug!(
                    context = context,
                    "frame tagged '{}' dropped",
                    read.as_deref().unwrap_or("")
                );
                record_drop(metrics, "service_mismatch");
            }
        }
    }
}

fn record_drop(metrics: Option<&SessionMetrics>, reason: &str) {
    if let Some(metrics) = metrics {
        metrics.inc_dropped_frame(reason);
    }
}

fn decode<T: DeserializeOwned>(context: &str, data: Value) -> Result<T, ClientError> {
    T::deserialize(&data).map_err(|source| ClientError::Decode {
        context: format!("payload of {context}"),
        payload: data.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_follow_handshake_progress() {
        let mut session = Session::default();
        assert!(session.permits(CONNECT));
        assert!(!session.permits(LOGIN));
        assert!(!session.permits("real"));

        session.connected = true;
        assert!(session.permits(LOGIN));
        assert!(!session.permits(PING));

        session.token = "abc".into();
        assert!(session.permits("real"));
        assert!(session.permits(PING));
    }

    #[tokio::test]
    async fn calls_before_connect_are_rejected() {
        let client = ProtocolClient::new(
            DeviceConfig::new("127.0.0.1:9"),
            SessionConfig::default(),
            None,
        )
        .unwrap();
        let err = client.call("real", Value::Null).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        let err = client.get("/about/list", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(!client.is_connected().await);
        client.close().await;
    }

    #[test]
    fn decode_reports_payload() {
        let err = decode::<TokenReply>("connect", json!({"nope": 1})).unwrap_err();
        match err {
            ClientError::Decode { payload, .. } => assert!(payload.contains("nope")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
