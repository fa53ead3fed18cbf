//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Request and response envelopes of the device control API."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Wire envelopes exchanged with the dongle.
//!
//! Every request is a flat JSON object carrying `lang`, `token`, and `service`
//! next to the service parameters. Every response wraps its payload in
//! `result_code` / `result_msg` / `result_data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

pub const CONNECT: &str = "connect";
pub const LOGIN: &str = "login";
pub const PING: &str = "ping";

pub const SUCCESS_CODE: i64 = 1;
pub const SESSION_LOST_CODES: [i64; 3] = [100, 104, 106];
/// Codes of unsolicited push frames the device interleaves with replies.
pub const DROPPED_CODES: [i64; 1] = [103];

/// Handshake verbs never trigger a reconnect.
pub fn is_handshake(service: &str) -> bool {
    service == CONNECT || service == LOGIN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "result_code")]
    pub code: i64,
    #[serde(rename = "result_msg", default)]
    pub message: String,
    #[serde(rename = "result_data", default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    SessionLost,
    Fatal,
}

impl Response {
    pub fn status(&self) -> ResponseStatus {
        if self.code == SUCCESS_CODE {
            ResponseStatus::Success
        } else if SESSION_LOST_CODES.contains(&self.code) {
            ResponseStatus::SessionLost
        } else {
            ResponseStatus::Fatal
        }
    }

    /// Service tag echoed inside `result_data`, if present.
    pub fn service_tag(&self) -> Option<&str> {
        self.data.get("service").and_then(Value::as_str)
    }
}

/// Outcome of inspecting a frame read while waiting for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    Accept,
    DropCode(i64),
    ServiceMismatch(Option<String>),
}

/// Decide whether `response` answers the pending `service` call.
///
/// Drop-list codes are filtered first. Ping replies carry no service tag and are
/// accepted as-is; every other reply must echo the requested service.
pub fn classify_frame(service: &str, response: &Response) -> FrameDisposition {
    if DROPPED_CODES.contains(&response.code) {
        return FrameDisposition::DropCode(response.code);
    }
    if service == PING {
        return FrameDisposition::Accept;
    }
    match response.service_tag() {
        Some(tag) if tag == service => FrameDisposition::Accept,
        other => FrameDisposition::ServiceMismatch(other.map(str::to_owned)),
    }
}

/// Assemble the outbound message. Caller parameters override the fixed fields.
pub fn build_request(
    lang: &str,
    token: &str,
    service: &str,
    params: &Value,
) -> Result<String, ClientError> {
    let mut message = Map::new();
    message.insert("lang".to_owned(), Value::from(lang));
    message.insert("token".to_owned(), Value::from(token));
    message.insert("service".to_owned(), Value::from(service));
    match params {
        Value::Null => {}
        Value::Object(extra) => {
            for (key, value) in extra {
                message.insert(key.clone(), value.clone());
            }
        }
        _ => {
            return Err(ClientError::InvalidParams {
                service: service.to_owned(),
            })
        }
    }
    Ok(Value::Object(message).to_string())
}
