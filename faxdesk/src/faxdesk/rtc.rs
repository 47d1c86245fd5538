//! The seam between the console and the real-time vendor client.
//!
//! The vendor pushes duck-typed notification objects; everything the rest of
//! the crate sees is normalized here, once, into [`CallUpdate`]. The client
//! itself is an explicitly owned object behind [`RtcClient`], constructed by
//! the session controller through an injected [`RtcConnector`].

use crate::faxdesk::call::{CallId, CallState, Direction};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum RtcError {
    #[error("gateway transport failed: {0}")]
    Transport(String),
    #[error("gateway refused the request: {0}")]
    Rejected(String),
    #[error("the client is not connected")]
    NotConnected,
}

/// Credentials extracted from the backend token grant.
#[derive(Debug, Clone)]
pub struct RtcCredentials {
    pub login_token: String,
    pub ice_servers: Vec<String>,
}

/// Events the vendor client surfaces to the session controller.
pub enum RtcEvent {
    Ready,
    Error(String),
    SocketClosed,
    Call(CallUpdate),
    /// Remote audio for a call, possibly arriving well after the call went
    /// active. 16-bit LE PCM, 8 kHz mono frames.
    RemoteStream {
        call_id: CallId,
        stream: mpsc::Receiver<Bytes>,
    },
}

/// A connected vendor client. `disconnect` must be idempotent.
#[async_trait]
pub trait RtcClient: Send {
    async fn answer(
        &mut self,
        call_id: &CallId,
        capture: mpsc::Receiver<Bytes>,
    ) -> Result<(), RtcError>;
    async fn hangup(&mut self, call_id: &CallId) -> Result<(), RtcError>;
    async fn set_muted(&mut self, call_id: &CallId, muted: bool) -> Result<(), RtcError>;
    async fn send_dtmf(&mut self, call_id: &CallId, digit: char) -> Result<(), RtcError>;
    async fn disconnect(&mut self) -> Result<(), RtcError>;
}

pub struct RtcSession {
    pub client: Box<dyn RtcClient>,
    pub events: mpsc::Receiver<RtcEvent>,
}

#[async_trait]
pub trait RtcConnector: Send + Sync {
    async fn connect(&self, credentials: RtcCredentials) -> Result<RtcSession, RtcError>;
}

/// A call notification normalized out of the vendor payload.
#[derive(Debug, Clone)]
pub struct CallUpdate {
    pub id: CallId,
    pub state: CallState,
    pub direction: Direction,
    pub caller: Option<String>,
    pub callee: Option<String>,
    pub media_url: Option<String>,
}

impl CallUpdate {
    /// Field names vary across vendor revisions; each logical value is
    /// looked up through a fallback chain, here and nowhere else.
    pub fn from_value(value: &Value) -> Option<Self> {
        let call = value.get("call").unwrap_or(value);

        let id = first_str(call, &["callID", "call_id", "id"])?;
        let state_label = first_str(call, &["state", "status"])?;
        let state = CallState::parse(&state_label)?;

        let direction = match first_str(call, &["direction"]).as_deref() {
            Some("inbound") | Some("incoming") => Direction::Inbound,
            _ => Direction::Outbound,
        };

        Some(Self {
            id: CallId::new(id),
            state,
            direction,
            caller: first_str(call, &["caller_id_number", "callerNumber", "caller", "from"]),
            callee: first_str(call, &["destination_number", "calleeNumber", "callee", "to"]),
            media_url: first_str(call, &["media_url", "mediaUrl", "stream_url"]),
        })
    }

    pub fn remote_party(&self) -> &str {
        let remote = match self.direction {
            Direction::Inbound => self.caller.as_deref(),
            Direction::Outbound => self.callee.as_deref(),
        };
        remote.unwrap_or("unknown")
    }
}

pub(crate) fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(key))
        .find_map(|v| v.as_str())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_the_snake_case_shape() {
        let update = CallUpdate::from_value(&json!({
            "call_id": "abc",
            "state": "ringing",
            "direction": "inbound",
            "caller_id_number": "+15550001111",
            "destination_number": "+15559998888",
        }))
        .unwrap();
        assert_eq!(update.id.as_str(), "abc");
        assert_eq!(update.state, CallState::Ringing);
        assert_eq!(update.direction, Direction::Inbound);
        assert_eq!(update.remote_party(), "+15550001111");
    }

    #[test]
    fn falls_back_across_field_name_variants() {
        let update = CallUpdate::from_value(&json!({
            "callID": "xyz",
            "status": "active",
            "callerNumber": "+1555",
            "mediaUrl": "http://gw/media/xyz",
        }))
        .unwrap();
        assert_eq!(update.id.as_str(), "xyz");
        assert_eq!(update.state, CallState::Active);
        assert_eq!(update.media_url.as_deref(), Some("http://gw/media/xyz"));
        // No direction field: treated as outbound.
        assert_eq!(update.direction, Direction::Outbound);
    }

    #[test]
    fn tolerates_a_nested_call_object() {
        let update = CallUpdate::from_value(&json!({
            "type": "callUpdate",
            "call": { "id": "n-1", "state": "hangup" },
        }))
        .unwrap();
        assert_eq!(update.id.as_str(), "n-1");
        assert!(update.state.is_terminal());
    }

    #[test]
    fn rejects_payloads_without_id_or_state() {
        assert!(CallUpdate::from_value(&json!({ "state": "ringing" })).is_none());
        assert!(CallUpdate::from_value(&json!({ "call_id": "abc" })).is_none());
        assert!(CallUpdate::from_value(&json!({ "call_id": "abc", "state": "weird" })).is_none());
    }
}
