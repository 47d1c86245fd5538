use std::collections::VecDeque;
use std::fmt;

/// Identifiers the user dismissed (reject, hangup) are remembered so the
/// corresponding terminal notification arriving later is a no-op.
const CLEARED_MEMORY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Vendor-reported call states, normalized from the notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    New,
    Ringing,
    Active,
    Held,
    Hangup,
    Destroy,
}

impl CallState {
    pub fn parse(label: &str) -> Option<Self> {
        let state = match label.to_ascii_lowercase().as_str() {
            "new" => CallState::New,
            "ringing" | "requesting" | "trying" | "early" => CallState::Ringing,
            "active" | "answered" | "connected" => CallState::Active,
            "held" | "hold" => CallState::Held,
            "hangup" | "done" => CallState::Hangup,
            "destroy" | "purge" => CallState::Destroy,
            _ => return None,
        };
        Some(state)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Hangup | CallState::Destroy)
    }
}

/// One call as the console tracks it. The gateway may know about more calls
/// than this; the UI only ever surfaces one incoming and one active.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    pub direction: Direction,
    pub remote: String,
    pub state: CallState,
    pub muted: bool,
    pub backend_originated: bool,
}

impl CallSession {
    pub fn inbound(id: CallId, remote: impl Into<String>) -> Self {
        Self {
            id,
            direction: Direction::Inbound,
            remote: remote.into(),
            state: CallState::Ringing,
            muted: false,
            backend_originated: false,
        }
    }

    pub fn outbound(id: CallId, remote: impl Into<String>, backend_originated: bool) -> Self {
        Self {
            id,
            direction: Direction::Outbound,
            remote: remote.into(),
            state: CallState::New,
            muted: false,
            backend_originated,
        }
    }
}

/// The call records of the display model: at most one incoming call and at
/// most one active call, plus the memory of recently dismissed identifiers.
#[derive(Debug, Default)]
pub struct CallBoard {
    incoming: Option<CallSession>,
    active: Option<CallSession>,
    cleared: VecDeque<CallId>,
}

impl CallBoard {
    pub fn incoming(&self) -> Option<&CallSession> {
        self.incoming.as_ref()
    }

    pub fn active(&self) -> Option<&CallSession> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut CallSession> {
        self.active.as_mut()
    }

    /// Any call in progress, pending or answered.
    pub fn is_busy(&self) -> bool {
        self.incoming.is_some() || self.active.is_some()
    }

    pub fn was_cleared(&self, id: &CallId) -> bool {
        self.cleared.contains(id)
    }

    pub fn note_cleared(&mut self, id: CallId) {
        if self.cleared.contains(&id) {
            return;
        }
        if self.cleared.len() == CLEARED_MEMORY {
            self.cleared.pop_front();
        }
        self.cleared.push_back(id);
    }

    /// Record a ringing inbound call. Refused (returns false) while another
    /// call is pending or answered; this UI has no call-waiting model.
    pub fn offer_incoming(&mut self, call: CallSession) -> bool {
        if let Some(existing) = &self.incoming {
            if existing.id != call.id {
                return false;
            }
        }
        if self.active.is_some() {
            return false;
        }
        self.incoming = Some(call);
        true
    }

    /// Record the backend's acknowledgement of an originated call. If the
    /// gateway notification for the same identifier already created the
    /// record, just mark it; the two arrivals converge either way.
    pub fn record_outbound(&mut self, id: CallId, remote: &str) {
        match &mut self.active {
            Some(call) if call.id == id => call.backend_originated = true,
            Some(_) => {
                log::warn!(id:% = id; "Outbound acknowledged while another call is active.");
            }
            None => self.active = Some(CallSession::outbound(id, remote, true)),
        }
    }

    /// Apply an `active` transition for the given identifier: promote the
    /// incoming record, refresh the existing active record, or surface a
    /// call this client has not seen yet (backend-originated, notification
    /// first).
    pub fn promote_active(&mut self, id: &CallId, direction: Direction, remote: &str) {
        if let Some(call) = &mut self.active {
            if call.id == *id {
                call.state = CallState::Active;
                return;
            }
        }
        let mut call = match self.incoming.take() {
            Some(incoming) if incoming.id == *id => incoming,
            other => {
                self.incoming = other;
                CallSession {
                    id: id.clone(),
                    direction,
                    remote: remote.to_owned(),
                    state: CallState::Active,
                    muted: false,
                    backend_originated: false,
                }
            }
        };
        call.state = CallState::Active;
        self.active = Some(call);
    }

    /// Refresh the vendor-reported state on whichever record carries the
    /// identifier. Returns false when neither does.
    pub fn update_state(&mut self, id: &CallId, state: CallState) -> bool {
        for slot in [&mut self.incoming, &mut self.active] {
            if let Some(call) = slot {
                if call.id == *id {
                    call.state = state;
                    return true;
                }
            }
        }
        false
    }

    pub fn take_incoming(&mut self) -> Option<CallSession> {
        self.incoming.take()
    }

    pub fn take_active(&mut self) -> Option<CallSession> {
        self.active.take()
    }

    /// Terminal cleanup: drop both records (the mute flag goes with them)
    /// and remember the identifiers. Safe to call on an empty board.
    pub fn clear_all(&mut self) -> bool {
        let mut any = false;
        for call in [self.incoming.take(), self.active.take()].into_iter().flatten() {
            self.note_cleared(call.id);
            any = true;
        }
        any
    }
}

pub fn is_dtmf_digit(digit: char) -> bool {
    matches!(digit, '0'..='9' | '*' | '#' | 'A'..='D')
}
