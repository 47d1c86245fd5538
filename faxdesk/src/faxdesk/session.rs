//! The session controller: owns the vendor client, reduces its event stream
//! into the display model, and carries the user-facing call actions.

use crate::faxdesk::audio::AudioBridge;
use crate::faxdesk::backend::BackendClient;
use crate::faxdesk::call::{is_dtmf_digit, CallBoard, CallId, CallSession, CallState, Direction};
use crate::faxdesk::rtc::{CallUpdate, RtcClient, RtcConnector, RtcEvent, RtcSession};

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Error,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    ConnectionFailed(String),
    ConnectionClosed,
    IncomingCall { caller: String },
    CallActive,
    CallEnded,
}

pub struct SessionController {
    backend: BackendClient,
    connector: Arc<dyn RtcConnector>,
    audio: Box<dyn AudioBridge>,
    state: ConnectionState,
    status: String,
    board: CallBoard,
    client: Option<Box<dyn RtcClient>>,
    rtc_events: Option<mpsc::Receiver<RtcEvent>>,
    bootstrap: Option<JoinHandle<Result<RtcSession>>>,
    cancel: CancellationToken,
    disposed: bool,
    pending_stream: Option<(CallId, mpsc::Receiver<Bytes>)>,
    events: VecDeque<SessionEvent>,
}

impl SessionController {
    pub fn new(
        backend: BackendClient,
        connector: Arc<dyn RtcConnector>,
        audio: Box<dyn AudioBridge>,
    ) -> Self {
        Self {
            backend,
            connector,
            audio,
            state: ConnectionState::Connecting,
            status: "Connecting...".to_owned(),
            board: CallBoard::default(),
            client: None,
            rtc_events: None,
            bootstrap: None,
            cancel: CancellationToken::new(),
            disposed: false,
            pending_stream: None,
            events: VecDeque::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn status_line(&self) -> &str {
        &self.status
    }

    pub fn calls(&self) -> &CallBoard {
        &self.board
    }

    /// Kicks off the token fetch and client connection in a background
    /// task; the result is consumed by [`run`](Self::run).
    pub fn connect(&mut self) {
        if self.disposed {
            log::warn!("Connect after teardown is ignored.");
            return;
        }
        self.state = ConnectionState::Connecting;
        self.status = "Connecting...".to_owned();

        let backend = self.backend.clone();
        let connector = Arc::clone(&self.connector);
        let cancel = self.cancel.clone();
        self.bootstrap = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(anyhow::Error::msg("The connection was cancelled")),
                result = bootstrap(backend, connector) => result,
            }
        }));
    }

    /// Idempotent teardown. Never errors, even when nothing is connected;
    /// anything still in flight is dropped without touching state again.
    pub async fn disconnect(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.cancel.cancel();

        if let Some(handle) = self.bootstrap.take() {
            if handle.is_finished() {
                // The client connected but was never installed; close it
                // out of band.
                if let Ok(Ok(session)) = handle.await {
                    let mut client = session.client;
                    tokio::spawn(async move {
                        let _ = client.disconnect().await;
                    });
                }
            } else {
                handle.abort();
            }
        }

        if let Some(mut client) = self.client.take() {
            if let Err(err) = client.disconnect().await {
                log::debug!(err:%; "Client disconnect reported an error.");
            }
        }
        self.rtc_events = None;
        self.pending_stream = None;
        self.board.clear_all();
        self.audio.detach();
        self.state = ConnectionState::Disconnected;
        self.status = "Disconnected".to_owned();
    }

    /// Drives the session one step: returns a queued display event, or
    /// waits on whichever source is live (bootstrap completion, then the
    /// vendor event stream). Pends forever when there is nothing to wait
    /// on, so it can sit in a `select!` opposite the command channel.
    pub async fn run(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }

        let bootstrapped = match self.bootstrap.as_mut() {
            Some(handle) => Some(handle.await),
            None => None,
        };
        if let Some(result) = bootstrapped {
            self.bootstrap = None;
            self.finish_bootstrap(result);
            return self.events.pop_front();
        }

        let event = match self.rtc_events.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => std::future::pending().await,
        };
        match event {
            Some(event) => self.reduce(event),
            None => {
                // The client dropped its end of the event channel.
                self.rtc_events = None;
                self.reduce(RtcEvent::SocketClosed);
            }
        }
        self.events.pop_front()
    }

    fn finish_bootstrap(
        &mut self,
        result: Result<Result<RtcSession>, tokio::task::JoinError>,
    ) {
        let result = match result {
            Ok(result) => result,
            Err(err) => Err(anyhow::Error::msg(err.to_string())),
        };
        match result {
            Ok(session) => {
                if self.disposed {
                    let mut client = session.client;
                    tokio::spawn(async move {
                        let _ = client.disconnect().await;
                    });
                    return;
                }
                self.client = Some(session.client);
                self.rtc_events = Some(session.events);
            }
            Err(err) => {
                if self.disposed {
                    return;
                }
                log::warn!(err:%; "Connection bootstrap failed.");
                self.state = ConnectionState::Error;
                self.status = format!("Connection error: {err}");
                self.push(SessionEvent::ConnectionFailed(err.to_string()));
            }
        }
    }

    fn reduce(&mut self, event: RtcEvent) {
        match event {
            RtcEvent::Ready => {
                self.state = ConnectionState::Ready;
                self.status = self.baseline_status();
                self.push(SessionEvent::Connected);
            }
            RtcEvent::Error(message) => {
                self.state = ConnectionState::Error;
                self.status = format!("Connection error: {message}");
                self.push(SessionEvent::ConnectionFailed(message));
            }
            RtcEvent::SocketClosed => self.handle_socket_closed(),
            RtcEvent::Call(update) => self.reduce_call(update),
            RtcEvent::RemoteStream { call_id, stream } => self.attach_stream(call_id, stream),
        }
    }

    fn reduce_call(&mut self, update: CallUpdate) {
        if self.board.was_cleared(&update.id) {
            log::debug!(id:% = update.id; "Notification for a dismissed call.");
            return;
        }
        match update.state {
            CallState::Ringing if update.direction == Direction::Inbound => {
                let caller = update.remote_party().to_owned();
                if self
                    .board
                    .offer_incoming(CallSession::inbound(update.id.clone(), caller.clone()))
                {
                    self.status = format!("Incoming: {caller}");
                    self.push(SessionEvent::IncomingCall { caller });
                } else {
                    log::warn!(id:% = update.id; "Refusing a second concurrent incoming call.");
                }
            }
            CallState::Active => {
                self.board
                    .promote_active(&update.id, update.direction, update.remote_party());
                self.status = "Connected".to_owned();
                self.push(SessionEvent::CallActive);
                self.try_attach_pending();
            }
            state if state.is_terminal() => {
                let any = self.board.clear_all();
                self.audio.detach();
                self.pending_stream = None;
                self.status = self.baseline_status();
                if any {
                    self.push(SessionEvent::CallEnded);
                }
            }
            state => {
                // Label refresh only; records are never cleared here.
                self.board.update_state(&update.id, state);
                self.status = self.baseline_status();
            }
        }
    }

    fn handle_socket_closed(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        // A dead signaling channel cannot deliver the terminal
        // notifications that would otherwise clean these up.
        self.board.clear_all();
        self.audio.detach();
        self.pending_stream = None;
        self.status = self.baseline_status();
        self.push(SessionEvent::ConnectionClosed);
    }

    fn attach_stream(&mut self, call_id: CallId, stream: mpsc::Receiver<Bytes>) {
        if self.board.active().is_some_and(|call| call.id == call_id) {
            if let Err(err) = self.audio.attach_playback(stream) {
                log::warn!(err:%; "Could not attach the remote stream.");
            }
        } else if !self.board.was_cleared(&call_id) {
            // The stream can outrun the state transition; hold it until the
            // call is promoted.
            self.pending_stream = Some((call_id, stream));
        }
    }

    fn try_attach_pending(&mut self) {
        if let Some((call_id, stream)) = self.pending_stream.take() {
            self.attach_stream(call_id, stream);
        }
    }

    /// Place an outbound call through the backend. The call surfaces back
    /// to this client via gateway notifications; either arrival order
    /// converges on a single record.
    pub async fn place_call(&mut self, destination: &str) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(anyhow::Error::msg(
                "Can't place a call. The session is not ready",
            ));
        }
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(anyhow::Error::msg(
                "Can't place a call. The destination is empty",
            ));
        }
        if self.board.is_busy() {
            return Err(anyhow::Error::msg(
                "Can't place a call. A call is already in progress",
            ));
        }

        match self.backend.originate_call(destination).await {
            Ok(id) => {
                self.board.record_outbound(id, destination);
                self.status = format!("Dialing {destination}");
                Ok(())
            }
            Err(err) => {
                self.status = self.baseline_status();
                Err(err.into())
            }
        }
    }

    /// Capture is acquired before answering; a refusal degrades to a
    /// "Failed to answer" status and leaves the incoming record alone.
    pub async fn answer(&mut self) -> Result<()> {
        let call_id = match self.board.incoming() {
            Some(call) => call.id.clone(),
            None => return Err(anyhow::Error::msg("There is no incoming call")),
        };
        let capture = match self.audio.open_capture() {
            Ok(capture) => capture,
            Err(err) => {
                self.status = "Failed to answer".to_owned();
                return Err(err.context("could not acquire audio capture"));
            }
        };
        let Some(client) = self.client.as_mut() else {
            self.status = "Failed to answer".to_owned();
            return Err(anyhow::Error::msg("The client is not connected"));
        };
        match client.answer(&call_id, capture).await {
            Ok(()) => {
                self.status = "Answering...".to_owned();
                Ok(())
            }
            Err(err) => {
                self.status = "Failed to answer".to_owned();
                Err(err.into())
            }
        }
    }

    /// User-initiated: the record is cleared immediately instead of waiting
    /// for the terminal notification, which the reducer then drops.
    pub async fn reject(&mut self) -> Result<()> {
        let Some(call) = self.board.take_incoming() else {
            return Err(anyhow::Error::msg("There is no incoming call"));
        };
        self.board.note_cleared(call.id.clone());
        if let Some(client) = self.client.as_mut() {
            if let Err(err) = client.hangup(&call.id).await {
                log::warn!(err:%, id:% = call.id; "Reject did not reach the gateway.");
            }
        }
        self.status = self.baseline_status();
        self.push(SessionEvent::CallEnded);
        Ok(())
    }

    /// Local state is reset before anything goes on the wire, so a failing
    /// backend can never leave the UI showing an active call.
    pub async fn hang_up(&mut self) -> Result<()> {
        let Some(call) = self.board.take_active() else {
            return Err(anyhow::Error::msg("There is no active call"));
        };
        self.board.note_cleared(call.id.clone());
        self.audio.detach();
        self.pending_stream = None;
        self.status = self.baseline_status();
        self.push(SessionEvent::CallEnded);

        if call.backend_originated {
            if let Err(err) = self.backend.hangup_call(&call.id).await {
                log::warn!(err:%, id:% = call.id; "Backend hangup failed; falling back to the client.");
                self.local_hangup(&call.id).await;
            }
        } else {
            self.local_hangup(&call.id).await;
        }
        Ok(())
    }

    async fn local_hangup(&mut self, call_id: &CallId) {
        if let Some(client) = self.client.as_mut() {
            if let Err(err) = client.hangup(call_id).await {
                log::warn!(err:%, id:% = call_id; "Hangup did not reach the gateway.");
            }
        }
    }

    pub async fn set_muted(&mut self, muted: bool) -> Result<()> {
        let call_id = match self.board.active() {
            Some(call) => call.id.clone(),
            None => return Err(anyhow::Error::msg("There is no active call")),
        };
        let Some(client) = self.client.as_mut() else {
            return Err(anyhow::Error::msg("The client is not connected"));
        };
        match client.set_muted(&call_id, muted).await {
            Ok(()) => {
                if let Some(call) = self.board.active_mut() {
                    call.muted = muted;
                }
                Ok(())
            }
            // The flag stays where it was; the action is display-neutral.
            Err(err) => Err(anyhow::Error::from(err)),
        }
    }

    pub async fn send_dtmf(&mut self, digit: char) -> Result<()> {
        if !is_dtmf_digit(digit) {
            return Err(anyhow::Error::msg(format!(
                "'{digit}' is not a touch-tone digit"
            )));
        }
        let call_id = match self.board.active() {
            Some(call) => call.id.clone(),
            None => return Err(anyhow::Error::msg("There is no active call")),
        };
        let Some(client) = self.client.as_mut() else {
            return Err(anyhow::Error::msg("The client is not connected"));
        };
        client.send_dtmf(&call_id, digit).await?;
        Ok(())
    }

    /// The status label as a pure function of connection state and call
    /// records; transient action labels overwrite it until the next
    /// transition recomputes.
    fn baseline_status(&self) -> String {
        match self.state {
            ConnectionState::Connecting => "Connecting...".to_owned(),
            ConnectionState::Error => "Connection error".to_owned(),
            ConnectionState::Disconnected => "Disconnected".to_owned(),
            ConnectionState::Ready => {
                if let Some(call) = self.board.active() {
                    match call.state {
                        CallState::Active => "Connected".to_owned(),
                        CallState::Held => "Call held".to_owned(),
                        _ => format!("Dialing {}", call.remote),
                    }
                } else if let Some(call) = self.board.incoming() {
                    format!("Incoming: {}", call.remote)
                } else {
                    "Ready".to_owned()
                }
            }
        }
    }

    fn push(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }
}

async fn bootstrap(
    backend: BackendClient,
    connector: Arc<dyn RtcConnector>,
) -> Result<RtcSession> {
    let credentials = backend.webrtc_token().await?;
    let session = connector.connect(credentials).await?;
    Ok(session)
}
