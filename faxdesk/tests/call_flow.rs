//! End-to-end call round-trip over the public API: bootstrap against a mock
//! backend, then ring -> answer -> active -> hangup through a scripted
//! gateway client.

use faxdesk::faxdesk::audio::AudioBridge;
use faxdesk::faxdesk::backend::BackendClient;
use faxdesk::faxdesk::call::{CallId, CallState, Direction};
use faxdesk::faxdesk::rtc::{
    CallUpdate, RtcClient, RtcConnector, RtcCredentials, RtcError, RtcEvent, RtcSession,
};
use faxdesk::faxdesk::session::{ConnectionState, SessionController, SessionEvent};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct ActionLog {
    answers: Vec<String>,
    hangups: Vec<String>,
}

struct ScriptedClient {
    log: Arc<Mutex<ActionLog>>,
}

#[async_trait::async_trait]
impl RtcClient for ScriptedClient {
    async fn answer(
        &mut self,
        call_id: &CallId,
        _capture: mpsc::Receiver<Bytes>,
    ) -> Result<(), RtcError> {
        self.log
            .lock()
            .unwrap()
            .answers
            .push(call_id.as_str().to_owned());
        Ok(())
    }

    async fn hangup(&mut self, call_id: &CallId) -> Result<(), RtcError> {
        self.log
            .lock()
            .unwrap()
            .hangups
            .push(call_id.as_str().to_owned());
        Ok(())
    }

    async fn set_muted(&mut self, _call_id: &CallId, _muted: bool) -> Result<(), RtcError> {
        Ok(())
    }

    async fn send_dtmf(&mut self, _call_id: &CallId, _digit: char) -> Result<(), RtcError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RtcError> {
        Ok(())
    }
}

struct ScriptedConnector {
    session: Mutex<Option<RtcSession>>,
    seen_token: Arc<Mutex<Option<String>>>,
}

#[async_trait::async_trait]
impl RtcConnector for ScriptedConnector {
    async fn connect(&self, credentials: RtcCredentials) -> Result<RtcSession, RtcError> {
        *self.seen_token.lock().unwrap() = Some(credentials.login_token);
        self.session
            .lock()
            .unwrap()
            .take()
            .ok_or(RtcError::NotConnected)
    }
}

struct NullAudio;

impl AudioBridge for NullAudio {
    fn open_capture(&mut self) -> Result<mpsc::Receiver<Bytes>, anyhow::Error> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    fn attach_playback(&mut self, _frames: mpsc::Receiver<Bytes>) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn detach(&mut self) {}
}

async fn next_event(controller: &mut SessionController) -> Option<SessionEvent> {
    for _ in 0..8 {
        let step = tokio::time::timeout(Duration::from_millis(200), controller.run()).await;
        match step {
            Ok(Some(event)) => return Some(event),
            Ok(None) => continue,
            Err(_) => return None,
        }
    }
    None
}

fn call_update(id: &str, state: CallState) -> RtcEvent {
    RtcEvent::Call(CallUpdate {
        id: CallId::new(id),
        state,
        direction: Direction::Inbound,
        caller: Some("+15550009999".to_owned()),
        callee: None,
        media_url: None,
    })
}

#[tokio::test]
async fn an_inbound_call_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telnyx/webrtc/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "login_token": "tok-123" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(ActionLog::default()));
    let seen_token = Arc::new(Mutex::new(None));
    let (rtc_tx, rtc_rx) = mpsc::channel(16);
    let connector = Arc::new(ScriptedConnector {
        session: Mutex::new(Some(RtcSession {
            client: Box::new(ScriptedClient {
                log: Arc::clone(&log),
            }),
            events: rtc_rx,
        })),
        seen_token: Arc::clone(&seen_token),
    });

    let mut controller = SessionController::new(
        BackendClient::new(server.uri()),
        connector,
        Box::new(NullAudio),
    );
    assert_eq!(controller.connection_state(), ConnectionState::Connecting);

    controller.connect();
    rtc_tx.send(RtcEvent::Ready).await.unwrap();
    assert_eq!(next_event(&mut controller).await, Some(SessionEvent::Connected));
    assert_eq!(controller.connection_state(), ConnectionState::Ready);
    assert_eq!(controller.status_line(), "Ready");
    assert_eq!(seen_token.lock().unwrap().as_deref(), Some("tok-123"));

    // Ring.
    rtc_tx
        .send(call_update("call-1", CallState::Ringing))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut controller).await,
        Some(SessionEvent::IncomingCall {
            caller: "+15550009999".to_owned()
        })
    );
    assert_eq!(controller.status_line(), "Incoming: +15550009999");

    // Answer, then the gateway confirms the call is up.
    controller.answer().await.unwrap();
    assert_eq!(log.lock().unwrap().answers, vec!["call-1".to_owned()]);

    rtc_tx
        .send(call_update("call-1", CallState::Active))
        .await
        .unwrap();
    assert_eq!(next_event(&mut controller).await, Some(SessionEvent::CallActive));
    assert_eq!(controller.status_line(), "Connected");

    // Hang up locally; the record clears without waiting for the gateway.
    controller.hang_up().await.unwrap();
    assert_eq!(controller.status_line(), "Ready");
    assert!(controller.calls().active().is_none());
    assert_eq!(log.lock().unwrap().hangups, vec!["call-1".to_owned()]);

    // The straggling terminal notification is a no-op.
    rtc_tx
        .send(call_update("call-1", CallState::Hangup))
        .await
        .unwrap();
    assert_eq!(next_event(&mut controller).await, None);
    assert_eq!(controller.status_line(), "Ready");

    controller.disconnect().await;
    controller.disconnect().await;
    assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
}
