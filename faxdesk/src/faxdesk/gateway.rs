//! The production vendor client: plain HTTP signaling against the real-time
//! gateway. A session is created with the login token, notifications arrive
//! over a long-poll loop, call actions are POSTs keyed by call identifier,
//! and remote audio is pulled as a chunked PCM stream.

use crate::faxdesk::call::{CallId, CallState};
use crate::faxdesk::rtc::{
    first_str, CallUpdate, RtcClient, RtcConnector, RtcCredentials, RtcError, RtcEvent, RtcSession,
};

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::select;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_SIZE: usize = 64;
const MEDIA_CHANNEL_SIZE: usize = 64;
/// The gateway holds idle long-poll requests itself; the pause only keeps an
/// eagerly answering server from spinning this client.
const POLL_PAUSE: Duration = Duration::from_millis(200);

pub struct GatewayConnector {
    http: reqwest::Client,
    base_url: String,
    log_notifications: bool,
}

impl GatewayConnector {
    pub fn new(base_url: impl Into<String>, log_notifications: bool) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http: reqwest::Client::new(),
            base_url,
            log_notifications,
        }
    }
}

#[async_trait]
impl RtcConnector for GatewayConnector {
    async fn connect(&self, credentials: RtcCredentials) -> Result<RtcSession, RtcError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            login_token: &'a str,
            #[serde(skip_serializing_if = "<[String]>::is_empty")]
            ice_servers: &'a [String],
        }

        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .json(&LoginRequest {
                login_token: &credentials.login_token,
                ice_servers: &credentials.ice_servers,
            })
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(RtcError::Rejected(format!(
                "session create returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(transport)?;
        let session_id = first_str(&body, &["id", "session_id", "sessionId"])
            .ok_or_else(|| RtcError::Rejected("no session identifier in response".to_owned()))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        // The created session is the connection; readiness is immediate and
        // must precede anything the poll loop delivers. A later `ready`
        // notification from the gateway is harmless.
        let _ = events_tx.send(RtcEvent::Ready).await;

        tokio::spawn(poll_events(PollContext {
            http: self.http.clone(),
            events_url: format!("{}/sessions/{session_id}/events", self.base_url),
            events: events_tx,
            cancel: cancel.clone(),
            log_notifications: self.log_notifications,
        }));

        Ok(RtcSession {
            client: Box::new(GatewayClient {
                http: self.http.clone(),
                base_url: self.base_url.clone(),
                session_id,
                cancel,
                disconnected: false,
            }),
            events: events_rx,
        })
    }
}

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    cancel: CancellationToken,
    disconnected: bool,
}

impl GatewayClient {
    fn call_url(&self, call_id: &CallId, action: &str) -> String {
        format!(
            "{}/sessions/{}/calls/{}/{action}",
            self.base_url, self.session_id, call_id
        )
    }

    async fn call_action(
        &self,
        call_id: &CallId,
        action: &str,
        body: Value,
    ) -> Result<(), RtcError> {
        if self.disconnected {
            return Err(RtcError::NotConnected);
        }
        let response = self
            .http
            .post(self.call_url(call_id, action))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RtcError::Rejected(format!(
                "{action} returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl RtcClient for GatewayClient {
    async fn answer(
        &mut self,
        call_id: &CallId,
        capture: mpsc::Receiver<Bytes>,
    ) -> Result<(), RtcError> {
        self.call_action(call_id, "answer", Value::Object(Default::default()))
            .await?;

        // Fire-and-forget capture upload; the call does not depend on it.
        let url = self.call_url(call_id, "media");
        let http = self.http.clone();
        let body = reqwest::Body::wrap_stream(
            ReceiverStream::new(capture).map(Ok::<Bytes, std::convert::Infallible>),
        );
        tokio::spawn(async move {
            if let Err(err) = http.post(url).body(body).send().await {
                log::warn!(err:%; "Capture upload ended.");
            }
        });
        Ok(())
    }

    async fn hangup(&mut self, call_id: &CallId) -> Result<(), RtcError> {
        self.call_action(call_id, "hangup", Value::Object(Default::default()))
            .await
    }

    async fn set_muted(&mut self, call_id: &CallId, muted: bool) -> Result<(), RtcError> {
        let action = if muted { "mute" } else { "unmute" };
        self.call_action(call_id, action, Value::Object(Default::default()))
            .await
    }

    async fn send_dtmf(&mut self, call_id: &CallId, digit: char) -> Result<(), RtcError> {
        self.call_action(call_id, "dtmf", serde_json::json!({ "digit": digit.to_string() }))
            .await
    }

    async fn disconnect(&mut self) -> Result<(), RtcError> {
        if self.disconnected {
            return Ok(());
        }
        self.disconnected = true;
        self.cancel.cancel();
        let url = format!("{}/sessions/{}", self.base_url, self.session_id);
        if let Err(err) = self.http.delete(url).send().await {
            log::debug!(err:%; "Session delete did not reach the gateway.");
        }
        Ok(())
    }
}

struct PollContext {
    http: reqwest::Client,
    events_url: String,
    events: mpsc::Sender<RtcEvent>,
    cancel: CancellationToken,
    log_notifications: bool,
}

async fn poll_events(ctx: PollContext) {
    let mut streamed: HashSet<String> = HashSet::new();
    loop {
        let response = select! {
            _ = ctx.cancel.cancelled() => break,
            response = ctx.http.get(&ctx.events_url).send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let _ = ctx.events.send(RtcEvent::Error(err.to_string())).await;
                let _ = ctx.events.send(RtcEvent::SocketClosed).await;
                break;
            }
        };
        if !response.status().is_success() {
            let _ = ctx.events.send(RtcEvent::SocketClosed).await;
            break;
        }
        match response.json::<Vec<Value>>().await {
            Ok(batch) => {
                for value in &batch {
                    dispatch(&ctx, value, &mut streamed).await;
                }
            }
            Err(err) => {
                log::warn!(err:%; "Discarding an unreadable notification batch.");
            }
        }

        select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_PAUSE) => (),
        }
    }
}

async fn dispatch(ctx: &PollContext, value: &Value, streamed: &mut HashSet<String>) {
    if ctx.log_notifications {
        log::debug!(payload:% = value; "Gateway notification.");
    }

    match value.get("type").and_then(Value::as_str) {
        Some("ready") => {
            let _ = ctx.events.send(RtcEvent::Ready).await;
            return;
        }
        Some("error") => {
            let message = first_str(value, &["message", "error"])
                .unwrap_or_else(|| "unspecified gateway error".to_owned());
            let _ = ctx.events.send(RtcEvent::Error(message)).await;
            return;
        }
        _ => (),
    }

    let Some(update) = CallUpdate::from_value(value) else {
        log::debug!("Ignoring a notification that is not a call update.");
        return;
    };

    let media = match (&update.media_url, update.state) {
        (Some(url), CallState::Active) if !streamed.contains(update.id.as_str()) => {
            streamed.insert(update.id.as_str().to_owned());
            Some((update.id.clone(), url.clone()))
        }
        _ => None,
    };

    let _ = ctx.events.send(RtcEvent::Call(update)).await;

    if let Some((call_id, url)) = media {
        let (frames_tx, frames_rx) = mpsc::channel(MEDIA_CHANNEL_SIZE);
        let _ = ctx
            .events
            .send(RtcEvent::RemoteStream {
                call_id,
                stream: frames_rx,
            })
            .await;
        tokio::spawn(stream_media(
            ctx.http.clone(),
            url,
            frames_tx,
            ctx.cancel.child_token(),
        ));
    }
}

async fn stream_media(
    http: reqwest::Client,
    url: String,
    frames: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            log::warn!(err:%, url:%; "Could not open the remote media stream.");
            return;
        }
    };
    let mut stream = response.bytes_stream();
    loop {
        select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    if frames.send(bytes).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    log::warn!(err:%; "Remote media stream failed.");
                    break;
                }
                None => break,
            },
        }
    }
}

fn transport(err: reqwest::Error) -> RtcError {
    RtcError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn connect_creates_a_session_and_surfaces_notifications() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "s-1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sessions/s-1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "call_id": "c-1", "state": "ringing", "direction": "inbound",
                  "caller_id_number": "+15550001111" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/s-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let connector = GatewayConnector::new(server.uri(), false);
        let mut session = connector
            .connect(RtcCredentials {
                login_token: "tok".to_owned(),
                ice_servers: Vec::new(),
            })
            .await
            .unwrap();

        assert!(matches!(session.events.recv().await, Some(RtcEvent::Ready)));
        match session.events.recv().await {
            Some(RtcEvent::Call(update)) => {
                assert_eq!(update.id.as_str(), "c-1");
                assert_eq!(update.state, CallState::Ringing);
            }
            _ => panic!("expected a call update"),
        }

        session.client.disconnect().await.unwrap();
        // Idempotent teardown.
        session.client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn a_rejected_login_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let connector = GatewayConnector::new(server.uri(), false);
        let result = connector
            .connect(RtcCredentials {
                login_token: "bad".to_owned(),
                ice_servers: Vec::new(),
            })
            .await;
        assert!(matches!(result, Err(RtcError::Rejected(_))));
    }

    #[tokio::test]
    async fn call_actions_hit_the_session_scoped_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "s-2" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sessions/s-2/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/s-2/calls/c-9/hangup"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let connector = GatewayConnector::new(server.uri(), false);
        let mut session = connector
            .connect(RtcCredentials {
                login_token: "tok".to_owned(),
                ice_servers: Vec::new(),
            })
            .await
            .unwrap();

        session.client.hangup(&CallId::new("c-9")).await.unwrap();
        session.client.disconnect().await.unwrap();
    }
}
