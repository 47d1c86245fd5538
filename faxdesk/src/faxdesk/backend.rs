//! Backend service client: fax CRUD, token issuance, backend-mediated call
//! origination and teardown. Every endpoint answers a `{data, message?}`
//! envelope; a success status without `data` is still a failure.

use crate::faxdesk::call::CallId;
use crate::faxdesk::rtc::RtcCredentials;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use typed_builder::TypedBuilder;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("the response is missing its data payload")]
    MissingData,
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    data: Option<Value>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    login_token: String,
    #[serde(default)]
    ice_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FaxCreated {
    #[serde(rename = "faxId")]
    fax_id: String,
}

#[derive(Debug, Deserialize)]
struct CallCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FaxPage {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Serialize, TypedBuilder)]
pub struct SendFaxRequest {
    #[builder(setter(into))]
    pub to: String,
    #[serde(rename = "mediaUrl")]
    #[builder(setter(into))]
    pub media_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub from: Option<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.http.get(self.url(path)).send().await?;
        decode(response).await
    }

    async fn post_data<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }

    pub async fn webrtc_token(&self) -> Result<RtcCredentials, ApiError> {
        let grant: TokenGrant = self
            .post_data("/telnyx/webrtc/token", &Value::Object(Default::default()))
            .await?;
        if grant.login_token.is_empty() {
            return Err(ApiError::Decode("the token grant is empty".to_owned()));
        }
        Ok(RtcCredentials {
            login_token: grant.login_token,
            ice_servers: grant.ice_servers,
        })
    }

    pub async fn send_fax(&self, request: &SendFaxRequest) -> Result<String, ApiError> {
        let created: FaxCreated = self.post_data("/fax/send", request).await?;
        Ok(created.fax_id)
    }

    pub async fn fax_status(&self, id: &str) -> Result<Value, ApiError> {
        self.get_data(&format!("/fax/status/{id}")).await
    }

    pub async fn list_faxes(&self) -> Result<Vec<Value>, ApiError> {
        let page: FaxPage = self.get_data("/fax/list").await?;
        Ok(page.data)
    }

    pub async fn originate_call(&self, to: &str) -> Result<CallId, ApiError> {
        #[derive(Serialize)]
        struct OutboundRequest<'a> {
            to: &'a str,
        }
        let created: CallCreated = self
            .post_data("/telnyx/calls/outbound", &OutboundRequest { to })
            .await?;
        Ok(CallId::new(created.id))
    }

    /// Backend-mediated hangup. The response body is not required to carry
    /// data; a success status is enough.
    pub async fn hangup_call(&self, id: &CallId) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(&format!("/telnyx/calls/{id}/hangup")))
            .json(&Value::Object(Default::default()))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let envelope = read_envelope(response).await?;
        Err(status_error(status, envelope))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let envelope = read_envelope(response).await?;
    if !status.is_success() {
        return Err(status_error(status, envelope));
    }
    let data = envelope.data.ok_or(ApiError::MissingData)?;
    serde_json::from_value(data).map_err(|err| ApiError::Decode(err.to_string()))
}

async fn read_envelope(response: reqwest::Response) -> Result<Envelope, ApiError> {
    let body = response.text().await?;
    // Error bodies are not guaranteed to be enveloped JSON.
    Ok(serde_json::from_str(&body).unwrap_or_default())
}

fn status_error(status: reqwest::StatusCode, envelope: Envelope) -> ApiError {
    let message = envelope
        .message
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| "request failed".to_owned());
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn unwraps_the_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fax/send"))
            .and(body_json(json!({"to": "+1555", "mediaUrl": "https://cdn/doc.pdf"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "faxId": "fx-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let request = SendFaxRequest::builder()
            .to("+1555")
            .media_url("https://cdn/doc.pdf")
            .build();
        assert_eq!(client.send_fax(&request).await.unwrap(), "fx-1");
    }

    #[tokio::test]
    async fn a_success_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fax/status/fx-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        assert!(matches!(
            client.fax_status("fx-9").await,
            Err(ApiError::MissingData)
        ));
    }

    #[tokio::test]
    async fn surfaces_the_backend_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/telnyx/calls/outbound"))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "message": "carrier unavailable"
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        match client.originate_call("+1555").await {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "carrier unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hangup_accepts_a_bare_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/telnyx/calls/c-1/hangup"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        client.hangup_call(&CallId::new("c-1")).await.unwrap();
    }

    #[tokio::test]
    async fn nested_fax_list_is_flattened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fax/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": [ { "id": "fx-1" }, { "id": "fx-2" } ] }
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let faxes = client.list_faxes().await.unwrap();
        assert_eq!(faxes.len(), 2);
        assert_eq!(faxes[0]["id"], "fx-1");
    }

    #[tokio::test]
    async fn an_empty_token_grant_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/telnyx/webrtc/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "login_token": "" }
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        assert!(client.webrtc_token().await.is_err());
    }
}
