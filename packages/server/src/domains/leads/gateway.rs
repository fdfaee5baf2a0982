use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, info, warn};

use super::mapping::LeadFields;
use crate::error::SinkError;
use crate::kernel::http::HttpRequest;
use crate::kernel::transport::ThrottledTransport;

/// Write side of the sync: the CRM's lead-creation webhook.
pub struct SinkGateway {
    transport: Arc<ThrottledTransport>,
    webhook_url: String,
}

impl SinkGateway {
    pub fn new(transport: Arc<ThrottledTransport>, webhook_url: impl Into<String>) -> Self {
        Self {
            transport,
            webhook_url: webhook_url.into(),
        }
    }

    /// Create a lead, returning the CRM's id for it.
    ///
    /// A 200 whose body carries no `result` is [`SinkError::Rejected`] and
    /// will not be retried. No response or any other status is
    /// [`SinkError::Unavailable`].
    pub async fn create_lead(&self, fields: &LeadFields) -> Result<String, SinkError> {
        info!(title = %fields.title, "creating lead");
        let request = HttpRequest::post_json(self.webhook_url.as_str(), fields.to_request_body());

        let Some(response) = self.transport.send(request).await else {
            error!("CRM unreachable");
            return Err(SinkError::Unavailable("no response from CRM".into()));
        };

        if response.status != StatusCode::OK {
            error!(status = %response.status, "CRM returned an error status");
            return Err(SinkError::Unavailable(format!(
                "CRM returned {}: {}",
                response.status, response.body
            )));
        }

        let body: Value = match response.json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "CRM answered with an unreadable body");
                return Err(SinkError::Rejected(format!("unreadable CRM response: {e}")));
            }
        };

        match lead_id(&body) {
            Some(id) => {
                info!(lead_id = %id, "lead created");
                Ok(id)
            }
            None => {
                let reason = rejection_reason(&body);
                error!(%reason, "CRM rejected lead");
                Err(SinkError::Rejected(reason))
            }
        }
    }

    /// Whether the CRM endpoint answers at all. Does not create a record.
    pub async fn probe(&self) -> bool {
        let request = HttpRequest::get(self.webhook_url.as_str());
        match self.transport.send(request).await {
            Some(response) => !response.status.is_server_error(),
            None => false,
        }
    }
}

fn lead_id(body: &Value) -> Option<String> {
    match body.get("result")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn rejection_reason(body: &Value) -> String {
    let text = |key: &str| {
        body.get(key).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    };
    text("error_description")
        .or_else(|| text("error"))
        .unwrap_or_else(|| "unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::source::ApplicationEvent;
    use crate::testing::{fast_transport_config, MockHttpClient, MockReply};
    use reqwest::Method;
    use serde_json::json;

    const WEBHOOK: &str = "https://crm.test/rest/1/key/crm.lead.add.json";

    fn gateway(mock: MockHttpClient) -> (Arc<MockHttpClient>, SinkGateway) {
        let mock = Arc::new(mock);
        let transport = Arc::new(ThrottledTransport::new(mock.clone(), fast_transport_config()));
        (mock, SinkGateway::new(transport, WEBHOOK))
    }

    fn fields() -> LeadFields {
        LeadFields::from_event(&ApplicationEvent {
            id: "n1".into(),
            vacancy_title: "Accountant".into(),
            raw: json!({ "resume": { "first_name": "Olim" } }),
        })
    }

    #[tokio::test]
    async fn test_lead_created() {
        let (mock, sink) = gateway(
            MockHttpClient::new().on(Method::POST, WEBHOOK, MockReply::json(json!({ "result": 1501 }))),
        );

        let id = sink.create_lead(&fields()).await.unwrap();

        assert_eq!(id, "1501");
        let body = mock.calls()[0].json_body().cloned().unwrap();
        assert_eq!(body["fields"]["NAME"], "Olim");
        assert_eq!(body["fields"]["TITLE"], "Accountant");
    }

    #[tokio::test]
    async fn test_logical_failure_is_rejected() {
        let (_, sink) = gateway(MockHttpClient::new().on(
            Method::POST,
            WEBHOOK,
            MockReply::json(json!({ "error": "ERROR_CORE", "error_description": "Invalid phone" })),
        ));

        let err = sink.create_lead(&fields()).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(ref reason) if reason == "Invalid phone"));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_rejected() {
        let (_, sink) =
            gateway(MockHttpClient::new().on(Method::POST, WEBHOOK, MockReply::ok("<html>")));

        assert!(matches!(
            sink.create_lead(&fields()).await,
            Err(SinkError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let (mock, sink) = gateway(MockHttpClient::new().on(
            Method::POST,
            WEBHOOK,
            MockReply::status(502, "bad gateway"),
        ));

        let err = sink.create_lead(&fields()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
        // status errors are not retried beyond the transport
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_response_is_unavailable() {
        let (mock, sink) =
            gateway(MockHttpClient::new().on(Method::POST, WEBHOOK, MockReply::failure("reset")));

        assert!(matches!(
            sink.create_lead(&fields()).await,
            Err(SinkError::Unavailable(_))
        ));
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_probe() {
        let (_, up) = gateway(MockHttpClient::new().on(
            Method::GET,
            WEBHOOK,
            MockReply::status(400, r#"{"error":"ERROR_ARGUMENT"}"#),
        ));
        assert!(up.probe().await);

        let (_, down) =
            gateway(MockHttpClient::new().on(Method::GET, WEBHOOK, MockReply::status(503, "")));
        assert!(!down.probe().await);
    }
}
