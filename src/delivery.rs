use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::DeliveryConfig;
use crate::error::IncidentError;

/// Payload accepted by the SMS relay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub recipient: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// `{success: true, id}` or `{success: false, error}`
#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Delivery errors from the alert channel
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryError {
    NetworkTimeout,
    HttpError(u16),
    Rejected(String),
    MalformedResponse(String),
    NoRuntime,
    Network(String),
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DeliveryError::NetworkTimeout => write!(f, "Network timeout"),
            DeliveryError::HttpError(code) => write!(f, "HTTP error: {}", code),
            DeliveryError::Rejected(msg) => write!(f, "Rejected by relay: {}", msg),
            DeliveryError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            DeliveryError::NoRuntime => write!(f, "No async runtime available for delivery"),
            DeliveryError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Outcome of one delivery attempt, reported back to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryReport {
    Delivered {
        recipient: String,
        id: Option<String>,
    },
    Failed {
        recipient: String,
        error: DeliveryError,
    },
}

impl DeliveryReport {
    /// The DeliveryFault a failed report amounts to
    pub fn fault(&self) -> Option<IncidentError> {
        match self {
            DeliveryReport::Delivered { .. } => None,
            DeliveryReport::Failed { recipient, error } => Some(IncidentError::DeliveryFault(
                format!("{} (recipient {})", error, recipient),
            )),
        }
    }
}

/// Fire-and-forget hand-off. Implementations must not block the caller.
pub trait AlertChannel: Send + Sync {
    fn deliver(&self, request: AlertRequest);
}

// ─── HTTP relay ──────────────────────────────────────────────────────────────

/// Posts alerts as JSON to a single relay endpoint.
///
/// Every request runs on its own spawned task; the outcome is sent on
/// `reports`. No retries: a failed send is reported and dropped.
pub struct HttpAlertChannel {
    client: reqwest::Client,
    endpoint: String,
    reports: UnboundedSender<DeliveryReport>,
}

impl HttpAlertChannel {
    pub fn new(
        endpoint: &str,
        config: &DeliveryConfig,
        reports: UnboundedSender<DeliveryReport>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("incident_tracker_rs/0.1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpAlertChannel {
            client,
            endpoint: endpoint.to_string(),
            reports,
        }
    }

    async fn post(
        client: reqwest::Client,
        endpoint: String,
        request: &AlertRequest,
    ) -> Result<Option<String>, DeliveryError> {
        let response = match client.post(&endpoint).json(request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    return Err(DeliveryError::NetworkTimeout);
                }
                return Err(DeliveryError::Network(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Network(format!("Failed to read response: {}", e)))?;

        interpret_response(status, &body)
    }
}

impl AlertChannel for HttpAlertChannel {
    fn deliver(&self, request: AlertRequest) {
        let reports = self.reports.clone();
        let recipient = request.recipient.clone();

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let _ = reports.send(DeliveryReport::Failed {
                    recipient,
                    error: DeliveryError::NoRuntime,
                });
                return;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        handle.spawn(async move {
            let report = match Self::post(client, endpoint, &request).await {
                Ok(id) => DeliveryReport::Delivered { recipient, id },
                Err(error) => DeliveryReport::Failed { recipient, error },
            };
            // Receiver gone means the host is shutting down
            let _ = reports.send(report);
        });
    }
}

/// Map a relay reply onto a delivery result
pub fn interpret_response(status: u16, body: &str) -> Result<Option<String>, DeliveryError> {
    match serde_json::from_str::<RelayResponse>(body) {
        Ok(reply) if reply.success => Ok(reply.id),
        Ok(reply) => Err(DeliveryError::Rejected(
            reply.error.unwrap_or_else(|| "no reason given".to_string()),
        )),
        Err(_) if !(200..300).contains(&status) => Err(DeliveryError::HttpError(status)),
        Err(e) => Err(DeliveryError::MalformedResponse(e.to_string())),
    }
}

// ─── Local channels ──────────────────────────────────────────────────────────

/// Used when no relay endpoint is configured
pub struct LogChannel;

impl AlertChannel for LogChannel {
    fn deliver(&self, request: AlertRequest) {
        log::warn!(
            "No delivery endpoint configured, alert for '{}' logged only:\n{}",
            request.recipient,
            request.message
        );
    }
}

/// Keeps every request in memory
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<AlertRequest>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<AlertRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AlertChannel for RecordingChannel {
    fn deliver(&self, request: AlertRequest) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn request() -> AlertRequest {
        AlertRequest {
            recipient: "+15550100".to_string(),
            message: "test".to_string(),
            latitude: Some(37.7749),
            longitude: None,
        }
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["recipient"], "+15550100");
        assert_eq!(json["latitude"], 37.7749);
        assert!(json.get("longitude").is_none());
    }

    #[test]
    fn test_interpret_success() {
        let result = interpret_response(200, r#"{"success":true,"id":"SM123"}"#);
        assert_eq!(result, Ok(Some("SM123".to_string())));
    }

    #[test]
    fn test_interpret_rejection() {
        let result = interpret_response(500, r#"{"success":false,"error":"invalid number"}"#);
        assert_eq!(result, Err(DeliveryError::Rejected("invalid number".to_string())));
    }

    #[test]
    fn test_interpret_http_error_without_body() {
        let result = interpret_response(502, "<html>Bad Gateway</html>");
        assert_eq!(result, Err(DeliveryError::HttpError(502)));
    }

    #[test]
    fn test_interpret_malformed_ok() {
        let result = interpret_response(200, "not json");
        assert!(matches!(result, Err(DeliveryError::MalformedResponse(_))));
    }

    #[test]
    fn test_delivery_error_display() {
        let errors = vec![
            DeliveryError::NetworkTimeout,
            DeliveryError::HttpError(404),
            DeliveryError::Rejected("x".to_string()),
            DeliveryError::MalformedResponse("y".to_string()),
            DeliveryError::NoRuntime,
            DeliveryError::Network("z".to_string()),
        ];
        for err in errors {
            assert!(!format!("{}", err).is_empty());
        }
    }

    #[test]
    fn test_failed_report_is_delivery_fault() {
        let failed = DeliveryReport::Failed {
            recipient: "+15550100".to_string(),
            error: DeliveryError::HttpError(503),
        };
        assert_eq!(
            failed.fault().map(|f| f.to_string()).as_deref(),
            Some("Delivery failed: HTTP error: 503 (recipient +15550100)")
        );

        let delivered = DeliveryReport::Delivered {
            recipient: "+15550100".to_string(),
            id: None,
        };
        assert!(delivered.fault().is_none());
    }

    #[test]
    fn test_recording_channel() {
        let channel = RecordingChannel::new();
        channel.deliver(request());
        channel.deliver(request());
        assert_eq!(channel.requests().len(), 2);
    }

    #[test]
    fn test_http_without_runtime_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = HttpAlertChannel::new("http://127.0.0.1:9", &DeliveryConfig::default(), tx);
        channel.deliver(request());
        match rx.try_recv() {
            Ok(DeliveryReport::Failed { error, .. }) => assert_eq!(error, DeliveryError::NoRuntime),
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_unreachable_endpoint_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = DeliveryConfig::default();
        config.timeout_secs = 2;
        // Port 9 (discard) is closed on test hosts
        let channel = HttpAlertChannel::new("http://127.0.0.1:9/alert", &config, tx);
        channel.deliver(request());
        let report = rx.recv().await.expect("report");
        assert!(matches!(report, DeliveryReport::Failed { .. }));
    }

    // Requires a running relay on localhost:3000
    #[tokio::test]
    #[ignore]
    async fn test_http_relay_integration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = HttpAlertChannel::new(
            "http://localhost:3000/send-alert",
            &DeliveryConfig::default(),
            tx,
        );
        channel.deliver(request());
        match rx.recv().await {
            Some(DeliveryReport::Delivered { id, .. }) => println!("Delivered: {:?}", id),
            other => panic!("Delivery failed: {:?}", other),
        }
    }
}
