//! Message gateway.
//!
//! Encodes the outbound report kinds, decodes inbound status requests and
//! owns the topic layout. The collector reads these exact field names, so
//! the wire keys (`alt`, `temp`, short `time`) stay as the backend expects
//! them. Publishing is fire-and-forget: a failed publish is logged and
//! dropped, the next flush or state transition carries current data
//! forward.

use crate::trace::TracePoint;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};

/// Startup status payload, emitted once after boot
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
}

/// Session START report with the environment snapshot
#[derive(Debug, Serialize)]
pub struct StartReport {
    pub session_state: &'static str,
    pub session_id: String,
    pub alt: f64,
    pub temp: f64,
    pub humidity: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Routine telemetry flush with the ordered altitude trace
#[derive(Debug, Serialize)]
pub struct TraceReport {
    pub session_state: &'static str,
    pub session_id: String,
    pub trace: Vec<TracePoint>,
}

/// Session END report; `time` is the total duration in seconds
#[derive(Debug, Serialize)]
pub struct EndReport {
    pub session_state: &'static str,
    pub session_id: String,
    pub alt: f64,
    pub time: f64,
}

/// Emergency report; `time` is seconds from session start to the incident
#[derive(Debug, Serialize)]
pub struct IncidentReport {
    pub session_state: &'static str,
    pub session_id: String,
    pub alt: f64,
    pub time: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Answer to a status request, routed to the collector's Telegram bridge
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub chat_id: i64,
    pub user_name: String,
    pub session_state: String,
    pub session_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub alt: f64,
    pub temp: f64,
    pub humidity: f64,
}

/// Inbound status request.
///
/// The collector may attach extra fields (e.g. a timestamp); unknown keys
/// are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub request_type: String,
    pub chat_id: i64,
    pub user_name: String,
}

impl StatusRequest {
    /// Decode an inbound request payload.
    ///
    /// Anything malformed, incomplete or of an unknown request type is
    /// dropped silently.
    pub fn decode(payload: &[u8]) -> Option<StatusRequest> {
        let request: StatusRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("dropping malformed request: {}", e);
                return None;
            }
        };
        if request.request_type != "status_check" {
            log::debug!("dropping unknown request type: {}", request.request_type);
            return None;
        }
        Some(request)
    }
}

/// Gateway between the session controller and the transport.
pub struct MessageGateway<T: Transport> {
    transport: T,
    topic_status: String,
    topic_telemetry: String,
    topic_telegram: String,
    topic_request: String,
}

impl<T: Transport> MessageGateway<T> {
    pub fn new(transport: T, serial: &str) -> Self {
        MessageGateway {
            transport,
            topic_status: format!("climbing/{}/status", serial),
            topic_telemetry: format!("climbing/{}", serial),
            topic_telegram: format!("climbing/{}/telegram", serial),
            topic_request: format!("climbing/{}/request", serial),
        }
    }

    /// Topic the device subscribes to for inbound requests
    pub fn request_topic(&self) -> &str {
        &self.topic_request
    }

    pub fn publish_startup_status(&self) {
        self.send(&self.topic_status, &StatusReport { status: "active" });
    }

    pub fn publish_start(&self, report: StartReport) {
        self.send(&self.topic_telemetry, &report);
    }

    /// Trace flushes always report ACTIVE: incident escalation travels only
    /// via the dedicated incident report.
    pub fn publish_trace(&self, session_id: &str, trace: Vec<TracePoint>) {
        self.send(
            &self.topic_telemetry,
            &TraceReport {
                session_state: "ACTIVE",
                session_id: session_id.to_string(),
                trace,
            },
        );
    }

    pub fn publish_end(&self, session_id: &str, alt: f64, duration_s: f64) {
        self.send(
            &self.topic_telemetry,
            &EndReport {
                session_state: "END",
                session_id: session_id.to_string(),
                alt,
                time: duration_s,
            },
        );
    }

    pub fn publish_incident(&self, report: IncidentReport) {
        self.send(&self.topic_telemetry, &report);
    }

    pub fn publish_status_response(&self, response: StatusResponse) {
        self.send(&self.topic_telegram, &response);
    }

    fn send<R: Serialize>(&self, topic: &str, report: &R) {
        let payload = match serde_json::to_string(report) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("failed to encode report for {}: {}", topic, e);
                return;
            }
        };
        if let Err(e) = self.transport.publish(topic, payload) {
            // At-most-once: no retry queue, the next report resyncs state
            log::warn!("report dropped: {}", e);
        }
    }
}
