//! Typed payloads for the OpenADR 2.0b pull-mode message set.
//!
//! These are the structures the client logic works with. Turning them into
//! wire bytes (XML, schema validation, signatures) is the job of a
//! [`MessageCodec`](crate::codec::MessageCodec) implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vocab::{EventStatus, OptType};

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// The `eiResponse` element carried by most acknowledgement messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response_code: u16,
    pub response_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Response {
    pub fn ok(request_id: Option<String>) -> Self {
        Self {
            response_code: 200,
            response_description: "OK".to_string(),
            request_id,
        }
    }

    pub fn error(response_code: u16, request_id: Option<String>) -> Self {
        Self {
            response_code,
            response_description: "ERROR".to_string(),
            request_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.response_code == 200
    }
}

// ---------------------------------------------------------------------------
// Targets and measurements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
}

impl Target {
    pub fn resource(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAttributes {
    pub ac: bool,
    pub hertz: u64,
    pub voltage: u64,
}

impl Default for PowerAttributes {
    fn default() -> Self {
        Self {
            ac: true,
            hertz: 50,
            voltage: 230,
        }
    }
}

/// The quantity a report datapoint measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The oadr item name, e.g. `powerReal` or `customUnit`.
    pub name: String,
    pub description: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_attributes: Option<PowerAttributes>,
}

// ---------------------------------------------------------------------------
// Report structures
// ---------------------------------------------------------------------------

/// The sampling envelope a report datapoint is offered at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingRate {
    pub min_period: Duration,
    pub max_period: Duration,
    pub on_change: bool,
}

impl Default for SamplingRate {
    fn default() -> Self {
        Self {
            min_period: Duration::from_secs(10),
            max_period: Duration::from_secs(3600),
            on_change: false,
        }
    }
}

/// Description of a single datapoint inside a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDescription {
    pub r_id: String,
    pub reading_type: String,
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_data_source: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_subject: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
    pub sampling_rate: SamplingRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub r_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInterval {
    pub dtstart: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    pub report_payload: ReportPayload,
}

/// A report, both in its metadata form (capability advertisement inside
/// `oadrRegisterReport`) and in its data form (inside `oadrUpdateReport`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_specifier_id: String,
    pub report_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtstart: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub report_descriptions: Vec<ReportDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<ReportInterval>,
}

/// The reporting window inside a report specifier, for one-shot requests
/// that should run at a specific instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportIntervalSpec {
    pub dtstart: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecifierPayload {
    pub r_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSpecifier {
    pub report_specifier_id: String,
    /// Sampling period requested by the VTN. Zero means single-shot; when
    /// absent the declared maximum sampling period applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_back_duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval: Option<ReportIntervalSpec>,
    pub specifier_payloads: Vec<SpecifierPayload>,
}

/// A VTN request for an active report subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub report_request_id: String,
    pub report_specifier: ReportSpecifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReport {
    pub report_request_id: String,
}

// ---------------------------------------------------------------------------
// Event structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub event_id: String,
    pub modification_number: u32,
    #[serde(default)]
    pub event_status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_event: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtn_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePeriod {
    pub dtstart: DateTime<Utc>,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_up_period: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInterval {
    pub dtstart: DateTime<Utc>,
    pub duration: Duration,
    pub signal_payload: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSignal {
    pub signal_name: String,
    pub signal_type: String,
    pub signal_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<SignalInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseRequired {
    #[default]
    Always,
    Never,
}

/// A demand-response event as distributed by the VTN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_descriptor: EventDescriptor,
    pub active_period: ActivePeriod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_signals: Vec<EventSignal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub response_required: ResponseRequired,
}

impl Event {
    pub fn id(&self) -> &str {
        &self.event_descriptor.event_id
    }

    pub fn modification_number(&self) -> u32 {
        self.event_descriptor.modification_number
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    pub response_code: u16,
    pub response_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub event_id: String,
    pub modification_number: u32,
    pub opt_type: OptType,
}

// ---------------------------------------------------------------------------
// Opt structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityComponent {
    pub dtstart: DateTime<Utc>,
    pub duration: Duration,
}

/// A temporary availability schedule attached to an opt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vavailability {
    #[serde(default)]
    pub components: Vec<AvailabilityComponent>,
}

/// A VEN-initiated availability declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opt {
    pub opt_id: String,
    pub opt_type: OptType,
    pub opt_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vavailability: Option<Vavailability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_target_mrid: Option<String>,
}

// ---------------------------------------------------------------------------
// Message payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRegistration {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePartyRegistration {
    pub request_id: String,
    pub ven_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub http_pull_model: bool,
    pub xml_signature: bool,
    pub report_only: bool,
    pub profile_name: String,
    pub transport_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_address: Option<String>,
    /// Present only when re-registering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedPartyRegistration {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_oadr_poll_freq: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelPartyRegistration {
    pub request_id: String,
    pub registration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanceledPartyRegistration {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestReregistration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
}

/// The bare `oadrResponse` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributeEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtn_id: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub event_responses: Vec<EventResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterReport {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_request_id: Option<String>,
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredReport {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub report_requests: Vec<ReportRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReport {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(default)]
    pub report_requests: Vec<ReportRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedReport {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub pending_reports: Vec<PendingReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub reports: Vec<Report>,
}

/// VTN acknowledgement of an `oadrUpdateReport`, possibly instructing the
/// VEN to cancel a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedReport {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_report: Option<CancelReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReport {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub report_request_id: String,
    #[serde(default)]
    pub report_to_follow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanceledReport {
    pub response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_reports: Vec<PendingReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOpt {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    #[serde(flatten)]
    pub opt: Opt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedOpt {
    pub response: Response,
    pub opt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOpt {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ven_id: Option<String>,
    pub opt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanceledOpt {
    pub response: Response,
    pub opt_id: String,
}

// ---------------------------------------------------------------------------
// OadrMessage — the full pull-mode message set
// ---------------------------------------------------------------------------

/// Every OpenADR 2.0b pull-mode message the client can send or receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "payload")]
pub enum OadrMessage {
    #[serde(rename = "oadrQueryRegistration")]
    QueryRegistration(QueryRegistration),
    #[serde(rename = "oadrCreatePartyRegistration")]
    CreatePartyRegistration(CreatePartyRegistration),
    #[serde(rename = "oadrCreatedPartyRegistration")]
    CreatedPartyRegistration(CreatedPartyRegistration),
    #[serde(rename = "oadrCancelPartyRegistration")]
    CancelPartyRegistration(CancelPartyRegistration),
    #[serde(rename = "oadrCanceledPartyRegistration")]
    CanceledPartyRegistration(CanceledPartyRegistration),
    #[serde(rename = "oadrRequestReregistration")]
    RequestReregistration(RequestReregistration),
    #[serde(rename = "oadrPoll")]
    Poll(Poll),
    #[serde(rename = "oadrResponse")]
    Response(ResponseEnvelope),
    #[serde(rename = "oadrRequestEvent")]
    RequestEvent(RequestEvent),
    #[serde(rename = "oadrDistributeEvent")]
    DistributeEvent(DistributeEvent),
    #[serde(rename = "oadrCreatedEvent")]
    CreatedEvent(CreatedEvent),
    #[serde(rename = "oadrRegisterReport")]
    RegisterReport(RegisterReport),
    #[serde(rename = "oadrRegisteredReport")]
    RegisteredReport(RegisteredReport),
    #[serde(rename = "oadrCreateReport")]
    CreateReport(CreateReport),
    #[serde(rename = "oadrCreatedReport")]
    CreatedReport(CreatedReport),
    #[serde(rename = "oadrUpdateReport")]
    UpdateReport(UpdateReport),
    #[serde(rename = "oadrUpdatedReport")]
    UpdatedReport(UpdatedReport),
    #[serde(rename = "oadrCancelReport")]
    CancelReport(CancelReport),
    #[serde(rename = "oadrCanceledReport")]
    CanceledReport(CanceledReport),
    #[serde(rename = "oadrCreateOpt")]
    CreateOpt(CreateOpt),
    #[serde(rename = "oadrCreatedOpt")]
    CreatedOpt(CreatedOpt),
    #[serde(rename = "oadrCancelOpt")]
    CancelOpt(CancelOpt),
    #[serde(rename = "oadrCanceledOpt")]
    CanceledOpt(CanceledOpt),
}

impl OadrMessage {
    /// The oadr message type name, as it appears on the wire.
    pub fn message_type(&self) -> &'static str {
        match self {
            OadrMessage::QueryRegistration(_) => "oadrQueryRegistration",
            OadrMessage::CreatePartyRegistration(_) => "oadrCreatePartyRegistration",
            OadrMessage::CreatedPartyRegistration(_) => "oadrCreatedPartyRegistration",
            OadrMessage::CancelPartyRegistration(_) => "oadrCancelPartyRegistration",
            OadrMessage::CanceledPartyRegistration(_) => "oadrCanceledPartyRegistration",
            OadrMessage::RequestReregistration(_) => "oadrRequestReregistration",
            OadrMessage::Poll(_) => "oadrPoll",
            OadrMessage::Response(_) => "oadrResponse",
            OadrMessage::RequestEvent(_) => "oadrRequestEvent",
            OadrMessage::DistributeEvent(_) => "oadrDistributeEvent",
            OadrMessage::CreatedEvent(_) => "oadrCreatedEvent",
            OadrMessage::RegisterReport(_) => "oadrRegisterReport",
            OadrMessage::RegisteredReport(_) => "oadrRegisteredReport",
            OadrMessage::CreateReport(_) => "oadrCreateReport",
            OadrMessage::CreatedReport(_) => "oadrCreatedReport",
            OadrMessage::UpdateReport(_) => "oadrUpdateReport",
            OadrMessage::UpdatedReport(_) => "oadrUpdatedReport",
            OadrMessage::CancelReport(_) => "oadrCancelReport",
            OadrMessage::CanceledReport(_) => "oadrCanceledReport",
            OadrMessage::CreateOpt(_) => "oadrCreateOpt",
            OadrMessage::CreatedOpt(_) => "oadrCreatedOpt",
            OadrMessage::CancelOpt(_) => "oadrCancelOpt",
            OadrMessage::CanceledOpt(_) => "oadrCanceledOpt",
        }
    }

    /// The application-layer response carried by this message, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            OadrMessage::CreatedPartyRegistration(m) => Some(&m.response),
            OadrMessage::CanceledPartyRegistration(m) => Some(&m.response),
            OadrMessage::Response(m) => Some(&m.response),
            OadrMessage::CreatedEvent(m) => Some(&m.response),
            OadrMessage::RegisteredReport(m) => Some(&m.response),
            OadrMessage::CreatedReport(m) => Some(&m.response),
            OadrMessage::UpdatedReport(m) => Some(&m.response),
            OadrMessage::CanceledReport(m) => Some(&m.response),
            OadrMessage::CreatedOpt(m) => Some(&m.response),
            OadrMessage::CanceledOpt(m) => Some(&m.response),
            OadrMessage::DistributeEvent(m) => m.response.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(event_id: &str, modification_number: u32) -> Event {
        Event {
            event_descriptor: EventDescriptor {
                event_id: event_id.to_string(),
                modification_number,
                event_status: EventStatus::Far,
                priority: Some(1),
                market_context: None,
                created_date_time: Some(Utc::now()),
                modification_date_time: None,
                test_event: false,
                vtn_comment: None,
            },
            active_period: ActivePeriod {
                dtstart: Utc::now(),
                duration: Duration::from_secs(3600),
                ramp_up_period: None,
                tolerance: None,
            },
            event_signals: vec![EventSignal {
                signal_name: "simple".to_string(),
                signal_type: "level".to_string(),
                signal_id: "sig-1".to_string(),
                intervals: Vec::new(),
                current_value: Some(1.0),
            }],
            targets: vec![Target::resource("device-1")],
            response_required: ResponseRequired::Always,
        }
    }

    #[test]
    fn response_helpers() {
        let ok = Response::ok(Some("req-1".to_string()));
        assert!(ok.is_ok());
        assert_eq!(ok.response_description, "OK");

        let err = Response::error(452, None);
        assert!(!err.is_ok());
        assert_eq!(err.response_code, 452);
        assert_eq!(err.response_description, "ERROR");
    }

    #[test]
    fn message_type_names_match_wire_names() {
        let msg = OadrMessage::Poll(Poll { ven_id: None });
        assert_eq!(msg.message_type(), "oadrPoll");

        let msg = OadrMessage::QueryRegistration(QueryRegistration {
            request_id: "r".to_string(),
        });
        assert_eq!(msg.message_type(), "oadrQueryRegistration");
    }

    #[test]
    fn message_serde_round_trip() {
        let msg = OadrMessage::DistributeEvent(DistributeEvent {
            response: None,
            request_id: Some("req-9".to_string()),
            vtn_id: Some("vtn-1".to_string()),
            events: vec![sample_event("E1", 0)],
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"oadrDistributeEvent\""));
        let parsed: OadrMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn created_party_registration_round_trip() {
        let msg = OadrMessage::CreatedPartyRegistration(CreatedPartyRegistration {
            response: Response::ok(Some("q-1".to_string())),
            registration_id: Some("R2".to_string()),
            ven_id: Some("V-assigned".to_string()),
            vtn_id: None,
            requested_oadr_poll_freq: Some(Duration::from_secs(15)),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: OadrMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn response_accessor_finds_nested_response() {
        let msg = OadrMessage::UpdatedReport(UpdatedReport {
            response: Response::error(450, None),
            ven_id: None,
            cancel_report: None,
        });
        assert_eq!(msg.response().map(|r| r.response_code), Some(450));

        let msg = OadrMessage::Poll(Poll::default());
        assert!(msg.response().is_none());
    }

    #[test]
    fn event_accessors() {
        let event = sample_event("E7", 3);
        assert_eq!(event.id(), "E7");
        assert_eq!(event.modification_number(), 3);
    }

    #[test]
    fn create_opt_flattens_opt_fields() {
        let msg = OadrMessage::CreateOpt(CreateOpt {
            request_id: "req-1".to_string(),
            ven_id: Some("ven-1".to_string()),
            opt: Opt {
                opt_id: "opt-1".to_string(),
                opt_type: OptType::OptIn,
                opt_reason: "economic".to_string(),
                market_context: None,
                targets: vec![Target::resource("device-1")],
                vavailability: None,
                event_id: None,
                modification_number: None,
                signal_target_mrid: None,
            },
        });
        let json = serde_json::to_string(&msg).unwrap();
        // The opt fields sit at the payload's top level, not nested.
        assert!(json.contains("\"opt_id\":\"opt-1\""));
        let parsed: OadrMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn response_required_defaults_to_always() {
        let json = serde_json::json!({
            "event_descriptor": {
                "event_id": "E1",
                "modification_number": 0,
                "event_status": "far",
            },
            "active_period": {
                "dtstart": Utc::now(),
                "duration": {"secs": 60, "nanos": 0},
            },
        });
        let event: Event = serde_json::from_value(json).expect("deserialize");
        assert_eq!(event.response_required, ResponseRequired::Always);
        assert!(event.event_signals.is_empty());
    }
}
