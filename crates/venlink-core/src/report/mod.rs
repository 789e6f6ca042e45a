//! Report declarations and the registry of active VTN subscriptions.
//!
//! Users declare what the VEN can measure with [`crate::VenClient::add_report`];
//! the VTN later subscribes to (a subset of) those datapoints with
//! `oadrCreateReport`. The sampling/accumulation half lives in
//! [`engine`], the outbound half in [`pump`].

pub(crate) mod engine;
pub(crate) mod pump;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::VenError;
use crate::scheduler::JobHandle;
use crate::util::generate_id;
use crate::vocab;
use crate::wire::{
    Measurement, PowerAttributes, Report, ReportDescription, SamplingRate, Target,
};

// ---------------------------------------------------------------------------
// DataCollectionMode
// ---------------------------------------------------------------------------

/// How the datapoint's sampler is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCollectionMode {
    /// The sampler is called at the sampling cadence and returns the
    /// current value (or a short series).
    #[default]
    Incremental,
    /// The sampler is called once per reporting window and returns the
    /// whole window of values.
    Full,
}

impl std::fmt::Display for DataCollectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataCollectionMode::Incremental => "incremental",
            DataCollectionMode::Full => "full",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Sampler capability traits
// ---------------------------------------------------------------------------

/// What an incremental sampler may return from one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutput {
    /// A single reading, stamped "now" by the engine.
    Scalar(f64),
    /// Several timestamped readings.
    Series(Vec<(DateTime<Utc>, f64)>),
}

/// Sampler for `incremental` datapoints: produces the current value on
/// every call.
#[async_trait]
pub trait IncrementalSampler: Send + Sync {
    async fn sample(&self) -> Result<SampleOutput, VenError>;
}

/// Sampler for `full` datapoints: produces the whole window
/// `[date_from, date_to]` at `sampling_interval` resolution.
#[async_trait]
pub trait WindowedSampler: Send + Sync {
    async fn sample_window(
        &self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        sampling_interval: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, VenError>;
}

/// A registered callback, tagged with its capability.
#[derive(Clone)]
pub enum Sampler {
    Incremental(Arc<dyn IncrementalSampler>),
    Windowed(Arc<dyn WindowedSampler>),
}

struct FnIncremental {
    f: Box<dyn Fn() -> BoxFuture<'static, Result<SampleOutput, VenError>> + Send + Sync>,
}

#[async_trait]
impl IncrementalSampler for FnIncremental {
    async fn sample(&self) -> Result<SampleOutput, VenError> {
        (self.f)().await
    }
}

struct FnWindowed {
    #[allow(clippy::type_complexity)]
    f: Box<
        dyn Fn(
                DateTime<Utc>,
                DateTime<Utc>,
                Duration,
            ) -> BoxFuture<'static, Result<Vec<(DateTime<Utc>, f64)>, VenError>>
            + Send
            + Sync,
    >,
}

#[async_trait]
impl WindowedSampler for FnWindowed {
    async fn sample_window(
        &self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        sampling_interval: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, VenError> {
        (self.f)(date_from, date_to, sampling_interval).await
    }
}

/// Wrap an async closure as an incremental sampler.
pub fn incremental_fn<F, Fut>(f: F) -> Sampler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<SampleOutput, VenError>> + Send + 'static,
{
    Sampler::Incremental(Arc::new(FnIncremental {
        f: Box::new(move || f().boxed()),
    }))
}

/// Wrap an async closure as a windowed sampler.
pub fn windowed_fn<F, Fut>(f: F) -> Sampler
where
    F: Fn(DateTime<Utc>, DateTime<Utc>, Duration) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vec<(DateTime<Utc>, f64)>, VenError>> + Send + 'static,
{
    Sampler::Windowed(Arc::new(FnWindowed {
        f: Box::new(move |from, to, interval| f(from, to, interval).boxed()),
    }))
}

// ---------------------------------------------------------------------------
// MeasurementSpec
// ---------------------------------------------------------------------------

/// What the user tells us about the measured quantity.
#[derive(Debug, Clone)]
pub enum MeasurementSpec {
    /// A well-known measurement code such as `POWER_REAL` or `voltage`;
    /// the canonical descriptor wins over user-supplied details.
    Code(String),
    /// A free-form quantity, sent as a `customUnit` measurement.
    Custom { description: String, unit: String },
    /// A fully spelled-out measurement, taken as-is.
    Detailed(Measurement),
}

// ---------------------------------------------------------------------------
// ReportSpec — parameters of add_report
// ---------------------------------------------------------------------------

/// Parameters for declaring a datapoint. Start from [`ReportSpec::new`] and
/// override what differs from the defaults.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub resource_id: String,
    pub measurement: Option<MeasurementSpec>,
    pub data_collection_mode: DataCollectionMode,
    pub report_specifier_id: Option<String>,
    pub r_id: Option<String>,
    pub report_name: String,
    pub reading_type: String,
    pub report_type: String,
    pub report_duration: Option<Duration>,
    pub report_dtstart: Option<DateTime<Utc>>,
    pub sampling_rate: Option<SamplingRate>,
    pub scale: String,
    pub unit: Option<String>,
    pub power_attributes: Option<PowerAttributes>,
    pub market_context: Option<String>,
}

impl ReportSpec {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            measurement: None,
            data_collection_mode: DataCollectionMode::Incremental,
            report_specifier_id: None,
            r_id: None,
            report_name: "TELEMETRY_USAGE".to_string(),
            reading_type: "Direct Read".to_string(),
            report_type: "reading".to_string(),
            report_duration: None,
            report_dtstart: None,
            sampling_rate: None,
            scale: "none".to_string(),
            unit: None,
            power_attributes: None,
            market_context: None,
        }
    }

    pub fn measurement(mut self, measurement: MeasurementSpec) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub fn data_collection_mode(mut self, mode: DataCollectionMode) -> Self {
        self.data_collection_mode = mode;
        self
    }

    pub fn report_specifier_id(mut self, id: impl Into<String>) -> Self {
        self.report_specifier_id = Some(id.into());
        self
    }

    pub fn r_id(mut self, r_id: impl Into<String>) -> Self {
        self.r_id = Some(r_id.into());
        self
    }

    pub fn report_name(mut self, name: impl Into<String>) -> Self {
        self.report_name = name.into();
        self
    }

    pub fn reading_type(mut self, reading_type: impl Into<String>) -> Self {
        self.reading_type = reading_type.into();
        self
    }

    pub fn report_type(mut self, report_type: impl Into<String>) -> Self {
        self.report_type = report_type.into();
        self
    }

    pub fn report_duration(mut self, duration: Duration) -> Self {
        self.report_duration = Some(duration);
        self
    }

    pub fn report_dtstart(mut self, dtstart: DateTime<Utc>) -> Self {
        self.report_dtstart = Some(dtstart);
        self
    }

    pub fn sampling_rate(mut self, rate: SamplingRate) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    /// Offer a single fixed sampling period.
    pub fn fixed_sampling_rate(mut self, period: Duration) -> Self {
        self.sampling_rate = Some(SamplingRate {
            min_period: period,
            max_period: period,
            on_change: false,
        });
        self
    }

    pub fn scale(mut self, scale: impl Into<String>) -> Self {
        self.scale = scale.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn power_attributes(mut self, attrs: PowerAttributes) -> Self {
        self.power_attributes = Some(attrs);
        self
    }

    pub fn market_context(mut self, market_context: impl Into<String>) -> Self {
        self.market_context = Some(market_context.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ReportDefinition — a declared report
// ---------------------------------------------------------------------------

/// A report the VEN has declared: identity plus the datapoints it offers.
#[derive(Debug, Clone)]
pub struct ReportDefinition {
    pub report_specifier_id: String,
    pub report_name: String,
    pub data_collection_mode: DataCollectionMode,
    pub duration: Duration,
    pub dtstart: DateTime<Utc>,
    pub created_date_time: DateTime<Utc>,
    pub descriptions: Vec<ReportDescription>,
}

impl ReportDefinition {
    /// The metadata form sent inside `oadrRegisterReport`.
    pub fn to_metadata(&self) -> Report {
        Report {
            report_specifier_id: self.report_specifier_id.clone(),
            report_name: self.report_name.clone(),
            report_request_id: Some("0".to_string()),
            created_date_time: Some(self.created_date_time),
            dtstart: Some(self.dtstart),
            duration: Some(self.duration),
            report_descriptions: self.descriptions.clone(),
            intervals: Vec::new(),
        }
    }

    pub fn description(&self, r_id: &str) -> Option<&ReportDescription> {
        self.descriptions.iter().find(|d| d.r_id == r_id)
    }

    /// The report name with any `METADATA_` prefix stripped, as used on
    /// outgoing data reports.
    pub fn outgoing_name(&self) -> String {
        self.report_name
            .strip_prefix("METADATA_")
            .unwrap_or(&self.report_name)
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// ActiveReportRequest — a VTN subscription
// ---------------------------------------------------------------------------

/// State kept per `oadrCreateReport` subscription.
#[derive(Debug, Clone)]
pub struct ActiveReportRequest {
    pub report_request_id: String,
    pub report_specifier_id: String,
    pub report_back_duration: Option<Duration>,
    pub granularity: Duration,
    /// The r_ids that survived validation, in VTN order.
    pub r_ids: Vec<String>,
    pub job: Option<JobHandle>,
}

// ---------------------------------------------------------------------------
// ReportRegistry
// ---------------------------------------------------------------------------

/// Declared reports, their samplers, active subscriptions, and partially
/// accumulated outgoing reports.
#[derive(Default)]
pub(crate) struct ReportRegistry {
    pub reports: Vec<ReportDefinition>,
    pub samplers: HashMap<(String, String), Sampler>,
    pub requests: Vec<ActiveReportRequest>,
    pub incomplete: HashMap<String, Report>,
}

impl ReportRegistry {
    pub fn find_report(&self, report_specifier_id: &str) -> Option<&ReportDefinition> {
        self.reports
            .iter()
            .find(|r| r.report_specifier_id == report_specifier_id)
    }

    pub fn find_request(&self, report_request_id: &str) -> Option<&ActiveReportRequest> {
        self.requests
            .iter()
            .find(|r| r.report_request_id == report_request_id)
    }

    pub fn remove_request(&mut self, report_request_id: &str) -> Option<ActiveReportRequest> {
        let idx = self
            .requests
            .iter()
            .position(|r| r.report_request_id == report_request_id)?;
        Some(self.requests.remove(idx))
    }

    /// Drop all subscription state. Declarations and samplers survive so a
    /// later re-registration can start over.
    pub fn clear_subscriptions(&mut self) {
        self.requests.clear();
        self.incomplete.clear();
    }

    /// Validate and record a datapoint declaration. Returns the
    /// `(report_specifier_id, r_id)` pair that keys its sampler.
    pub fn add_report(
        &mut self,
        spec: ReportSpec,
        sampler: Sampler,
        clock: &dyn Clock,
    ) -> Result<(String, String), VenError> {
        if !vocab::is_valid_report_name(&spec.report_name) {
            return Err(VenError::Validation(format!(
                "{} is not a valid report_name; valid options are {} or any name starting with 'x-'",
                spec.report_name,
                vocab::REPORT_NAMES.join(", ")
            )));
        }
        if !vocab::is_valid_reading_type(&spec.reading_type) {
            return Err(VenError::Validation(format!(
                "{} is not a valid reading_type; valid options are {} or any name starting with 'x-'",
                spec.reading_type,
                vocab::READING_TYPES.join(", ")
            )));
        }
        if !vocab::is_valid_report_type(&spec.report_type) {
            return Err(VenError::Validation(format!(
                "{} is not a valid report_type; valid options are {} or any name starting with 'x-'",
                spec.report_type,
                vocab::REPORT_TYPES.join(", ")
            )));
        }
        if !vocab::is_valid_scale(&spec.scale) {
            return Err(VenError::Validation(format!(
                "{} is not a valid scale; valid options are {}",
                spec.scale,
                vocab::SI_SCALE_CODES.join(", ")
            )));
        }

        // The capability check the original deferred to sampling time.
        match (spec.data_collection_mode, &sampler) {
            (DataCollectionMode::Full, Sampler::Incremental(_)) => {
                return Err(VenError::Validation(
                    "data_collection_mode 'full' requires a windowed sampler taking \
                     date_from, date_to and sampling_interval"
                        .to_string(),
                ));
            }
            (DataCollectionMode::Incremental, Sampler::Windowed(_)) => {
                return Err(VenError::Validation(
                    "data_collection_mode 'incremental' requires an incremental sampler"
                        .to_string(),
                ));
            }
            _ => {}
        }

        let duration = spec.report_duration.unwrap_or_else(|| {
            tracing::warn!(
                "no report_duration provided for report {}; defaulting to 3600 seconds, \
                 which may or may not fit the data buffer you can actually provide",
                spec.report_name
            );
            Duration::from_secs(3600)
        });
        let dtstart = spec.report_dtstart.unwrap_or_else(|| clock.now());
        let sampling_rate = spec.sampling_rate.clone().unwrap_or_default();

        let measurement = self.resolve_measurement(&spec)?;

        // Get or create the report this datapoint belongs to.
        let report_idx = match &spec.report_specifier_id {
            Some(id) => self
                .reports
                .iter()
                .position(|r| r.report_name == spec.report_name && r.report_specifier_id == *id),
            None => self
                .reports
                .iter()
                .position(|r| r.report_name == spec.report_name),
        };
        let report_idx = match report_idx {
            Some(idx) => idx,
            None => {
                let report_specifier_id =
                    spec.report_specifier_id.clone().unwrap_or_else(generate_id);
                self.reports.push(ReportDefinition {
                    report_specifier_id,
                    report_name: spec.report_name.clone(),
                    data_collection_mode: spec.data_collection_mode,
                    duration,
                    dtstart,
                    created_date_time: clock.now(),
                    descriptions: Vec::new(),
                });
                self.reports.len() - 1
            }
        };

        let r_id = spec.r_id.clone().unwrap_or_else(generate_id);
        let report_specifier_id = self.reports[report_idx].report_specifier_id.clone();

        let key = (report_specifier_id.clone(), r_id.clone());
        if self.samplers.contains_key(&key) {
            return Err(VenError::Validation(format!(
                "a callback is already registered for r_id {r_id} in report {report_specifier_id}"
            )));
        }

        let target = Target::resource(spec.resource_id.clone());
        self.reports[report_idx].descriptions.push(ReportDescription {
            r_id: r_id.clone(),
            reading_type: spec.reading_type.clone(),
            report_type: spec.report_type.clone(),
            report_data_source: Some(target.clone()),
            report_subject: Some(target),
            measurement,
            sampling_rate,
            market_context: spec.market_context.clone(),
        });
        self.samplers.insert(key, sampler);

        Ok((report_specifier_id, r_id))
    }

    /// Determine the item name, description and unit for the datapoint.
    /// A canonical descriptor wins over user-supplied details.
    fn resolve_measurement(&self, spec: &ReportSpec) -> Result<Option<Measurement>, VenError> {
        if spec.report_name.ends_with("TELEMETRY_STATUS") {
            return Ok(None);
        }
        let scale = Some(spec.scale.clone());

        let measurement = match &spec.measurement {
            None => {
                return Err(VenError::Validation(format!(
                    "a measurement is required for {} reports",
                    spec.report_name
                )))
            }
            Some(MeasurementSpec::Detailed(m)) => {
                let mut m = m.clone();
                if m.scale.is_none() {
                    m.scale = scale;
                }
                m
            }
            Some(MeasurementSpec::Code(code)) => match vocab::canonical_measurement(code) {
                Some(canonical) => {
                    if let Some(unit) = &spec.unit {
                        if unit != canonical.unit
                            && !canonical.acceptable_units.contains(&unit.as_str())
                        {
                            tracing::warn!(
                                "the supplied unit {unit} for measurement {code} will be \
                                 ignored, {} will be used instead; allowed units are: {}",
                                canonical.unit,
                                canonical.acceptable_units.join(", ")
                            );
                        }
                    }
                    Measurement {
                        name: canonical.name.to_string(),
                        description: canonical.description.to_string(),
                        unit: canonical.unit.to_string(),
                        scale,
                        power_attributes: canonical
                            .power_related
                            .then(|| spec.power_attributes.clone().unwrap_or_default()),
                    }
                }
                None => Measurement {
                    name: "customUnit".to_string(),
                    description: code.clone(),
                    unit: spec.unit.clone().unwrap_or_default(),
                    scale,
                    power_attributes: None,
                },
            },
            Some(MeasurementSpec::Custom { description, unit }) => Measurement {
                name: "customUnit".to_string(),
                description: description.clone(),
                unit: unit.clone(),
                scale,
                power_attributes: None,
            },
        };
        Ok(Some(measurement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn scalar_sampler() -> Sampler {
        incremental_fn(|| async { Ok(SampleOutput::Scalar(1.5)) })
    }

    fn window_sampler() -> Sampler {
        windowed_fn(|_from, _to, _interval| async { Ok(Vec::new()) })
    }

    fn registry_with(spec: ReportSpec, sampler: Sampler) -> (ReportRegistry, (String, String)) {
        let mut registry = ReportRegistry::default();
        let ids = registry
            .add_report(spec, sampler, &SystemClock)
            .expect("add_report should succeed");
        (registry, ids)
    }

    #[test]
    fn add_report_applies_defaults() {
        let spec = ReportSpec::new("device-1")
            .measurement(MeasurementSpec::Code("POWER_REAL".to_string()));
        let (registry, (rsid, r_id)) = registry_with(spec, scalar_sampler());

        let report = registry.find_report(&rsid).expect("report exists");
        assert_eq!(report.report_name, "TELEMETRY_USAGE");
        assert_eq!(report.duration, Duration::from_secs(3600));
        assert_eq!(report.descriptions.len(), 1);

        let rd = report.description(&r_id).expect("description exists");
        assert_eq!(rd.reading_type, "Direct Read");
        assert_eq!(rd.report_type, "reading");
        assert_eq!(rd.sampling_rate.min_period, Duration::from_secs(10));
        assert_eq!(rd.sampling_rate.max_period, Duration::from_secs(3600));
        assert!(registry.samplers.contains_key(&(rsid, r_id)));
    }

    #[test]
    fn add_report_rejects_unknown_report_name() {
        let mut registry = ReportRegistry::default();
        let spec = ReportSpec::new("device-1")
            .report_name("TELEMETRY_BOGUS")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let err = registry
            .add_report(spec, scalar_sampler(), &SystemClock)
            .unwrap_err();
        assert!(err.to_string().contains("not a valid report_name"));
    }

    #[test]
    fn add_report_accepts_private_use_names() {
        let mut registry = ReportRegistry::default();
        let spec = ReportSpec::new("device-1")
            .report_name("x-SITE_TELEMETRY")
            .reading_type("x-estimated")
            .report_type("x-siteLoad")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        assert!(registry
            .add_report(spec, scalar_sampler(), &SystemClock)
            .is_ok());
    }

    #[test]
    fn full_mode_requires_windowed_sampler() {
        let mut registry = ReportRegistry::default();
        let spec = ReportSpec::new("device-1")
            .data_collection_mode(DataCollectionMode::Full)
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let err = registry
            .add_report(spec, scalar_sampler(), &SystemClock)
            .unwrap_err();
        assert!(err.to_string().contains("windowed sampler"));
    }

    #[test]
    fn incremental_mode_rejects_windowed_sampler() {
        let mut registry = ReportRegistry::default();
        let spec = ReportSpec::new("device-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let err = registry
            .add_report(spec, window_sampler(), &SystemClock)
            .unwrap_err();
        assert!(err.to_string().contains("incremental sampler"));
    }

    #[test]
    fn same_report_is_extended_not_duplicated() {
        let spec = ReportSpec::new("device-1")
            .report_specifier_id("rsid-1")
            .r_id("dp-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let (mut registry, _) = registry_with(spec, scalar_sampler());

        let spec2 = ReportSpec::new("device-2")
            .report_specifier_id("rsid-1")
            .r_id("dp-2")
            .measurement(MeasurementSpec::Code("current".to_string()));
        registry
            .add_report(spec2, scalar_sampler(), &SystemClock)
            .expect("second datapoint");

        assert_eq!(registry.reports.len(), 1);
        assert_eq!(registry.reports[0].descriptions.len(), 2);
    }

    #[test]
    fn duplicate_r_id_is_rejected() {
        let spec = ReportSpec::new("device-1")
            .report_specifier_id("rsid-1")
            .r_id("dp-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let (mut registry, _) = registry_with(spec, scalar_sampler());

        let spec2 = ReportSpec::new("device-1")
            .report_specifier_id("rsid-1")
            .r_id("dp-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let err = registry
            .add_report(spec2, scalar_sampler(), &SystemClock)
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn canonical_measurement_wins_over_user_unit() {
        let spec = ReportSpec::new("device-1")
            .measurement(MeasurementSpec::Code("POWER_REAL".to_string()))
            .unit("horsepower");
        let (registry, (rsid, r_id)) = registry_with(spec, scalar_sampler());

        let rd = registry
            .find_report(&rsid)
            .and_then(|r| r.description(&r_id))
            .unwrap();
        let measurement = rd.measurement.as_ref().expect("measurement present");
        assert_eq!(measurement.unit, "W");
        assert_eq!(measurement.name, "powerReal");
        // Power-related measurements carry power attributes.
        assert!(measurement.power_attributes.is_some());
    }

    #[test]
    fn telemetry_status_has_no_measurement() {
        let spec = ReportSpec::new("device-1").report_name("TELEMETRY_STATUS");
        let (registry, (rsid, r_id)) = registry_with(spec, scalar_sampler());
        let rd = registry
            .find_report(&rsid)
            .and_then(|r| r.description(&r_id))
            .unwrap();
        assert!(rd.measurement.is_none());
    }

    #[test]
    fn unknown_code_becomes_custom_unit() {
        let spec = ReportSpec::new("device-1")
            .measurement(MeasurementSpec::Code("widgets".to_string()))
            .unit("wid");
        let (registry, (rsid, r_id)) = registry_with(spec, scalar_sampler());
        let rd = registry
            .find_report(&rsid)
            .and_then(|r| r.description(&r_id))
            .unwrap();
        let m = rd.measurement.as_ref().unwrap();
        assert_eq!(m.name, "customUnit");
        assert_eq!(m.description, "widgets");
        assert_eq!(m.unit, "wid");
    }

    #[test]
    fn metadata_form_carries_request_id_zero() {
        let spec = ReportSpec::new("device-1")
            .report_specifier_id("rsid-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let (registry, _) = registry_with(spec, scalar_sampler());
        let metadata = registry.reports[0].to_metadata();
        assert_eq!(metadata.report_request_id.as_deref(), Some("0"));
        assert_eq!(metadata.report_specifier_id, "rsid-1");
        assert!(metadata.intervals.is_empty());
    }

    #[test]
    fn outgoing_name_strips_metadata_prefix() {
        let spec = ReportSpec::new("device-1")
            .report_name("METADATA_TELEMETRY_USAGE")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let (registry, _) = registry_with(spec, scalar_sampler());
        assert_eq!(registry.reports[0].outgoing_name(), "TELEMETRY_USAGE");
    }

    #[test]
    fn clear_subscriptions_keeps_declarations() {
        let spec = ReportSpec::new("device-1")
            .measurement(MeasurementSpec::Code("voltage".to_string()));
        let (mut registry, _) = registry_with(spec, scalar_sampler());
        registry.requests.push(ActiveReportRequest {
            report_request_id: "rr-1".to_string(),
            report_specifier_id: "rsid".to_string(),
            report_back_duration: None,
            granularity: Duration::from_secs(10),
            r_ids: Vec::new(),
            job: None,
        });
        registry.clear_subscriptions();
        assert!(registry.requests.is_empty());
        assert!(registry.incomplete.is_empty());
        assert_eq!(registry.reports.len(), 1);
        assert_eq!(registry.samplers.len(), 1);
    }
}
