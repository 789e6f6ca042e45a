//! The VEN client root: owns all state, wires the registration manager,
//! event tracker, report engine and polling loop together, and exposes the
//! public configuration API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::codec::{JsonCodec, MessageCodec};
use crate::config::VenConfig;
use crate::error::{RequestError, VenError};
use crate::event::{DefaultEventHandler, EventHandler, EventLedger};
use crate::hooks::HookSet;
use crate::report::pump::run_report_pump;
use crate::report::{ReportRegistry, ReportSpec, Sampler};
use crate::scheduler::Scheduler;
use crate::transport::{HttpTransport, Service, Transport};
use crate::util::certificate_fingerprint;
use crate::vocab::OptType;
use crate::wire::{
    OadrMessage, Opt, Poll, RegisteredReport, Report, Response, ResponseEnvelope,
};

// ---------------------------------------------------------------------------
// Registration state
// ---------------------------------------------------------------------------

/// Mutable identity handed out by the VTN.
#[derive(Debug)]
pub(crate) struct RegistrationState {
    pub ven_id: Option<String>,
    pub registration_id: Option<String>,
    pub poll_frequency: Duration,
}

// ---------------------------------------------------------------------------
// ClientInner
// ---------------------------------------------------------------------------

/// Shared state behind the [`VenClient`] handle. All mutable collections are
/// guarded by short-lived std mutexes; no lock is held across an await.
pub(crate) struct ClientInner {
    /// Self-reference so `&self` methods can hand owned handles to spawned
    /// tasks and scheduler jobs.
    weak_self: std::sync::Weak<ClientInner>,
    pub(crate) config: VenConfig,
    pub(crate) codec: Arc<dyn MessageCodec>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) scheduler: Scheduler,
    pub(crate) hooks: HookSet,
    pub(crate) handler: Mutex<Arc<dyn EventHandler>>,
    pub(crate) registration: Mutex<RegistrationState>,
    pub(crate) registry: Mutex<ReportRegistry>,
    pub(crate) events: Mutex<EventLedger>,
    pub(crate) opts: Mutex<Vec<Opt>>,
    pub(crate) pending_tx: mpsc::UnboundedSender<Report>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Report>>>,
    pub(crate) pump_cancel: CancellationToken,
    pump_running: AtomicBool,
    stopped: CancellationToken,
}

impl ClientInner {
    pub(crate) fn ven_id(&self) -> Option<String> {
        self.registration.lock().unwrap().ven_id.clone()
    }

    pub(crate) fn registration_id(&self) -> Option<String> {
        self.registration.lock().unwrap().registration_id.clone()
    }

    pub(crate) fn handler_snapshot(&self) -> Arc<dyn EventHandler> {
        self.handler.lock().unwrap().clone()
    }

    /// An owned handle to this client, for spawned tasks. `None` only
    /// during teardown.
    pub(crate) fn arc(&self) -> Option<Arc<ClientInner>> {
        self.weak_self.upgrade()
    }

    // -----------------------------------------------------------------------
    // Request/response exchange
    // -----------------------------------------------------------------------

    /// Send one message and return the parsed reply.
    ///
    /// `Ok(None)` means the VTN answered with an empty body. Every failure
    /// path is logged here and surfaced as a tagged [`RequestError`]; callers
    /// decide whether a failed exchange matters.
    pub(crate) async fn perform_request(
        &self,
        service: Service,
        message: &OadrMessage,
    ) -> Result<Option<OadrMessage>, RequestError> {
        let raw = self
            .codec
            .encode(message)
            .map_err(RequestError::from)
            .map_err(|err| {
                tracing::error!("could not encode {}: {err}", message.message_type());
                err
            })?;
        self.hooks.run_before_send_xml(&raw).await;

        let reply = match self.transport.post(service, raw).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(
                    "could not connect to the VTN at {} ({service}): {err}",
                    self.config.vtn_url
                );
                return Err(RequestError::Network(err.to_string()));
            }
        };
        self.hooks.run_after_receive_xml(&reply.body).await;

        if reply.status != 200 {
            tracing::warn!(
                "non-OK HTTP status {} when performing a request to {service}",
                reply.status
            );
            return Err(RequestError::HttpStatus {
                status: reply.status,
            });
        }
        if reply.body.is_empty() {
            return Ok(None);
        }

        self.hooks.run_before_schema_validation(&reply.body).await;
        if let Err(err) = self.codec.validate_schema(&reply.body) {
            tracing::warn!("incoming message did not pass schema validation: {err}");
            return Err(err.into());
        }
        if let Some(fingerprint) = &self.config.vtn_fingerprint {
            if let Err(err) = self.codec.verify_signature(&reply.body, fingerprint) {
                tracing::warn!("incoming message had an invalid signature, ignoring: {err}");
                return Err(err.into());
            }
        }
        self.hooks.run_before_parse_xml(&reply.body).await;
        let parsed = match self.codec.decode(&reply.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!("the incoming message could not be parsed: {err}");
                return Err(err.into());
            }
        };
        self.hooks.run_after_parse_xml(&parsed).await;

        if let Some(response) = parsed.response() {
            if !response.is_ok() {
                tracing::warn!(
                    "we got a non-OK OpenADR response from the server: {}: {}",
                    response.response_code,
                    response.response_description
                );
            }
        }
        Ok(Some(parsed))
    }

    /// Send an empty `oadrResponse`, for instance after receiving
    /// `oadrRequestReregistration`.
    pub(crate) async fn send_response(
        &self,
        service: Service,
        response_code: u16,
        response_description: &str,
        request_id: Option<String>,
    ) {
        let msg = OadrMessage::Response(ResponseEnvelope {
            response: Response {
                response_code,
                response_description: response_description.to_string(),
                request_id,
            },
            ven_id: self.ven_id(),
        });
        let _ = self.perform_request(service, &msg).await;
    }

    // -----------------------------------------------------------------------
    // Polling loop
    // -----------------------------------------------------------------------

    /// Request the next available message from the VTN.
    pub(crate) async fn poll(&self) -> Result<Option<OadrMessage>, RequestError> {
        let msg = OadrMessage::Poll(Poll {
            ven_id: self.ven_id(),
        });
        self.perform_request(Service::OadrPoll, &msg).await
    }

    /// One poll tick: fetch a message and dispatch it. The reply is fully
    /// handled before this returns, so polls never interleave.
    pub(crate) async fn poll_once(&self) {
        tracing::debug!("now polling for new messages");
        match self.poll().await {
            Err(_) => {} // already logged; the next tick retries
            Ok(None) => {}
            Ok(Some(message)) => self.dispatch(message).await,
        }
    }

    /// Route one inbound message to its handler.
    pub(crate) async fn dispatch(&self, message: OadrMessage) {
        match message {
            OadrMessage::Response(_) => {
                tracing::debug!("received empty response from the VTN");
            }
            OadrMessage::RequestReregistration(_) => {
                tracing::info!("the VTN required us to re-register");
                self.send_response(Service::EiRegisterParty, 200, "OK", None)
                    .await;
                self.create_party_reregistration().await;
            }
            OadrMessage::DistributeEvent(payload) => {
                if !payload.events.is_empty() {
                    self.on_event_batch(payload.request_id, payload.events).await;
                }
            }
            OadrMessage::UpdatedReport(ack) => {
                if let Some(directive) = ack.cancel_report {
                    self.cancel_report(directive).await;
                }
            }
            OadrMessage::CreateReport(payload) => {
                self.handle_report_requests(Some(payload.request_id), payload.report_requests)
                    .await;
            }
            OadrMessage::RegisterReport(payload) => {
                tracing::warn!(
                    "the VTN offered reports, but reports in that direction are not consumed"
                );
                let msg = OadrMessage::RegisteredReport(RegisteredReport {
                    response: Response::ok(Some(payload.request_id)),
                    ven_id: self.ven_id(),
                    report_requests: Vec::new(),
                });
                let _ = self.perform_request(Service::EiReport, &msg).await;
            }
            OadrMessage::CancelPartyRegistration(payload) => {
                tracing::info!("the VTN required us to cancel the registration");
                self.on_cancel_party_registration(payload).await;
            }
            OadrMessage::CancelReport(payload) => {
                tracing::info!("the VTN required us to cancel a report");
                self.cancel_report(payload).await;
            }
            other => {
                tracing::warn!(
                    "no handler implemented for incoming message of type {}, ignoring",
                    other.message_type()
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Report pump lifecycle
    // -----------------------------------------------------------------------

    /// Start the outbound report pump unless it is already running.
    pub(crate) fn start_report_pump(&self) {
        let Some(inner) = self.arc() else { return };
        if self.pump_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let rx = self.pending_rx.lock().unwrap().take();
        let Some(rx) = rx else {
            return;
        };
        let cancel = self.pump_cancel.clone();
        tokio::spawn(async move {
            run_report_pump(inner, rx, cancel).await;
        });
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Hand the pending-report queue's consumer end to a test.
    #[cfg(test)]
    pub(crate) fn take_pending_rx(&self) -> Option<mpsc::UnboundedReceiver<Report>> {
        self.pending_rx.lock().unwrap().take()
    }

    /// Stop all scheduled work, the pump, and flag the client as stopped.
    pub(crate) async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.pump_cancel.cancel();
        // Give in-flight sends a moment to flush.
        tokio::time::sleep(Duration::from_millis(500)).await;
        tracing::warn!("stop(): client is shutting down");
        self.stopped.cancel();
    }
}

// ---------------------------------------------------------------------------
// VenClient
// ---------------------------------------------------------------------------

/// An OpenADR 2.0b Virtual End Node speaking pull-mode HTTP to a VTN.
///
/// Construct with [`VenClient::new`] (or [`VenClient::builder`] to inject a
/// codec, transport or clock), declare reports, set an event handler, then
/// call [`VenClient::run`].
#[derive(Clone)]
pub struct VenClient {
    pub(crate) inner: Arc<ClientInner>,
}

/// Builder for [`VenClient`].
pub struct VenClientBuilder {
    config: VenConfig,
    codec: Option<Arc<dyn MessageCodec>>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    handler: Option<Arc<dyn EventHandler>>,
}

impl VenClientBuilder {
    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<VenClient, VenError> {
        let config = self.config;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(build_default_transport(&config)?),
        };
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new()));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let handler: Arc<dyn EventHandler> = self
            .handler
            .unwrap_or_else(|| Arc::new(DefaultEventHandler));

        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(config.allow_jitter);
        let ven_id = config.ven_id.clone();

        let pending_rx = Mutex::new(Some(pending_rx));
        let inner = Arc::new_cyclic(|weak| ClientInner {
            weak_self: weak.clone(),
            config,
            codec,
            transport,
            clock,
            scheduler,
            hooks: HookSet::default(),
            handler: Mutex::new(handler),
            registration: Mutex::new(RegistrationState {
                ven_id,
                registration_id: None,
                poll_frequency: Duration::from_secs(10),
            }),
            registry: Mutex::new(ReportRegistry::default()),
            events: Mutex::new(EventLedger::default()),
            opts: Mutex::new(Vec::new()),
            pending_tx,
            pending_rx,
            pump_cancel: CancellationToken::new(),
            pump_running: AtomicBool::new(false),
            stopped: CancellationToken::new(),
        });
        Ok(VenClient { inner })
    }
}

/// Build the default HTTP transport from the configured security material.
fn build_default_transport(config: &VenConfig) -> Result<HttpTransport, VenError> {
    let mut builder =
        HttpTransport::builder(&config.vtn_url).check_hostname(config.check_hostname);

    if let (Some(cert_path), Some(key_path)) = (&config.cert, &config.key) {
        let cert = std::fs::read(cert_path)?;
        let key = std::fs::read(key_path)?;
        if config.show_fingerprint {
            match certificate_fingerprint(&cert) {
                Ok(fingerprint) => {
                    println!();
                    println!("{}", "*".repeat(80));
                    println!("{:^80}", "Your VEN Certificate Fingerprint is");
                    println!("{fingerprint:^80}");
                    println!("{:^80}", "Please deliver this fingerprint to the VTN.");
                    println!("{:^80}", "You do not need to keep this a secret.");
                    println!("{}", "*".repeat(80));
                    println!();
                }
                Err(err) => tracing::warn!("could not compute certificate fingerprint: {err}"),
            }
        }
        builder = builder.client_identity(cert, key);
    }
    if let Some(ca_path) = &config.ca_file {
        builder = builder.ca_bundle(std::fs::read(ca_path)?);
    }
    builder.build()
}

impl VenClient {
    /// Create a client with the default codec and HTTP transport.
    pub fn new(config: VenConfig) -> Result<Self, VenError> {
        Self::builder(config).build()
    }

    pub fn builder(config: VenConfig) -> VenClientBuilder {
        VenClientBuilder {
            config,
            codec: None,
            transport: None,
            clock: None,
            handler: None,
        }
    }

    // -----------------------------------------------------------------------
    // Configuration surface
    // -----------------------------------------------------------------------

    /// Declare a datapoint this VEN can report, with the sampler that
    /// produces its values. Returns the `(report_specifier_id, r_id)` pair.
    pub fn add_report(
        &self,
        spec: ReportSpec,
        sampler: Sampler,
    ) -> Result<(String, String), VenError> {
        let mut registry = self.inner.registry.lock().unwrap();
        registry.add_report(spec, sampler, self.inner.clock.as_ref())
    }

    /// Install the event handler invoked for new and updated events.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.inner.handler.lock().unwrap() = handler;
    }

    /// Hook points on the request/response chain.
    pub fn hooks(&self) -> &HookSet {
        &self.inner.hooks
    }

    pub fn ven_id(&self) -> Option<String> {
        self.inner.ven_id()
    }

    pub fn registration_id(&self) -> Option<String> {
        self.inner.registration_id()
    }

    pub fn poll_frequency(&self) -> Duration {
        self.inner.registration.lock().unwrap().poll_frequency
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Run the client in full-auto mode: register, advertise reports, sync
    /// events, then keep polling until [`VenClient::stop`].
    pub async fn run(&self) -> Result<(), VenError> {
        let inner = &self.inner;

        // Query-registration → create-party-registration handshake. The VTN
        // echoes a request id we must reuse.
        let mut request_id = None;
        if let Ok(Some(OadrMessage::CreatedPartyRegistration(payload))) =
            inner.query_registration().await
        {
            if let Some(registration_id) = payload.registration_id {
                inner.registration.lock().unwrap().registration_id = Some(registration_id);
            }
            request_id = payload.response.request_id;
        }

        inner.create_party_registration(request_id, None).await;

        if inner.registration_id().is_none() {
            tracing::error!("no registration id received from the VTN, aborting");
            inner.shutdown().await;
            return Err(VenError::Registration(
                "no registration id received from the VTN".to_string(),
            ));
        }

        inner.register_reports().await;
        let have_reports = !inner.registry.lock().unwrap().reports.is_empty();
        if have_reports {
            inner.start_report_pump();
        }

        // Initial event sync, then one poll right away.
        inner.sync_events().await;
        inner.poll_once().await;

        // Set up automatic polling.
        let poll_frequency = {
            let mut registration = inner.registration.lock().unwrap();
            if registration.poll_frequency > Duration::from_secs(24 * 3600) {
                tracing::warn!(
                    "polling with intervals of more than 24 hours is not supported; \
                     will use 24 hours as the polling interval"
                );
                registration.poll_frequency = Duration::from_secs(24 * 3600);
            }
            if registration.poll_frequency < Duration::from_secs(1) {
                tracing::warn!("polling faster than once per second is not supported");
                registration.poll_frequency = Duration::from_secs(1);
            }
            registration.poll_frequency
        };

        let for_poll = Arc::clone(inner);
        inner.scheduler.add_interval_job(poll_frequency, move || {
            let inner = Arc::clone(&for_poll);
            async move { inner.poll_once().await }
        });

        let for_status = Arc::clone(inner);
        inner.scheduler.add_interval_job(
            Duration::from_secs(inner.config.event_status_log_period),
            move || {
                let inner = Arc::clone(&for_status);
                async move { inner.event_status_refresh() }
            },
        );

        let for_cleanup = Arc::clone(inner);
        inner.scheduler.add_interval_job(
            Duration::from_secs(inner.config.events_clean_up_period),
            move || {
                let inner = Arc::clone(&for_cleanup);
                async move { inner.event_cleanup() }
            },
        );

        Ok(())
    }

    /// Cleanly stop the client.
    pub async fn stop(&self) {
        self.inner.shutdown().await;
    }

    /// Resolve once [`VenClient::stop`] has completed (also after a fatal
    /// registration failure).
    pub async fn wait_until_stopped(&self) {
        self.inner.stopped.cancelled().await;
    }

    // -----------------------------------------------------------------------
    // Manual protocol paths
    // -----------------------------------------------------------------------

    /// Request the next available message from the VTN.
    pub async fn poll(&self) -> Result<Option<OadrMessage>, RequestError> {
        self.inner.poll().await
    }

    /// Request the next events from the VTN without dispatching them.
    pub async fn request_event(
        &self,
        reply_limit: Option<u32>,
    ) -> Result<Option<OadrMessage>, RequestError> {
        self.inner.request_event(reply_limit).await
    }

    /// Fetch pending events from the VTN and run them through the normal
    /// intake path. Called automatically on connect and re-registration.
    pub async fn sync_events(&self) {
        self.inner.sync_events().await;
    }

    /// Directly inform the VTN of an opt decision for one event.
    pub async fn created_event(
        &self,
        request_id: impl Into<String>,
        event_id: impl Into<String>,
        opt_type: OptType,
        modification_number: u32,
    ) {
        self.inner
            .created_event(request_id.into(), event_id.into(), opt_type, modification_number)
            .await;
    }

    /// Cancel this VEN's registration with the VTN.
    pub async fn cancel_party_registration(&self) {
        self.inner.cancel_party_registration().await;
    }

    /// Send an empty `oadrResponse` on the given service.
    pub async fn send_response(
        &self,
        service: Service,
        response_code: u16,
        response_description: &str,
        request_id: Option<String>,
    ) {
        self.inner
            .send_response(service, response_code, response_description, request_id)
            .await;
    }
}
