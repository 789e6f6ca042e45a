//! Event reception: de-duplication, modification tracking, opt responses,
//! and the periodic status/cleanup jobs.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::client::ClientInner;
use crate::error::{RequestError, VenError};
use crate::transport::Service;
use crate::util::generate_id;
use crate::vocab::{self, determine_event_status, status_codes, EventStatus, OptType};
use crate::wire::{
    CreatedEvent, Event, EventResponse, OadrMessage, RequestEvent, Response, ResponseRequired,
};

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

/// User decisions about demand-response events.
///
/// `on_event` is invoked for every event seen for the first time and must
/// take an opt decision. `on_update_event` is invoked when a known event
/// arrives with a higher modification number; returning `Ok(None)` reuses
/// the previously recorded decision. Any error coerces the whole batch to
/// opt-out.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<OptType, VenError>;

    async fn on_update_event(&self, event: &Event) -> Result<Option<OptType>, VenError> {
        let _ = event;
        Ok(None)
    }
}

/// Placeholder handler that opts out of everything, loudly.
pub struct DefaultEventHandler;

#[async_trait]
impl EventHandler for DefaultEventHandler {
    async fn on_event(&self, event: &Event) -> Result<OptType, VenError> {
        tracing::warn!(
            "no event handler is configured; opting out of event {}",
            event.id()
        );
        Ok(OptType::OptOut)
    }
}

// ---------------------------------------------------------------------------
// EventLedger
// ---------------------------------------------------------------------------

/// Events we have seen, and the opt decision recorded for each.
#[derive(Default)]
pub(crate) struct EventLedger {
    pub received: Vec<Event>,
    pub responded: HashMap<String, OptType>,
}

impl EventLedger {
    fn modification_number_of(&self, event_id: &str) -> Option<u32> {
        self.received
            .iter()
            .find(|e| e.id() == event_id)
            .map(Event::modification_number)
    }

    fn replace(&mut self, event: Event) {
        self.received.retain(|e| e.id() != event.id());
        self.received.push(event);
    }
}

// ---------------------------------------------------------------------------
// Intake and response synthesis
// ---------------------------------------------------------------------------

impl ClientInner {
    /// Process one batch of events from `oadrDistributeEvent` (or the
    /// `oadrRequestEvent` reply) and answer with `oadrCreatedEvent`.
    pub(crate) async fn on_event_batch(&self, request_id: Option<String>, events: Vec<Event>) {
        let handler = self.handler_snapshot();
        let mut decisions: Vec<Option<OptType>> = Vec::with_capacity(events.len());
        let mut batch_failed = false;

        for event in &events {
            let event_id = event.id().to_string();
            tracing::info!(
                "received event {event_id} with status {} and modification number {}",
                event.event_descriptor.event_status,
                event.modification_number()
            );

            let known = self
                .events
                .lock()
                .unwrap()
                .modification_number_of(&event_id);

            let decision = match known {
                // Unchanged re-delivery: reuse the recorded choice without
                // bothering the handler.
                Some(previous) if previous == event.modification_number() => {
                    Ok(self.events.lock().unwrap().responded.get(&event_id).copied())
                }
                Some(_) => {
                    self.events.lock().unwrap().replace(event.clone());
                    handler.on_update_event(event).await.map(|opt| {
                        opt.or_else(|| {
                            self.events.lock().unwrap().responded.get(&event_id).copied()
                        })
                    })
                }
                None => {
                    self.events.lock().unwrap().received.push(event.clone());
                    handler.on_event(event).await.map(Some)
                }
            };

            match decision {
                Ok(opt) => {
                    let mut ledger = self.events.lock().unwrap();
                    if matches!(
                        event.event_descriptor.event_status,
                        EventStatus::Completed | EventStatus::Cancelled
                    ) {
                        ledger.responded.remove(&event_id);
                    } else if let Some(opt) = opt {
                        ledger.responded.insert(event_id, opt);
                    }
                    decisions.push(opt);
                }
                Err(err) => {
                    tracing::error!(
                        "the event handler encountered an error, will opt out of the whole \
                         batch: {err}"
                    );
                    batch_failed = true;
                    break;
                }
            }
        }

        if batch_failed {
            decisions = vec![Some(OptType::OptOut); events.len()];
        }
        for (event, decision) in events.iter().zip(decisions.iter_mut()) {
            if decision.is_none() && event.response_required == ResponseRequired::Always {
                tracing::error!(
                    "the event handler took no opt decision for event {}, which requires a \
                     response; opting out",
                    event.id()
                );
                *decision = Some(OptType::OptOut);
            }
        }

        let event_responses = self.synthesize_responses(&events, &decisions, &request_id);
        if event_responses.is_empty() {
            tracing::info!(
                "not sending any event responses, because a response was not required by the VTN"
            );
            return;
        }
        let msg = OadrMessage::CreatedEvent(CreatedEvent {
            response: Response::ok(request_id),
            ven_id: self.ven_id(),
            event_responses,
        });
        let _ = self.perform_request(Service::EiEvent, &msg).await;
    }

    /// One response entry per event that requires one and is not already
    /// over. An unrecognized signal name downgrades the entry to
    /// SIGNAL_NOT_SUPPORTED.
    fn synthesize_responses(
        &self,
        events: &[Event],
        decisions: &[Option<OptType>],
        request_id: &Option<String>,
    ) -> Vec<EventResponse> {
        let now = self.clock.now();
        let mut responses = Vec::new();
        for (event, decision) in events.iter().zip(decisions) {
            if event.response_required != ResponseRequired::Always {
                continue;
            }
            if determine_event_status(&event.active_period, now) == EventStatus::Completed {
                continue;
            }
            let Some(opt_type) = decision else { continue };

            let mut response_code = 200;
            for signal in &event.event_signals {
                if !vocab::is_valid_signal_name(&signal.signal_name) {
                    response_code = status_codes::SIGNAL_NOT_SUPPORTED;
                    break;
                }
            }
            responses.push(EventResponse {
                response_code,
                response_description: if response_code == 200 { "OK" } else { "ERROR" }.to_string(),
                request_id: request_id.clone(),
                event_id: event.id().to_string(),
                modification_number: event.modification_number(),
                opt_type: *opt_type,
            });
        }
        responses
    }

    /// Ask the VTN for pending events.
    pub(crate) async fn request_event(
        &self,
        reply_limit: Option<u32>,
    ) -> Result<Option<OadrMessage>, RequestError> {
        let msg = OadrMessage::RequestEvent(RequestEvent {
            request_id: generate_id(),
            ven_id: self.ven_id(),
            reply_limit,
        });
        self.perform_request(Service::EiEvent, &msg).await
    }

    /// Initial (and post-re-registration) event sync: fetch pending events
    /// and run them through the normal intake path.
    pub(crate) async fn sync_events(&self) {
        if let Ok(Some(OadrMessage::DistributeEvent(payload))) = self.request_event(None).await {
            if !payload.events.is_empty() {
                self.on_event_batch(payload.request_id, payload.events).await;
            }
        }
    }

    /// Manually acknowledge one event with an opt decision, bypassing the
    /// handler machinery.
    pub(crate) async fn created_event(
        &self,
        request_id: String,
        event_id: String,
        opt_type: OptType,
        modification_number: u32,
    ) {
        let msg = OadrMessage::CreatedEvent(CreatedEvent {
            response: Response::ok(Some(request_id.clone())),
            ven_id: self.ven_id(),
            event_responses: vec![EventResponse {
                response_code: 200,
                response_description: "OK".to_string(),
                request_id: Some(request_id),
                event_id,
                modification_number,
                opt_type,
            }],
        });
        let _ = self.perform_request(Service::EiEvent, &msg).await;
    }

    // -----------------------------------------------------------------------
    // Periodic maintenance
    // -----------------------------------------------------------------------

    /// Recompute the status of every non-cancelled event and log changes.
    pub(crate) fn event_status_refresh(&self) {
        let now = self.clock.now();
        let mut ledger = self.events.lock().unwrap();
        for event in ledger.received.iter_mut() {
            if event.event_descriptor.event_status == EventStatus::Cancelled {
                continue;
            }
            let status = determine_event_status(&event.active_period, now);
            if status != event.event_descriptor.event_status {
                event.event_descriptor.event_status = status;
                tracing::info!("event {} has new status: {status}", event.id());
            }
        }
    }

    /// Drop events that are cancelled or have run to completion.
    pub(crate) fn event_cleanup(&self) {
        let now = self.clock.now();
        let mut ledger = self.events.lock().unwrap();
        ledger.received.retain(|event| {
            let done = event.event_descriptor.event_status == EventStatus::Cancelled
                || determine_event_status(&event.active_period, now) == EventStatus::Completed;
            if done {
                tracing::info!("removing event {} because it is no longer relevant", event.id());
            }
            !done
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use crate::testutil::{registered_client, FakeTransport};
    use crate::wire::{ActivePeriod, EventDescriptor, EventSignal};

    fn make_event(event_id: &str, modification_number: u32) -> Event {
        Event {
            event_descriptor: EventDescriptor {
                event_id: event_id.to_string(),
                modification_number,
                event_status: EventStatus::Far,
                priority: None,
                market_context: None,
                created_date_time: None,
                modification_date_time: None,
                test_event: false,
                vtn_comment: None,
            },
            active_period: ActivePeriod {
                dtstart: Utc::now() + chrono::Duration::seconds(600),
                duration: Duration::from_secs(3600),
                ramp_up_period: None,
                tolerance: None,
            },
            event_signals: vec![EventSignal {
                signal_name: "simple".to_string(),
                signal_type: "level".to_string(),
                signal_id: "sig-1".to_string(),
                intervals: Vec::new(),
                current_value: None,
            }],
            targets: Vec::new(),
            response_required: ResponseRequired::Always,
        }
    }

    struct CountingHandler {
        opt: OptType,
        on_event_calls: AtomicUsize,
        on_update_calls: AtomicUsize,
    }

    impl CountingHandler {
        fn opt_in() -> Arc<Self> {
            Arc::new(Self {
                opt: OptType::OptIn,
                on_event_calls: AtomicUsize::new(0),
                on_update_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn on_event(&self, _event: &Event) -> Result<OptType, VenError> {
            self.on_event_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.opt)
        }

        async fn on_update_event(&self, _event: &Event) -> Result<Option<OptType>, VenError> {
            self.on_update_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.opt))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn on_event(&self, _event: &Event) -> Result<OptType, VenError> {
            Err(VenError::Internal("device offline".to_string()))
        }
    }

    fn created_event_responses(transport: &FakeTransport) -> Vec<EventResponse> {
        transport
            .sent()
            .into_iter()
            .filter_map(|(_, msg)| match msg {
                OadrMessage::CreatedEvent(payload) => Some(payload.event_responses),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn new_event_invokes_handler_and_responds() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        let handler = CountingHandler::opt_in();
        client.add_handler(handler.clone());

        client
            .inner
            .on_event_batch(Some("req-1".to_string()), vec![make_event("E1", 0)])
            .await;

        assert_eq!(handler.on_event_calls.load(Ordering::SeqCst), 1);
        let responses = created_event_responses(&transport);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].opt_type, OptType::OptIn);
        assert_eq!(responses[0].event_id, "E1");
        assert_eq!(responses[0].response_code, 200);
    }

    #[tokio::test]
    async fn redelivery_with_same_modification_number_reuses_choice() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        let handler = CountingHandler::opt_in();
        client.add_handler(handler.clone());

        client
            .inner
            .on_event_batch(Some("req-1".to_string()), vec![make_event("E1", 0)])
            .await;
        client
            .inner
            .on_event_batch(Some("req-2".to_string()), vec![make_event("E1", 0)])
            .await;

        // The handler ran once; the second response reused the stored opt.
        assert_eq!(handler.on_event_calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.on_update_calls.load(Ordering::SeqCst), 0);
        let responses = created_event_responses(&transport);
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.opt_type == OptType::OptIn));
    }

    #[tokio::test]
    async fn changed_modification_number_invokes_update_handler() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        let handler = CountingHandler::opt_in();
        client.add_handler(handler.clone());

        client
            .inner
            .on_event_batch(None, vec![make_event("E1", 0)])
            .await;
        client
            .inner
            .on_event_batch(None, vec![make_event("E1", 1)])
            .await;

        assert_eq!(handler.on_event_calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.on_update_calls.load(Ordering::SeqCst), 1);

        // The stored copy is the fresh one.
        let ledger = client.inner.events.lock().unwrap();
        assert_eq!(ledger.received.len(), 1);
        assert_eq!(ledger.received[0].modification_number(), 1);
    }

    #[tokio::test]
    async fn handler_error_coerces_batch_to_opt_out() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        client.add_handler(Arc::new(FailingHandler));

        client
            .inner
            .on_event_batch(
                Some("req-1".to_string()),
                vec![make_event("E1", 0), make_event("E2", 0)],
            )
            .await;

        let responses = created_event_responses(&transport);
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.opt_type == OptType::OptOut));
    }

    #[tokio::test]
    async fn response_not_required_events_are_not_answered() {
        let transport = Arc::new(FakeTransport::new());
        let client = registered_client(transport.clone(), "R1");
        client.add_handler(CountingHandler::opt_in());

        let mut event = make_event("E1", 0);
        event.response_required = ResponseRequired::Never;
        client.inner.on_event_batch(None, vec![event]).await;

        // No oadrCreatedEvent at all.
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn completed_events_get_no_response() {
        let transport = Arc::new(FakeTransport::new());
        let client = registered_client(transport.clone(), "R1");
        client.add_handler(CountingHandler::opt_in());

        let mut event = make_event("E1", 0);
        event.active_period.dtstart = Utc::now() - chrono::Duration::seconds(7200);
        event.active_period.duration = Duration::from_secs(600);
        client.inner.on_event_batch(None, vec![event]).await;

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_signal_name_yields_signal_not_supported() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        client.add_handler(CountingHandler::opt_in());

        let mut event = make_event("E1", 0);
        event.event_signals[0].signal_name = "MYSTERY_SIGNAL".to_string();
        client
            .inner
            .on_event_batch(Some("req-1".to_string()), vec![event])
            .await;

        let responses = created_event_responses(&transport);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response_code, status_codes::SIGNAL_NOT_SUPPORTED);
        assert_eq!(responses[0].response_description, "ERROR");
    }

    #[tokio::test]
    async fn completed_event_is_dropped_from_responded_map() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");
        client.add_handler(CountingHandler::opt_in());

        client
            .inner
            .on_event_batch(None, vec![make_event("E1", 0)])
            .await;
        assert!(client.inner.events.lock().unwrap().responded.contains_key("E1"));

        let mut completed = make_event("E1", 1);
        completed.event_descriptor.event_status = EventStatus::Completed;
        client.inner.on_event_batch(None, vec![completed]).await;
        assert!(!client.inner.events.lock().unwrap().responded.contains_key("E1"));
    }

    #[tokio::test]
    async fn status_refresh_updates_and_cleanup_removes() {
        let transport = Arc::new(FakeTransport::new());
        let client = registered_client(transport, "R1");

        // One event already over, one still upcoming.
        let mut over = make_event("E-done", 0);
        over.active_period.dtstart = Utc::now() - chrono::Duration::seconds(7200);
        over.active_period.duration = Duration::from_secs(60);
        let upcoming = make_event("E-soon", 0);
        {
            let mut ledger = client.inner.events.lock().unwrap();
            ledger.received.push(over);
            ledger.received.push(upcoming);
        }

        client.inner.event_status_refresh();
        {
            let ledger = client.inner.events.lock().unwrap();
            let done = ledger.received.iter().find(|e| e.id() == "E-done").unwrap();
            assert_eq!(done.event_descriptor.event_status, EventStatus::Completed);
        }

        client.inner.event_cleanup();
        let ledger = client.inner.events.lock().unwrap();
        assert_eq!(ledger.received.len(), 1);
        assert_eq!(ledger.received[0].id(), "E-soon");
    }

    #[tokio::test]
    async fn cancelled_events_are_skipped_by_refresh_but_swept() {
        let transport = Arc::new(FakeTransport::new());
        let client = registered_client(transport, "R1");

        let mut cancelled = make_event("E-cancelled", 0);
        cancelled.event_descriptor.event_status = EventStatus::Cancelled;
        client.inner.events.lock().unwrap().received.push(cancelled);

        client.inner.event_status_refresh();
        assert_eq!(
            client.inner.events.lock().unwrap().received[0]
                .event_descriptor
                .event_status,
            EventStatus::Cancelled
        );

        client.inner.event_cleanup();
        assert!(client.inner.events.lock().unwrap().received.is_empty());
    }

    #[tokio::test]
    async fn sync_events_feeds_intake() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_reply(OadrMessage::DistributeEvent(crate::wire::DistributeEvent {
            response: None,
            request_id: Some("req-sync".to_string()),
            vtn_id: None,
            events: vec![make_event("E1", 0)],
        }));
        transport.push_empty();

        let client = registered_client(transport.clone(), "R1");
        let handler = CountingHandler::opt_in();
        client.add_handler(handler.clone());

        client.sync_events().await;
        assert_eq!(handler.on_event_calls.load(Ordering::SeqCst), 1);
        let sent = transport.sent();
        assert_eq!(sent[0].1.message_type(), "oadrRequestEvent");
        assert_eq!(sent[1].1.message_type(), "oadrCreatedEvent");
    }

    #[tokio::test]
    async fn created_event_manual_path() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");

        client
            .created_event("req-x", "E9", OptType::OptIn, 2)
            .await;

        let responses = created_event_responses(&transport);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].event_id, "E9");
        assert_eq!(responses[0].modification_number, 2);
        assert_eq!(responses[0].opt_type, OptType::OptIn);
    }
}
