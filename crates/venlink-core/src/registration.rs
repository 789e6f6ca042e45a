//! Registration lifecycle: the query/create handshake, re-registration on
//! VTN request, and cancellation from either side.

use std::time::Duration;

use crate::client::ClientInner;
use crate::error::RequestError;
use crate::transport::Service;
use crate::util::generate_id;
use crate::vocab::status_codes;
use crate::wire::{
    CancelPartyRegistration, CanceledPartyRegistration, CreatePartyRegistration, OadrMessage,
    QueryRegistration, Response,
};

impl ClientInner {
    /// Ask the VTN about an existing registration. The reply (an
    /// `oadrCreatedPartyRegistration`) may carry a registration id and the
    /// request id to echo into the registration proper.
    pub(crate) async fn query_registration(&self) -> Result<Option<OadrMessage>, RequestError> {
        let msg = OadrMessage::QueryRegistration(QueryRegistration {
            request_id: generate_id(),
        });
        self.perform_request(Service::EiRegisterParty, &msg).await
    }

    /// Register this VEN with the VTN. Pass `registration_id` to turn the
    /// call into a re-registration.
    ///
    /// On success the VTN-assigned registration id, ven id and requested
    /// poll frequency are recorded. On failure the local registration state
    /// is left as it was; callers detect the failure by checking
    /// [`ClientInner::registration_id`].
    pub(crate) async fn create_party_registration(
        &self,
        request_id: Option<String>,
        registration_id: Option<String>,
    ) {
        let msg = OadrMessage::CreatePartyRegistration(CreatePartyRegistration {
            request_id: request_id.unwrap_or_else(generate_id),
            ven_name: self.config.ven_name.clone(),
            ven_id: self.ven_id(),
            http_pull_model: true,
            xml_signature: false,
            report_only: false,
            profile_name: "2.0b".to_string(),
            transport_name: "simpleHttp".to_string(),
            transport_address: None,
            registration_id,
        });

        let payload = match self.perform_request(Service::EiRegisterParty, &msg).await {
            Ok(Some(OadrMessage::CreatedPartyRegistration(payload))) => payload,
            Ok(Some(other)) => {
                tracing::warn!(
                    "unexpected reply {} to oadrCreatePartyRegistration",
                    other.message_type()
                );
                return;
            }
            Ok(None) | Err(_) => return,
        };

        if !payload.response.is_ok() {
            tracing::error!(
                "got error on create party registration: {} {}",
                payload.response.response_code,
                payload.response.response_description
            );
            return;
        }

        let mut registration = self.registration.lock().unwrap();
        match payload.registration_id {
            Some(id) => registration.registration_id = Some(id),
            None => {
                tracing::error!(
                    "no registration id received from the VTN during registration; \
                     will assume that we are not or no longer registered"
                );
                registration.registration_id = None;
            }
        }
        match payload.ven_id {
            Some(ven_id) => {
                if let Some(current) = &registration.ven_id {
                    if *current != ven_id {
                        tracing::warn!(
                            "the ven id received from the VTN ({ven_id}) did not match the \
                             previously configured ven id ({current}); updating to the VTN's value"
                        );
                    }
                }
                registration.ven_id = Some(ven_id);
            }
            None => {
                tracing::error!(
                    "no ven id received from the VTN during registration; \
                     will assume that we are not or no longer registered"
                );
            }
        }
        if registration.registration_id.is_some() {
            registration.poll_frequency = payload
                .requested_oadr_poll_freq
                .unwrap_or(Duration::from_secs(10));
            tracing::info!(
                "VEN is now registered with registration id {:?} and ven id {:?}",
                registration.registration_id,
                registration.ven_id
            );
            tracing::info!("the polling frequency is {:?}", registration.poll_frequency);
        }
    }

    /// Re-register with the current registration id, then replay report
    /// registration and event sync. Loss of the registration id here is
    /// fatal, as in the initial handshake.
    pub(crate) async fn create_party_reregistration(&self) {
        let registration_id = self.registration_id();
        self.create_party_registration(None, registration_id).await;

        if self.registration_id().is_none() {
            tracing::error!("no registration id received from the VTN, aborting");
            self.shutdown().await;
            return;
        }

        self.register_reports().await;
        if !self.registry.lock().unwrap().reports.is_empty() {
            self.start_report_pump();
        }
        self.sync_events().await;
    }

    /// Cancel our own registration. On VTN acknowledgement all subscription
    /// state and scheduled jobs are dropped.
    pub(crate) async fn cancel_party_registration(&self) {
        let Some(registration_id) = self.registration_id() else {
            tracing::info!("VEN is not registered");
            return;
        };
        tracing::info!(
            "VEN is registered with registration id {registration_id} and ven id {:?}, \
             trying to un-register",
            self.ven_id()
        );

        let msg = OadrMessage::CancelPartyRegistration(CancelPartyRegistration {
            request_id: generate_id(),
            registration_id,
            ven_id: self.ven_id(),
        });
        match self.perform_request(Service::EiRegisterParty, &msg).await {
            Ok(Some(OadrMessage::CanceledPartyRegistration(ack))) if ack.response.is_ok() => {
                tracing::info!("VEN successfully un-registered");
                self.registration.lock().unwrap().registration_id = None;
                self.registry.lock().unwrap().clear_subscriptions();
                self.scheduler.remove_all_jobs();
            }
            _ => {
                tracing::warn!("the VEN couldn't cancel the registration");
            }
        }
    }

    /// Handle a VTN-initiated registration cancellation. A request for a
    /// registration id other than ours is answered with 452 and otherwise
    /// ignored.
    pub(crate) async fn on_cancel_party_registration(&self, payload: CancelPartyRegistration) {
        let Some(local) = self.registration_id() else {
            tracing::info!("VEN is not registered, doing nothing");
            return;
        };

        if payload.registration_id != local {
            tracing::info!(
                "cancel request is not for us: our registration id is {local}, \
                 the request was for {}",
                payload.registration_id
            );
            let msg = OadrMessage::CanceledPartyRegistration(CanceledPartyRegistration {
                response: Response::error(status_codes::INVALID_ID, Some(payload.request_id)),
                registration_id: Some(local),
                ven_id: self.ven_id(),
            });
            let _ = self.perform_request(Service::EiRegisterParty, &msg).await;
            return;
        }

        // Subscription state and jobs go away; declared reports survive so a
        // future registration can advertise them again.
        self.registry.lock().unwrap().clear_subscriptions();
        self.scheduler.remove_all_jobs();

        let msg = OadrMessage::CanceledPartyRegistration(CanceledPartyRegistration {
            response: Response::ok(Some(payload.request_id)),
            registration_id: Some(local),
            ven_id: self.ven_id(),
        });
        let _ = self.perform_request(Service::EiRegisterParty, &msg).await;
        self.registration.lock().unwrap().registration_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testutil::{registered_client, scripted_client, FakeTransport};
    use crate::wire::{CreatedPartyRegistration, DistributeEvent};

    fn created_party_registration(
        registration_id: Option<&str>,
        ven_id: Option<&str>,
    ) -> OadrMessage {
        OadrMessage::CreatedPartyRegistration(CreatedPartyRegistration {
            response: Response::ok(None),
            registration_id: registration_id.map(str::to_string),
            ven_id: ven_id.map(str::to_string),
            vtn_id: None,
            requested_oadr_poll_freq: None,
        })
    }

    #[tokio::test]
    async fn vtn_assigned_ven_id_wins_over_configured() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_reply(created_party_registration(Some("R1"), Some("vtn-choice")));

        let client = scripted_client(transport);
        {
            let mut registration = client.inner.registration.lock().unwrap();
            registration.ven_id = Some("my-choice".to_string());
        }
        client.inner.create_party_registration(None, None).await;
        assert_eq!(client.ven_id().as_deref(), Some("vtn-choice"));
        assert_eq!(client.registration_id().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn error_response_leaves_registration_untouched() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_reply(OadrMessage::CreatedPartyRegistration(
            CreatedPartyRegistration {
                response: Response::error(463, None),
                registration_id: Some("R-rejected".to_string()),
                ven_id: None,
                vtn_id: None,
                requested_oadr_poll_freq: None,
            },
        ));

        let client = scripted_client(transport);
        client.inner.create_party_registration(None, None).await;
        assert!(client.registration_id().is_none());
    }

    #[tokio::test]
    async fn reply_without_registration_id_clears_local_state() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_reply(created_party_registration(None, Some("V1")));

        let client = scripted_client(transport);
        client.inner.registration.lock().unwrap().registration_id = Some("stale".to_string());
        client.inner.create_party_registration(None, None).await;
        assert!(client.registration_id().is_none());
    }

    #[tokio::test]
    async fn cancel_party_registration_wipes_jobs_and_state() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_reply(OadrMessage::CanceledPartyRegistration(
            CanceledPartyRegistration {
                response: Response::ok(None),
                registration_id: Some("R1".to_string()),
                ven_id: None,
            },
        ));

        let client = registered_client(transport.clone(), "R1");
        client
            .inner
            .scheduler
            .add_interval_job(Duration::from_secs(60), || async {});
        assert_eq!(client.inner.scheduler.job_count(), 1);

        client.cancel_party_registration().await;
        assert!(client.registration_id().is_none());
        assert_eq!(client.inner.scheduler.job_count(), 0);

        let sent = transport.sent();
        assert_eq!(sent[0].1.message_type(), "oadrCancelPartyRegistration");
    }

    #[tokio::test]
    async fn cancel_without_ack_keeps_registration() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_status(500);

        let client = registered_client(transport, "R1");
        client.cancel_party_registration().await;
        assert_eq!(client.registration_id().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn vtn_cancel_with_wrong_registration_id_gets_452() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();

        let client = registered_client(transport.clone(), "R1");
        client
            .inner
            .on_cancel_party_registration(CancelPartyRegistration {
                request_id: "req-7".to_string(),
                registration_id: "someone-else".to_string(),
                ven_id: None,
            })
            .await;

        // Local state untouched.
        assert_eq!(client.registration_id().as_deref(), Some("R1"));
        let sent = transport.sent();
        match &sent[0].1 {
            OadrMessage::CanceledPartyRegistration(reply) => {
                assert_eq!(reply.response.response_code, status_codes::INVALID_ID);
                assert_eq!(reply.response.request_id.as_deref(), Some("req-7"));
                assert_eq!(reply.registration_id.as_deref(), Some("R1"));
            }
            other => panic!("unexpected reply {}", other.message_type()),
        }
    }

    #[tokio::test]
    async fn vtn_cancel_with_matching_id_unregisters() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();

        let client = registered_client(transport.clone(), "R1");
        client
            .inner
            .on_cancel_party_registration(CancelPartyRegistration {
                request_id: "req-8".to_string(),
                registration_id: "R1".to_string(),
                ven_id: None,
            })
            .await;

        assert!(client.registration_id().is_none());
        assert_eq!(client.inner.scheduler.job_count(), 0);
        let sent = transport.sent();
        match &sent[0].1 {
            OadrMessage::CanceledPartyRegistration(reply) => {
                assert!(reply.response.is_ok());
            }
            other => panic!("unexpected reply {}", other.message_type()),
        }
    }

    #[tokio::test]
    async fn reregistration_replays_reports_and_event_sync() {
        let transport = Arc::new(FakeTransport::new());
        // oadrResponse ack for the re-registration request.
        transport.push_empty();
        // Reply to oadrCreatePartyRegistration.
        transport.push_reply(created_party_registration(Some("R1"), Some("V1")));
        // Reply to oadrRegisterReport.
        transport.push_empty();
        // Reply to oadrRequestEvent.
        transport.push_reply(OadrMessage::DistributeEvent(DistributeEvent {
            response: None,
            request_id: None,
            vtn_id: None,
            events: Vec::new(),
        }));

        let client = registered_client(transport.clone(), "R1");
        client
            .inner
            .dispatch(OadrMessage::RequestReregistration(Default::default()))
            .await;

        let sent = transport.sent();
        assert_eq!(sent[0].1.message_type(), "oadrResponse");
        match &sent[1].1 {
            OadrMessage::CreatePartyRegistration(payload) => {
                // Re-registration carries the current registration id.
                assert_eq!(payload.registration_id.as_deref(), Some("R1"));
            }
            other => panic!("unexpected message {}", other.message_type()),
        }
        assert_eq!(sent[2].1.message_type(), "oadrRegisterReport");
        assert_eq!(sent[3].1.message_type(), "oadrRequestEvent");
    }
}
