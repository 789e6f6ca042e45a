//! The outbound report pump: a single long-lived consumer that drains the
//! pending-report queue in order and delivers each report to the VTN.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::ClientInner;
use crate::transport::Service;
use crate::util::generate_id;
use crate::wire::{OadrMessage, Report, UpdateReport};

/// Drain `rx` until the channel closes or `cancel` fires. Send failures are
/// logged and the pump moves on; a VTN acknowledgement carrying a
/// cancel-report directive is acted upon before the next report is taken.
pub(crate) async fn run_report_pump(
    inner: Arc<ClientInner>,
    mut rx: mpsc::UnboundedReceiver<Report>,
    cancel: CancellationToken,
) {
    loop {
        let report = tokio::select! {
            _ = cancel.cancelled() => return,
            report = rx.recv() => match report {
                Some(report) => report,
                None => return,
            },
        };

        let msg = OadrMessage::UpdateReport(UpdateReport {
            request_id: generate_id(),
            ven_id: inner.ven_id(),
            reports: vec![report],
        });
        match inner.perform_request(Service::EiReport, &msg).await {
            Err(err) => {
                tracing::error!("unable to send the report to the VTN: {err}");
            }
            Ok(Some(OadrMessage::UpdatedReport(ack))) => {
                if let Some(directive) = ack.cancel_report {
                    inner.cancel_report(directive).await;
                }
            }
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testutil::{registered_client, FakeTransport};
    use crate::wire::{CancelReport, Response, UpdatedReport};

    fn report(report_specifier_id: &str) -> Report {
        Report {
            report_specifier_id: report_specifier_id.to_string(),
            report_name: "TELEMETRY_USAGE".to_string(),
            report_request_id: Some("rr-1".to_string()),
            ..Report::default()
        }
    }

    #[tokio::test]
    async fn reports_leave_in_enqueue_order() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_empty();
        transport.push_empty();
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");

        client.inner.pending_tx.send(report("first")).unwrap();
        client.inner.pending_tx.send(report("second")).unwrap();
        client.inner.pending_tx.send(report("third")).unwrap();
        client.inner.start_report_pump();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let specifiers: Vec<String> = transport
            .sent()
            .into_iter()
            .filter_map(|(_, msg)| match msg {
                OadrMessage::UpdateReport(payload) => {
                    Some(payload.reports[0].report_specifier_id.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(specifiers, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_the_pump() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_network_error();
        transport.push_empty();
        let client = registered_client(transport.clone(), "R1");

        client.inner.pending_tx.send(report("lost")).unwrap();
        client.inner.pending_tx.send(report("delivered")).unwrap();
        client.inner.start_report_pump();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Both reports were attempted.
        let updates = transport
            .sent()
            .into_iter()
            .filter(|(_, msg)| matches!(msg, OadrMessage::UpdateReport(_)))
            .count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn cancellation_exits_cleanly() {
        let transport = Arc::new(FakeTransport::new());
        let client = registered_client(transport.clone(), "R1");

        client.inner.start_report_pump();
        client.inner.pump_cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A report enqueued after cancellation is never sent. The channel
        // may already be closed once the pump has exited.
        let _ = client.inner.pending_tx.send(report("late"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn vtn_ack_with_cancel_directive_triggers_cancel_path() {
        let transport = Arc::new(FakeTransport::new());
        // Ack the update with an embedded cancel-report directive; the
        // cancel handler then sends oadrCanceledReport (second reply).
        transport.push_reply(OadrMessage::UpdatedReport(UpdatedReport {
            response: Response::ok(None),
            ven_id: None,
            cancel_report: Some(CancelReport {
                request_id: "req-c".to_string(),
                ven_id: None,
                report_request_id: "rr-1".to_string(),
                report_to_follow: false,
            }),
        }));
        transport.push_empty();

        let client = registered_client(transport.clone(), "R1");
        // An active request with no accepted r_ids, so the cancel path skips
        // the final update and its drain delay.
        client.inner.registry.lock().unwrap().requests.push(
            crate::report::ActiveReportRequest {
                report_request_id: "rr-1".to_string(),
                report_specifier_id: "rsid-1".to_string(),
                report_back_duration: None,
                granularity: Duration::from_secs(10),
                r_ids: Vec::new(),
                job: None,
            },
        );

        client.inner.pending_tx.send(report("rsid-1")).unwrap();
        client.inner.start_report_pump();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let types: Vec<&'static str> = transport
            .sent()
            .iter()
            .map(|(_, msg)| msg.message_type())
            .collect();
        assert_eq!(types, vec!["oadrUpdateReport", "oadrCanceledReport"]);
        assert!(client.inner.registry.lock().unwrap().requests.is_empty());
    }
}
