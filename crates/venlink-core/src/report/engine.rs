//! The reporting engine: advertising declared reports, accepting VTN
//! subscriptions, running samplers on the requested cadence, accumulating
//! intervals, and deciding when a report is complete.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::client::ClientInner;
use crate::report::{ActiveReportRequest, DataCollectionMode, SampleOutput, Sampler};
use crate::transport::Service;
use crate::util::generate_id;
use crate::vocab::status_codes;
use crate::wire::{
    CancelReport, CanceledReport, CreatedReport, OadrMessage, PendingReport, RegisterReport,
    Report, ReportInterval, ReportPayload, ReportRequest, Response,
};

/// What to do after a report request has been recorded.
enum Followup {
    /// Nothing to run (unknown report, or nothing accepted).
    Nothing,
    /// Schedule a recurring sampling job.
    Recurring { period: Duration },
    /// Run one sample at a VTN-chosen instant.
    RunAt { dtstart: DateTime<Utc> },
    /// Run one sample right away.
    RunNow,
}

impl ClientInner {
    // -----------------------------------------------------------------------
    // Registration phase
    // -----------------------------------------------------------------------

    /// Advertise all declared reports with `oadrRegisterReport`. If the VTN
    /// immediately answers with report requests, enter the subscription
    /// phase.
    pub(crate) async fn register_reports(&self) {
        let reports = {
            let mut registry = self.registry.lock().unwrap();
            let now = self.clock.now();
            for report in registry.reports.iter_mut() {
                report.created_date_time = now;
            }
            registry
                .reports
                .iter()
                .map(|r| r.to_metadata())
                .collect::<Vec<_>>()
        };

        let msg = OadrMessage::RegisterReport(RegisterReport {
            request_id: generate_id(),
            ven_id: self.ven_id(),
            report_request_id: Some("0".to_string()),
            reports,
        });
        if let Ok(Some(OadrMessage::RegisteredReport(reply))) =
            self.perform_request(Service::EiReport, &msg).await
        {
            if !reply.report_requests.is_empty() {
                self.handle_report_requests(
                    reply.response.request_id.clone(),
                    reply.report_requests,
                )
                .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subscription phase
    // -----------------------------------------------------------------------

    /// Record the VTN's report requests, schedule sampling for each, and
    /// answer with one `oadrCreatedReport` for the whole batch.
    pub(crate) async fn handle_report_requests(
        &self,
        request_id: Option<String>,
        report_requests: Vec<ReportRequest>,
    ) {
        let mut response_code = 200;
        let pending: Vec<PendingReport> = report_requests
            .iter()
            .map(|r| PendingReport {
                report_request_id: r.report_request_id.clone(),
            })
            .collect();

        for request in report_requests {
            let report_request_id = request.report_request_id.clone();
            match self.accept_report_request(request) {
                Err(()) => {
                    response_code = status_codes::INVALID_ID;
                }
                Ok(Followup::Nothing) => {}
                Ok(Followup::Recurring { period }) => {
                    let Some(inner) = self.arc() else { continue };
                    let rr_for_job = report_request_id.clone();
                    let job = self.scheduler.add_interval_job(period, move || {
                        let inner = inner.clone();
                        let report_request_id = rr_for_job.clone();
                        async move { inner.update_report(&report_request_id).await }
                    });
                    let mut registry = self.registry.lock().unwrap();
                    if let Some(entry) = registry
                        .requests
                        .iter_mut()
                        .find(|r| r.report_request_id == report_request_id)
                    {
                        entry.job = Some(job);
                    }
                }
                Ok(Followup::RunAt { dtstart }) => {
                    let Some(inner) = self.arc() else { continue };
                    let delay = (dtstart - self.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    self.scheduler.add_one_shot_job(delay, move || async move {
                        inner.update_report(&report_request_id).await;
                    });
                }
                Ok(Followup::RunNow) => {
                    self.update_report(&report_request_id).await;
                }
            }
        }

        let msg = OadrMessage::CreatedReport(CreatedReport {
            response: Response {
                response_code,
                response_description: if response_code == 200 { "OK" } else { "ERROR" }
                    .to_string(),
                request_id,
            },
            ven_id: self.ven_id(),
            pending_reports: pending,
        });
        let _ = self.perform_request(Service::EiReport, &msg).await;
    }

    /// Validate one report request against the declarations and record it.
    /// `Err(())` marks a VTN request with an INVALID id.
    fn accept_report_request(&self, request: ReportRequest) -> Result<Followup, ()> {
        let report_request_id = request.report_request_id;
        let specifier = request.report_specifier;
        let report_specifier_id = specifier.report_specifier_id;

        let first_r_id = specifier
            .specifier_payloads
            .first()
            .map(|p| p.r_id.as_str())
            .unwrap_or_default();
        if report_specifier_id.contains("INVALID") || first_r_id.contains("INVALID") {
            tracing::error!("the VTN requested an invalid report; will respond with an error");
            return Err(());
        }

        let mut registry = self.registry.lock().unwrap();
        let Some(report) = registry.find_report(&report_specifier_id) else {
            tracing::error!(
                "a non-existent report with report_specifier_id {report_specifier_id} \
                 was requested"
            );
            registry.requests.push(ActiveReportRequest {
                report_request_id,
                report_specifier_id,
                report_back_duration: specifier.report_back_duration,
                granularity: specifier.granularity.unwrap_or(Duration::ZERO),
                r_ids: Vec::new(),
                job: None,
            });
            return Ok(Followup::Nothing);
        };

        let mut single = false;
        let mut granularity = specifier.granularity;
        let mut accepted = Vec::new();
        for payload in &specifier.specifier_payloads {
            let r_id = &payload.r_id;
            let Some(rd) = report.description(r_id) else {
                tracing::error!(
                    "a non-existent r_id {r_id} inside report with report_specifier_id \
                     {report_specifier_id} was requested"
                );
                continue;
            };

            // A requested measurement must match the declared one exactly.
            if let Some(measurement) = &payload.measurement {
                let Some(declared) = &rd.measurement else {
                    tracing::error!(
                        "a measurement was requested for r_id {r_id}, but none is declared"
                    );
                    continue;
                };
                if measurement.description != declared.description {
                    tracing::error!(
                        "a non-matching measurement description for report_request_id \
                         {report_request_id} and r_id {r_id}; offered: {}, requested: {}",
                        declared.description,
                        measurement.description
                    );
                    continue;
                }
                if measurement.unit != declared.unit {
                    tracing::error!(
                        "a non-matching measurement unit for report_request_id \
                         {report_request_id} and r_id {r_id}; offered: {}, requested: {}",
                        declared.unit,
                        measurement.unit
                    );
                    continue;
                }
            }

            match granularity {
                Some(g) if g.is_zero() => {
                    tracing::info!(
                        "a single report was requested for report_specifier_id \
                         {report_specifier_id} and r_id {r_id}"
                    );
                    single = true;
                }
                Some(g) => {
                    if !(rd.sampling_rate.min_period <= g && g <= rd.sampling_rate.max_period) {
                        tracing::error!(
                            "an invalid sampling rate {g:?} was requested for \
                             report_specifier_id {report_specifier_id} and r_id {r_id}; the \
                             offered sampling rate is between {:?} and {:?}",
                            rd.sampling_rate.min_period,
                            rd.sampling_rate.max_period
                        );
                        continue;
                    }
                }
                None => {
                    // No granularity requested: fall back to the slowest
                    // offered rate.
                    granularity = Some(rd.sampling_rate.max_period);
                }
            }
            accepted.push(r_id.clone());
        }

        let report_back_duration = specifier.report_back_duration;
        let granularity = granularity
            .or(report_back_duration)
            .unwrap_or(Duration::ZERO);

        registry.requests.push(ActiveReportRequest {
            report_request_id,
            report_specifier_id,
            report_back_duration,
            granularity,
            r_ids: accepted,
            job: None,
        });
        drop(registry);

        if !single && report_back_duration.is_some_and(|d| !d.is_zero()) {
            Ok(Followup::Recurring { period: granularity })
        } else if let Some(interval) = specifier.report_interval {
            Ok(Followup::RunAt {
                dtstart: interval.dtstart,
            })
        } else {
            Ok(Followup::RunNow)
        }
    }

    // -----------------------------------------------------------------------
    // Sampling phase
    // -----------------------------------------------------------------------

    /// Run every accepted sampler of the request once, append the results to
    /// the in-progress report, and flush it when complete.
    pub(crate) async fn update_report(&self, report_request_id: &str) {
        tracing::debug!("running update_report for {report_request_id}");

        // Snapshot everything the sampling needs; samplers are awaited
        // without holding the registry lock.
        let plan = {
            let registry = self.registry.lock().unwrap();
            let Some(request) = registry.find_request(report_request_id) else {
                tracing::error!("report with report_request_id {report_request_id} was not found");
                return;
            };
            let Some(report) = registry.find_report(&request.report_specifier_id) else {
                tracing::error!(
                    "report_specifier_id {} has no declared report",
                    request.report_specifier_id
                );
                return;
            };
            let outgoing = registry
                .incomplete
                .get(report_request_id)
                .cloned()
                .unwrap_or_else(|| Report {
                    report_request_id: Some(report_request_id.to_string()),
                    report_specifier_id: report.report_specifier_id.clone(),
                    report_name: report.outgoing_name(),
                    ..Report::default()
                });
            let samplers: Vec<(String, Option<Sampler>)> = request
                .r_ids
                .iter()
                .map(|r_id| {
                    let key = (request.report_specifier_id.clone(), r_id.clone());
                    (r_id.clone(), registry.samplers.get(&key).cloned())
                })
                .collect();
            (
                request.granularity,
                request.report_back_duration,
                report.data_collection_mode,
                report.duration,
                request.r_ids.len(),
                samplers,
                outgoing,
            )
        };
        let (granularity, report_back_duration, mode, report_duration, r_id_count, samplers, mut outgoing) =
            plan;

        let now = self.clock.now();
        match mode {
            DataCollectionMode::Full => {
                let window = report_back_duration.unwrap_or(granularity).max(granularity);
                let date_to = now;
                let date_from = now
                    - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
                for (r_id, sampler) in samplers {
                    let Some(Sampler::Windowed(sampler)) = sampler else {
                        tracing::error!(
                            "no windowed callback found for r_id {r_id} in report {}",
                            outgoing.report_specifier_id
                        );
                        continue;
                    };
                    match sampler.sample_window(date_from, date_to, granularity).await {
                        Ok(series) => {
                            for (dtstart, value) in series {
                                push_interval(&mut outgoing, dtstart, granularity, &r_id, value);
                            }
                        }
                        Err(err) => {
                            tracing::error!("the sampler for r_id {r_id} failed: {err}");
                        }
                    }
                }
            }
            DataCollectionMode::Incremental => {
                for (r_id, sampler) in samplers {
                    let Some(Sampler::Incremental(sampler)) = sampler else {
                        tracing::error!(
                            "no callback found for r_id {r_id} in report {}",
                            outgoing.report_specifier_id
                        );
                        continue;
                    };
                    match sampler.sample().await {
                        Ok(SampleOutput::Scalar(value)) => {
                            push_interval(&mut outgoing, now, granularity, &r_id, value);
                        }
                        Ok(SampleOutput::Series(series)) => {
                            for (dtstart, value) in series {
                                push_interval(&mut outgoing, dtstart, granularity, &r_id, value);
                            }
                        }
                        Err(err) => {
                            tracing::error!("the sampler for r_id {r_id} failed: {err}");
                        }
                    }
                }
            }
        }

        // The report always starts at its earliest interval and spans the
        // declared duration.
        if let Some(min_dtstart) = outgoing.intervals.iter().map(|i| i.dtstart).min() {
            outgoing.dtstart = Some(min_dtstart);
            outgoing.duration = Some(report_duration);
        }
        tracing::info!(
            "the number of intervals in the report is now {}",
            outgoing.intervals.len()
        );

        // Completion rule: an incremental request with a reporting window
        // larger than its sampling period accumulates until every expected
        // interval is present; everything else flushes immediately.
        let accumulating = mode == DataCollectionMode::Incremental
            && !granularity.is_zero()
            && report_back_duration.is_some_and(|rbd| rbd > granularity);

        if accumulating {
            let rbd = report_back_duration.unwrap_or(granularity);
            let expected = r_id_count * (rbd.as_millis() / granularity.as_millis()) as usize;
            if outgoing.intervals.len() == expected {
                tracing::info!("the report is now complete; will queue for sending");
                self.registry
                    .lock()
                    .unwrap()
                    .incomplete
                    .remove(report_request_id);
                let _ = self.pending_tx.send(outgoing);
            } else {
                tracing::debug!("the report is not yet complete, will hold until it is");
                self.registry
                    .lock()
                    .unwrap()
                    .incomplete
                    .insert(report_request_id.to_string(), outgoing);
            }
        } else {
            tracing::info!("report will be sent now");
            let _ = self.pending_tx.send(outgoing);
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel an active subscription on VTN request. In-flight data is
    /// sampled one last time so it is not lost.
    pub(crate) async fn cancel_report(&self, payload: CancelReport) {
        let report_request_id = payload.report_request_id.clone();
        let request = {
            let registry = self.registry.lock().unwrap();
            registry.find_request(&report_request_id).cloned()
        };
        let Some(request) = request else {
            tracing::error!("report with report_request_id {report_request_id} was not found");
            return;
        };

        if !request.r_ids.is_empty() {
            tracing::info!("updating report {report_request_id} one last time before cancelling");
            self.update_report(&report_request_id).await;
            // Give the pump a moment to drain the final report.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        if let Some(job) = &request.job {
            self.scheduler.remove(job);
        }
        tracing::info!("report with report_request_id {report_request_id} has been cancelled");

        let response = Response::ok(Some(payload.request_id));
        let msg = if payload.report_to_follow {
            tracing::info!(
                "report with report_request_id {report_request_id} will be followed by a new report"
            );
            let msg = CanceledReport {
                response,
                ven_id: self.ven_id(),
                report_request_id: Some(report_request_id.clone()),
                pending_reports: vec![PendingReport {
                    report_request_id: report_request_id.clone(),
                }],
            };
            self.update_report(&report_request_id).await;
            msg
        } else {
            CanceledReport {
                response,
                ven_id: self.ven_id(),
                report_request_id: Some(report_request_id.clone()),
                pending_reports: Vec::new(),
            }
        };

        self.registry
            .lock()
            .unwrap()
            .remove_request(&report_request_id);
        let _ = self
            .perform_request(Service::EiReport, &OadrMessage::CanceledReport(msg))
            .await;
    }
}

fn push_interval(
    report: &mut Report,
    dtstart: DateTime<Utc>,
    granularity: Duration,
    r_id: &str,
    value: f64,
) {
    report.intervals.push(ReportInterval {
        dtstart,
        duration: Some(granularity),
        report_payload: ReportPayload {
            r_id: r_id.to_string(),
            value,
        },
    });
}
