//! Opt management: VEN-initiated availability declarations.

use crate::client::ClientInner;
use crate::error::VenError;
use crate::transport::Service;
use crate::util::generate_id;
use crate::vocab::{self, OptType};
use crate::wire::{CancelOpt, CreateOpt, OadrMessage, Opt, Target, Vavailability};
use crate::VenClient;

/// Parameters for [`VenClient::create_opt`].
#[derive(Debug, Clone)]
pub struct OptSpec {
    pub opt_type: OptType,
    pub opt_reason: String,
    pub targets: Vec<Target>,
    pub vavailability: Option<Vavailability>,
    pub event_id: Option<String>,
    pub modification_number: Option<u32>,
    pub opt_id: Option<String>,
    pub request_id: Option<String>,
    pub market_context: Option<String>,
    pub signal_target_mrid: Option<String>,
}

impl OptSpec {
    pub fn new(opt_type: OptType, opt_reason: impl Into<String>) -> Self {
        Self {
            opt_type,
            opt_reason: opt_reason.into(),
            targets: Vec::new(),
            vavailability: None,
            event_id: None,
            modification_number: None,
            opt_id: None,
            request_id: None,
            market_context: None,
            signal_target_mrid: None,
        }
    }

    pub fn targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    /// Bind this opt to an event.
    pub fn for_event(mut self, event_id: impl Into<String>, modification_number: u32) -> Self {
        self.event_id = Some(event_id.into());
        self.modification_number = Some(modification_number);
        self
    }

    pub fn vavailability(mut self, vavailability: Vavailability) -> Self {
        self.vavailability = Some(vavailability);
        self
    }

    /// Pin the opt id instead of generating one.
    pub fn opt_id(mut self, opt_id: impl Into<String>) -> Self {
        self.opt_id = Some(opt_id.into());
        self
    }

    pub fn market_context(mut self, market_context: impl Into<String>) -> Self {
        self.market_context = Some(market_context.into());
        self
    }

    pub fn signal_target_mrid(mut self, mrid: impl Into<String>) -> Self {
        self.signal_target_mrid = Some(mrid.into());
        self
    }
}

impl ClientInner {
    pub(crate) async fn create_opt(&self, spec: OptSpec) -> Result<Option<String>, VenError> {
        if !vocab::is_valid_opt_reason(&spec.opt_reason) {
            return Err(VenError::Validation(format!(
                "{} is not a valid opt reason; valid options are {} or any name starting with 'x-'",
                spec.opt_reason,
                vocab::OPT_REASONS.join(", ")
            )));
        }

        let opt_id = spec.opt_id.unwrap_or_else(generate_id);
        let opt = Opt {
            opt_id: opt_id.clone(),
            opt_type: spec.opt_type,
            opt_reason: spec.opt_reason,
            market_context: spec.market_context,
            targets: spec.targets,
            vavailability: spec.vavailability,
            event_id: spec.event_id,
            modification_number: spec.modification_number,
            signal_target_mrid: spec.signal_target_mrid,
        };
        self.opts.lock().unwrap().push(opt.clone());

        let msg = OadrMessage::CreateOpt(CreateOpt {
            request_id: spec.request_id.unwrap_or_else(generate_id),
            ven_id: self.ven_id(),
            opt,
        });
        match self.perform_request(Service::EiOpt, &msg).await {
            Ok(Some(OadrMessage::CreatedOpt(ack))) => {
                tracing::info!(
                    "the VTN acknowledged the opt message with opt_id {}",
                    ack.opt_id
                );
                Ok(Some(ack.opt_id))
            }
            _ => {
                tracing::error!("the VTN did not acknowledge the opt message");
                Ok(None)
            }
        }
    }

    pub(crate) async fn cancel_opt(&self, opt_id: &str) -> Result<bool, VenError> {
        let known = self
            .opts
            .lock()
            .unwrap()
            .iter()
            .any(|opt| opt.opt_id == opt_id);
        if !known {
            tracing::error!(
                "a non-existent opt with opt_id {opt_id} was requested for cancellation"
            );
            return Ok(false);
        }

        let msg = OadrMessage::CancelOpt(CancelOpt {
            request_id: generate_id(),
            ven_id: self.ven_id(),
            opt_id: opt_id.to_string(),
        });
        match self.perform_request(Service::EiOpt, &msg).await {
            Ok(Some(OadrMessage::CanceledOpt(ack))) => {
                tracing::info!(
                    "the VTN acknowledged the opt cancellation with opt_id {}",
                    ack.opt_id
                );
                self.opts.lock().unwrap().retain(|opt| opt.opt_id != opt_id);
                Ok(true)
            }
            _ => {
                tracing::error!("the VTN did not acknowledge the opt cancellation");
                Ok(false)
            }
        }
    }
}

impl VenClient {
    /// Declare availability to the VTN. On acknowledgement, returns the
    /// VTN-confirmed opt id.
    pub async fn create_opt(&self, spec: OptSpec) -> Result<Option<String>, VenError> {
        self.inner.create_opt(spec).await
    }

    /// Cancel a previously acknowledged opt. Unknown ids are refused
    /// locally.
    pub async fn cancel_opt(&self, opt_id: &str) -> Result<bool, VenError> {
        self.inner.cancel_opt(opt_id).await
    }
}
