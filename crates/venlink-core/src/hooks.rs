//! Observation hooks on the request/response chain.
//!
//! Callers can watch the raw payload just before it is sent, right after it
//! is received, before schema validation, before parsing, and the typed
//! message after parsing. Listeners observe; they cannot mutate the
//! payload. A listener that panics is isolated by the tokio task boundary
//! of the calling job and never takes the client down.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::wire::OadrMessage;

/// Listener for the raw-payload hook points.
#[async_trait]
pub trait RawListener: Send + Sync {
    async fn on_xml(&self, xml: &str);
}

/// Listener for the parsed-message hook point.
#[async_trait]
pub trait ParsedListener: Send + Sync {
    async fn on_message(&self, message: &OadrMessage);
}

/// The five hook points, each holding an ordered list of listeners.
#[derive(Default)]
pub struct HookSet {
    before_send_xml: Mutex<Vec<Arc<dyn RawListener>>>,
    after_receive_xml: Mutex<Vec<Arc<dyn RawListener>>>,
    before_schema_validation: Mutex<Vec<Arc<dyn RawListener>>>,
    before_parse_xml: Mutex<Vec<Arc<dyn RawListener>>>,
    after_parse_xml: Mutex<Vec<Arc<dyn ParsedListener>>>,
}

impl HookSet {
    pub fn add_before_send_xml(&self, listener: Arc<dyn RawListener>) {
        self.before_send_xml.lock().unwrap().push(listener);
    }

    pub fn add_after_receive_xml(&self, listener: Arc<dyn RawListener>) {
        self.after_receive_xml.lock().unwrap().push(listener);
    }

    pub fn add_before_schema_validation(&self, listener: Arc<dyn RawListener>) {
        self.before_schema_validation.lock().unwrap().push(listener);
    }

    pub fn add_before_parse_xml(&self, listener: Arc<dyn RawListener>) {
        self.before_parse_xml.lock().unwrap().push(listener);
    }

    pub fn add_after_parse_xml(&self, listener: Arc<dyn ParsedListener>) {
        self.after_parse_xml.lock().unwrap().push(listener);
    }

    pub(crate) async fn run_before_send_xml(&self, raw: &[u8]) {
        Self::run_raw(&self.before_send_xml, raw).await;
    }

    pub(crate) async fn run_after_receive_xml(&self, raw: &[u8]) {
        Self::run_raw(&self.after_receive_xml, raw).await;
    }

    pub(crate) async fn run_before_schema_validation(&self, raw: &[u8]) {
        Self::run_raw(&self.before_schema_validation, raw).await;
    }

    pub(crate) async fn run_before_parse_xml(&self, raw: &[u8]) {
        Self::run_raw(&self.before_parse_xml, raw).await;
    }

    pub(crate) async fn run_after_parse_xml(&self, message: &OadrMessage) {
        let listeners = self.after_parse_xml.lock().unwrap().clone();
        for listener in listeners {
            listener.on_message(message).await;
        }
    }

    async fn run_raw(point: &Mutex<Vec<Arc<dyn RawListener>>>, raw: &[u8]) {
        // Snapshot under the lock; listeners run without holding it.
        let listeners = point.lock().unwrap().clone();
        if listeners.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(raw);
        for listener in listeners {
            listener.on_xml(&text).await;
        }
    }
}
