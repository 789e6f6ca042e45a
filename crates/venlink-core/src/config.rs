use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::VenError;

/// Client configuration.
///
/// The file form is JSON with the same field names; unspecified fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenConfig {
    /// The name for this VEN.
    pub ven_name: String,
    /// The URL of the VTN to connect to. A trailing slash is stripped.
    pub vtn_url: String,
    /// Emit debug-level protocol logging.
    pub debug: bool,
    /// Path to a PEM certificate used for mTLS and message signing.
    pub cert: Option<PathBuf>,
    /// Path to the PEM private key belonging to `cert`.
    pub key: Option<PathBuf>,
    /// Passphrase for the signing key, handed to the codec.
    pub passphrase: Option<String>,
    /// Pinned fingerprint of the VTN certificate. When set, every incoming
    /// message must carry a valid signature from that certificate.
    pub vtn_fingerprint: Option<String>,
    /// Print this VEN's own certificate fingerprint on startup.
    pub show_fingerprint: bool,
    /// Path to a PEM CA bundle for validating the VTN server certificate.
    pub ca_file: Option<PathBuf>,
    /// Spread the first firing of recurring jobs with a random offset.
    pub allow_jitter: bool,
    /// The VEN id; when absent the VTN assigns one at registration.
    pub ven_id: Option<String>,
    /// Ask the codec not to sign outgoing messages.
    pub disable_signature: bool,
    /// Verify the VTN hostname against its certificate.
    pub check_hostname: bool,
    /// Seconds between event status recomputations.
    pub event_status_log_period: u64,
    /// Seconds between sweeps of completed/cancelled events.
    pub events_clean_up_period: u64,
}

impl Default for VenConfig {
    fn default() -> Self {
        Self {
            ven_name: String::new(),
            vtn_url: String::new(),
            debug: false,
            cert: None,
            key: None,
            passphrase: None,
            vtn_fingerprint: None,
            show_fingerprint: true,
            ca_file: None,
            allow_jitter: true,
            ven_id: None,
            disable_signature: false,
            check_hostname: true,
            event_status_log_period: 10,
            events_clean_up_period: 300,
        }
    }
}

impl VenConfig {
    pub fn new(ven_name: impl Into<String>, vtn_url: impl Into<String>) -> Self {
        Self {
            ven_name: ven_name.into(),
            vtn_url: vtn_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, VenError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let mut config: VenConfig = serde_json::from_str(&content)?;
        config.vtn_url = config.vtn_url.trim_end_matches('/').to_string();
        if config.ven_name.is_empty() || config.vtn_url.is_empty() {
            return Err(VenError::Validation(
                "ven_name and vtn_url are required".to_string(),
            ));
        }
        Ok(config)
    }
}
