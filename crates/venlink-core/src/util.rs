use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::VenError;

/// Generate a random identifier for request ids, report specifiers, opts.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Compute the OpenADR fingerprint of a PEM-encoded certificate.
///
/// The fingerprint is the last twenty hex digits of the SHA-256 hash of the
/// certificate's DER bytes, upper-cased and grouped in colon-separated pairs
/// (`12:34:…:EF`). This is the value a VTN operator registers to pin a VEN.
pub fn certificate_fingerprint(pem: &[u8]) -> Result<String, VenError> {
    let der = der_from_pem(pem)?;
    let digest = Sha256::digest(&der);
    let hex: String = digest.iter().map(|b| format!("{b:02X}")).collect();
    let tail = &hex[hex.len() - 20..];
    let grouped: Vec<&str> = (0..tail.len()).step_by(2).map(|i| &tail[i..i + 2]).collect();
    Ok(grouped.join(":"))
}

/// Extract the DER bytes from the first CERTIFICATE block of a PEM file.
fn der_from_pem(pem: &[u8]) -> Result<Vec<u8>, VenError> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| VenError::Validation("certificate is not valid PEM text".to_string()))?;

    let mut in_block = false;
    let mut body = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("-----BEGIN CERTIFICATE") {
            in_block = true;
            continue;
        }
        if line.starts_with("-----END CERTIFICATE") {
            break;
        }
        if in_block {
            body.push_str(line);
        }
    }
    if body.is_empty() {
        return Err(VenError::Validation(
            "no CERTIFICATE block found in PEM data".to_string(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(body.as_bytes())
        .map_err(|e| VenError::Validation(format!("invalid base64 in PEM data: {e}")))
}
