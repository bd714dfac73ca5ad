//! Pairing artifact rendering.
//!
//! When the messaging network issues a pairing challenge, the raw payload
//! has to be turned into something a frontend can show to the user for
//! scanning. The encoding itself is a deployment concern, so it sits behind
//! the [`PairingRenderer`] trait; the default implementation wraps the
//! payload in a base64 `data:` URL and leaves the visual encoding to the
//! consumer.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Errors from pairing artifact rendering.
///
/// A render failure never changes session state; the previous artifact (if
/// any) stays visible.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("failed to encode pairing payload: {0}")]
    Encode(String),
}

/// Turns a raw pairing challenge payload into a displayable artifact.
pub trait PairingRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<String, PairingError>;
}

/// Renderer producing a `data:` URL with the base64-encoded payload.
pub struct DataUrlRenderer;

impl PairingRenderer for DataUrlRenderer {
    fn render(&self, payload: &str) -> Result<String, PairingError> {
        if payload.is_empty() {
            return Err(PairingError::Encode("empty pairing payload".to_string()));
        }
        Ok(format!("data:text/plain;base64,{}", STANDARD.encode(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_data_url() {
        let artifact = DataUrlRenderer.render("XYZ").unwrap();
        assert_eq!(artifact, "data:text/plain;base64,WFla");
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(DataUrlRenderer.render("").is_err());
    }
}
