//! Driver Protocol types for communication between chatbridge and automation
//! drivers.
//!
//! An automation driver is the process that actually speaks to the messaging
//! network (typically by steering a headless browser). chatbridge runs one
//! driver per tenant and talks to it over newline-delimited JSON on stdio:
//!
//! - **Commands** (chatbridge → driver): instructions such as "send this
//!   message to this chat".
//! - **Events** (driver → chatbridge): lifecycle notifications (pairing
//!   challenge issued, session ready, disconnected) and command completions.
//!
//! Use this crate to build custom drivers in Rust.
//!
//! # Example: Minimal Driver
//!
//! ```ignore
//! use chatbridge_driver_protocol::{DriverCommand, DriverEvent};
//!
//! // Read commands from stdin
//! let line = read_line_from_stdin();
//! let command: DriverCommand = serde_json::from_str(&line)?;
//!
//! // Send events to stdout
//! let event = DriverEvent::Ready;
//! println!("{}", serde_json::to_string(&event)?);
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (chatbridge → driver)
// ============================================================================

/// Commands sent from chatbridge to an automation driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverCommand {
    /// Begin connecting to the messaging network.
    ///
    /// The driver answers with lifecycle events (`pairing_challenge`,
    /// `ready`, ...) rather than a command completion.
    Initialize,

    /// Send a text message to a destination chat or group.
    SendMessage {
        request_id: String,
        destination: String,
        body: String,
    },

    /// Join a group using an invite code.
    ///
    /// Completed with `CommandOk { group_id: Some(..) }` carrying the
    /// identifier of the joined group.
    AcceptInvite { request_id: String, code: String },

    /// Request graceful shutdown.
    Shutdown,
}

// ============================================================================
// Events (driver → chatbridge)
// ============================================================================

/// Events sent from an automation driver to chatbridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    /// The network issued a pairing challenge. `payload` is the raw
    /// challenge text to be rendered as a scannable artifact.
    ///
    /// May be re-emitted at any time, including after `ready`, when the
    /// network requires the device to pair again.
    PairingChallenge { payload: String },

    /// The session is paired and able to dispatch messages.
    Ready,

    /// The network dropped the connection. `reason` is an opaque,
    /// driver-defined string kept for diagnostics.
    Disconnected { reason: String },

    /// Authentication was rejected. Terminal for the session.
    AuthFailure,

    /// A command completed successfully. `group_id` is set for
    /// `accept_invite` completions.
    CommandOk {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },

    /// A command failed.
    CommandError {
        request_id: String,
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_snake_case_tags() {
        let json = serde_json::to_string(&DriverCommand::SendMessage {
            request_id: "req_1".to_string(),
            destination: "group-1".to_string(),
            body: "hello".to_string(),
        })
        .unwrap();

        assert!(json.contains(r#""type":"send_message""#));
        assert!(json.contains(r#""destination":"group-1""#));
    }

    #[test]
    fn lifecycle_events_parse() {
        let event: DriverEvent =
            serde_json::from_str(r#"{"type":"pairing_challenge","payload":"XYZ"}"#).unwrap();
        assert!(matches!(event, DriverEvent::PairingChallenge { payload } if payload == "XYZ"));

        let event: DriverEvent =
            serde_json::from_str(r#"{"type":"disconnected","reason":"timeout"}"#).unwrap();
        assert!(matches!(event, DriverEvent::Disconnected { reason } if reason == "timeout"));
    }

    #[test]
    fn command_ok_omits_missing_group_id() {
        let json = serde_json::to_string(&DriverEvent::CommandOk {
            request_id: "req_2".to_string(),
            group_id: None,
        })
        .unwrap();

        assert!(!json.contains("group_id"));

        let event: DriverEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(event, DriverEvent::CommandOk { group_id: None, .. }));
    }
}
