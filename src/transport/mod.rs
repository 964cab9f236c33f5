//! Transports that carry one built message to one recipient.
//!
//! The dispatcher only sees the [`Transport`] trait; [`SmtpTransport`] is the
//! real implementation on top of lettre's low-level SMTP client.

pub mod auth;
mod smtp;

pub use auth::{LoginAuth, LoginExchange, ServerState};
pub use smtp::SmtpTransport;

use crate::config::TransportConfig;
use crate::error::TransportError;

/// A fully built message addressed to a single recipient.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Envelope sender, the resolved configuration's username.
    pub sender: String,
    /// Envelope recipient address.
    pub recipient: String,
    /// Header block, blank line and body.
    pub message: Vec<u8>,
}

/// Delivers one message over one connection, blocking the calling thread.
///
/// Implementations open and close their own connection per call; nothing is
/// pooled or reused.
pub trait Transport: Send + Sync {
    fn deliver(&self, config: &TransportConfig, outgoing: &Outgoing) -> Result<(), TransportError>;
}
