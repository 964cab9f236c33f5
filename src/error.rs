//! Error types for mail dispatch.

use std::fmt;

use lettre::address::AddressError;
use lettre::transport::smtp;

/// Single transport configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Empty host")]
    EmptyHost,

    #[error("Invalid port {0}")]
    InvalidPort(u32),

    #[error("Empty username")]
    EmptyUsername,

    #[error("Empty password")]
    EmptyPassword,
}

/// Findings that make a configuration mapping weak.
///
/// These are never returned to the caller of [`crate::ConfigResolver::new`];
/// they are logged as warnings and the resolver is built anyway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Empty configuration mapping")]
    EmptyMapping,

    #[error("Invalid configuration for domain {domain}: {source}")]
    InvalidEntry {
        domain: String,
        #[source]
        source: FieldError,
    },

    #[error("Invalid default configuration: {0}")]
    InvalidDefault(#[source] FieldError),
}

/// Steps of the SMTP exchange after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStep {
    SetSender,
    SetRecipient,
    OpenData,
    WriteMessage,
    Close,
}

impl fmt::Display for SmtpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::SetSender => "set sender",
            Self::SetRecipient => "set recipient",
            Self::OpenData => "open data writer",
            Self::WriteMessage => "write message",
            Self::Close => "close connection",
        };
        f.write_str(step)
    }
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Refusing to send credentials over an unencrypted connection")]
    Unencrypted,

    #[error("Server doesn't support AUTH")]
    NotSupported,

    #[error("Unexpected server challenge: {0}")]
    UnexpectedChallenge(String),

    #[error("Malformed server challenge: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Server rejected credentials with code {code}")]
    Rejected { code: String },

    #[error(transparent)]
    Smtp(#[from] smtp::Error),
}

/// Errors raised while delivering one message over one connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid port {0}")]
    InvalidPort(u32),

    #[error("Invalid {role} address {address:?}: {source}")]
    Address {
        role: &'static str,
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("Failed to configure TLS: {0}")]
    Tls(#[source] smtp::Error),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: smtp::Error,
    },

    #[error("STARTTLS upgrade failed: {0}")]
    StartTls(#[source] smtp::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to {step}: {source}")]
    Command {
        step: SmtpStep,
        #[source]
        source: smtp::Error,
    },
}

/// Errors reported by [`crate::Dispatcher::send`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No recipients")]
    NoRecipients,

    #[error("No transport configuration for {recipient}")]
    Unresolved { recipient: String },

    #[error("Failed to send to {recipient}: {source}")]
    Transmission {
        recipient: String,
        #[source]
        source: TransportError,
    },

    #[error("Send task for {recipient} failed: {reason}")]
    TaskFailed { recipient: String, reason: String },
}

impl DispatchError {
    /// The recipient address this error is attributable to, if any.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::NoRecipients => None,
            Self::Unresolved { recipient }
            | Self::Transmission { recipient, .. }
            | Self::TaskFailed { recipient, .. } => Some(recipient),
        }
    }
}
