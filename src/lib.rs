//! Mail dispatch: per-domain SMTP configuration and concurrent fan-out.
//!
//! Build a [`ConfigResolver`] from a domain → [`TransportConfig`] mapping, wrap
//! it in a [`Dispatcher`], then [`Dispatcher::send`] one message to many
//! recipients. Each recipient is delivered independently over its own
//! connection; the call returns the failures once every delivery finished.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod resolver;
pub mod transport;

pub use config::{ConfigMapping, DEFAULT_KEY, DispatchOptions, TransportConfig};
pub use dispatcher::Dispatcher;
pub use error::{AuthError, ConfigError, DispatchError, FieldError, SmtpStep, TransportError};
pub use message::{ContentKind, Recipient};
pub use resolver::ConfigResolver;
pub use transport::{Outgoing, SmtpTransport, Transport};
