//! SMTP delivery in plain and secure mode.

use std::fmt;
use std::time::Duration;

use lettre::Address;
use lettre::transport::smtp;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters, TlsVersion};
use lettre::transport::smtp::commands::{Data, Ehlo, Mail, Rcpt};
use lettre::transport::smtp::extension::{ClientId, Extension};
use secrecy::ExposeSecret;

use super::auth::{LoginAuth, authenticate};
use super::{Outgoing, Transport};
use crate::config::TransportConfig;
use crate::error::{AuthError, SmtpStep, TransportError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends through a fresh SMTP connection per message.
///
/// Plain mode connects in the clear, upgrades with STARTTLS when offered and
/// authenticates with [`LoginAuth`]. Secure mode wraps the socket in TLS 1.2+
/// first and authenticates with AUTH PLAIN.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    timeout: Option<Duration>,
    hello_name: ClientId,
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            hello_name: ClientId::Domain("localhost".to_string()),
        }
    }
}

impl SmtpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect and I/O timeout; `None` waits indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name sent with EHLO.
    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = ClientId::Domain(name.into());
        self
    }

    fn tls_parameters(config: &TransportConfig) -> Result<TlsParameters, TransportError> {
        TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.skip_certificate_verification)
            .set_min_tls_version(TlsVersion::Tlsv12)
            .build_rustls()
            .map_err(TransportError::Tls)
    }

    fn connect(
        &self,
        config: &TransportConfig,
        tls: Option<&TlsParameters>,
    ) -> Result<SmtpConnection, TransportError> {
        let port = u16::try_from(config.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(TransportError::InvalidPort(config.port))?;

        SmtpConnection::connect(
            (config.host.as_str(), port),
            self.timeout,
            &self.hello_name,
            tls,
            None,
        )
        .map_err(|source| TransportError::Connect {
            addr: format!("{}:{}", config.host, port),
            source,
        })
    }

    fn open_plain(&self, config: &TransportConfig) -> Result<SmtpConnection, TransportError> {
        let mut conn = self.connect(config, None)?;
        if let Err(e) = self.prepare_plain(&mut conn, config) {
            conn.abort();
            return Err(e);
        }
        Ok(conn)
    }

    fn prepare_plain(
        &self,
        conn: &mut SmtpConnection,
        config: &TransportConfig,
    ) -> Result<(), TransportError> {
        if conn.server_info().supports_feature(Extension::StartTls) {
            let tls = Self::tls_parameters(config)?;
            conn.starttls(&tls, &self.hello_name)
                .map_err(TransportError::StartTls)?;
        }

        if !self.advertises_auth(conn)? {
            return Err(AuthError::NotSupported.into());
        }

        let auth = LoginAuth::new(config.username.clone(), config.password.clone());
        authenticate(conn, &auth)?;
        Ok(())
    }

    fn open_secure(&self, config: &TransportConfig) -> Result<SmtpConnection, TransportError> {
        let tls = Self::tls_parameters(config)?;
        let mut conn = self.connect(config, Some(&tls))?;

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        if let Err(e) = conn.auth(&[Mechanism::Plain], &credentials) {
            conn.abort();
            return Err(AuthError::Smtp(e).into());
        }
        Ok(conn)
    }

    /// Whether the server offers the AUTH extension at all.
    ///
    /// lettre only records the mechanisms it implements, so a server that
    /// lists e.g. only `AUTH CRAM-MD5` looks the same as one without AUTH.
    /// In that case the EHLO is repeated and its keywords read directly.
    fn advertises_auth(&self, conn: &mut SmtpConnection) -> Result<bool, TransportError> {
        let info = conn.server_info();
        if [Mechanism::Plain, Mechanism::Login, Mechanism::Xoauth2]
            .into_iter()
            .any(|m| info.supports_auth_mechanism(m))
        {
            return Ok(true);
        }

        let response = conn
            .command(Ehlo::new(self.hello_name.clone()))
            .map_err(AuthError::Smtp)?;
        Ok(response.message().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("AUTH"))
        }))
    }
}

impl Transport for SmtpTransport {
    fn deliver(&self, config: &TransportConfig, outgoing: &Outgoing) -> Result<(), TransportError> {
        let sender = sender_of(&outgoing.sender)?;
        let recipient = parse_address("recipient", &outgoing.recipient)?;

        let mut conn = if config.use_secure_channel {
            self.open_secure(config)?
        } else {
            self.open_plain(config)?
        };

        let result = transmit(&mut conn, sender, recipient, &outgoing.message);
        if result.is_err() {
            conn.abort();
        }
        result
    }
}

fn transmit(
    conn: &mut SmtpConnection,
    sender: Sender<'_>,
    recipient: Address,
    message: &[u8],
) -> Result<(), TransportError> {
    let mail_from = match sender {
        Sender::Address(address) => conn.command(Mail::new(Some(address), vec![])),
        Sender::Login(name) => conn.command(MailFromLogin(name)),
    };
    mail_from.map_err(failed(SmtpStep::SetSender))?;
    conn.command(Rcpt::new(recipient, vec![]))
        .map_err(failed(SmtpStep::SetRecipient))?;
    conn.command(Data).map_err(failed(SmtpStep::OpenData))?;
    conn.message(message).map_err(failed(SmtpStep::WriteMessage))?;
    conn.quit().map_err(failed(SmtpStep::Close))?;
    Ok(())
}

fn failed(step: SmtpStep) -> impl FnOnce(smtp::Error) -> TransportError {
    move |source| TransportError::Command { step, source }
}

/// Envelope sender. Login names that are not addresses go out verbatim.
enum Sender<'a> {
    Address(Address),
    Login(&'a str),
}

/// `MAIL FROM` for a bare login name, which lettre's `Mail` cannot carry.
struct MailFromLogin<'a>(&'a str);

impl fmt::Display for MailFromLogin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MAIL FROM:<{}>\r\n", self.0)
    }
}

fn sender_of(username: &str) -> Result<Sender<'_>, TransportError> {
    match parse_address("sender", username) {
        Ok(address) => Ok(Sender::Address(address)),
        Err(_) if is_login_name(username) => Ok(Sender::Login(username)),
        Err(e) => Err(e),
    }
}

/// Safe to place between angle brackets on a command line.
fn is_login_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '<' | '>'))
}

fn parse_address(role: &'static str, address: &str) -> Result<Address, TransportError> {
    address
        .parse::<Address>()
        .map_err(|source| TransportError::Address {
            role,
            address: address.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_port_before_connecting() {
        let transport = SmtpTransport::new();
        let config = TransportConfig::new("127.0.0.1", 70000, "bot@example.com", "pw");
        assert!(matches!(
            transport.connect(&config, None),
            Err(TransportError::InvalidPort(70000))
        ));

        let config = TransportConfig::new("127.0.0.1", 0, "bot@example.com", "pw");
        assert!(matches!(
            transport.connect(&config, None),
            Err(TransportError::InvalidPort(0))
        ));
    }

    #[test]
    fn invalid_recipient_fails_without_network() {
        let transport = SmtpTransport::new();
        let config = TransportConfig::new("192.0.2.1", 25, "bot@example.com", "pw");
        let outgoing = Outgoing {
            sender: "bot@example.com".into(),
            recipient: "invalid-email".into(),
            message: b"x".to_vec(),
        };
        match transport.deliver(&config, &outgoing) {
            Err(TransportError::Address { role, address, .. }) => {
                assert_eq!(role, "recipient");
                assert_eq!(address, "invalid-email");
            }
            other => panic!("expected address error, got {other:?}"),
        }
    }

    #[test]
    fn login_name_sender_is_sent_verbatim() {
        assert!(matches!(sender_of("bot@example.com"), Ok(Sender::Address(_))));
        assert!(matches!(sender_of("ops"), Ok(Sender::Login("ops"))));
        assert_eq!(MailFromLogin("ops").to_string(), "MAIL FROM:<ops>\r\n");
    }

    #[test]
    fn sender_that_would_break_the_command_line_is_rejected() {
        for username in ["ops\r\nRSET", "two words", "<ops>", ""] {
            match sender_of(username) {
                Err(TransportError::Address { role, address, .. }) => {
                    assert_eq!(role, "sender");
                    assert_eq!(address, username);
                }
                Ok(_) => panic!("{username:?} accepted"),
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
    }
}
