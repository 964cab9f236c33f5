//! LOGIN authentication with downgrade protection.
//!
//! lettre's built-in mechanisms will happily send credentials over any
//! connection. `LoginAuth` refuses unless the channel is already encrypted or
//! the server explicitly advertised `AUTH LOGIN`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use lettre::transport::smtp::authentication::Mechanism;
use lettre::transport::smtp::client::SmtpConnection;
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;

const USERNAME_CHALLENGE: &[u8] = b"Username:";
const PASSWORD_CHALLENGE: &[u8] = b"Password:";

/// What the client knows about the server when authentication starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerState {
    pub encrypted: bool,
    pub login_advertised: bool,
}

impl ServerState {
    fn of(conn: &SmtpConnection) -> Self {
        Self {
            encrypted: conn.is_encrypted(),
            login_advertised: conn.server_info().supports_auth_mechanism(Mechanism::Login),
        }
    }
}

/// Credentials for the LOGIN exchange.
pub struct LoginAuth {
    username: String,
    password: SecretString,
}

impl LoginAuth {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Precondition check. Fails with [`AuthError::Unencrypted`] on a plain
    /// connection that did not advertise LOGIN.
    pub fn start(&self, server: &ServerState) -> Result<LoginExchange<'_>, AuthError> {
        if !server.encrypted && !server.login_advertised {
            return Err(AuthError::Unencrypted);
        }
        Ok(LoginExchange {
            auth: self,
            step: LoginStep::Username,
        })
    }
}

impl fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStep {
    Username,
    Password,
    Done,
}

/// A started LOGIN exchange: answers `Username:` then `Password:`.
#[derive(Debug)]
pub struct LoginExchange<'a> {
    auth: &'a LoginAuth,
    step: LoginStep,
}

impl LoginExchange<'_> {
    /// Answer one decoded server challenge.
    pub fn respond(&mut self, challenge: &[u8]) -> Result<&[u8], AuthError> {
        match (self.step, challenge) {
            (LoginStep::Username, USERNAME_CHALLENGE) => {
                self.step = LoginStep::Password;
                Ok(self.auth.username.as_bytes())
            }
            (LoginStep::Password, PASSWORD_CHALLENGE) => {
                self.step = LoginStep::Done;
                Ok(self.auth.password.expose_secret().as_bytes())
            }
            _ => Err(AuthError::UnexpectedChallenge(
                String::from_utf8_lossy(challenge).into_owned(),
            )),
        }
    }

    pub fn is_done(&self) -> bool {
        self.step == LoginStep::Done
    }
}

struct AuthLogin;

impl fmt::Display for AuthLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AUTH LOGIN\r\n")
    }
}

struct ChallengeReply(String);

impl fmt::Display for ChallengeReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.0)
    }
}

/// Run the LOGIN exchange on an open connection.
pub(crate) fn authenticate(conn: &mut SmtpConnection, auth: &LoginAuth) -> Result<(), AuthError> {
    let mut exchange = auth.start(&ServerState::of(conn))?;

    let mut response = conn.command(AuthLogin)?;
    while response.has_code(334) {
        let challenge = BASE64.decode(response.first_line().unwrap_or_default().trim())?;
        let reply = BASE64.encode(exchange.respond(&challenge)?);
        response = conn.command(ChallengeReply(reply))?;
    }

    if !response.has_code(235) {
        return Err(AuthError::Rejected {
            code: response.code().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> LoginAuth {
        LoginAuth::new("bot@example.com", SecretString::from("hunter2"))
    }

    const PLAIN_UNADVERTISED: ServerState = ServerState {
        encrypted: false,
        login_advertised: false,
    };

    #[test]
    fn refuses_plain_connection_without_login() {
        let auth = auth();
        assert!(matches!(
            auth.start(&PLAIN_UNADVERTISED),
            Err(AuthError::Unencrypted)
        ));
    }

    #[test]
    fn allows_advertised_login_on_plain_connection() {
        let auth = auth();
        let state = ServerState {
            encrypted: false,
            login_advertised: true,
        };
        assert!(auth.start(&state).is_ok());
    }

    #[test]
    fn allows_encrypted_connection_without_advertisement() {
        let auth = auth();
        let state = ServerState {
            encrypted: true,
            login_advertised: false,
        };
        assert!(auth.start(&state).is_ok());
    }

    #[test]
    fn answers_username_then_password() {
        let auth = auth();
        let state = ServerState {
            encrypted: true,
            login_advertised: true,
        };
        let mut exchange = auth.start(&state).unwrap();
        assert_eq!(exchange.respond(b"Username:").unwrap(), b"bot@example.com");
        assert!(!exchange.is_done());
        assert_eq!(exchange.respond(b"Password:").unwrap(), b"hunter2");
        assert!(exchange.is_done());
    }

    #[test]
    fn rejects_unexpected_challenge() {
        let auth = auth();
        let state = ServerState {
            encrypted: true,
            login_advertised: true,
        };
        let mut exchange = auth.start(&state).unwrap();
        match exchange.respond(b"Token:") {
            Err(AuthError::UnexpectedChallenge(c)) => assert_eq!(c, "Token:"),
            other => panic!("expected unexpected-challenge error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_order_challenge() {
        let auth = auth();
        let state = ServerState {
            encrypted: true,
            login_advertised: true,
        };
        let mut exchange = auth.start(&state).unwrap();
        assert!(exchange.respond(b"Password:").is_err());
    }

    #[test]
    fn debug_hides_password() {
        assert!(!format!("{:?}", auth()).contains("hunter2"));
    }
}
