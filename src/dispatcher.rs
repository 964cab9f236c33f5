//! Concurrent per-recipient dispatch.
//!
//! Every recipient gets its own unit of work: resolve a configuration, build
//! the envelope, deliver over a fresh connection. Units run on the blocking
//! thread pool, fail independently, and are all joined before `send` returns.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};

use crate::config::DispatchOptions;
use crate::error::DispatchError;
use crate::message::{ContentKind, Recipient, build_message};
use crate::resolver::ConfigResolver;
use crate::transport::{Outgoing, SmtpTransport, Transport};

/// Message parts shared by every unit of one dispatch.
#[derive(Debug)]
struct Letter {
    from_display_name: String,
    subject: String,
    body: String,
    kind: ContentKind,
}

/// Terminal state of one recipient's unit.
#[derive(Debug)]
enum Outcome {
    Skipped,
    Sent,
    Failed(DispatchError),
}

/// Fans a message out to many recipients concurrently.
pub struct Dispatcher {
    resolver: Arc<ConfigResolver>,
    transport: Arc<dyn Transport>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Dispatcher over real SMTP connections.
    pub fn new(resolver: ConfigResolver) -> Self {
        Self::with_transport(resolver, Arc::new(SmtpTransport::new()))
    }

    pub fn with_transport(resolver: ConfigResolver, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            transport,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Send a plain-text message. See [`Dispatcher::dispatch`].
    pub async fn send(
        &self,
        from_display_name: &str,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
    ) -> Vec<DispatchError> {
        self.dispatch(from_display_name, recipients, subject, body, ContentKind::Plain)
            .await
    }

    /// Send an HTML message. See [`Dispatcher::dispatch`].
    pub async fn send_html(
        &self,
        from_display_name: &str,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
    ) -> Vec<DispatchError> {
        self.dispatch(from_display_name, recipients, subject, body, ContentKind::Html)
            .await
    }

    /// Deliver to every recipient and collect the failures.
    ///
    /// An empty recipient list returns `[NoRecipients]` without touching the
    /// network. Otherwise one unit per recipient is spawned and this resolves
    /// once all of them have finished; the returned errors are in completion
    /// order. Recipients with no matching configuration are dropped silently
    /// unless [`DispatchOptions::report_unresolved`] is set.
    pub async fn dispatch(
        &self,
        from_display_name: &str,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
        kind: ContentKind,
    ) -> Vec<DispatchError> {
        if recipients.is_empty() {
            return vec![DispatchError::NoRecipients];
        }

        let letter = Arc::new(Letter {
            from_display_name: from_display_name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            kind,
        });
        let limiter = self
            .options
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let report_unresolved = self.options.report_unresolved;

        let mut units = JoinSet::new();
        let mut pending = HashMap::with_capacity(recipients.len());
        for recipient in recipients.iter().cloned() {
            let resolver = Arc::clone(&self.resolver);
            let transport = Arc::clone(&self.transport);
            let letter = Arc::clone(&letter);
            let limiter = limiter.clone();

            let tracked = recipient.address.clone();
            let handle = units.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let address = recipient.address.clone();
                let unit = tokio::task::spawn_blocking(move || {
                    deliver_one(
                        &resolver,
                        transport.as_ref(),
                        &letter,
                        &recipient,
                        report_unresolved,
                    )
                });
                match unit.await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::Failed(DispatchError::TaskFailed {
                        recipient: address,
                        reason: e.to_string(),
                    }),
                }
            });
            pending.insert(handle.id(), tracked);
        }

        let mut errors = Vec::new();
        let (mut sent, mut skipped) = (0usize, 0usize);
        while let Some(joined) = units.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcome
                }
                Err(e) => aborted_unit(&mut pending, e),
            };
            match outcome {
                Outcome::Sent => sent += 1,
                Outcome::Skipped => skipped += 1,
                Outcome::Failed(e) => errors.push(e),
            }
        }

        tracing::debug!(
            "Dispatch finished: {sent} sent, {skipped} skipped, {} failed",
            errors.len()
        );
        errors
    }
}

/// Attribute a unit that ended without producing an outcome to its recipient.
fn aborted_unit(pending: &mut HashMap<Id, String>, error: JoinError) -> Outcome {
    match pending.remove(&error.id()) {
        Some(recipient) => {
            tracing::error!("Dispatch unit for {recipient} aborted: {error}");
            Outcome::Failed(DispatchError::TaskFailed {
                recipient,
                reason: error.to_string(),
            })
        }
        None => {
            tracing::error!("Dispatch unit aborted: {error}");
            Outcome::Skipped
        }
    }
}

/// One recipient, start to finish. Runs on a blocking thread.
fn deliver_one(
    resolver: &ConfigResolver,
    transport: &dyn Transport,
    letter: &Letter,
    recipient: &Recipient,
    report_unresolved: bool,
) -> Outcome {
    let Some(config) = resolver.resolve(&recipient.address) else {
        tracing::debug!("No mail configuration for {}, skipping", recipient.address);
        return if report_unresolved {
            Outcome::Failed(DispatchError::Unresolved {
                recipient: recipient.address.clone(),
            })
        } else {
            Outcome::Skipped
        };
    };

    let from = Recipient::new(letter.from_display_name.clone(), config.username.clone());
    let outgoing = Outgoing {
        sender: config.username.clone(),
        recipient: recipient.address.clone(),
        message: build_message(&from, recipient, &letter.subject, letter.kind, &letter.body),
    };

    match transport.deliver(&config, &outgoing) {
        Ok(()) => {
            tracing::info!("Email sent to {}", recipient.address);
            Outcome::Sent
        }
        Err(source) => {
            tracing::warn!("Email to {} failed: {source}", recipient.address);
            Outcome::Failed(DispatchError::Transmission {
                recipient: recipient.address.clone(),
                source,
            })
        }
    }
}
