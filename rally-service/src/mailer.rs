// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The outbound email sink.
//!
//! Delivery itself is an external collaborator; the backend only needs "send this templated
//! message to that address". The default sink writes to the log, which is what development
//! and the test suites use.

use std::sync::Arc;

/// Error delivering an email.
#[derive(Debug, thiserror::Error)]
#[error("sending email failed: {0}")]
pub struct MailError(pub String);

/// An outbound message, already rendered.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Rendered body.
    pub body: String,
}

/// The delivery sink.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers one message.
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// A shared mailer handle.
pub type DynMailer = Arc<dyn Mailer>;

/// Sink that writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    /// Creates a log sink with the given sender address.
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        log::info!(
            "email from `{}` to `{}`: {} -- {}",
            self.from,
            email.to,
            email.subject,
            email.body
        );
        Ok(())
    }
}

/// Mailer used by the test suites; collects messages instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: parking_lot::Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages recorded so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().push(email);
        Ok(())
    }
}
