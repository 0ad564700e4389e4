use jiff::Timestamp;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    events::{Job, JobQueue, MailMessage},
    models::{
        UserId,
        notification::{Notification, NotificationKind},
        store::Store,
    },
};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Recipient #{0} does not exist")]
    UnknownRecipient(UserId),

    #[error("Failed to send email to '{to}': {reason}")]
    MailFailed { to: String, reason: String },
}

/// Persists the in-app notification for one recipient.
pub trait NotificationSink {
    fn deliver(
        &mut self,
        recipient_id: UserId,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Uuid, DeliveryError>;
}

pub trait Mailer {
    fn send(&self, message: &MailMessage) -> Result<(), DeliveryError>;
}

/// Writes notification rows straight into the store.
pub struct StoreSink<'a> {
    store: &'a mut Store,
}

impl<'a> StoreSink<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }
}

impl NotificationSink for StoreSink<'_> {
    fn deliver(
        &mut self,
        recipient_id: UserId,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Uuid, DeliveryError> {
        if self.store.get_user(recipient_id).is_none() {
            return Err(DeliveryError::UnknownRecipient(recipient_id));
        }
        let id = Uuid::new_v4();
        self.store.add_notification(Notification {
            id,
            user_id: recipient_id,
            kind,
            data,
            read_at: None,
            created_at: Timestamp::now(),
        });
        Ok(id)
    }
}

/// Mailer that only records outgoing mail in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub notifications: usize,
    pub emails: usize,
    pub failures: usize,
}

fn run(job: Job, sink: &mut dyn NotificationSink, mailer: &dyn Mailer, report: &mut DrainReport) {
    let recipient_id = job.recipient_id;
    match sink.deliver(recipient_id, job.kind, job.data) {
        Ok(id) => {
            report.notifications += 1;
            info!(%id, recipient_id, kind = %job.kind, "notification stored");
        }
        Err(e) => {
            report.failures += 1;
            error!(recipient_id, kind = %job.kind, error = %e, "notification delivery failed");
        }
    }

    if let Some(mail) = job.mail {
        match mailer.send(&mail) {
            Ok(()) => report.emails += 1,
            Err(e) => {
                report.failures += 1;
                error!(recipient_id, error = %e, "email delivery failed");
            }
        }
    }
}

/// Runs every queued job once. Failed jobs are logged and dropped.
pub fn drain(
    queue: &mut dyn JobQueue,
    sink: &mut dyn NotificationSink,
    mailer: &dyn Mailer,
) -> DrainReport {
    let mut report = DrainReport::default();
    while let Some(job) = queue.pop() {
        run(job, sink, mailer, &mut report);
    }
    report
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Mailer that keeps what it was asked to send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: RefCell<Vec<MailMessage>>,
        pub fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::MailFailed {
                    to: message.to.clone(),
                    reason: "smtp down".to_string(),
                });
            }
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }
    }
}
