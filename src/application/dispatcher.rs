use crate::config::DispatchConfig;
use crate::domain::directory::{ChatAddress, Parent, ParentId, PaymentId};
use crate::domain::notification::ReminderMessage;
use crate::domain::payment::Payment;
use crate::domain::ports::{DirectoryStoreRef, TransportRef};
use crate::error::DeliveryError;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// A reminder that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub payment_id: PaymentId,
    pub parent_id: ParentId,
    pub recipient: Option<ChatAddress>,
    pub error: DeliveryError,
}

/// Result of one reminder batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Reminders the dispatcher tried to deliver.
    pub attempted: usize,
    pub delivered: usize,
    /// Parents left out because they had nothing to pay.
    pub skipped: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchReport {
    fn record(mut self, outcome: std::result::Result<(), DeliveryFailure>) -> Self {
        self.attempted += 1;
        match outcome {
            Ok(()) => self.delivered += 1,
            Err(failure) => self.failures.push(failure),
        }
        self
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Sends payment reminders, one independent delivery per recipient.
///
/// A failed, unresolvable or timed-out send is logged and recorded in the
/// report; it never stops the rest of the batch and never surfaces as an
/// error to the caller.
pub struct NotificationDispatcher {
    directory: DirectoryStoreRef,
    transport: TransportRef,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(directory: DirectoryStoreRef, transport: TransportRef, config: DispatchConfig) -> Self {
        Self {
            directory,
            transport,
            config,
        }
    }

    /// Reminds the parent of each payment.
    pub async fn dispatch(&self, payments: &[Payment]) -> DispatchReport {
        let report = self
            .run(payments.iter().map(|payment| (payment, None)), 0)
            .await;
        info!(
            delivered = report.delivered,
            failed = report.failed(),
            "Reminders dispatched"
        );
        report
    }

    /// Reminds every reachable parent of one outstanding payment, ignoring
    /// the reminder window.
    ///
    /// When a parent owes several payments the one with the earliest due
    /// date (then lowest id) is used. Parents owing nothing are skipped.
    pub async fn dispatch_to_all_recipients(
        &self,
        parents: &[Parent],
        unpaid: &[Payment],
    ) -> DispatchReport {
        let mut targets = Vec::new();
        let mut skipped = 0;
        for parent in parents.iter().filter(|p| p.chat_address.is_some()) {
            let oldest = unpaid
                .iter()
                .filter(|p| p.parent_id() == parent.id && !p.is_paid())
                .min_by_key(|p| (p.due_date(), p.id()));
            match oldest {
                Some(payment) => targets.push((payment, Some(parent))),
                None => skipped += 1,
            }
        }

        let report = self.run(targets.into_iter(), skipped).await;
        info!(
            delivered = report.delivered,
            failed = report.failed(),
            skipped = report.skipped,
            "Reminders force-dispatched to all recipients"
        );
        report
    }

    async fn run<'a>(
        &self,
        targets: impl Iterator<Item = (&'a Payment, Option<&'a Parent>)>,
        skipped: usize,
    ) -> DispatchReport {
        let initial = DispatchReport {
            skipped,
            ..DispatchReport::default()
        };
        stream::iter(targets)
            .map(|(payment, parent)| self.deliver(payment, parent))
            .buffer_unordered(self.config.concurrency.max(1))
            .fold(initial, |report, outcome| async move { report.record(outcome) })
            .await
    }

    async fn deliver(
        &self,
        payment: &Payment,
        parent: Option<&Parent>,
    ) -> std::result::Result<(), DeliveryFailure> {
        let fail = |recipient: Option<ChatAddress>, error: DeliveryError| {
            warn!(
                payment_id = %payment.id(),
                parent_id = %payment.parent_id(),
                recipient = recipient.as_ref().map(ChatAddress::as_str).unwrap_or("-"),
                error = %error,
                "Reminder not delivered"
            );
            DeliveryFailure {
                payment_id: payment.id(),
                parent_id: payment.parent_id(),
                recipient,
                error,
            }
        };

        let message = match self.compose(payment, parent).await {
            Ok(message) => message,
            Err(error) => return Err(fail(None, error)),
        };

        let timeout = self.config.send_timeout();
        let sent = tokio::time::timeout(
            timeout,
            self.transport
                .send_message(&message.recipient, &message.text, &message.action),
        )
        .await
        .unwrap_or(Err(DeliveryError::Timeout(self.config.send_timeout_ms)));

        match sent {
            Ok(()) => {
                info!(payment_id = %payment.id(), recipient = %message.recipient, "Reminder delivered");
                Ok(())
            }
            Err(error) => Err(fail(Some(message.recipient), error)),
        }
    }

    async fn compose(
        &self,
        payment: &Payment,
        parent: Option<&Parent>,
    ) -> std::result::Result<ReminderMessage, DeliveryError> {
        let unresolvable = |e: crate::error::PaymentError| DeliveryError::Unresolvable(e.to_string());

        let parent = match parent {
            Some(parent) => parent.clone(),
            None => self
                .directory
                .find_parent(payment.parent_id())
                .await
                .map_err(unresolvable)?
                .ok_or_else(|| {
                    DeliveryError::Unresolvable(format!("parent {} not found", payment.parent_id()))
                })?,
        };
        let recipient = parent
            .chat_address
            .clone()
            .ok_or(DeliveryError::NoChatAddress(parent.id.0))?;

        let grade_id = parent.grade_id.ok_or_else(|| {
            DeliveryError::Unresolvable(format!("parent {} has no grade", parent.id))
        })?;
        let grade = self
            .directory
            .find_grade(grade_id)
            .await
            .map_err(unresolvable)?
            .ok_or_else(|| DeliveryError::Unresolvable(format!("grade {} not found", grade_id)))?;
        let school = self
            .directory
            .find_school(grade.school_id)
            .await
            .map_err(unresolvable)?
            .ok_or_else(|| {
                DeliveryError::Unresolvable(format!("school {} not found", grade.school_id))
            })?;

        Ok(ReminderMessage::compose(recipient, &parent, &grade, &school, payment))
    }
}
