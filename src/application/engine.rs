use crate::application::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::application::generator::PaymentGenerator;
use crate::application::selector::ReminderSelector;
use crate::application::tracker::{MonthlyPayments, PaymentSummary, PaymentTracker};
use crate::config::AppConfig;
use crate::domain::directory::PaymentId;
use crate::domain::notification::ActionToken;
use crate::domain::payment::{BillingMonth, Payment};
use crate::domain::ports::{DirectoryStoreRef, PaymentStoreRef, TransportRef};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// The main entry point for administrative operations.
///
/// `FeeEngine` owns the storage backends and the transport, and wires the
/// generator, selector, dispatcher and tracker together. Each call runs one
/// batch to completion.
pub struct FeeEngine {
    directory: DirectoryStoreRef,
    payments: PaymentStoreRef,
    generator: PaymentGenerator,
    selector: ReminderSelector,
    dispatcher: NotificationDispatcher,
    tracker: PaymentTracker,
}

impl FeeEngine {
    /// Creates a new `FeeEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `directory` - The store for schools, grades and parents.
    /// * `payments` - The store for payment history.
    /// * `transport` - Where reminders are sent.
    /// * `config` - Billing, reminder window and dispatch settings.
    pub fn new(
        directory: DirectoryStoreRef,
        payments: PaymentStoreRef,
        transport: TransportRef,
        config: AppConfig,
    ) -> Self {
        Self {
            generator: PaymentGenerator::new(directory.clone(), payments.clone(), config.billing),
            selector: ReminderSelector::new(directory.clone(), payments.clone(), config.reminders),
            dispatcher: NotificationDispatcher::new(directory.clone(), transport, config.dispatch),
            tracker: PaymentTracker::new(directory.clone(), payments.clone()),
            directory,
            payments,
        }
    }

    pub fn directory(&self) -> &DirectoryStoreRef {
        &self.directory
    }

    pub async fn generate_monthly_payments(&self, month: &BillingMonth) -> Result<usize> {
        self.generator.generate_monthly_payments(month).await
    }

    pub async fn select_payments_due_for_reminder(&self, today: NaiveDate) -> Result<Vec<Payment>> {
        self.selector.select_payments_due_for_reminder(today).await
    }

    /// Selects the payments inside the reminder window and reminds their parents.
    pub async fn send_reminders(&self, today: NaiveDate) -> Result<DispatchReport> {
        let due = self.selector.select_payments_due_for_reminder(today).await?;
        Ok(self.dispatcher.dispatch(&due).await)
    }

    pub async fn dispatch(&self, payments: &[Payment]) -> DispatchReport {
        self.dispatcher.dispatch(payments).await
    }

    /// Reminds every parent with a chat address, regardless of the window.
    pub async fn dispatch_to_all_recipients(&self) -> Result<DispatchReport> {
        let parents = self.directory.find_parents_with_chat_address().await?;
        let unpaid = self.payments.find_unpaid_payments(None).await?;
        Ok(self
            .dispatcher
            .dispatch_to_all_recipients(&parents, &unpaid)
            .await)
    }

    pub async fn mark_paid(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Payment> {
        self.tracker.mark_paid(id, at).await
    }

    pub async fn mark_receipt_sent(&self, id: PaymentId) -> Result<Payment> {
        self.tracker.mark_receipt_sent(id).await
    }

    pub async fn confirm(&self, token: &ActionToken, at: DateTime<Utc>) -> Result<Payment> {
        self.tracker.confirm(token, at).await
    }

    pub async fn list_paid(&self) -> Result<Vec<MonthlyPayments>> {
        self.tracker.list_paid().await
    }

    pub async fn list_unpaid(&self, month: Option<BillingMonth>) -> Result<Vec<Payment>> {
        self.tracker.list_unpaid(month).await
    }

    pub async fn summary(&self, month: BillingMonth) -> Result<PaymentSummary> {
        self.tracker.summary(month).await
    }
}
