use crate::domain::directory::PaymentId;
use crate::domain::notification::ActionToken;
use crate::domain::payment::{BillingMonth, Payment};
use crate::domain::ports::{DirectoryStoreRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Paid payments of one billing month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyPayments {
    pub month: BillingMonth,
    pub payments: Vec<Payment>,
}

/// Headline numbers for the administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub schools: usize,
    pub active_parents: usize,
    pub unpaid_total: usize,
    pub paid_in_month: usize,
    pub unpaid_in_month: usize,
    pub paid_total: usize,
    pub paid_with_receipt: usize,
}

/// Moves payments through `Unpaid -> Paid -> ReceiptSent` and answers
/// reporting queries.
pub struct PaymentTracker {
    directory: DirectoryStoreRef,
    payments: PaymentStoreRef,
}

impl PaymentTracker {
    pub fn new(directory: DirectoryStoreRef, payments: PaymentStoreRef) -> Self {
        Self {
            directory,
            payments,
        }
    }

    async fn load(&self, id: PaymentId) -> Result<Payment> {
        self.payments
            .get_payment(id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Payment", id))
    }

    /// Marks a payment as paid at `at`.
    ///
    /// Confirming an already paid payment changes nothing and returns the
    /// stored record, original payment date included.
    pub async fn mark_paid(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Payment> {
        let mut payment = self.load(id).await?;
        if payment.mark_paid(at) {
            self.payments.update_payment(payment.clone()).await?;
            info!(payment_id = %id, parent_id = %payment.parent_id(), "Payment marked as paid");
        } else {
            info!(payment_id = %id, "Payment already paid, confirmation ignored");
        }
        Ok(payment)
    }

    /// Records that the receipt for a paid payment went out.
    pub async fn mark_receipt_sent(&self, id: PaymentId) -> Result<Payment> {
        let mut payment = self.load(id).await?;
        if payment.mark_receipt_sent()? {
            self.payments.update_payment(payment.clone()).await?;
            info!(payment_id = %id, "Receipt marked as sent");
        }
        Ok(payment)
    }

    /// Applies the action carried by a reminder reply.
    pub async fn confirm(&self, token: &ActionToken, at: DateTime<Utc>) -> Result<Payment> {
        match token {
            ActionToken::ConfirmPayment(id) => self.mark_paid(*id, at).await,
            ActionToken::ConfirmReceipt(id) => self.mark_receipt_sent(*id).await,
        }
    }

    /// Paid payments grouped by month, newest month first. Within a month
    /// payments are in the order they were paid.
    pub async fn list_paid(&self) -> Result<Vec<MonthlyPayments>> {
        let mut by_month: BTreeMap<BillingMonth, Vec<Payment>> = BTreeMap::new();
        for payment in self.payments.find_paid_payments().await? {
            by_month.entry(payment.month()).or_default().push(payment);
        }

        Ok(by_month
            .into_iter()
            .rev()
            .map(|(month, mut payments)| {
                payments.sort_by_key(|p| (p.payment_date(), p.id()));
                MonthlyPayments { month, payments }
            })
            .collect())
    }

    pub async fn list_unpaid(&self, month: Option<BillingMonth>) -> Result<Vec<Payment>> {
        self.payments.find_unpaid_payments(month).await
    }

    pub async fn summary(&self, month: BillingMonth) -> Result<PaymentSummary> {
        let unpaid = self.payments.find_unpaid_payments(None).await?;
        let paid = self.payments.find_paid_payments().await?;

        Ok(PaymentSummary {
            schools: self.directory.find_schools().await?.len(),
            active_parents: self.directory.find_active_parents().await?.len(),
            unpaid_total: unpaid.len(),
            paid_in_month: paid.iter().filter(|p| p.month() == month).count(),
            unpaid_in_month: unpaid.iter().filter(|p| p.month() == month).count(),
            paid_total: paid.len(),
            paid_with_receipt: paid.iter().filter(|p| p.is_receipt_sent()).count(),
        })
    }
}
