use crate::config::ReminderPolicy;
use crate::domain::directory::ParentId;
use crate::domain::payment::Payment;
use crate::domain::ports::{DirectoryStoreRef, PaymentStoreRef};
use crate::error::Result;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

/// Picks the unpaid payments that should get a reminder today.
///
/// Read-only: calling it twice with the same `today` yields the same list.
pub struct ReminderSelector {
    directory: DirectoryStoreRef,
    payments: PaymentStoreRef,
    policy: ReminderPolicy,
}

impl ReminderSelector {
    pub fn new(
        directory: DirectoryStoreRef,
        payments: PaymentStoreRef,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            directory,
            payments,
            policy,
        }
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    /// Unpaid payments of reachable parents that fall inside the reminder
    /// window, ordered by due date then id.
    pub async fn select_payments_due_for_reminder(&self, today: NaiveDate) -> Result<Vec<Payment>> {
        let reachable: HashSet<ParentId> = self
            .directory
            .find_parents_with_chat_address()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut selected: Vec<Payment> = self
            .payments
            .find_unpaid_payments(None)
            .await?
            .into_iter()
            .filter(|p| reachable.contains(&p.parent_id()))
            .filter(|p| self.policy.is_due(p.due_date(), today))
            .collect();
        selected.sort_by_key(|p| (p.due_date(), p.id()));

        debug!(today = %today, selected = selected.len(), "Payments selected for reminder");
        Ok(selected)
    }
}
