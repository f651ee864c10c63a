use crate::config::BillingConfig;
use crate::domain::payment::{BillingMonth, NewPayment};
use crate::domain::ports::{DirectoryStoreRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use tracing::{debug, info, warn};

/// Creates the monthly payment obligations.
///
/// Every active parent with a grade gets exactly one payment per billing
/// month, priced from the grade at the time of generation.
pub struct PaymentGenerator {
    directory: DirectoryStoreRef,
    payments: PaymentStoreRef,
    billing: BillingConfig,
}

impl PaymentGenerator {
    pub fn new(
        directory: DirectoryStoreRef,
        payments: PaymentStoreRef,
        billing: BillingConfig,
    ) -> Self {
        Self {
            directory,
            payments,
            billing,
        }
    }

    /// Bills every eligible parent for `month` and returns how many payments
    /// were created. Running it again for the same month creates none.
    pub async fn generate_monthly_payments(&self, month: &BillingMonth) -> Result<usize> {
        let due_date = self.billing.due_date(month);
        let mut created = 0;

        for parent in self.directory.find_active_parents().await? {
            let Some(grade_id) = parent.grade_id else {
                warn!(parent_id = %parent.id, "Parent has no grade, not billed");
                continue;
            };
            let Some(grade) = self.directory.find_grade(grade_id).await? else {
                warn!(parent_id = %parent.id, grade_id = %grade_id, "Grade not found, not billed");
                continue;
            };

            // Ignore parents already billed for this month
            if self.payments.find_payment(parent.id, *month).await?.is_some() {
                continue;
            }

            let new_payment = NewPayment {
                parent_id: parent.id,
                month: *month,
                amount: grade.monthly_payment,
                due_date,
            };
            match self.payments.insert_payment(new_payment).await {
                Ok(payment) => {
                    debug!(payment_id = %payment.id(), parent_id = %parent.id, amount = %payment.amount(), "Payment created");
                    created += 1;
                }
                // Lost a race with another generator run
                Err(PaymentError::Duplicate { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(month = %month, created, "Monthly payments generated");
        Ok(created)
    }
}
