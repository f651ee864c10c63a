use super::directory::{
    ChatAddress, Grade, GradeId, NewParent, Parent, ParentId, PaymentId, School, SchoolId,
};
use super::notification::ActionToken;
use super::payment::{Amount, BillingMonth, NewPayment, Payment};
use crate::error::{DeliveryError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Reference data: schools, their grades and the enrolled parents.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_school(&self, name: String) -> Result<School>;
    async fn insert_grade(
        &self,
        school_id: SchoolId,
        name: String,
        monthly_payment: Amount,
    ) -> Result<Grade>;
    async fn update_grade(&self, grade: Grade) -> Result<()>;
    async fn insert_parent(&self, parent: NewParent) -> Result<Parent>;

    async fn find_schools(&self) -> Result<Vec<School>>;
    async fn find_school(&self, id: SchoolId) -> Result<Option<School>>;
    async fn find_grades(&self, school_id: SchoolId) -> Result<Vec<Grade>>;
    async fn find_grade(&self, id: GradeId) -> Result<Option<Grade>>;
    async fn find_parent(&self, id: ParentId) -> Result<Option<Parent>>;
    async fn find_active_parents(&self) -> Result<Vec<Parent>>;
    async fn find_parents_with_chat_address(&self) -> Result<Vec<Parent>>;
}

/// Payment history. Payments are never removed.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_payment(&self, parent_id: ParentId, month: BillingMonth)
    -> Result<Option<Payment>>;
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Inserts a new obligation, failing with `PaymentError::Duplicate` if
    /// the parent already has one for that month. The check and the insert
    /// happen atomically.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment>;
    async fn update_payment(&self, payment: Payment) -> Result<()>;

    /// Unpaid payments in id order, optionally restricted to one month.
    async fn find_unpaid_payments(&self, month: Option<BillingMonth>) -> Result<Vec<Payment>>;
    async fn find_paid_payments(&self) -> Result<Vec<Payment>>;
}

/// Outbound chat channel. Any error is a per-recipient delivery failure.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send_message(
        &self,
        recipient: &ChatAddress,
        text: &str,
        action: &ActionToken,
    ) -> std::result::Result<(), DeliveryError>;
}

pub type DirectoryStoreRef = Arc<dyn DirectoryStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type TransportRef = Arc<dyn NotificationTransport>;
