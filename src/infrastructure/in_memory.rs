use crate::domain::directory::{
    Grade, GradeId, NewParent, Parent, ParentId, PaymentId, School, SchoolId,
};
use crate::domain::payment::{Amount, BillingMonth, NewPayment, Payment};
use crate::domain::ports::{DirectoryStore, PaymentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Directory {
    schools: BTreeMap<SchoolId, School>,
    grades: BTreeMap<GradeId, Grade>,
    parents: BTreeMap<ParentId, Parent>,
    next_id: u64,
}

impl Directory {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A thread-safe in-memory store for schools, grades and parents.
///
/// Ids come from a single counter and iteration follows id order, so
/// results are deterministic. Ideal for testing or one-shot CLI runs.
#[derive(Default, Clone)]
pub struct InMemoryDirectoryStore {
    inner: Arc<RwLock<Directory>>,
}

impl InMemoryDirectoryStore {
    /// Creates a new, empty in-memory directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn insert_school(&self, name: String) -> Result<School> {
        let mut dir = self.inner.write().await;
        let school = School {
            id: SchoolId(dir.allocate()),
            name,
        };
        dir.schools.insert(school.id, school.clone());
        Ok(school)
    }

    async fn insert_grade(
        &self,
        school_id: SchoolId,
        name: String,
        monthly_payment: Amount,
    ) -> Result<Grade> {
        let mut dir = self.inner.write().await;
        if !dir.schools.contains_key(&school_id) {
            return Err(PaymentError::not_found("School", school_id));
        }
        let grade = Grade {
            id: GradeId(dir.allocate()),
            school_id,
            name,
            monthly_payment,
        };
        dir.grades.insert(grade.id, grade.clone());
        Ok(grade)
    }

    async fn update_grade(&self, grade: Grade) -> Result<()> {
        let mut dir = self.inner.write().await;
        match dir.grades.get_mut(&grade.id) {
            Some(existing) => {
                *existing = grade;
                Ok(())
            }
            None => Err(PaymentError::not_found("Grade", grade.id)),
        }
    }

    async fn insert_parent(&self, parent: NewParent) -> Result<Parent> {
        let mut dir = self.inner.write().await;
        if let Some(grade_id) = parent.grade_id
            && !dir.grades.contains_key(&grade_id)
        {
            return Err(PaymentError::not_found("Grade", grade_id));
        }
        let parent = parent.into_parent(ParentId(dir.allocate()));
        dir.parents.insert(parent.id, parent.clone());
        Ok(parent)
    }

    async fn find_schools(&self) -> Result<Vec<School>> {
        let dir = self.inner.read().await;
        Ok(dir.schools.values().cloned().collect())
    }

    async fn find_school(&self, id: SchoolId) -> Result<Option<School>> {
        let dir = self.inner.read().await;
        Ok(dir.schools.get(&id).cloned())
    }

    async fn find_grades(&self, school_id: SchoolId) -> Result<Vec<Grade>> {
        let dir = self.inner.read().await;
        Ok(dir
            .grades
            .values()
            .filter(|g| g.school_id == school_id)
            .cloned()
            .collect())
    }

    async fn find_grade(&self, id: GradeId) -> Result<Option<Grade>> {
        let dir = self.inner.read().await;
        Ok(dir.grades.get(&id).cloned())
    }

    async fn find_parent(&self, id: ParentId) -> Result<Option<Parent>> {
        let dir = self.inner.read().await;
        Ok(dir.parents.get(&id).cloned())
    }

    async fn find_active_parents(&self) -> Result<Vec<Parent>> {
        let dir = self.inner.read().await;
        Ok(dir.parents.values().filter(|p| p.active).cloned().collect())
    }

    async fn find_parents_with_chat_address(&self) -> Result<Vec<Parent>> {
        let dir = self.inner.read().await;
        Ok(dir
            .parents
            .values()
            .filter(|p| p.can_be_notified())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct Ledger {
    payments: BTreeMap<PaymentId, Payment>,
    by_parent_month: HashMap<(ParentId, BillingMonth), PaymentId>,
    next_id: u64,
}

/// A thread-safe in-memory store for payments.
///
/// Keeps a `(parent, month)` index next to the payments; both are updated
/// under one write lock so concurrent generators cannot double-bill.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<Ledger>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_payment(
        &self,
        parent_id: ParentId,
        month: BillingMonth,
    ) -> Result<Option<Payment>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .by_parent_month
            .get(&(parent_id, month))
            .and_then(|id| ledger.payments.get(id))
            .cloned())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let ledger = self.inner.read().await;
        Ok(ledger.payments.get(&id).cloned())
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let mut ledger = self.inner.write().await;
        let key = (payment.parent_id, payment.month);
        if ledger.by_parent_month.contains_key(&key) {
            return Err(PaymentError::Duplicate {
                parent_id: payment.parent_id.0,
                month: payment.month.to_string(),
            });
        }
        ledger.next_id += 1;
        let payment = payment.into_payment(PaymentId(ledger.next_id));
        ledger.by_parent_month.insert(key, payment.id());
        ledger.payments.insert(payment.id(), payment.clone());
        Ok(payment)
    }

    async fn update_payment(&self, payment: Payment) -> Result<()> {
        let mut ledger = self.inner.write().await;
        let id = payment.id();
        match ledger.payments.get_mut(&id) {
            Some(existing) if !existing.same_obligation(&payment) => Err(
                PaymentError::InvalidState(format!("payment {} cannot change parent or month", id)),
            ),
            Some(existing) => {
                *existing = payment;
                Ok(())
            }
            None => Err(PaymentError::not_found("Payment", id)),
        }
    }

    async fn find_unpaid_payments(&self, month: Option<BillingMonth>) -> Result<Vec<Payment>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .payments
            .values()
            .filter(|p| !p.is_paid() && month.is_none_or(|m| p.month() == m))
            .cloned()
            .collect())
    }

    async fn find_paid_payments(&self) -> Result<Vec<Payment>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .payments
            .values()
            .filter(|p| p.is_paid())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn new_payment(parent: u64, month: &str) -> NewPayment {
        NewPayment {
            parent_id: ParentId(parent),
            month: month.parse().unwrap(),
            amount: Amount::new(dec!(3400)).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_directory_store() {
        let store = InMemoryDirectoryStore::new();
        let school = store.insert_school("Школа №5".to_string()).await.unwrap();
        let grade = store
            .insert_grade(school.id, "5 класс".to_string(), Amount::new(dec!(3400)).unwrap())
            .await
            .unwrap();

        let parent = NewParent::new("Анна", "Маша").unwrap().with_grade(grade.id);
        let parent = store.insert_parent(parent).await.unwrap();

        assert_eq!(store.find_schools().await.unwrap(), vec![school.clone()]);
        assert_eq!(store.find_grades(school.id).await.unwrap(), vec![grade.clone()]);
        assert_eq!(store.find_parent(parent.id).await.unwrap(), Some(parent.clone()));
        assert_eq!(store.find_active_parents().await.unwrap().len(), 1);
        // No chat address yet
        assert!(store.find_parents_with_chat_address().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_parent_unknown_grade() {
        let store = InMemoryDirectoryStore::new();
        let parent = NewParent::new("Анна", "Маша").unwrap().with_grade(GradeId(99));
        assert!(matches!(
            store.insert_parent(parent).await,
            Err(PaymentError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_payment_store() {
        let store = InMemoryPaymentStore::new();
        let payment = store.insert_payment(new_payment(1, "2024-03")).await.unwrap();

        let retrieved = store.get_payment(payment.id()).await.unwrap().unwrap();
        assert_eq!(retrieved, payment);
        let by_key = store
            .find_payment(ParentId(1), "2024-03".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(by_key, Some(payment));
        assert!(store.get_payment(PaymentId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_payment_rejects_duplicate() {
        let store = InMemoryPaymentStore::new();
        store.insert_payment(new_payment(1, "2024-03")).await.unwrap();

        let result = store.insert_payment(new_payment(1, "2024-03")).await;
        assert!(matches!(result, Err(PaymentError::Duplicate { .. })));

        store.insert_payment(new_payment(1, "2024-04")).await.unwrap();
        assert_eq!(store.find_unpaid_payments(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unpaid_and_paid_queries() {
        let store = InMemoryPaymentStore::new();
        let mut first = store.insert_payment(new_payment(1, "2024-03")).await.unwrap();
        store.insert_payment(new_payment(2, "2024-03")).await.unwrap();
        store.insert_payment(new_payment(1, "2024-04")).await.unwrap();

        first.mark_paid(Utc::now());
        store.update_payment(first.clone()).await.unwrap();

        let march = store
            .find_unpaid_payments(Some("2024-03".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(march.len(), 1);
        assert_eq!(march[0].parent_id(), ParentId(2));
        assert_eq!(store.find_paid_payments().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_update_payment_keeps_parent_and_month() {
        let store = InMemoryPaymentStore::new();
        let march = store.insert_payment(new_payment(1, "2024-03")).await.unwrap();

        let moved = new_payment(1, "2024-04").into_payment(march.id());
        assert!(matches!(
            store.update_payment(moved).await,
            Err(PaymentError::InvalidState(_))
        ));
        let reparented = new_payment(2, "2024-03").into_payment(march.id());
        assert!(matches!(
            store.update_payment(reparented).await,
            Err(PaymentError::InvalidState(_))
        ));

        // April is still free for the same parent
        store.insert_payment(new_payment(1, "2024-04")).await.unwrap();
        let april = store
            .find_unpaid_payments(Some("2024-04".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(april.len(), 1);
        let stored = store
            .find_payment(ParentId(1), "2024-03".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, Some(march));
    }
}
