use crate::domain::directory::{
    Grade, GradeId, NewParent, Parent, ParentId, PaymentId, School, SchoolId,
};
use crate::domain::payment::{Amount, BillingMonth, NewPayment, Payment};
use crate::domain::ports::{DirectoryStore, PaymentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_SCHOOLS: &str = "schools";
pub const CF_GRADES: &str = "grades";
pub const CF_PARENTS: &str = "parents";
pub const CF_PAYMENTS: &str = "payments";
/// Secondary index `<parent_id>:<YYYY-MM>` -> payment id.
pub const CF_PAYMENT_KEYS: &str = "payment_keys";
/// Id counters, one key per entity kind.
pub const CF_META: &str = "meta";

const ALL_CFS: [&str; 6] = [
    CF_SCHOOLS,
    CF_GRADES,
    CF_PARENTS,
    CF_PAYMENTS,
    CF_PAYMENT_KEYS,
    CF_META,
];

/// A persistent store implementation using RocksDB.
///
/// Every entity kind lives in its own Column Family, values are JSON.
/// Writes that allocate ids or touch the payment index go through a single
/// async mutex and land in one `WriteBatch`, which makes the
/// `(parent, month)` check-then-insert atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "Column family '{}' not found",
                name
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &'static str, id: u64) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        id: u64,
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, id.to_be_bytes(), serde_json::to_vec(value)?);
        Ok(())
    }

    /// Bumps the counter for `kind`. Callers must hold `write_lock`.
    fn next_id(&self, batch: &mut WriteBatch, kind: &str) -> Result<u64> {
        let meta = self.cf(CF_META)?;
        let current = match self.db.get_cf(meta, kind)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                        "Corrupt id counter for '{}'",
                        kind
                    ))))
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        batch.put_cf(meta, kind, next.to_be_bytes());
        Ok(next)
    }

    fn payment_key(parent_id: ParentId, month: BillingMonth) -> String {
        format!("{}:{}", parent_id, month)
    }
}

#[async_trait]
impl DirectoryStore for RocksDBStore {
    async fn insert_school(&self, name: String) -> Result<School> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        let school = School {
            id: SchoolId(self.next_id(&mut batch, CF_SCHOOLS)?),
            name,
        };
        self.put_json(&mut batch, CF_SCHOOLS, school.id.0, &school)?;
        self.db.write(batch)?;
        Ok(school)
    }

    async fn insert_grade(
        &self,
        school_id: SchoolId,
        name: String,
        monthly_payment: Amount,
    ) -> Result<Grade> {
        let _guard = self.write_lock.lock().await;
        if self.get_json::<School>(CF_SCHOOLS, school_id.0)?.is_none() {
            return Err(PaymentError::not_found("School", school_id));
        }
        let mut batch = WriteBatch::default();
        let grade = Grade {
            id: GradeId(self.next_id(&mut batch, CF_GRADES)?),
            school_id,
            name,
            monthly_payment,
        };
        self.put_json(&mut batch, CF_GRADES, grade.id.0, &grade)?;
        self.db.write(batch)?;
        Ok(grade)
    }

    async fn update_grade(&self, grade: Grade) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.get_json::<Grade>(CF_GRADES, grade.id.0)?.is_none() {
            return Err(PaymentError::not_found("Grade", grade.id));
        }
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_GRADES, grade.id.0, &grade)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn insert_parent(&self, parent: NewParent) -> Result<Parent> {
        let _guard = self.write_lock.lock().await;
        if let Some(grade_id) = parent.grade_id
            && self.get_json::<Grade>(CF_GRADES, grade_id.0)?.is_none()
        {
            return Err(PaymentError::not_found("Grade", grade_id));
        }
        let mut batch = WriteBatch::default();
        let parent = parent.into_parent(ParentId(self.next_id(&mut batch, CF_PARENTS)?));
        self.put_json(&mut batch, CF_PARENTS, parent.id.0, &parent)?;
        self.db.write(batch)?;
        Ok(parent)
    }

    async fn find_schools(&self) -> Result<Vec<School>> {
        self.scan_json(CF_SCHOOLS)
    }

    async fn find_school(&self, id: SchoolId) -> Result<Option<School>> {
        self.get_json(CF_SCHOOLS, id.0)
    }

    async fn find_grades(&self, school_id: SchoolId) -> Result<Vec<Grade>> {
        let grades: Vec<Grade> = self.scan_json(CF_GRADES)?;
        Ok(grades
            .into_iter()
            .filter(|g| g.school_id == school_id)
            .collect())
    }

    async fn find_grade(&self, id: GradeId) -> Result<Option<Grade>> {
        self.get_json(CF_GRADES, id.0)
    }

    async fn find_parent(&self, id: ParentId) -> Result<Option<Parent>> {
        self.get_json(CF_PARENTS, id.0)
    }

    async fn find_active_parents(&self) -> Result<Vec<Parent>> {
        let parents: Vec<Parent> = self.scan_json(CF_PARENTS)?;
        Ok(parents.into_iter().filter(|p| p.active).collect())
    }

    async fn find_parents_with_chat_address(&self) -> Result<Vec<Parent>> {
        let parents: Vec<Parent> = self.scan_json(CF_PARENTS)?;
        Ok(parents.into_iter().filter(Parent::can_be_notified).collect())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn find_payment(
        &self,
        parent_id: ParentId,
        month: BillingMonth,
    ) -> Result<Option<Payment>> {
        let key = Self::payment_key(parent_id, month);
        match self.db.get_cf(self.cf(CF_PAYMENT_KEYS)?, key)? {
            Some(bytes) => {
                let id: u64 = serde_json::from_slice(&bytes)?;
                self.get_json(CF_PAYMENTS, id)
            }
            None => Ok(None),
        }
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, id.0)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;
        let keys = self.cf(CF_PAYMENT_KEYS)?;
        let key = Self::payment_key(payment.parent_id, payment.month);
        // Just check if the key exists without retrieving the value
        if self.db.get_pinned_cf(keys, &key)?.is_some() {
            return Err(PaymentError::Duplicate {
                parent_id: payment.parent_id.0,
                month: payment.month.to_string(),
            });
        }

        let mut batch = WriteBatch::default();
        let payment = payment.into_payment(PaymentId(self.next_id(&mut batch, CF_PAYMENTS)?));
        self.put_json(&mut batch, CF_PAYMENTS, payment.id().0, &payment)?;
        batch.put_cf(keys, key, serde_json::to_vec(&payment.id().0)?);
        self.db.write(batch)?;
        Ok(payment)
    }

    async fn update_payment(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let id = payment.id();
        match self.get_json::<Payment>(CF_PAYMENTS, id.0)? {
            None => return Err(PaymentError::not_found("Payment", id)),
            // The key index points at this record; parent and month are fixed.
            Some(existing) if !existing.same_obligation(&payment) => {
                return Err(PaymentError::InvalidState(format!(
                    "payment {} cannot change parent or month",
                    id
                )));
            }
            Some(_) => {}
        }
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PAYMENTS, id.0, &payment)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_unpaid_payments(&self, month: Option<BillingMonth>) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan_json(CF_PAYMENTS)?;
        Ok(payments
            .into_iter()
            .filter(|p| !p.is_paid() && month.is_none_or(|m| p.month() == m))
            .collect())
    }

    async fn find_paid_payments(&self) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan_json(CF_PAYMENTS)?;
        Ok(payments.into_iter().filter(Payment::is_paid).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn new_payment(parent: ParentId) -> NewPayment {
        NewPayment {
            parent_id: parent,
            month: "2024-03".parse().unwrap(),
            amount: Amount::new(dec!(3800)).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in ALL_CFS {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_directory_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let school = store.insert_school("Школа №26".to_string()).await.unwrap();
        let grade = store
            .insert_grade(school.id, "1 класс".to_string(), Amount::new(dec!(3800)).unwrap())
            .await
            .unwrap();
        let parent = store
            .insert_parent(NewParent::new("Ирина", "Саша").unwrap().with_grade(grade.id))
            .await
            .unwrap();

        assert_eq!(store.find_schools().await.unwrap(), vec![school.clone()]);
        assert_eq!(store.find_grades(school.id).await.unwrap(), vec![grade]);
        assert_eq!(store.find_parent(parent.id).await.unwrap(), Some(parent));
        assert!(store.find_school(SchoolId(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_payment_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut payment = store.insert_payment(new_payment(ParentId(1))).await.unwrap();
        assert!(matches!(
            store.insert_payment(new_payment(ParentId(1))).await,
            Err(PaymentError::Duplicate { .. })
        ));

        payment.mark_paid(Utc::now());
        store.update_payment(payment.clone()).await.unwrap();

        let found = store
            .find_payment(ParentId(1), "2024-03".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(found, Some(payment.clone()));
        assert_eq!(store.find_paid_payments().await.unwrap(), vec![payment]);
        assert!(store.find_unpaid_payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_counters() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.insert_payment(new_payment(ParentId(1))).await.unwrap();
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        let second = store.insert_payment(new_payment(ParentId(2))).await.unwrap();
        assert_eq!(second.id(), PaymentId(2));
    }

    #[tokio::test]
    async fn test_rocksdb_update_keeps_parent_and_month() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let march = store.insert_payment(new_payment(ParentId(1))).await.unwrap();

        let april_month: BillingMonth = "2024-04".parse().unwrap();
        let april = NewPayment {
            month: april_month,
            ..new_payment(ParentId(1))
        };
        let moved = april.clone().into_payment(march.id());
        assert!(matches!(
            store.update_payment(moved).await,
            Err(PaymentError::InvalidState(_))
        ));

        store.insert_payment(april).await.unwrap();
        assert_eq!(
            store.find_unpaid_payments(Some(april_month)).await.unwrap().len(),
            1
        );
        let stored = store
            .find_payment(ParentId(1), "2024-03".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, Some(march));
    }
}
