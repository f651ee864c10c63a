use super::directory::{ParentId, PaymentId};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A positive, whole monthly fee.
///
/// Fees are charged in whole currency units, so fractional values are
/// rejected along with zero and negative ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        } else if !value.fract().is_zero() {
            Err(PaymentError::ValidationError(
                "Amount must be a whole number".to_string(),
            ))
        } else {
            Ok(Self(value.normalize()))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A billing cycle, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingMonth(NaiveDate);

impl BillingMonth {
    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self(date - Days::new(u64::from(date.day0())))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.0 + Months::new(1) - Days::new(1)
    }

    /// The given day of this month, clamped into the month's range.
    pub fn day(&self, day: u32) -> NaiveDate {
        let day = day.clamp(1, self.last_day().day());
        self.0 + Days::new(u64::from(day - 1))
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Months::new(1))
    }
}

impl FromStr for BillingMonth {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || PaymentError::ValidationError(format!("Invalid billing month '{}', expected YYYY-MM", s));

        let bytes = s.as_bytes();
        if bytes.len() != 7
            || bytes[4] != b'-'
            || !bytes[..4].iter().all(u8::is_ascii_digit)
            || !bytes[5..].iter().all(u8::is_ascii_digit)
        {
            return Err(invalid());
        }
        let year: i32 = s[..4].parse().map_err(|_| invalid())?;
        let month: u32 = s[5..].parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BillingMonth> for String {
    fn from(month: BillingMonth) -> Self {
        month.to_string()
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    ReceiptSent,
}

/// Payment obligation before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub parent_id: ParentId,
    pub month: BillingMonth,
    pub amount: Amount,
    pub due_date: NaiveDate,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            parent_id: self.parent_id,
            month: self.month,
            amount: self.amount,
            due_date: self.due_date,
            is_paid: false,
            payment_date: None,
            is_receipt_sent: false,
        }
    }
}

/// One parent's fee for one billing month.
///
/// The paid/receipt flags only move forward through [`Payment::mark_paid`]
/// and [`Payment::mark_receipt_sent`], so a payment date exists exactly when
/// the payment is paid and a receipt is never recorded for an unpaid payment.
/// Stored records that break this are rejected when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredPayment")]
pub struct Payment {
    id: PaymentId,
    parent_id: ParentId,
    month: BillingMonth,
    amount: Amount,
    due_date: NaiveDate,
    is_paid: bool,
    payment_date: Option<DateTime<Utc>>,
    is_receipt_sent: bool,
}

/// Wire form of [`Payment`], checked before it becomes one.
#[derive(Deserialize)]
struct StoredPayment {
    id: PaymentId,
    parent_id: ParentId,
    month: BillingMonth,
    amount: Amount,
    due_date: NaiveDate,
    is_paid: bool,
    payment_date: Option<DateTime<Utc>>,
    is_receipt_sent: bool,
}

impl TryFrom<StoredPayment> for Payment {
    type Error = PaymentError;

    fn try_from(raw: StoredPayment) -> Result<Self> {
        if raw.is_paid != raw.payment_date.is_some() {
            return Err(PaymentError::InvalidState(format!(
                "payment {} is marked paid={} but has payment date {:?}",
                raw.id, raw.is_paid, raw.payment_date
            )));
        }
        if raw.is_receipt_sent && !raw.is_paid {
            return Err(PaymentError::InvalidState(format!(
                "payment {} has a receipt but is not paid",
                raw.id
            )));
        }
        Ok(Self {
            id: raw.id,
            parent_id: raw.parent_id,
            month: raw.month,
            amount: raw.amount,
            due_date: raw.due_date,
            is_paid: raw.is_paid,
            payment_date: raw.payment_date,
            is_receipt_sent: raw.is_receipt_sent,
        })
    }
}

impl Payment {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn parent_id(&self) -> ParentId {
        self.parent_id
    }

    pub fn month(&self) -> BillingMonth {
        self.month
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    /// Whether `other` is the same obligation: same id, parent and month.
    pub fn same_obligation(&self, other: &Payment) -> bool {
        self.id == other.id && self.parent_id == other.parent_id && self.month == other.month
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.payment_date
    }

    pub fn is_receipt_sent(&self) -> bool {
        self.is_receipt_sent
    }

    pub fn status(&self) -> PaymentStatus {
        match (self.is_paid, self.is_receipt_sent) {
            (false, _) => PaymentStatus::Unpaid,
            (true, false) => PaymentStatus::Paid,
            (true, true) => PaymentStatus::ReceiptSent,
        }
    }

    /// Records the payment. Returns `false` when it was already paid, in
    /// which case the original payment date is kept.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_paid {
            return false;
        }
        self.is_paid = true;
        self.payment_date = Some(at);
        true
    }

    /// Records that a receipt went out. Returns `false` when it already had.
    pub fn mark_receipt_sent(&mut self) -> Result<bool> {
        if !self.is_paid {
            return Err(PaymentError::InvalidState(format!(
                "payment {} is not paid yet",
                self.id
            )));
        }
        if self.is_receipt_sent {
            return Ok(false);
        }
        self.is_receipt_sent = true;
        Ok(true)
    }
}
