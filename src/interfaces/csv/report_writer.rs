use crate::domain::directory::{GradeId, Parent};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::DirectoryStore;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// School name, grade name and monthly fee for a parent's grade. Empty when
/// the parent has no grade or it is gone from the directory.
#[derive(Debug, Default)]
struct Placement {
    school: String,
    grade: String,
    monthly_payment: String,
}

async fn placement(directory: &dyn DirectoryStore, grade_id: Option<GradeId>) -> Result<Placement> {
    let Some(grade_id) = grade_id else {
        return Ok(Placement::default());
    };
    let Some(grade) = directory.find_grade(grade_id).await? else {
        return Ok(Placement::default());
    };
    let school = directory
        .find_school(grade.school_id)
        .await?
        .map(|s| s.name)
        .unwrap_or_default();
    Ok(Placement {
        school,
        grade: grade.name,
        monthly_payment: grade.monthly_payment.to_string(),
    })
}

/// One report line: the payment plus who owes it.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentRecord {
    pub payment_id: u64,
    pub month: String,
    pub parent: String,
    pub child: String,
    pub school: String,
    pub grade: String,
    pub phone: String,
    pub amount: String,
    pub due_date: String,
    pub status: PaymentStatus,
    pub payment_date: Option<String>,
}

impl PaymentRecord {
    /// Builds a record, falling back to the bare parent id when the parent
    /// is no longer in the directory.
    pub async fn describe(directory: &dyn DirectoryStore, payment: &Payment) -> Result<Self> {
        let (parent, child, phone, place) = match directory.find_parent(payment.parent_id()).await? {
            Some(parent) => {
                let place = placement(directory, parent.grade_id).await?;
                (
                    parent.display_name(),
                    parent.child_name,
                    parent.phone_number.unwrap_or_default(),
                    place,
                )
            }
            None => (
                format!("#{}", payment.parent_id()),
                String::new(),
                String::new(),
                Placement::default(),
            ),
        };
        Ok(Self {
            payment_id: payment.id().0,
            month: payment.month().to_string(),
            parent,
            child,
            school: place.school,
            grade: place.grade,
            phone,
            amount: payment.amount().to_string(),
            due_date: payment.due_date().format("%d.%m.%Y").to_string(),
            status: payment.status(),
            payment_date: payment
                .payment_date()
                .map(|d| d.format("%d.%m.%Y %H:%M").to_string()),
        })
    }
}

/// One line of the parent list.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ParentRecord {
    pub parent_id: u64,
    pub parent: String,
    pub child: String,
    pub school: String,
    pub grade: String,
    pub monthly_payment: String,
    pub phone: String,
    pub has_chat: bool,
}

impl ParentRecord {
    pub async fn describe(directory: &dyn DirectoryStore, parent: &Parent) -> Result<Self> {
        let place = placement(directory, parent.grade_id).await?;
        Ok(Self {
            parent_id: parent.id.0,
            parent: parent.display_name(),
            child: parent.child_name.clone(),
            school: place.school,
            grade: place.grade,
            monthly_payment: place.monthly_payment,
            phone: parent.phone_number.clone().unwrap_or_default(),
            has_chat: parent.chat_address.is_some(),
        })
    }
}

/// Writes report records as CSV, header first.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records<R: Serialize>(&mut self, records: impl IntoIterator<Item = R>) -> Result<()> {
        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
