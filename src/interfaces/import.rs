//! Loading reference data into a [`DirectoryStore`].

use crate::domain::directory::{ChatAddress, GradeId, NewParent, SchoolId};
use crate::domain::payment::Amount;
use crate::domain::ports::DirectoryStore;
use crate::error::{PaymentError, Result};
use crate::interfaces::csv::directory_reader::{GradeRow, ParentRow};
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Schools served out of the box, with the fee shared by all their grades.
const DEFAULT_SCHOOLS: [(&str, rust_decimal::Decimal); 4] = [
    ("Школа №5", dec!(3400)),
    ("Школа №26", dec!(3800)),
    ("Школа №78", dec!(3400)),
    ("Школа №100", dec!(3600)),
];
const DEFAULT_GRADES: std::ops::RangeInclusive<u32> = 1..=8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub schools: usize,
    pub grades: usize,
    pub parents: usize,
}

type ParentKey = (String, Option<String>, String, Option<GradeId>);

/// Resolves schools and grades by name and creates what is missing.
///
/// Re-importing the same data creates nothing new, which keeps repeated runs
/// against a persistent store harmless.
pub struct DirectoryImporter<'a> {
    store: &'a dyn DirectoryStore,
    schools: HashMap<String, SchoolId>,
    grades: HashMap<(SchoolId, String), GradeId>,
    parents: HashSet<ParentKey>,
    summary: ImportSummary,
}

impl<'a> DirectoryImporter<'a> {
    pub async fn new(store: &'a dyn DirectoryStore) -> Result<Self> {
        let mut schools = HashMap::new();
        let mut grades = HashMap::new();
        for school in store.find_schools().await? {
            for grade in store.find_grades(school.id).await? {
                grades.insert((school.id, grade.name), grade.id);
            }
            schools.insert(school.name, school.id);
        }
        let parents = store
            .find_active_parents()
            .await?
            .into_iter()
            .map(|p| (p.first_name, p.last_name, p.child_name, p.grade_id))
            .collect();

        Ok(Self {
            store,
            schools,
            grades,
            parents,
            summary: ImportSummary::default(),
        })
    }

    pub fn summary(&self) -> ImportSummary {
        self.summary
    }

    async fn ensure_school(&mut self, name: &str) -> Result<SchoolId> {
        if let Some(id) = self.schools.get(name) {
            return Ok(*id);
        }
        let school = self.store.insert_school(name.to_string()).await?;
        self.schools.insert(school.name, school.id);
        self.summary.schools += 1;
        Ok(school.id)
    }

    async fn ensure_grade(&mut self, school_id: SchoolId, name: &str, fee: Amount) -> Result<GradeId> {
        if let Some(id) = self.grades.get(&(school_id, name.to_string())) {
            let id = *id;
            if let Some(mut grade) = self.store.find_grade(id).await?
                && grade.monthly_payment != fee
            {
                info!(grade_id = %id, old = %grade.monthly_payment, new = %fee, "Grade price updated");
                grade.monthly_payment = fee;
                self.store.update_grade(grade).await?;
            }
            return Ok(id);
        }
        let grade = self
            .store
            .insert_grade(school_id, name.to_string(), fee)
            .await?;
        self.grades.insert((school_id, grade.name), grade.id);
        self.summary.grades += 1;
        Ok(grade.id)
    }

    pub async fn import_grade(&mut self, row: GradeRow) -> Result<GradeId> {
        let fee = Amount::new(row.monthly_payment)?;
        let school_id = self.ensure_school(&row.school).await?;
        self.ensure_grade(school_id, &row.grade, fee).await
    }

    pub async fn import_parent(&mut self, row: ParentRow) -> Result<()> {
        let school_id = *self
            .schools
            .get(&row.school)
            .ok_or_else(|| PaymentError::not_found("School", &row.school))?;
        let grade_id = *self
            .grades
            .get(&(school_id, row.grade.clone()))
            .ok_or_else(|| PaymentError::not_found("Grade", format!("{} / {}", row.school, row.grade)))?;

        let mut parent = NewParent::new(row.first_name, row.child_name)?.with_grade(grade_id);
        if let Some(last_name) = row.last_name {
            parent = parent.with_last_name(last_name);
        }
        if let Some(phone) = row.phone_number {
            parent = parent.with_phone(phone);
        }
        if let Some(chat) = row.chat_address {
            parent = parent.with_chat_address(ChatAddress::new(chat)?);
        }

        let key = (
            parent.first_name.clone(),
            parent.last_name.clone(),
            parent.child_name.clone(),
            parent.grade_id,
        );
        if self.parents.contains(&key) {
            return Ok(());
        }
        self.store.insert_parent(parent).await?;
        self.parents.insert(key);
        self.summary.parents += 1;
        Ok(())
    }

    /// Imports every row, logging and skipping the ones that fail.
    pub async fn import_grades(&mut self, rows: impl Iterator<Item = Result<GradeRow>>) {
        for row in rows {
            let result = match row {
                Ok(row) => self.import_grade(row).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "Grade row skipped");
            }
        }
    }

    pub async fn import_parents(&mut self, rows: impl Iterator<Item = Result<ParentRow>>) {
        for row in rows {
            let result = match row {
                Ok(row) => self.import_parent(row).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "Parent row skipped");
            }
        }
    }

    /// Creates the default schools with grades one through eight.
    pub async fn seed_default_catalogue(&mut self) -> Result<()> {
        for (school, fee) in DEFAULT_SCHOOLS {
            for grade in DEFAULT_GRADES {
                self.import_grade(GradeRow {
                    school: school.to_string(),
                    grade: format!("{} класс", grade),
                    monthly_payment: fee,
                })
                .await?;
            }
        }
        Ok(())
    }
}
