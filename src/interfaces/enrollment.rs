//! Step-by-step collection of a new parent's details.
//!
//! Each administrator has at most one flow in progress. The flow never
//! touches a store; it only produces a validated [`NewParent`] once every
//! step is answered.

use crate::domain::directory::{ChatAddress, Grade, GradeId, NewParent, School, SchoolId};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStep {
    AwaitingName,
    AwaitingChild,
    AwaitingSchool,
    AwaitingGrade,
    AwaitingPhone,
    AwaitingChatAddress,
    Complete,
}

impl EnrollmentStep {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::AwaitingName => "Parent's first name (and last name, optional):",
            Self::AwaitingChild => "Child's name:",
            Self::AwaitingSchool => "Choose a school (number):",
            Self::AwaitingGrade => "Choose a grade (number):",
            Self::AwaitingPhone => "Phone number ('-' to skip):",
            Self::AwaitingChatAddress => "Chat address ('-' to skip):",
            Self::Complete => "Done.",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Answers {
    first_name: Option<String>,
    last_name: Option<String>,
    child_name: Option<String>,
    school_id: Option<SchoolId>,
    grade_id: Option<GradeId>,
    phone_number: Option<String>,
    chat_address: Option<ChatAddress>,
}

#[derive(Debug, Clone)]
pub struct EnrollmentFlow {
    step: EnrollmentStep,
    answers: Answers,
}

impl Default for EnrollmentFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn skipped(input: &str) -> bool {
    matches!(input.trim(), "" | "-")
}

impl EnrollmentFlow {
    pub fn new() -> Self {
        Self {
            step: EnrollmentStep::AwaitingName,
            answers: Answers::default(),
        }
    }

    pub fn step(&self) -> EnrollmentStep {
        self.step
    }

    fn ensure_step(&self, step: EnrollmentStep) -> Result<()> {
        if self.step == step {
            Ok(())
        } else {
            Err(PaymentError::InvalidState(format!(
                "enrollment is at {:?}, not {:?}",
                self.step, step
            )))
        }
    }

    /// Answers one of the free-text steps.
    pub fn submit_text(&mut self, input: &str) -> Result<EnrollmentStep> {
        let input = input.trim();
        match self.step {
            EnrollmentStep::AwaitingName => {
                let mut words = input.split_whitespace();
                let first = words.next().ok_or_else(|| {
                    PaymentError::ValidationError("First name must not be empty".to_string())
                })?;
                let rest = words.collect::<Vec<_>>().join(" ");
                self.answers.first_name = Some(first.to_string());
                self.answers.last_name = (!rest.is_empty()).then_some(rest);
                self.step = EnrollmentStep::AwaitingChild;
            }
            EnrollmentStep::AwaitingChild => {
                if input.is_empty() {
                    return Err(PaymentError::ValidationError(
                        "Child name must not be empty".to_string(),
                    ));
                }
                self.answers.child_name = Some(input.to_string());
                self.step = EnrollmentStep::AwaitingSchool;
            }
            EnrollmentStep::AwaitingPhone => {
                self.answers.phone_number = (!skipped(input)).then(|| input.to_string());
                self.step = EnrollmentStep::AwaitingChatAddress;
            }
            EnrollmentStep::AwaitingChatAddress => {
                self.answers.chat_address = if skipped(input) {
                    None
                } else {
                    Some(ChatAddress::new(input)?)
                };
                self.step = EnrollmentStep::Complete;
            }
            step => {
                return Err(PaymentError::InvalidState(format!(
                    "{:?} does not take free text",
                    step
                )));
            }
        }
        Ok(self.step)
    }

    pub fn choose_school(&mut self, school: &School) -> Result<EnrollmentStep> {
        self.ensure_step(EnrollmentStep::AwaitingSchool)?;
        self.answers.school_id = Some(school.id);
        self.step = EnrollmentStep::AwaitingGrade;
        Ok(self.step)
    }

    pub fn choose_grade(&mut self, grade: &Grade) -> Result<EnrollmentStep> {
        self.ensure_step(EnrollmentStep::AwaitingGrade)?;
        if self.answers.school_id != Some(grade.school_id) {
            return Err(PaymentError::ValidationError(format!(
                "Grade '{}' belongs to another school",
                grade.name
            )));
        }
        self.answers.grade_id = Some(grade.id);
        self.step = EnrollmentStep::AwaitingPhone;
        Ok(self.step)
    }

    pub fn school_id(&self) -> Option<SchoolId> {
        self.answers.school_id
    }

    /// The collected parent, available once every step is answered.
    pub fn finish(self) -> Result<NewParent> {
        self.ensure_step(EnrollmentStep::Complete)?;
        let answers = self.answers;
        let missing = |field: &str| PaymentError::InvalidState(format!("{} was never answered", field));

        let mut parent = NewParent::new(
            answers.first_name.ok_or_else(|| missing("first name"))?,
            answers.child_name.ok_or_else(|| missing("child name"))?,
        )?
        .with_grade(answers.grade_id.ok_or_else(|| missing("grade"))?);
        if let Some(last_name) = answers.last_name {
            parent = parent.with_last_name(last_name);
        }
        if let Some(phone) = answers.phone_number {
            parent = parent.with_phone(phone);
        }
        if let Some(address) = answers.chat_address {
            parent = parent.with_chat_address(address);
        }
        Ok(parent)
    }
}

/// In-progress flows keyed by administrator.
#[derive(Debug)]
pub struct EnrollmentSessions<K> {
    flows: HashMap<K, EnrollmentFlow>,
}

impl<K> Default for EnrollmentSessions<K> {
    fn default() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> EnrollmentSessions<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh flow, discarding any unfinished one for `admin`.
    pub fn start(&mut self, admin: K) -> &mut EnrollmentFlow {
        let flow = self.flows.entry(admin).or_default();
        *flow = EnrollmentFlow::new();
        flow
    }

    pub fn get_mut(&mut self, admin: &K) -> Option<&mut EnrollmentFlow> {
        self.flows.get_mut(admin)
    }

    /// Drops the flow. Returns `false` when there was none.
    pub fn cancel(&mut self, admin: &K) -> bool {
        self.flows.remove(admin).is_some()
    }

    /// Removes a finished flow and returns the parent it collected. An
    /// unfinished flow stays in place.
    pub fn complete(&mut self, admin: &K) -> Result<NewParent> {
        let none = || PaymentError::InvalidState("no enrollment in progress".to_string());
        let step = self.flows.get(admin).ok_or_else(none)?.step();
        if step != EnrollmentStep::Complete {
            return Err(PaymentError::InvalidState(format!(
                "enrollment is still at {:?}",
                step
            )));
        }
        self.flows.remove(admin).ok_or_else(none)?.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use rust_decimal_macros::dec;

    fn school(id: u64) -> School {
        School {
            id: SchoolId(id),
            name: format!("Школа {}", id),
        }
    }

    fn grade(id: u64, school_id: u64) -> Grade {
        Grade {
            id: GradeId(id),
            school_id: SchoolId(school_id),
            name: "5 класс".to_string(),
            monthly_payment: Amount::new(dec!(3400)).unwrap(),
        }
    }

    #[test]
    fn test_full_flow() {
        let mut sessions = EnrollmentSessions::new();
        let flow = sessions.start(42_u64);
        assert_eq!(flow.submit_text("Анна Иванова").unwrap(), EnrollmentStep::AwaitingChild);
        assert_eq!(flow.submit_text("Маша").unwrap(), EnrollmentStep::AwaitingSchool);
        flow.choose_school(&school(1)).unwrap();
        flow.choose_grade(&grade(2, 1)).unwrap();
        assert_eq!(flow.submit_text("-").unwrap(), EnrollmentStep::AwaitingChatAddress);
        assert_eq!(flow.submit_text("100500").unwrap(), EnrollmentStep::Complete);

        let parent = sessions.complete(&42).unwrap();
        assert_eq!(parent.first_name, "Анна");
        assert_eq!(parent.last_name.as_deref(), Some("Иванова"));
        assert_eq!(parent.grade_id, Some(GradeId(2)));
        assert_eq!(parent.phone_number, None);
        assert_eq!(parent.chat_address.unwrap().as_str(), "100500");
        assert!(sessions.get_mut(&42).is_none());
    }

    #[test]
    fn test_out_of_order_steps_rejected() {
        let mut flow = EnrollmentFlow::new();
        assert!(matches!(
            flow.choose_school(&school(1)),
            Err(PaymentError::InvalidState(_))
        ));
        assert!(flow.submit_text("  ").is_err());
        assert_eq!(flow.step(), EnrollmentStep::AwaitingName);

        flow.submit_text("Олег").unwrap();
        flow.submit_text("Петя").unwrap();
        assert!(flow.submit_text("Школа").is_err());
        flow.choose_school(&school(1)).unwrap();
        assert!(matches!(
            flow.choose_grade(&grade(5, 2)),
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(flow.step(), EnrollmentStep::AwaitingGrade);
        assert!(flow.finish().is_err());
    }

    #[test]
    fn test_cancel_and_incomplete() {
        let mut sessions = EnrollmentSessions::new();
        sessions.start("admin").submit_text("Анна").unwrap();

        assert!(sessions.complete(&"admin").is_err());
        assert!(sessions.get_mut(&"admin").is_some());

        assert!(sessions.cancel(&"admin"));
        assert!(!sessions.cancel(&"admin"));
        assert!(sessions.complete(&"admin").is_err());
    }
}
