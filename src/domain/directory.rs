use super::payment::Amount;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(SchoolId);
id_type!(GradeId);
id_type!(ParentId);
id_type!(
    /// Store-allocated payment identifier, also embedded in action tokens.
    PaymentId
);

/// Opaque address of a chat recipient. The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatAddress(String);

impl ChatAddress {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PaymentError::ValidationError(
                "Chat address must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChatAddress {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ChatAddress> for String {
    fn from(address: ChatAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
}

/// A class within a school and the fee charged for it each month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub school_id: SchoolId,
    pub name: String,
    pub monthly_payment: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: ParentId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub child_name: String,
    pub grade_id: Option<GradeId>,
    pub phone_number: Option<String>,
    pub chat_address: Option<ChatAddress>,
    pub active: bool,
}

impl Parent {
    /// Name used when addressing the parent: first name plus last name when known.
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn can_be_notified(&self) -> bool {
        self.active && self.chat_address.is_some()
    }
}

/// Parent data before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParent {
    pub first_name: String,
    pub last_name: Option<String>,
    pub child_name: String,
    pub grade_id: Option<GradeId>,
    pub phone_number: Option<String>,
    pub chat_address: Option<ChatAddress>,
}

impl NewParent {
    pub fn new(first_name: impl Into<String>, child_name: impl Into<String>) -> Result<Self> {
        let first_name = non_empty(first_name.into(), "First name")?;
        let child_name = non_empty(child_name.into(), "Child name")?;
        Ok(Self {
            first_name,
            last_name: None,
            child_name,
            grade_id: None,
            phone_number: None,
            chat_address: None,
        })
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = optional(last_name.into());
        self
    }

    pub fn with_grade(mut self, grade_id: GradeId) -> Self {
        self.grade_id = Some(grade_id);
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = optional(phone.into());
        self
    }

    pub fn with_chat_address(mut self, address: ChatAddress) -> Self {
        self.chat_address = Some(address);
        self
    }

    pub fn into_parent(self, id: ParentId) -> Parent {
        Parent {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            child_name: self.child_name,
            grade_id: self.grade_id,
            phone_number: self.phone_number,
            chat_address: self.chat_address,
            active: true,
        }
    }
}

fn non_empty(value: String, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(PaymentError::ValidationError(format!(
            "{} must not be empty",
            field
        )))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_address_rejects_blank() {
        assert!(ChatAddress::new("  ").is_err());
        assert_eq!(ChatAddress::new(" 42 ").unwrap().as_str(), "42");
    }

    #[test]
    fn test_new_parent_requires_names() {
        assert!(matches!(
            NewParent::new("", "Маша"),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(NewParent::new("Анна", " ").is_err());
    }

    #[test]
    fn test_display_name() {
        let parent = NewParent::new("Анна", "Маша")
            .unwrap()
            .with_last_name("Иванова")
            .into_parent(ParentId(1));
        assert_eq!(parent.display_name(), "Анна Иванова");
        assert!(parent.active);
        assert!(!parent.can_be_notified());

        let parent = NewParent::new("Олег", "Петя")
            .unwrap()
            .with_last_name("")
            .into_parent(ParentId(2));
        assert_eq!(parent.display_name(), "Олег");
    }
}
