use super::directory::{ChatAddress, Grade, Parent, PaymentId, School};
use super::payment::Payment;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Correlation id carried by a reminder so the recipient can answer it.
///
/// Rendered as `payment_<id>` for "I have paid" and `receipt_<id>` for a
/// receipt confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionToken {
    ConfirmPayment(PaymentId),
    ConfirmReceipt(PaymentId),
}

impl ActionToken {
    pub fn payment_id(&self) -> PaymentId {
        match self {
            Self::ConfirmPayment(id) | Self::ConfirmReceipt(id) => *id,
        }
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmPayment(id) => write!(f, "payment_{}", id),
            Self::ConfirmReceipt(id) => write!(f, "receipt_{}", id),
        }
    }
}

impl FromStr for ActionToken {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PaymentError::ValidationError(format!("Unknown action token '{}'", s));
        let (kind, id) = s.split_once('_').ok_or_else(invalid)?;
        let id = PaymentId(id.parse().map_err(|_| invalid())?);
        match kind {
            "payment" => Ok(Self::ConfirmPayment(id)),
            "receipt" => Ok(Self::ConfirmReceipt(id)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ActionToken {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionToken> for String {
    fn from(token: ActionToken) -> Self {
        token.to_string()
    }
}

/// A rendered payment reminder addressed to one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub recipient: ChatAddress,
    pub text: String,
    pub action: ActionToken,
}

impl ReminderMessage {
    pub fn compose(
        recipient: ChatAddress,
        parent: &Parent,
        grade: &Grade,
        school: &School,
        payment: &Payment,
    ) -> Self {
        let text = format!(
            "💳 Напоминание об оплате\n\n\
             Уважаемый(ая) {name}!\n\n\
             Напоминаем об оплате занятий за {month}:\n\
             🏫 {school}\n\
             📚 {grade}\n\
             👶 {child}\n\
             💳 Сумма: {amount} руб.\n\
             📅 Срок оплаты: {due}\n\n\
             После оплаты нажмите кнопку \"✅ Оплатил\".",
            name = parent.display_name(),
            month = payment.month(),
            school = school.name,
            grade = grade.name,
            child = parent.child_name,
            amount = payment.amount(),
            due = payment.due_date().format("%d.%m.%Y"),
        );
        Self {
            recipient,
            text,
            action: ActionToken::ConfirmPayment(payment.id()),
        }
    }
}
