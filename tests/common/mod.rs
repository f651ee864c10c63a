#![allow(dead_code)]

use async_trait::async_trait;
use fee_reminder::domain::directory::{ChatAddress, Grade, NewParent, Parent};
use fee_reminder::domain::notification::ActionToken;
use fee_reminder::domain::payment::Amount;
use fee_reminder::domain::ports::{DirectoryStore, DirectoryStoreRef, NotificationTransport};
use fee_reminder::error::DeliveryError;
use fee_reminder::infrastructure::in_memory::InMemoryDirectoryStore;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A directory with one school and one grade at `fee`.
pub async fn directory_with_grade(fee: Decimal) -> (DirectoryStoreRef, Grade) {
    let directory: DirectoryStoreRef = Arc::new(InMemoryDirectoryStore::new());
    let school = directory.insert_school("Школа №5".to_string()).await.unwrap();
    let grade = directory
        .insert_grade(school.id, "5 класс".to_string(), Amount::new(fee).unwrap())
        .await
        .unwrap();
    (directory, grade)
}

/// Enrolls `count` reachable parents in `grade`, with chat addresses
/// `1001`, `1002` and so on.
pub async fn enroll_parents(directory: &dyn DirectoryStore, grade: &Grade, count: usize) -> Vec<Parent> {
    let mut parents = Vec::with_capacity(count);
    for i in 1..=count {
        let parent = NewParent::new(format!("Родитель {}", i), format!("Ребёнок {}", i))
            .unwrap()
            .with_grade(grade.id)
            .with_chat_address(ChatAddress::new(format!("{}", 1000 + i)).unwrap());
        parents.push(directory.insert_parent(parent).await.unwrap());
    }
    parents
}

/// Transport that records every attempt and fails for chosen recipients.
#[derive(Default)]
pub struct RecordingTransport {
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn failing_for(recipients: impl IntoIterator<Item = String>) -> Self {
        Self {
            failing: recipients.into_iter().collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send_message(
        &self,
        recipient: &ChatAddress,
        _text: &str,
        _action: &ActionToken,
    ) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(recipient.to_string());
        if self.failing.contains(recipient.as_str()) {
            return Err(DeliveryError::Transport("chat unavailable".to_string()));
        }
        Ok(())
    }
}
