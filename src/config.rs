//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `FEE_REMINDER__SECTION__KEY` environment variables.

use crate::domain::payment::BillingMonth;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub reminders: ReminderPolicy,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// How obligations are dated.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Day of the billing month a payment falls due. Clamped to the
    /// month's length, so 31 means "last day of the month".
    #[serde(default = "default_due_day")]
    pub due_day: u32,
}

fn default_due_day() -> u32 {
    10
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            due_day: default_due_day(),
        }
    }
}

impl BillingConfig {
    pub fn due_date(&self, month: &BillingMonth) -> NaiveDate {
        month.day(self.due_day)
    }
}

/// Which unpaid payments get an automatic reminder.
///
/// A payment qualifies once its due date is at most `days_before_due` days
/// away. Payments already past due qualify only when `include_overdue` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderPolicy {
    #[serde(default = "default_days_before_due")]
    pub days_before_due: i64,
    #[serde(default = "default_include_overdue")]
    pub include_overdue: bool,
}

fn default_days_before_due() -> i64 {
    5
}

fn default_include_overdue() -> bool {
    true
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            days_before_due: default_days_before_due(),
            include_overdue: default_include_overdue(),
        }
    }
}

impl ReminderPolicy {
    pub fn is_due(&self, due_date: NaiveDate, today: NaiveDate) -> bool {
        let days_left = (due_date - today).num_days();
        if days_left < 0 {
            self.include_overdue
        } else {
            days_left <= self.days_before_due
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of sends in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// A send that takes longer than this counts as failed.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl AppConfig {
    /// Loads configuration from `path` (or `config/default.toml` when it
    /// exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder.add_source(::config::File::with_name("config/default").required(false)),
        };
        let config = builder
            .add_source(::config::Environment::with_prefix("FEE_REMINDER").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
