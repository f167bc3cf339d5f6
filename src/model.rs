use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage layout for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Days between borrow and due date.
pub const LOAN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Borrowed,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
        }
    }

    /// Position along the lifecycle; matches the `CASE` ranking used in SQL.
    pub fn rank(&self) -> i64 {
        match self {
            BorrowStatus::Pending => 0,
            BorrowStatus::Borrowed => 1,
            BorrowStatus::Returned => 2,
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BorrowStatus::Pending),
            "borrowed" => Some(BorrowStatus::Borrowed),
            "returned" => Some(BorrowStatus::Returned),
            _ => None,
        }
    }
}

/// One persisted row: a single book inside a borrow transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BorrowRecord {
    pub transaction_id: String,
    pub book_id: i64,
    pub student_id: i64,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
}

/// Transaction-shaped view rebuilt from one or more [`BorrowRecord`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BorrowTransaction {
    pub transaction_id: String,
    pub student_id: i64,
    pub book_ids: Vec<i64>,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
}

impl From<BorrowRecord> for BorrowTransaction {
    fn from(rec: BorrowRecord) -> Self {
        Self {
            transaction_id: rec.transaction_id,
            student_id: rec.student_id,
            book_ids: vec![rec.book_id],
            borrow_date: rec.borrow_date,
            due_date: rec.due_date,
            return_date: rec.return_date,
            status: rec.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub npm: String,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTier {
    Reminder,
    #[serde(rename = "escalation_24h")]
    Escalation24h,
    #[serde(rename = "escalation_48h")]
    Escalation48h,
    #[serde(rename = "escalation_72h")]
    Escalation72h,
}

impl NotificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTier::Reminder => "reminder",
            NotificationTier::Escalation24h => "escalation_24h",
            NotificationTier::Escalation48h => "escalation_48h",
            NotificationTier::Escalation72h => "escalation_72h",
        }
    }
}

/// Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub transaction_id: String,
    pub book_ids: Vec<i64>,
    pub due_date: DateTime<Utc>,
    pub message: String,
    pub tier: NotificationTier,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
