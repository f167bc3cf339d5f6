//! Due-date evaluation: per-account reminders and the system-wide
//! escalation sweep. Evaluation is read-only; delivery lives in [`dispatch`].

pub mod dispatch;

use crate::aggregate::aggregate;
use crate::clock::Clock;
use crate::db::lookup::{AccountLookup, StudentLookup};
use crate::db::{store, Pool};
use crate::error::{BorrowError, BorrowResult};
use crate::model::{
    format_timestamp, BorrowStatus, BorrowTransaction, NotificationEvent, NotificationTier,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const HOUR_SECS: i64 = 60 * 60;

/// A reminder fires while the due date is less than this far ahead.
pub const REMINDER_WINDOW_SECS: i64 = 24 * HOUR_SECS;

/// Each escalation tier is a single-shot band this wide (0.06 h); a sweep
/// slower than this can step over a band entirely.
pub const ESCALATION_BAND_SECS: i64 = 216;

const ESCALATION_TIERS: [(i64, NotificationTier); 3] = [
    (24 * HOUR_SECS, NotificationTier::Escalation24h),
    (48 * HOUR_SECS, NotificationTier::Escalation48h),
    (72 * HOUR_SECS, NotificationTier::Escalation72h),
];

/// Reminder for a transaction due within the next 24 hours.
pub fn reminder_for(tx: &BorrowTransaction, now: DateTime<Utc>) -> Option<NotificationEvent> {
    if tx.status == BorrowStatus::Returned || tx.return_date.is_some() {
        return None;
    }
    let remaining = tx.due_date.timestamp() - now.timestamp();
    if remaining <= 0 || remaining >= REMINDER_WINDOW_SECS {
        return None;
    }
    Some(event(tx, NotificationTier::Reminder))
}

/// Escalation for a borrowed, unreturned transaction sitting inside one of
/// the overdue bands. Nothing is emitted between bands.
pub fn escalation_for(tx: &BorrowTransaction, now: DateTime<Utc>) -> Option<NotificationEvent> {
    if tx.status != BorrowStatus::Borrowed || tx.return_date.is_some() {
        return None;
    }
    let overdue = now.timestamp() - tx.due_date.timestamp();
    ESCALATION_TIERS
        .iter()
        .find(|(start, _)| overdue >= *start && overdue < start + ESCALATION_BAND_SECS)
        .map(|(_, tier)| event(tx, *tier))
}

fn event(tx: &BorrowTransaction, tier: NotificationTier) -> NotificationEvent {
    NotificationEvent {
        transaction_id: tx.transaction_id.clone(),
        book_ids: tx.book_ids.clone(),
        due_date: tx.due_date,
        message: message_for(tier, &format_timestamp(&tx.due_date)),
        tier,
    }
}

fn message_for(tier: NotificationTier, due: &str) -> String {
    match tier {
        NotificationTier::Reminder => {
            format!("Please return the book to the library before {}", due)
        }
        NotificationTier::Escalation24h => format!(
            "Your borrowed book passed its return deadline of {} one day ago. Please return it to the library.",
            due
        ),
        NotificationTier::Escalation48h => format!(
            "Please return the book: it is now two days past the return deadline of {}.",
            due
        ),
        NotificationTier::Escalation72h => format!(
            "Warning! Three days have passed since the return deadline of {}. Return the book immediately.",
            due
        ),
    }
}

#[derive(Clone)]
pub struct NotificationService {
    pool: Pool,
    accounts: Arc<dyn AccountLookup>,
    students: Arc<dyn StudentLookup>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(
        pool: Pool,
        accounts: Arc<dyn AccountLookup>,
        students: Arc<dyn StudentLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            accounts,
            students,
            clock,
        }
    }

    /// Reminders for every transaction of the account's student that falls
    /// due within the next 24 hours. Returned books are dropped first, so a
    /// partially returned transaction is reminded about what is still out.
    /// A corrupt row aborts the whole call.
    #[instrument(skip(self))]
    pub async fn notifications_for_account(&self, account_id: i64) -> BorrowResult<Vec<NotificationEvent>> {
        if !self.accounts.exists_by_id(account_id).await? {
            return Err(BorrowError::validation(format!(
                "account not found: {}",
                account_id
            )));
        }
        let student = self
            .students
            .by_account_id(account_id)
            .await?
            .ok_or_else(|| {
                BorrowError::validation(format!("student not found for account {}", account_id))
            })?;

        let records = store::find_by_student_id(&self.pool, student.id).await?;
        let now = self.clock.now();
        let outstanding = records
            .into_iter()
            .filter(|r| r.status != BorrowStatus::Returned && r.return_date.is_none());
        let events: Vec<NotificationEvent> = aggregate(outstanding)
            .iter()
            .filter_map(|tx| reminder_for(tx, now))
            .collect();
        debug!(student_id = student.id, events = events.len(), "reminders evaluated");
        Ok(events)
    }

    /// Evaluate every open transaction against the escalation bands.
    ///
    /// Only the still-outstanding books of a transaction are considered. A
    /// transaction that fails to load (e.g. an unparsable due date) is logged
    /// and skipped; the rest of the sweep carries on.
    #[instrument(skip(self))]
    pub async fn run_escalation_sweep(&self) -> BorrowResult<Vec<NotificationEvent>> {
        let ids = store::find_open_transaction_ids(&self.pool).await?;
        let now = self.clock.now();
        let mut events = Vec::new();
        let mut failures = 0usize;

        for id in &ids {
            let records = match store::find_by_transaction_id(&self.pool, id).await {
                Ok(records) => records,
                Err(err) => {
                    failures += 1;
                    warn!(%err, transaction_id = %id, "skipping transaction in escalation sweep");
                    continue;
                }
            };
            let outstanding = records
                .into_iter()
                .filter(|r| r.status == BorrowStatus::Borrowed && r.return_date.is_none());
            for tx in aggregate(outstanding) {
                if let Some(ev) = escalation_for(&tx, now) {
                    events.push(ev);
                }
            }
        }

        info!(
            open = ids.len(),
            events = events.len(),
            failures,
            "escalation sweep finished"
        );
        Ok(events)
    }
}
