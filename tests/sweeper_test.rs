use anyhow::{anyhow, Result};
use borrowdesk::borrow::BorrowService;
use borrowdesk::clock::FixedClock;
use borrowdesk::config::BorrowPolicy;
use borrowdesk::db::lookup::SqlCatalog;
use borrowdesk::model::{NotificationEvent, NotificationTier};
use borrowdesk::notify::dispatch::Notifier;
use borrowdesk::notify::NotificationService;
use borrowdesk::sweeper;
use chrono::{Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio::sync::Mutex;

async fn setup() -> (BorrowService, NotificationService, Arc<FixedClock>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    sqlx::query("INSERT INTO students (id, name, npm) VALUES (7, 'Ana', '5001')")
        .execute(&pool)
        .await
        .unwrap();
    for id in [101, 102] {
        sqlx::query("INSERT INTO books (id, title) VALUES (?, 'A Book')")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
    }

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    let catalog = Arc::new(SqlCatalog::new(pool.clone()));
    let borrows = BorrowService::new(
        pool.clone(),
        catalog.clone(),
        catalog.clone(),
        clock.clone(),
        BorrowPolicy::default(),
    );
    let notifications = NotificationService::new(pool, catalog.clone(), catalog, clock.clone());
    (borrows, notifications, clock)
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    seen: Arc<Mutex<Vec<NotificationEvent>>>,
    fail_tier: Option<NotificationTier>,
}

impl RecordingNotifier {
    async fn seen(&self) -> Vec<NotificationEvent> {
        self.seen.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<()> {
        if self.fail_tier == Some(event.tier) {
            return Err(anyhow!("relay unavailable"));
        }
        self.seen.lock().await.push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn sweep_once_dispatches_escalations() {
    let (borrows, notifications, clock) = setup().await;
    let a = borrows.create(7, &[101]).await.unwrap();
    clock.advance(Duration::hours(24));
    let b = borrows.create(7, &[102]).await.unwrap();

    // a is 48h overdue, b is 24h overdue
    clock.set(b.due_date + Duration::hours(24));
    let notifier = RecordingNotifier::default();
    let delivered = sweeper::sweep_once(&notifications, &notifier).await.unwrap();
    assert_eq!(delivered, 2);

    let seen = notifier.seen().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].transaction_id, a.transaction_id);
    assert_eq!(seen[0].tier, NotificationTier::Escalation48h);
    assert_eq!(seen[1].transaction_id, b.transaction_id);
    assert_eq!(seen[1].tier, NotificationTier::Escalation24h);
}

#[tokio::test]
async fn dispatch_failure_does_not_stop_delivery() {
    let (borrows, notifications, clock) = setup().await;
    borrows.create(7, &[101]).await.unwrap();
    clock.advance(Duration::hours(24));
    let b = borrows.create(7, &[102]).await.unwrap();
    clock.set(b.due_date + Duration::hours(24));

    let notifier = RecordingNotifier {
        fail_tier: Some(NotificationTier::Escalation48h),
        ..Default::default()
    };
    let delivered = sweeper::sweep_once(&notifications, &notifier).await.unwrap();
    assert_eq!(delivered, 1);
    let seen = notifier.seen().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].transaction_id, b.transaction_id);
}

#[tokio::test]
async fn nothing_due_means_nothing_sent() {
    let (borrows, notifications, _clock) = setup().await;
    borrows.create(7, &[101, 102]).await.unwrap();
    let notifier = RecordingNotifier::default();
    assert_eq!(sweeper::sweep_once(&notifications, &notifier).await.unwrap(), 0);
    assert!(notifier.seen().await.is_empty());
}

#[tokio::test]
async fn run_sweeps_until_shutdown() {
    let (borrows, notifications, clock) = setup().await;
    let tx = borrows.create(7, &[101]).await.unwrap();
    clock.set(tx.due_date + Duration::hours(72));

    let notifier = RecordingNotifier::default();
    sweeper::run(
        &notifications,
        &notifier,
        std::time::Duration::from_millis(20),
        std::time::Duration::from_secs(5),
        tokio::time::sleep(std::time::Duration::from_millis(150)),
    )
    .await;

    // the clock is frozen, so every tick re-emits the same band
    let seen = notifier.seen().await;
    assert!(seen.len() >= 2, "only {} sweeps ran", seen.len());
    assert!(seen
        .iter()
        .all(|e| e.transaction_id == tx.transaction_id && e.tier == NotificationTier::Escalation72h));
}
