//! Borrow lifecycle: creating multi-book transactions, moving individual
//! books through `pending → borrowed → returned`, and the query surface.
use crate::aggregate::aggregate;
use crate::clock::Clock;
use crate::config::BorrowPolicy;
use crate::db::lookup::{BookLookup, StudentLookup};
use crate::db::{store, Pool};
use crate::error::{BorrowError, BorrowResult};
use crate::model::{BorrowRecord, BorrowStatus, BorrowTransaction, LOAN_DAYS};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct BorrowService {
    pool: Pool,
    books: Arc<dyn BookLookup>,
    students: Arc<dyn StudentLookup>,
    clock: Arc<dyn Clock>,
    policy: BorrowPolicy,
}

impl BorrowService {
    pub fn new(
        pool: Pool,
        books: Arc<dyn BookLookup>,
        students: Arc<dyn StudentLookup>,
        clock: Arc<dyn Clock>,
        policy: BorrowPolicy,
    ) -> Self {
        Self {
            pool,
            books,
            students,
            clock,
            policy,
        }
    }

    /// Create one transaction covering every book in `book_ids`.
    ///
    /// All references are validated before anything is written; the rows are
    /// then inserted in a single unit of work, so either every book is
    /// recorded or none is.
    #[instrument(skip(self, book_ids), fields(books = book_ids.len()))]
    pub async fn create(&self, student_id: i64, book_ids: &[i64]) -> BorrowResult<BorrowTransaction> {
        if book_ids.is_empty() {
            return Err(BorrowError::validation("at least one book is required"));
        }
        for (idx, book_id) in book_ids.iter().enumerate() {
            if book_ids[..idx].contains(book_id) {
                return Err(BorrowError::validation(format!(
                    "book {} listed more than once",
                    book_id
                )));
            }
            if !self.books.exists_by_id(*book_id).await? {
                return Err(BorrowError::validation(format!("book not found: {}", book_id)));
            }
        }
        if !self.students.exists_by_id(student_id).await? {
            return Err(BorrowError::validation(format!(
                "student not found: {}",
                student_id
            )));
        }
        if self.policy.reject_books_on_loan {
            for book_id in book_ids {
                if store::is_book_on_loan(&self.pool, *book_id).await? {
                    return Err(BorrowError::validation(format!(
                        "book already on loan: {}",
                        book_id
                    )));
                }
            }
        }

        let transaction_id = Uuid::new_v4().to_string();
        let borrow_date = self.clock.now().trunc_subsecs(0);
        let due_date = borrow_date + Duration::days(LOAN_DAYS);
        let records: Vec<BorrowRecord> = book_ids
            .iter()
            .map(|&book_id| BorrowRecord {
                transaction_id: transaction_id.clone(),
                book_id,
                student_id,
                borrow_date,
                due_date,
                return_date: None,
                status: self.policy.initial_status,
            })
            .collect();

        let mut uow = self.pool.begin().await?;
        for rec in &records {
            store::insert_record(&mut uow, rec).await?;
        }
        uow.commit().await?;

        info!(%transaction_id, student_id, books = records.len(), "borrow created");
        aggregate(records)
            .into_iter()
            .next()
            .ok_or_else(|| BorrowError::internal("created transaction produced no view"))
    }

    /// Move one book of a transaction to `new_status`.
    ///
    /// `returned` requires `return_date`; other statuses must not carry one.
    /// With `strict_transitions`, moving backwards in the lifecycle is rejected.
    #[instrument(skip(self, return_date))]
    pub async fn update_status(
        &self,
        transaction_id: &str,
        book_id: i64,
        new_status: &str,
        return_date: Option<DateTime<Utc>>,
    ) -> BorrowResult<()> {
        let records = store::find_by_transaction_id(&self.pool, transaction_id).await?;
        if records.is_empty() {
            return Err(BorrowError::not_found(format!(
                "transaction {} not found",
                transaction_id
            )));
        }

        let status = BorrowStatus::parse_status(new_status.trim()).ok_or_else(|| {
            BorrowError::validation(format!(
                "invalid status '{}': expected pending, borrowed or returned",
                new_status
            ))
        })?;
        let return_date = match (status, return_date) {
            (BorrowStatus::Returned, None) => {
                return Err(BorrowError::validation(
                    "return_date is required when status is returned",
                ))
            }
            (BorrowStatus::Returned, Some(at)) => Some(at.trunc_subsecs(0)),
            (_, Some(_)) => {
                return Err(BorrowError::validation(
                    "return_date is only allowed when status is returned",
                ))
            }
            (_, None) => None,
        };

        let current = records
            .iter()
            .find(|r| r.book_id == book_id)
            .ok_or_else(|| {
                BorrowError::not_found(format!(
                    "book {} is not part of transaction {}",
                    book_id, transaction_id
                ))
            })?;
        // Early answer for the common case; the store re-checks atomically.
        if self.policy.strict_transitions && status < current.status {
            return Err(BorrowError::validation(format!(
                "cannot move book {} from {} back to {}",
                book_id,
                current.status.as_str(),
                status.as_str()
            )));
        }

        let mut uow = self.pool.begin().await?;
        store::update_status(
            &mut uow,
            transaction_id,
            book_id,
            status,
            return_date,
            self.policy.strict_transitions,
        )
        .await?;
        uow.commit().await?;

        info!(transaction_id, book_id, status = status.as_str(), "borrow status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn by_transaction_id(&self, transaction_id: &str) -> BorrowResult<BorrowTransaction> {
        let records = store::find_by_transaction_id(&self.pool, transaction_id).await?;
        aggregate(records).into_iter().next().ok_or_else(|| {
            BorrowError::not_found(format!("transaction {} not found", transaction_id))
        })
    }

    /// The individual per-book rows of one transaction, each with its own status.
    #[instrument(skip(self))]
    pub async fn records_for_transaction(&self, transaction_id: &str) -> BorrowResult<Vec<BorrowRecord>> {
        let records = store::find_by_transaction_id(&self.pool, transaction_id).await?;
        if records.is_empty() {
            return Err(BorrowError::not_found(format!(
                "transaction {} not found",
                transaction_id
            )));
        }
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn by_student_id(&self, student_id: i64) -> BorrowResult<Vec<BorrowTransaction>> {
        let records = store::find_by_student_id(&self.pool, student_id).await?;
        Ok(aggregate(records))
    }

    /// Every historical borrow of one book, one entry per event.
    #[instrument(skip(self))]
    pub async fn by_book_id(&self, book_id: i64) -> BorrowResult<Vec<BorrowTransaction>> {
        let records = store::find_by_book_id(&self.pool, book_id).await?;
        Ok(records.into_iter().map(BorrowTransaction::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn all(&self) -> BorrowResult<Vec<BorrowTransaction>> {
        let records = store::find_all(&self.pool).await?;
        Ok(aggregate(records))
    }
}
