use super::{Pool, UnitOfWork};
use crate::error::{BorrowError, BorrowResult};
use crate::model::{format_timestamp, parse_timestamp, BorrowRecord, BorrowStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

const SELECT_RECORD: &str = "SELECT transaction_id, book_id, student_id, borrow_date, due_date, return_date, status FROM borrows";

#[instrument(skip_all, fields(transaction_id = %record.transaction_id, book_id = record.book_id))]
pub async fn insert_record(uow: &mut UnitOfWork<'_>, record: &BorrowRecord) -> BorrowResult<()> {
    sqlx::query(
        "INSERT INTO borrows (transaction_id, book_id, student_id, borrow_date, due_date, return_date, status) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.transaction_id)
    .bind(record.book_id)
    .bind(record.student_id)
    .bind(format_timestamp(&record.borrow_date))
    .bind(format_timestamp(&record.due_date))
    .bind(record.return_date.as_ref().map(format_timestamp))
    .bind(record.status.as_str())
    .execute(&mut **uow)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn find_by_transaction_id(pool: &Pool, transaction_id: &str) -> BorrowResult<Vec<BorrowRecord>> {
    let rows = sqlx::query(&format!("{SELECT_RECORD} WHERE transaction_id = ? ORDER BY id"))
        .bind(transaction_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

#[instrument(skip_all)]
pub async fn find_by_student_id(pool: &Pool, student_id: i64) -> BorrowResult<Vec<BorrowRecord>> {
    let rows = sqlx::query(&format!("{SELECT_RECORD} WHERE student_id = ? ORDER BY id"))
        .bind(student_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

#[instrument(skip_all)]
pub async fn find_by_book_id(pool: &Pool, book_id: i64) -> BorrowResult<Vec<BorrowRecord>> {
    let rows = sqlx::query(&format!("{SELECT_RECORD} WHERE book_id = ? ORDER BY id"))
        .bind(book_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

#[instrument(skip_all)]
pub async fn find_all(pool: &Pool) -> BorrowResult<Vec<BorrowRecord>> {
    let rows = sqlx::query(&format!("{SELECT_RECORD} ORDER BY id"))
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

/// Transaction IDs that still have a borrowed, unreturned row, in creation order.
/// Reads only text columns so a corrupt timestamp cannot fail the listing.
#[instrument(skip_all)]
pub async fn find_open_transaction_ids(pool: &Pool) -> BorrowResult<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT transaction_id FROM borrows WHERE status = 'borrowed' AND return_date IS NULL GROUP BY transaction_id ORDER BY MIN(id)",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[instrument(skip_all)]
pub async fn is_book_on_loan(pool: &Pool, book_id: i64) -> BorrowResult<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM borrows WHERE book_id = ? AND status != 'returned' LIMIT 1",
    )
    .bind(book_id)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// Update the single `(transaction_id, book_id)` row. No matching row is `NotFound`.
///
/// With `forward_only`, the row is only touched while its current status does
/// not rank above `status`; check and write are one statement.
#[instrument(skip_all, fields(%transaction_id, book_id = book_id, status = status.as_str()))]
pub async fn update_status(
    uow: &mut UnitOfWork<'_>,
    transaction_id: &str,
    book_id: i64,
    status: BorrowStatus,
    return_date: Option<DateTime<Utc>>,
    forward_only: bool,
) -> BorrowResult<()> {
    let res = sqlx::query(
        "UPDATE borrows SET status = ?, return_date = ? WHERE transaction_id = ? AND book_id = ? \
         AND (? = 0 OR CASE status WHEN 'pending' THEN 0 WHEN 'borrowed' THEN 1 ELSE 2 END <= ?)",
    )
    .bind(status.as_str())
    .bind(return_date.as_ref().map(format_timestamp))
    .bind(transaction_id)
    .bind(book_id)
    .bind(forward_only)
    .bind(status.rank())
    .execute(&mut **uow)
    .await?;
    if res.rows_affected() > 0 {
        return Ok(());
    }

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM borrows WHERE transaction_id = ? AND book_id = ?")
            .bind(transaction_id)
            .bind(book_id)
            .fetch_optional(&mut **uow)
            .await?;
    match current {
        None => Err(BorrowError::not_found(format!(
            "book {} is not part of transaction {}",
            book_id, transaction_id
        ))),
        Some(current) => Err(BorrowError::validation(format!(
            "cannot move book {} from {} back to {}",
            book_id,
            current,
            status.as_str()
        ))),
    }
}

fn record_from_row(row: &SqliteRow) -> BorrowResult<BorrowRecord> {
    let transaction_id: String = row.try_get("transaction_id")?;
    let timestamp = |column: &str| -> BorrowResult<DateTime<Utc>> {
        let raw: String = row.try_get(column)?;
        parse_timestamp(&raw).ok_or_else(|| {
            BorrowError::internal(format!(
                "transaction {} has unparsable {} '{}'",
                transaction_id, column, raw
            ))
        })
    };
    let borrow_date = timestamp("borrow_date")?;
    let due_date = timestamp("due_date")?;
    let return_date = match row.try_get::<Option<String>, _>("return_date")? {
        Some(raw) if !raw.trim().is_empty() => Some(parse_timestamp(&raw).ok_or_else(|| {
            BorrowError::internal(format!(
                "transaction {} has unparsable return_date '{}'",
                transaction_id, raw
            ))
        })?),
        _ => None,
    };
    let status_str: String = row.try_get("status")?;
    let status = BorrowStatus::parse_status(&status_str).ok_or_else(|| {
        BorrowError::internal(format!(
            "transaction {} has unknown status {}",
            transaction_id, status_str
        ))
    })?;

    Ok(BorrowRecord {
        book_id: row.try_get("book_id")?,
        student_id: row.try_get("student_id")?,
        transaction_id,
        borrow_date,
        due_date,
        return_date,
        status,
    })
}
