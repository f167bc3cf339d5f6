//! Rebuilds transaction-shaped views from per-book borrow rows.
use crate::model::{BorrowRecord, BorrowTransaction};
use std::collections::HashMap;

/// Group records by `transaction_id`.
///
/// Groups come out in the order their first record was seen, and each
/// group's book IDs keep first-seen order without duplicates. Scalar fields
/// (dates, status) are taken from the first record of the group.
pub fn aggregate<I>(records: I) -> Vec<BorrowTransaction>
where
    I: IntoIterator<Item = BorrowRecord>,
{
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<BorrowTransaction> = Vec::new();

    for rec in records {
        match slots.get(&rec.transaction_id) {
            Some(&idx) => {
                let view = &mut out[idx];
                if !view.book_ids.contains(&rec.book_id) {
                    view.book_ids.push(rec.book_id);
                }
            }
            None => {
                slots.insert(rec.transaction_id.clone(), out.len());
                out.push(BorrowTransaction::from(rec));
            }
        }
    }
    out
}
