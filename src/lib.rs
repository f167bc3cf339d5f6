//! Borrow transaction lifecycle and overdue-notification engine for a
//! library backend.
//!
//! A borrow *transaction* groups one or more books checked out together by a
//! student. It is stored as one `borrows` row per book and rebuilt into a
//! transaction view on read. [`borrow::BorrowService`] owns creation and
//! status changes; [`notify::NotificationService`] evaluates due dates into
//! reminders and overdue escalations, which [`sweeper`] dispatches on a timer.

pub mod aggregate;
pub mod borrow;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod sweeper;

pub use error::{BorrowError, BorrowResult};
