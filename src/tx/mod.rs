//! Transactions, cursors and named sub-databases (C3/C4/C5).

mod cursor;
mod database;
mod kind;
mod transaction;

pub use cursor::Cursor;
pub use database::Database;
pub use kind::{Ro, Rw, TransactionKind, WriteMarker};
pub use transaction::Transaction;
