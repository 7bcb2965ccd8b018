//! Database access for the reconciliation engine
//!
//! Functions take any SQLite executor so the same query runs against the pool
//! or inside a caller's transaction (`&mut *tx`).

pub mod accounts;
pub mod ledger;
pub mod leases;
pub mod orphans;
pub mod tracks;
