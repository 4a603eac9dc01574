//! # Storage backend contracts.
//!
//! This module defines the interface contracts the engine's database backends implement.
//!
//! * [`CanteenDatabase`] is the mutation surface: every method is one atomic unit spanning the
//!   order or submission record, the student's cached balance, and any ledger entry the operation
//!   creates. No intermediate state is ever visible to other connections.
//! * [`AccountManagement`] is the query surface: students, shops, orders, status history, and the
//!   partitioned wallet ledger.
//! * [`ShopAnalytics`] provides read-only rollups over completed orders.
mod account_management;
mod analytics;
mod canteen_database;
mod data_objects;

pub use account_management::{AccountApiError, AccountManagement};
pub use analytics::ShopAnalytics;
pub use canteen_database::{CanteenDatabase, CanteenDbError};
pub use data_objects::{BalanceReconciliation, DailySales, OrderTransition, SalesSummary, SettledSubmission};
