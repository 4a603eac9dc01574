//! Canteen Engine
//!
//! The core order and wallet machinery of the campus canteen backend. Students place orders
//! against shop catalogs and pay from a prepaid wallet; shop staff drive orders through a
//! fulfilment pipeline gated by a pickup credential; administrators fan out ad-hoc billing
//! events. This library owns the parts with real invariants — the order state machine, the
//! calendar-month-partitioned wallet ledger, and the atomic coupling between the two — and is
//! transport-agnostic: the HTTP layer, authentication and push delivery live elsewhere.
//!
//! The library is divided into two main sections:
//! 1. Storage backends behind the traits in [`mod@traits`] ([`CanteenDatabase`] for atomic
//!    mutations, [`AccountManagement`] and [`ShopAnalytics`] for queries). SQLite is the bundled
//!    backend; you should never need to reach past the traits, apart from the data types in
//!    [`db_types`], which are public.
//! 2. The public API objects ([`OrderFlowApi`], [`WalletApi`], [`BillingApi`],
//!    [`ShopAnalyticsApi`]). These add capability checks, the retry-once conflict policy and
//!    event publication on top of a backend. Construct each once at startup and inject it where
//!    it is needed.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]): new
//! order, status changed, order ready, order cancelled. Handlers are async hooks registered at
//! startup; delivery is best-effort and strictly after commit.
pub mod access;
pub mod db_types;
pub mod events;
pub mod helpers;

mod api;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    analytics_api::ShopAnalyticsApi,
    billing_api::BillingApi,
    ledger_objects,
    order_flow_api::OrderFlowApi,
    order_objects,
    wallet_api::WalletApi,
};
pub use traits::{
    AccountApiError,
    AccountManagement,
    BalanceReconciliation,
    CanteenDatabase,
    CanteenDbError,
    DailySales,
    OrderTransition,
    SalesSummary,
    SettledSubmission,
    ShopAnalytics,
};
