//! The public data types of the canteen engine.
//!
//! These are the records the storage backends persist and the API layer hands out. Identifier
//! newtypes are thin wrappers around strings so they can be bound to queries directly.
use std::{fmt::Display, str::FromStr};

pub use canteen_common::{Money, Secret};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------     StudentId       ---------------------------------------------------------
/// A lightweight wrapper around the student's registration id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct StudentId(pub String);

impl Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for StudentId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl StudentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       ShopId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ShopId(pub String);

impl Display for ShopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for ShopId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl ShopId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     MenuItemId      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MenuItemId(pub String);

impl Display for MenuItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for MenuItemId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl MenuItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      OrderNo        ---------------------------------------------------------
/// The public, human-readable order number: the order date followed by a daily sequence number,
/// e.g. `20260805-0042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Staff => write!(f, "staff"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

//--------------------------------------       Actor         ---------------------------------------------------------
/// The already-authenticated identity performing an operation. The upstream request layer is
/// responsible for authentication; the engine only checks capabilities.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    /// For staff, the shop they are attached to.
    pub shop_id: Option<ShopId>,
}

impl Actor {
    pub fn student<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: Role::Student, shop_id: None }
    }

    pub fn staff<S: Into<String>>(id: S, shop_id: ShopId) -> Self {
        Self { id: id.into(), role: Role::Staff, shop_id: Some(shop_id) }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: Role::Admin, shop_id: None }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins manage every shop; staff manage only their own.
    pub fn manages_shop(&self, shop_id: &ShopId) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Staff => self.shop_id.as_ref() == Some(shop_id),
            Role::Student => false,
        }
    }
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed by the student; the shop has not started on it yet.
    Pending,
    /// The shop has accepted the order and is working on it.
    Preparing,
    /// Ready for pickup; the pickup credential gates the hand-over.
    Ready,
    /// Some, but not all, item lines have been handed over.
    PartiallyDelivered,
    /// All items delivered and the wallet debited.
    Completed,
    /// Cancelled by the owner (while pending) or by shop staff.
    Cancelled,
}

impl OrderStatus {
    /// The order state machine. Orders start at `Pending` and every realized transition must be
    /// one of these edges; `Completed` and `Cancelled` are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Preparing | Cancelled)
                | (Preparing, Ready | Cancelled)
                | (Ready, PartiallyDelivered | Completed | Cancelled)
                | (PartiallyDelivered, Completed | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Preparing => write!(f, "preparing"),
            OrderStatus::Ready => write!(f, "ready"),
            OrderStatus::PartiallyDelivered => write!(f, "partially_delivered"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "partially_delivered" => Ok(Self::PartiallyDelivered),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------    ServiceType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Food,
    Laundry,
    Xerox,
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::Food => write!(f, "food"),
            ServiceType::Laundry => write!(f, "laundry"),
            ServiceType::Xerox => write!(f, "xerox"),
        }
    }
}

/// Service-specific parameters. Food orders carry everything they need in their item lines;
/// laundry and xerox requests are parametrized here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceDetails {
    Food,
    Laundry {
        bag_count: u32,
        instructions: Option<String>,
    },
    Xerox {
        pages: u32,
        copies: u32,
        colour: bool,
    },
}

//--------------------------------------     OrderItem       ---------------------------------------------------------
/// A snapshot of a catalog item at the moment the order was placed. Prices are frozen here;
/// later catalog edits never reach back into an existing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: MenuItemId,
    pub name: String,
    /// The list price at order time.
    pub unit_price: Money,
    /// The active offer price at order time, if there was one.
    pub offer_price: Option<Money>,
    pub quantity: i64,
    /// Effective price (offer if present, else list) times quantity.
    pub subtotal: Money,
    pub image: Option<String>,
    pub delivered: bool,
}

impl OrderItem {
    pub fn effective_price(&self) -> Money {
        self.offer_price.unwrap_or(self.unit_price)
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub student_id: StudentId,
    pub shop_id: ShopId,
    pub service: ServiceType,
    pub details: Option<ServiceDetails>,
    pub items: Vec<OrderItem>,
    /// Sum of the item subtotals, computed once at creation.
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Short code checked against the pickup payload at the counter. Masked in log output.
    pub pickup_code: Secret<String>,
    /// The staff member who last advanced the order.
    pub handled_by: Option<String>,
    pub cancelled_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn all_items_delivered(&self) -> bool {
        self.items.iter().all(|i| i.delivered)
    }
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub student_id: StudentId,
    pub shop_id: ShopId,
    pub service: ServiceType,
    pub details: Option<ServiceDetails>,
    pub lines: Vec<OrderLine>,
    pub notes: Option<String>,
}

/// One requested catalog item with a quantity, before validation and price snapshotting.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub item_id: MenuItemId,
    pub quantity: i64,
}

impl NewOrder {
    pub fn new(student_id: StudentId, shop_id: ShopId, service: ServiceType) -> Self {
        Self { student_id, shop_id, service, details: None, lines: Vec::new(), notes: None }
    }

    pub fn with_line(mut self, item_id: MenuItemId, quantity: i64) -> Self {
        self.lines.push(OrderLine { item_id, quantity });
        self
    }

    pub fn with_details(mut self, details: ServiceDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

//--------------------------------------  OrderStatusChange  ---------------------------------------------------------
/// One row of the order's status history: a realized transition, who drove it, and when.
#[derive(Debug, Clone, FromRow)]
pub struct OrderStatusChange {
    pub id: i64,
    pub order_no: OrderNo,
    /// `None` for the creation row.
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  LedgerEntryType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Credit,
    Debit,
    Refund,
}

impl LedgerEntryType {
    /// Credits and refunds increase the balance, debits decrease it.
    pub fn signed(self, amount: Money) -> Money {
        match self {
            LedgerEntryType::Credit | LedgerEntryType::Refund => amount,
            LedgerEntryType::Debit => -amount,
        }
    }
}

impl Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Credit => write!(f, "credit"),
            LedgerEntryType::Debit => write!(f, "debit"),
            LedgerEntryType::Refund => write!(f, "refund"),
        }
    }
}

impl FromStr for LedgerEntryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "refund" => Ok(Self::Refund),
            s => Err(ConversionError(format!("Invalid ledger entry type: {s}"))),
        }
    }
}

//--------------------------------------    LedgerEntry      ---------------------------------------------------------
/// An immutable record of one wallet balance change, stored in the monthly partition that matches
/// its creation instant.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Row id within the partition. Only unique together with [`LedgerEntry::partition`].
    pub id: i64,
    /// The partition table this entry lives in, e.g. `transactions_2026_08`.
    pub partition: String,
    pub student_id: StudentId,
    pub entry_type: LedgerEntryType,
    pub amount: Money,
    /// Balance snapshot read inside the posting transaction, before this entry applied.
    pub balance_before: Money,
    pub balance_after: Money,
    pub description: String,
    pub order_no: Option<OrderNo>,
    pub actor_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// A stable reference to this entry, usable from other records: `<partition>:<id>`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.partition, self.id)
    }
}

//--------------------------------------   NewLedgerEntry    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub student_id: StudentId,
    pub entry_type: LedgerEntryType,
    /// Must be strictly positive; the entry type carries the sign.
    pub amount: Money,
    pub description: String,
    pub order_no: Option<OrderNo>,
    pub actor_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewLedgerEntry {
    pub fn new<S: Into<String>>(
        student_id: StudentId,
        entry_type: LedgerEntryType,
        amount: Money,
        description: S,
    ) -> Self {
        Self {
            student_id,
            entry_type,
            amount,
            description: description.into(),
            order_no: None,
            actor_id: None,
            metadata: None,
        }
    }

    pub fn for_order(mut self, order_no: OrderNo) -> Self {
        self.order_no = Some(order_no);
        self
    }

    pub fn by_actor<S: Into<String>>(mut self, actor_id: S) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

//-------------------------------------- PaymentRequestStatus -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Active,
    Closed,
    Cancelled,
}

impl Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentRequestStatus::Active => write!(f, "active"),
            PaymentRequestStatus::Closed => write!(f, "closed"),
            PaymentRequestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

//--------------------------------------  TargetSelector     ---------------------------------------------------------
/// Describes which students a payment request bills. Resolved to a concrete student set at
/// request-creation time; the selector itself is stored for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetSelector {
    All,
    Students(Vec<StudentId>),
    Department(String),
    Year(i64),
}

impl Display for TargetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetSelector::All => write!(f, "all students"),
            TargetSelector::Students(ids) => write!(f, "{} named students", ids.len()),
            TargetSelector::Department(d) => write!(f, "department {d}"),
            TargetSelector::Year(y) => write!(f, "year {y}"),
        }
    }
}

//--------------------------------------  PaymentRequest     ---------------------------------------------------------
/// An admin-initiated bulk billing event. The counters are a cache over the submissions table,
/// maintained only by the pay and close flows.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub amount: Money,
    pub selector: TargetSelector,
    pub status: PaymentRequestStatus,
    pub total_target_count: i64,
    pub paid_count: i64,
    pub total_collected: Money,
    pub created_by: String,
    pub due_date: Option<DateTime<Utc>>,
    pub show_on_dashboard: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//-------------------------------------- NewPaymentRequest   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub title: String,
    pub description: String,
    pub amount: Money,
    pub selector: TargetSelector,
    pub due_date: Option<DateTime<Utc>>,
    pub show_on_dashboard: bool,
}

impl NewPaymentRequest {
    pub fn new<S: Into<String>>(title: S, amount: Money, selector: TargetSelector) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            amount,
            selector,
            due_date: None,
            show_on_dashboard: true,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn due_by(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn hidden_from_dashboard(mut self) -> Self {
        self.show_on_dashboard = false;
        self
    }
}

//-------------------------------------- PaymentSubmission   ---------------------------------------------------------
/// One student's obligation under a payment request. At most one exists per (request, student).
#[derive(Debug, Clone, FromRow)]
pub struct PaymentSubmission {
    pub id: i64,
    pub request_id: i64,
    pub student_id: StudentId,
    pub status: PaymentStatus,
    pub amount: Money,
    /// Reference to the settling ledger entry (`<partition>:<id>`), set when paid.
    pub ledger_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      Student        ---------------------------------------------------------
/// The engine's read/balance model of a student. Registration and approval are handled upstream.
#[derive(Debug, Clone, FromRow)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub department: String,
    pub year: i64,
    pub active: bool,
    pub approved: bool,
    /// Cached, authoritative balance. Written only alongside a justifying ledger entry.
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn is_eligible(&self) -> bool {
        self.active && self.approved
    }
}

//--------------------------------------        Shop         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub service: ServiceType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      MenuItem       ---------------------------------------------------------
/// A catalog entry, read-only from the engine's point of view. Catalog CRUD lives upstream.
#[derive(Debug, Clone, FromRow)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub shop_id: ShopId,
    pub name: String,
    pub price: Money,
    pub offer_price: Option<Money>,
    pub image: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn effective_price(&self) -> Money {
        self.offer_price.unwrap_or(self.price)
    }
}
