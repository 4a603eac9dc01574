use crate::db_types::{Order, OrderStatus};

/// A student has placed a new order. The shop's live dashboard wants to hear about this.
#[derive(Debug, Clone)]
pub struct NewOrderEvent {
    pub order: Order,
}

impl NewOrderEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order moved along the state machine. Fired for every committed transition.
#[derive(Debug, Clone)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub previous: OrderStatus,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, previous: OrderStatus) -> Self {
        Self { order, previous }
    }
}

/// An order reached `ready`; the owning student should be told to come collect it.
#[derive(Debug, Clone)]
pub struct OrderReadyEvent {
    pub order: Order,
}

impl OrderReadyEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order was cancelled, by its owner or by shop staff.
#[derive(Debug, Clone)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub reason: Option<String>,
}

impl OrderCancelledEvent {
    pub fn new(order: Order) -> Self {
        let reason = order.cancelled_reason.clone();
        Self { order, reason }
    }
}
