use std::fmt::Debug;

use log::*;

use crate::{
    access,
    api::{
        order_objects::{OrderQueryFilter, PlacedOrder},
    },
    db_types::{Actor, MenuItemId, NewOrder, Order, OrderNo, OrderStatus, OrderStatusChange, ShopId, StudentId},
    events::{
        EventProducers,
        NewOrderEvent,
        OrderCancelledEvent,
        OrderReadyEvent,
        OrderStatusChangedEvent,
    },
    helpers::{self, PickupPayload},
    traits::{CanteenDatabase, CanteenDbError, OrderTransition},
};

/// `OrderFlowApi` drives the order lifecycle: creation, the status state machine with its wallet
/// side effects, owner cancellation, and pickup verification.
///
/// Events are published only after the underlying transaction has committed, and a slow or
/// missing subscriber never affects the committed state.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: CanteenDatabase
{
    /// Places a new order for a student and returns it along with the opaque pickup payload the
    /// client renders as a QR code.
    ///
    /// Students place their own orders; staff and admins may place one on a student's behalf.
    pub async fn create_order(&self, actor: &Actor, order: NewOrder) -> Result<PlacedOrder, CanteenDbError> {
        access::ensure_self_or_staff(actor, &order.student_id)?;
        let saved = match self.db.create_order(order.clone()).await {
            Err(e) if e.is_retryable() => {
                warn!("🍽️ Transient conflict creating an order for {}; retrying once", order.student_id);
                self.db.create_order(order).await
            },
            other => other,
        }?;
        let payload = PickupPayload::new(
            saved.order_no.clone(),
            saved.pickup_code.reveal().clone(),
            saved.shop_id.clone(),
            saved.created_at,
        );
        let pickup_payload = helpers::encode(&payload);
        self.call_new_order_hook(&saved).await;
        Ok(PlacedOrder { order: saved, pickup_payload })
    }

    /// Moves an order along the state machine on behalf of shop staff.
    ///
    /// Completion debits the wallet (re-checking the balance inside the transaction) and
    /// cancellation of a paid order refunds it; see
    /// [`CanteenDatabase::transition_order`] for the full contract. A transient store conflict is
    /// retried once; every other failure reaches the caller.
    pub async fn update_status(
        &self,
        order_no: &OrderNo,
        new_status: OrderStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<OrderTransition, CanteenDbError> {
        let order = self
            .db
            .fetch_order(order_no)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(order_no.clone()))?;
        access::ensure_staff_for_shop(actor, &order.shop_id)?;
        let transition = match self.db.transition_order(order_no, new_status, None, actor, reason.clone()).await {
            Err(e) if e.is_retryable() => {
                warn!("🍽️ Transient conflict moving order [{order_no}] to {new_status}; retrying once");
                self.db.transition_order(order_no, new_status, None, actor, reason).await
            },
            other => other,
        }?;
        self.call_status_hooks(&transition).await;
        Ok(transition)
    }

    /// Lets the owning student withdraw an order, but only while it is still `pending`. Once the
    /// shop has started preparing, cancellation is a staff decision.
    pub async fn cancel_by_owner(
        &self,
        order_no: &OrderNo,
        student_id: &StudentId,
        reason: Option<String>,
    ) -> Result<OrderTransition, CanteenDbError> {
        let order = self
            .db
            .fetch_order(order_no)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(order_no.clone()))?;
        if &order.student_id != student_id {
            return Err(CanteenDbError::Forbidden(format!("order {order_no} does not belong to {student_id}")));
        }
        if order.status != OrderStatus::Pending {
            return Err(CanteenDbError::PreconditionFailed(format!(
                "order {order_no} is already {}; only pending orders can be cancelled by their owner",
                order.status
            )));
        }
        let actor = Actor::student(student_id.as_str());
        // the pending check is repeated inside the transaction via the status precondition
        let transition = self
            .db
            .transition_order(order_no, OrderStatus::Cancelled, Some(OrderStatus::Pending), &actor, reason)
            .await?;
        self.call_status_hooks(&transition).await;
        Ok(transition)
    }

    /// Marks item lines as handed over, driving `ready` orders to `partially_delivered`.
    pub async fn record_item_delivery(
        &self,
        order_no: &OrderNo,
        item_ids: &[MenuItemId],
        actor: &Actor,
    ) -> Result<Order, CanteenDbError> {
        let order = self
            .db
            .fetch_order(order_no)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(order_no.clone()))?;
        access::ensure_staff_for_shop(actor, &order.shop_id)?;
        let previous = order.status;
        let updated = self.db.record_item_delivery(order_no, item_ids, actor).await?;
        if updated.status != previous {
            for emitter in &self.producers.status_changed_producer {
                emitter.publish_event(OrderStatusChangedEvent::new(updated.clone(), previous)).await;
            }
        }
        Ok(updated)
    }

    /// Checks a presented pickup token against the live order without changing anything.
    ///
    /// Verification is read-only so staff can inspect the order before anything is charged; the
    /// hand-over itself is a separate, explicit completion call.
    pub async fn verify_pickup(
        &self,
        token: &str,
        presenting_shop: &ShopId,
        actor: &Actor,
    ) -> Result<Order, CanteenDbError> {
        access::ensure_staff_for_shop(actor, presenting_shop)?;
        let payload = helpers::decode(token)
            .ok_or_else(|| CanteenDbError::Validation("the pickup token is unreadable".to_string()))?;
        if &payload.shop_id != presenting_shop {
            debug!("🎫 Pickup token for shop {} presented at {presenting_shop}", payload.shop_id);
            return Err(CanteenDbError::ShopMismatch);
        }
        let order = self
            .db
            .fetch_order(&payload.order_id)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(payload.order_id.clone()))?;
        if &payload.pickup_token != order.pickup_code.reveal() {
            debug!("🎫 Pickup credential mismatch for order [{}]", order.order_no);
            return Err(CanteenDbError::TokenMismatch);
        }
        if order.status != OrderStatus::Ready {
            return Err(CanteenDbError::NotReady(order.status));
        }
        debug!("🎫 Pickup token for order [{}] verified at {presenting_shop}", order.order_no);
        Ok(order)
    }

    pub async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, CanteenDbError> {
        Ok(self.db.fetch_order(order_no).await?)
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CanteenDbError> {
        Ok(self.db.search_orders(query).await?)
    }

    /// The realized status history of an order, oldest first.
    pub async fn order_history(&self, order_no: &OrderNo) -> Result<Vec<OrderStatusChange>, CanteenDbError> {
        Ok(self.db.order_history(order_no).await?)
    }

    async fn call_new_order_hook(&self, order: &Order) {
        for emitter in &self.producers.new_order_producer {
            trace!("📬️ Notifying new-order subscribers about [{}]", order.order_no);
            emitter.publish_event(NewOrderEvent::new(order.clone())).await;
        }
    }

    async fn call_status_hooks(&self, transition: &OrderTransition) {
        let order = &transition.order;
        for emitter in &self.producers.status_changed_producer {
            emitter.publish_event(OrderStatusChangedEvent::new(order.clone(), transition.previous_status)).await;
        }
        match order.status {
            OrderStatus::Ready => {
                for emitter in &self.producers.order_ready_producer {
                    emitter.publish_event(OrderReadyEvent::new(order.clone())).await;
                }
            },
            OrderStatus::Cancelled => {
                for emitter in &self.producers.order_cancelled_producer {
                    emitter.publish_event(OrderCancelledEvent::new(order.clone())).await;
                }
            },
            _ => {},
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
