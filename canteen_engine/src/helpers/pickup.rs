//! Pickup payload encoding.
//!
//! The payload a student presents at the counter (usually rendered as a QR code by the client)
//! is the base64 encoding of a small JSON object binding the order number, the short pickup
//! credential and the shop the order belongs to. Encoding and decoding are pure; checking a
//! decoded payload against a live order happens in
//! [`OrderFlowApi::verify_pickup`](crate::OrderFlowApi::verify_pickup).
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderNo, ShopId};

pub const PICKUP_CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupPayload {
    pub order_id: OrderNo,
    pub pickup_token: String,
    pub shop_id: ShopId,
    pub timestamp: DateTime<Utc>,
}

impl PickupPayload {
    pub fn new(order_id: OrderNo, pickup_token: String, shop_id: ShopId, timestamp: DateTime<Utc>) -> Self {
        Self { order_id, pickup_token, shop_id, timestamp }
    }
}

/// Generates a fresh short pickup credential.
pub fn new_pickup_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PICKUP_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Encodes the payload into its opaque wire form.
pub fn encode(payload: &PickupPayload) -> String {
    // Hand-rolled via the json! macro so encoding is total. The field set mirrors PickupPayload.
    let json = serde_json::json!({
        "order_id": payload.order_id.as_str(),
        "pickup_token": payload.pickup_token,
        "shop_id": payload.shop_id.as_str(),
        "timestamp": payload.timestamp.to_rfc3339(),
    })
    .to_string();
    BASE64.encode(json)
}

/// Decodes an opaque token back into a payload. Returns `None` for any malformed input — bad
/// base64, bad UTF-8, bad JSON, missing or mistyped fields. Never panics.
pub fn decode(token: &str) -> Option<PickupPayload> {
    let bytes = BASE64.decode(token).ok()?;
    let json = String::from_utf8(bytes).ok()?;
    serde_json::from_str(&json).ok()
}
