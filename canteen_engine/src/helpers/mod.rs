mod pickup;

pub use pickup::{decode, encode, new_pickup_code, PickupPayload};
