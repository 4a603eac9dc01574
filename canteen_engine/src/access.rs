//! Capability checks.
//!
//! Authentication happens upstream; the engine receives an [`Actor`] it trusts and only decides
//! whether that actor may perform the requested operation. Keeping these checks in one module
//! (rather than scattered through the flows) means the API layer calls out to them explicitly.
use crate::{
    db_types::{Actor, Role, ShopId, StudentId},
    traits::CanteenDbError,
};

/// Staff may act on orders of their own shop; admins on any shop.
pub fn ensure_staff_for_shop(actor: &Actor, shop_id: &ShopId) -> Result<(), CanteenDbError> {
    if actor.manages_shop(shop_id) {
        Ok(())
    } else {
        Err(CanteenDbError::Forbidden(format!("{} may not manage orders for shop {shop_id}", actor.id)))
    }
}

pub fn ensure_admin(actor: &Actor) -> Result<(), CanteenDbError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CanteenDbError::Forbidden(format!("{} is not an administrator", actor.id)))
    }
}

/// Students act only as themselves; staff and admins may act on behalf of a student.
pub fn ensure_self_or_staff(actor: &Actor, student_id: &StudentId) -> Result<(), CanteenDbError> {
    match actor.role {
        Role::Student if actor.id == student_id.as_str() => Ok(()),
        Role::Staff | Role::Admin => Ok(()),
        _ => Err(CanteenDbError::Forbidden(format!("{} may not act for student {student_id}", actor.id))),
    }
}
