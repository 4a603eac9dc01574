//! Read-only catalog lookups. Catalog CRUD (shops, menu items, categories) is owned by the
//! upstream admin surface; order creation only ever needs to read and snapshot.
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{MenuItem, MenuItemId, Shop, ShopId},
    traits::AccountApiError,
};

pub async fn fetch_shop(shop_id: &ShopId, conn: &mut SqliteConnection) -> Result<Option<Shop>, AccountApiError> {
    let shop = sqlx::query_as("SELECT * FROM shops WHERE id = $1").bind(shop_id).fetch_optional(conn).await?;
    Ok(shop)
}

/// Fetches the named menu items of one shop. Items from other shops are simply not returned,
/// which the caller reports as unavailable lines.
pub async fn fetch_menu_items(
    shop_id: &ShopId,
    item_ids: &[MenuItemId],
    conn: &mut SqliteConnection,
) -> Result<Vec<MenuItem>, AccountApiError> {
    if item_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM menu_items WHERE shop_id = ");
    builder.push_bind(shop_id.as_str());
    builder.push(" AND id IN (");
    let mut values = builder.separated(", ");
    for id in item_ids {
        values.push_bind(id.as_str());
    }
    builder.push(")");
    let items = builder.build_query_as::<MenuItem>().fetch_all(conn).await?;
    Ok(items)
}
