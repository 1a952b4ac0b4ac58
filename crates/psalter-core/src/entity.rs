//! Identity traits shared by every cached record.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A record with a stable unique identifier.
///
/// Mirrors key every reconciliation step on [`Entity::id`]; two entities with
/// the same id are the same record at different versions.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// An entity whose position in its collection is explicit.
pub trait Ordered: Entity {
    fn order_position(&self) -> i64;

    fn set_order_position(&mut self, position: i64);
}
