//! Concrete stores, one per area of the church workspace.
//!
//! Every store is built from one or more [`CollectionMirror`]s and follows the
//! same status protocol: writes record and return failures, primary reads
//! record them, best-effort lookups log them and come back empty.
//!
//! [`CollectionMirror`]: crate::mirror::CollectionMirror

pub mod roles;
pub mod settings;
pub mod setlists;
pub mod skills;

pub use roles::{RoleDraft, RoleStore, ROLES, USER_ROLES};
pub use settings::{ImportSummary, KeyTestOutcome, SettingsStore, CHURCH_SETTINGS};
pub use setlists::{SetlistDraft, SetlistFilter, SetlistStore, StatusCounts, SETLISTS, SETLIST_SONGS};
pub use skills::{SkillDraft, SkillStore, SKILLS, USER_SKILLS};

use crate::auth::StoreContext;
use crate::gateway::{Gateway, ListQuery};
use crate::mirror::decode_all;
use psalter_core::UserSummary;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Best-effort lookup of assignment rows, mapped through `pick`.
///
/// Failures are logged and yield an empty list.
pub(crate) async fn lookup<G, R, T, F>(
    ctx: &StoreContext<G>,
    collection: &str,
    query: ListQuery,
    pick: F,
) -> Vec<T>
where
    G: Gateway,
    R: DeserializeOwned,
    F: Fn(R) -> Option<T>,
{
    let rows = match ctx.gateway.get_full_list(collection, &query).await {
        Ok(raw) => decode_all::<R>(collection, raw),
        Err(e) => Err(e.into()),
    };
    match rows {
        Ok(rows) => rows.into_iter().filter_map(pick).collect(),
        Err(e) => {
            warn!("Lookup on {} failed, returning nothing: {}", collection, e);
            Vec::new()
        }
    }
}

pub(crate) fn dedupe_users(users: Vec<UserSummary>) -> Vec<UserSummary> {
    let mut seen = std::collections::HashSet::new();
    users.into_iter().filter(|u| seen.insert(u.id.clone())).collect()
}
