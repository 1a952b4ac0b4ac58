//! Roles, role assignments and permission coverage.

use crate::auth::StoreContext;
use crate::error::{Result, StoreError};
use crate::gateway::{Gateway, ListQuery, RecordOptions};
use crate::mirror::CollectionMirror;
use crate::realtime::SubscriptionHandle;
use parking_lot::RwLock;
use psalter_core::{missing_coverage, permissions_for_user, Permission, Placement, Role, UserRole, UserSummary};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::info;

pub const ROLES: &str = "roles";
pub const USER_ROLES: &str = "user_roles";

/// Fields for a new role. The church is filled in from the signed-in user.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RoleDraft {
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
}

impl RoleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn grant(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }
}

fn assignment_options() -> RecordOptions {
    RecordOptions {
        expand: vec!["user".to_string(), "role".to_string()],
    }
}

/// A church's role roster with its assignments.
///
/// After every change to the roster the store re-reads roles and assignments
/// and recomputes which required permissions no staffed role grants.
pub struct RoleStore<G: Gateway> {
    roles: CollectionMirror<Role, G>,
    user_roles: CollectionMirror<UserRole, G>,
    missing: RwLock<Vec<Permission>>,
}

impl<G: Gateway> RoleStore<G> {
    pub fn new(ctx: StoreContext<G>) -> Self {
        Self {
            roles: CollectionMirror::new(ROLES, ctx.clone(), Placement::Append).scoped_by("church"),
            user_roles: CollectionMirror::new(USER_ROLES, ctx, Placement::Append).scoped_by("church"),
            missing: RwLock::new(Vec::new()),
        }
    }

    fn ctx(&self) -> &StoreContext<G> {
        self.roles.context()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.roles.items()
    }

    pub fn user_roles(&self) -> Vec<UserRole> {
        self.user_roles.items()
    }

    pub fn role_mirror(&self) -> &CollectionMirror<Role, G> {
        &self.roles
    }

    pub fn assignment_mirror(&self) -> &CollectionMirror<UserRole, G> {
        &self.user_roles
    }

    /// Required permissions left uncovered at the last validation.
    pub fn missing_permissions(&self) -> Vec<Permission> {
        self.missing.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.roles.is_loading() || self.user_roles.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.roles.error().or_else(|| self.user_roles.error())
    }

    pub fn initialized(&self) -> bool {
        self.roles.initialized()
    }

    pub fn clear_error(&self) {
        self.roles.clear_error();
        self.user_roles.clear_error();
    }

    async fn fetch_roles(&self) -> Result<Vec<Role>> {
        let auth = self.ctx().require_auth()?;
        let query = ListQuery::new().eq("church", auth.church_id).sort("name");
        self.roles.fetch_all(&query).await
    }

    async fn fetch_user_roles(&self) -> Result<Vec<UserRole>> {
        let auth = self.ctx().require_auth()?;
        let query = ListQuery::new()
            .eq("church", auth.church_id)
            .expand("user")
            .expand("role");
        self.user_roles.fetch_all(&query).await
    }

    pub async fn load_roles(&self) {
        self.roles.load_from(self.fetch_roles()).await;
    }

    pub async fn load_roles_once(&self) {
        self.roles.load_once_from(|| self.fetch_roles()).await;
    }

    pub async fn load_user_roles(&self) {
        self.user_roles.load_from(self.fetch_user_roles()).await;
    }

    /// Re-read roles and assignments and recompute the uncovered permissions.
    ///
    /// A failed re-read is recorded and leaves the previous result in place.
    pub async fn validate_permission_coverage(&self) -> Vec<Permission> {
        let fetched = self
            .roles
            .track_read("validate_permission_coverage", async {
                futures::try_join!(self.fetch_roles(), self.fetch_user_roles())
            })
            .await;

        if let Some((roles, assignments)) = fetched {
            let missing = missing_coverage(&roles, &assignments);
            if !missing.is_empty() {
                info!("{} required permissions are not covered", missing.len());
            }
            *self.missing.write() = missing;
        }
        self.missing_permissions()
    }

    pub async fn create_role(&self, draft: RoleDraft) -> Result<Role> {
        let role = self.roles.create(json!(draft)).await?;
        self.validate_permission_coverage().await;
        Ok(role)
    }

    pub async fn update_role(&self, id: &str, patch: Value) -> Result<Role> {
        let role = self.roles.update(id, patch).await?;
        self.validate_permission_coverage().await;
        Ok(role)
    }

    /// Delete a role. System roles are refused without a remote call.
    pub async fn delete_role(&self, id: &str) -> Result<()> {
        if self.roles.get(id).is_some_and(|r| r.is_system) {
            let err = StoreError::Validation("System roles cannot be deleted".to_string());
            self.roles.record_error("delete", &err);
            return Err(err);
        }

        self.roles.delete(id).await?;
        self.user_roles.modify(|state| state.retain(|ur| ur.role != id));
        self.validate_permission_coverage().await;
        Ok(())
    }

    /// Assign `role_id` to `user_id`. An existing cached assignment of the same
    /// pair is returned as is.
    pub async fn assign_role(&self, user_id: &str, role_id: &str) -> Result<UserRole> {
        let existing = self
            .user_roles
            .items()
            .into_iter()
            .find(|ur| ur.user == user_id && ur.role == role_id);
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let data = json!({ "user": user_id, "role": role_id });
        let assignment = self.user_roles.create_with(data, &assignment_options()).await?;
        self.validate_permission_coverage().await;
        Ok(assignment)
    }

    pub async fn unassign_role(&self, user_role_id: &str) -> Result<()> {
        self.user_roles.delete(user_role_id).await?;
        self.validate_permission_coverage().await;
        Ok(())
    }

    /// Members holding `role_id`, fetched fresh. Empty when the lookup fails.
    pub async fn users_with_role(&self, role_id: &str) -> Vec<UserSummary> {
        let query = ListQuery::new().eq("role", role_id).expand("user");
        let users = super::lookup(self.ctx(), USER_ROLES, query, |row: UserRole| {
            row.expand.and_then(|e| e.user)
        })
        .await;
        super::dedupe_users(users)
    }

    /// Cached roles held by `user_id`.
    pub fn roles_for_user(&self, user_id: &str) -> Vec<Role> {
        let held: HashSet<String> = self
            .user_roles
            .items()
            .into_iter()
            .filter(|ur| ur.user == user_id)
            .map(|ur| ur.role)
            .collect();

        self.roles
            .items()
            .into_iter()
            .filter(|r| held.contains(&r.id))
            .collect()
    }

    /// Permissions of the signed-in user according to the cached roster.
    pub fn current_user_permissions(&self) -> BTreeSet<Permission> {
        match self.ctx().auth.current() {
            Some(auth) => permissions_for_user(&auth.user_id, &self.roles.items(), &self.user_roles.items()),
            None => BTreeSet::new(),
        }
    }

    pub fn current_user_can(&self, permission: Permission) -> bool {
        self.current_user_permissions().contains(&permission)
    }

    pub async fn subscribe_to_updates(&self) -> Result<SubscriptionHandle> {
        self.roles.subscribe_to_updates("*").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, StaticAuth};
    use crate::config::StoreConfig;
    use crate::memory::{MemoryGateway, Operation};
    use std::sync::Arc;

    fn store() -> (Arc<MemoryGateway>, RoleStore<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.relate(USER_ROLES, "user", "users");
        gateway.relate(USER_ROLES, "role", ROLES);
        let auth = Arc::new(StaticAuth::new(AuthContext::new("c1", "u1")));
        let ctx = StoreContext::new(Arc::clone(&gateway), auth, StoreConfig::default());
        (gateway, RoleStore::new(ctx))
    }

    #[tokio::test]
    async fn test_coverage_follows_assignments() {
        let (_gateway, store) = store();
        let mut admin = RoleDraft::new("Admin");
        for p in Permission::REQUIRED {
            admin = admin.grant(p);
        }
        let admin = store.create_role(admin).await.unwrap();
        assert_eq!(store.missing_permissions(), Permission::REQUIRED.to_vec());

        let assignment = store.assign_role("u1", &admin.id).await.unwrap();
        assert!(store.missing_permissions().is_empty());
        assert!(store.current_user_can(Permission::ManageRoles));

        store.unassign_role(&assignment.id).await.unwrap();
        assert_eq!(store.missing_permissions().len(), Permission::REQUIRED.len());
        assert!(!store.current_user_can(Permission::ManageRoles));
    }

    #[tokio::test]
    async fn test_assign_role_is_idempotent_for_cached_pair() {
        let (gateway, store) = store();
        let role = store.create_role(RoleDraft::new("Band")).await.unwrap();

        let first = store.assign_role("u2", &role.id).await.unwrap();
        let second = store.assign_role("u2", &role.id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(gateway.call_count(Operation::Create, USER_ROLES), 1);
    }

    #[tokio::test]
    async fn test_system_role_is_not_deleted() {
        let (gateway, store) = store();
        gateway.seed(ROLES, json!({"id": "r1", "church": "c1", "name": "Owner", "is_system": true}));
        store.load_roles().await;

        let err = store.delete_role("r1").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.error().as_deref(), Some("System roles cannot be deleted"));
        assert_eq!(gateway.call_count(Operation::Delete, ROLES), 0);
        assert_eq!(store.roles().len(), 1);
    }

    #[tokio::test]
    async fn test_users_with_role_swallows_failures() {
        let (gateway, store) = store();
        gateway.seed("users", json!({"id": "u2", "name": "Ben"}));
        gateway.seed(USER_ROLES, json!({"id": "ur1", "user": "u2", "role": "r1", "church": "c1"}));

        let users = store.users_with_role("r1").await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Ben");

        gateway.fail_next(
            Operation::GetFullList,
            USER_ROLES,
            crate::error::GatewayError::new(500, "boom"),
        );
        assert!(store.users_with_role("r1").await.is_empty());
        assert!(store.error().is_none());
    }
}
