//! Skill catalogue and per-member skill assignments.

use crate::auth::StoreContext;
use crate::error::Result;
use crate::gateway::{Gateway, ListQuery, RecordOptions};
use crate::mirror::CollectionMirror;
use crate::realtime::SubscriptionHandle;
use psalter_core::{Placement, Skill, UserSkill, UserSummary};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

pub const SKILLS: &str = "skills";
pub const USER_SKILLS: &str = "user_skills";

/// Category used for skills without one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Fields for a new skill. The church is filled in from the signed-in user.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SkillDraft {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl SkillDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

fn assignment_options() -> RecordOptions {
    RecordOptions {
        expand: vec!["user".to_string(), "skill".to_string()],
    }
}

/// Skills of one church and who holds them.
///
/// A [`ChurchClient`](crate::client::ChurchClient) hands out a single shared
/// instance; every holder sees and mutates the same cache.
pub struct SkillStore<G: Gateway> {
    skills: CollectionMirror<Skill, G>,
    user_skills: CollectionMirror<UserSkill, G>,
}

impl<G: Gateway> SkillStore<G> {
    pub fn new(ctx: StoreContext<G>) -> Self {
        Self {
            skills: CollectionMirror::new(SKILLS, ctx.clone(), Placement::Append).scoped_by("church"),
            user_skills: CollectionMirror::new(USER_SKILLS, ctx, Placement::Append).scoped_by("church"),
        }
    }

    pub fn skills(&self) -> Vec<Skill> {
        self.skills.items()
    }

    pub fn user_skills(&self) -> Vec<UserSkill> {
        self.user_skills.items()
    }

    pub fn skill_mirror(&self) -> &CollectionMirror<Skill, G> {
        &self.skills
    }

    pub fn assignment_mirror(&self) -> &CollectionMirror<UserSkill, G> {
        &self.user_skills
    }

    pub fn is_loading(&self) -> bool {
        self.skills.is_loading() || self.user_skills.is_loading()
    }

    /// The most relevant failure, skill catalogue first.
    pub fn error(&self) -> Option<String> {
        self.skills.error().or_else(|| self.user_skills.error())
    }

    pub fn initialized(&self) -> bool {
        self.skills.initialized()
    }

    pub fn clear_error(&self) {
        self.skills.clear_error();
        self.user_skills.clear_error();
    }

    async fn fetch_skills(&self) -> Result<Vec<Skill>> {
        let auth = self.skills.context().require_auth()?;
        let query = ListQuery::new().eq("church", auth.church_id).sort("name");
        self.skills.fetch_all(&query).await
    }

    async fn fetch_user_skills(&self) -> Result<Vec<UserSkill>> {
        let auth = self.user_skills.context().require_auth()?;
        let query = ListQuery::new()
            .eq("church", auth.church_id)
            .expand("user")
            .expand("skill");
        self.user_skills.fetch_all(&query).await
    }

    pub async fn load_skills(&self) {
        self.skills.load_from(self.fetch_skills()).await;
    }

    pub async fn load_skills_once(&self) {
        self.skills.load_once_from(|| self.fetch_skills()).await;
    }

    pub async fn load_user_skills(&self) {
        self.user_skills.load_from(self.fetch_user_skills()).await;
    }

    pub async fn create_skill(&self, draft: SkillDraft) -> Result<Skill> {
        self.skills.create(json!(draft)).await
    }

    pub async fn update_skill(&self, id: &str, patch: Value) -> Result<Skill> {
        self.skills.update(id, patch).await
    }

    /// Delete a skill and forget the cached assignments pointing at it.
    pub async fn delete_skill(&self, id: &str) -> Result<()> {
        self.skills.delete(id).await?;
        self.user_skills.modify(|state| state.retain(|us| us.skill != id));
        Ok(())
    }

    pub async fn assign_skill(
        &self,
        user_id: &str,
        skill_id: &str,
        proficiency: Option<&str>,
    ) -> Result<UserSkill> {
        let data = json!({
            "user": user_id,
            "skill": skill_id,
            "proficiency": proficiency,
        });
        self.user_skills.create_with(data, &assignment_options()).await
    }

    pub async fn unassign_skill(&self, user_skill_id: &str) -> Result<()> {
        self.user_skills.delete(user_skill_id).await
    }

    /// Members holding `skill_id`, fetched fresh. Empty when the lookup fails.
    pub async fn users_with_skill(&self, skill_id: &str) -> Vec<UserSummary> {
        let query = ListQuery::new().eq("skill", skill_id).expand("user");
        let users = super::lookup(self.skills.context(), USER_SKILLS, query, |row: UserSkill| {
            row.expand.and_then(|e| e.user)
        })
        .await;
        super::dedupe_users(users)
    }

    /// Cached skills held by `user_id`, in catalogue order.
    pub fn skills_for_user(&self, user_id: &str) -> Vec<Skill> {
        let held: HashSet<String> = self
            .user_skills
            .items()
            .into_iter()
            .filter(|us| us.user == user_id)
            .map(|us| us.skill)
            .collect();

        self.skills
            .items()
            .into_iter()
            .filter(|s| held.contains(&s.id))
            .collect()
    }

    /// Cached skills grouped by category, blank categories under [`UNCATEGORIZED`].
    pub fn skills_by_category(&self) -> BTreeMap<String, Vec<Skill>> {
        let mut groups: BTreeMap<String, Vec<Skill>> = BTreeMap::new();
        for skill in self.skills.items() {
            let category = skill
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(UNCATEGORIZED)
                .to_string();
            groups.entry(category).or_default().push(skill);
        }
        groups
    }

    pub async fn subscribe_to_updates(&self) -> Result<SubscriptionHandle> {
        self.skills.subscribe_to_updates("*").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, StaticAuth};
    use crate::config::StoreConfig;
    use crate::memory::MemoryGateway;
    use std::sync::Arc;

    fn store() -> (Arc<MemoryGateway>, SkillStore<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.relate(USER_SKILLS, "user", "users");
        gateway.relate(USER_SKILLS, "skill", SKILLS);
        let auth = Arc::new(StaticAuth::new(AuthContext::new("c1", "u1")));
        let ctx = StoreContext::new(Arc::clone(&gateway), auth, StoreConfig::default());
        (gateway, SkillStore::new(ctx))
    }

    #[tokio::test]
    async fn test_load_skills_is_church_scoped_and_sorted() {
        let (gateway, store) = store();
        gateway.seed(SKILLS, json!({"id": "s2", "name": "Vocals", "church": "c1"}));
        gateway.seed(SKILLS, json!({"id": "s1", "name": "Drums", "church": "c1"}));
        gateway.seed(SKILLS, json!({"id": "s3", "name": "Bass", "church": "c2"}));

        store.load_skills().await;

        let names: Vec<_> = store.skills().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Drums", "Vocals"]);
        assert!(store.initialized());
    }

    #[tokio::test]
    async fn test_delete_skill_drops_its_assignments() {
        let (gateway, store) = store();
        gateway.seed(SKILLS, json!({"id": "s1", "name": "Drums", "church": "c1"}));
        gateway.seed(USER_SKILLS, json!({"id": "us1", "user": "u1", "skill": "s1", "church": "c1"}));
        gateway.seed(USER_SKILLS, json!({"id": "us2", "user": "u2", "skill": "s2", "church": "c1"}));
        store.load_skills().await;
        store.load_user_skills().await;

        store.delete_skill("s1").await.unwrap();

        let left: Vec<_> = store.user_skills().into_iter().map(|us| us.id).collect();
        assert_eq!(left, vec!["us2"]);
    }

    #[tokio::test]
    async fn test_skills_by_category() {
        let (_gateway, store) = store();
        store.create_skill(SkillDraft::new("Drums").category("Band")).await.unwrap();
        store.create_skill(SkillDraft::new("Bass").category("Band")).await.unwrap();
        store.create_skill(SkillDraft::new("Camera")).await.unwrap();

        let groups = store.skills_by_category();
        assert_eq!(groups["Band"].len(), 2);
        assert_eq!(groups[UNCATEGORIZED][0].name, "Camera");
    }

    #[tokio::test]
    async fn test_skills_for_user_uses_cached_assignments() {
        let (gateway, store) = store();
        gateway.seed("users", json!({"id": "u7", "name": "Ana", "email": "ana@example.org"}));
        let drums = store.create_skill(SkillDraft::new("Drums")).await.unwrap();
        store.create_skill(SkillDraft::new("Keys")).await.unwrap();

        let assignment = store.assign_skill("u7", &drums.id, Some("lead")).await.unwrap();
        assert_eq!(assignment.church, "c1");
        assert_eq!(
            assignment.expand.and_then(|e| e.user).map(|u| u.name).as_deref(),
            Some("Ana")
        );

        let held: Vec<_> = store.skills_for_user("u7").into_iter().map(|s| s.name).collect();
        assert_eq!(held, vec!["Drums"]);
    }
}
