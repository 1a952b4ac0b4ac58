//! Typed records for the remote collections.
//!
//! Field names follow the remote database's record layout, so relation fields
//! hold the related record's id (`church`, `user`, `role`, ...) and optional
//! `expand` blocks carry the related records when a query asked for them.

use crate::entity::{Entity, Ordered};
use serde::{Deserialize, Serialize};

/// A capability a role can grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageChurch,
    ManageMembers,
    ManageRoles,
    ManageSetlists,
    ManageSongs,
    ManageSkills,
    ViewSchedule,
    #[serde(other)]
    Unknown,
}

impl Permission {
    /// Permissions that at least one staffed role must grant.
    pub const REQUIRED: [Permission; 7] = [
        Permission::ManageChurch,
        Permission::ManageMembers,
        Permission::ManageRoles,
        Permission::ManageSetlists,
        Permission::ManageSongs,
        Permission::ManageSkills,
        Permission::ViewSchedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageChurch => "manage_church",
            Permission::ManageMembers => "manage_members",
            Permission::ManageRoles => "manage_roles",
            Permission::ManageSetlists => "manage_setlists",
            Permission::ManageSongs => "manage_songs",
            Permission::ManageSkills => "manage_skills",
            Permission::ViewSchedule => "view_schedule",
            Permission::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub church: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Role {
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl Entity for Role {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Minimal view of a user record, as returned in expansions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Entity for UserSummary {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRoleExpand {
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Assignment of a role to a user within a church.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: String,
    pub user: String,
    pub role: String,
    #[serde(default)]
    pub church: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<UserRoleExpand>,
}

impl Entity for UserRole {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetlistStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl SetlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetlistStatus::Draft => "draft",
            SetlistStatus::Published => "published",
            SetlistStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for SetlistStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SetlistStatus::Draft),
            "published" => Ok(SetlistStatus::Published),
            "archived" => Ok(SetlistStatus::Archived),
            other => Err(format!("unknown setlist status: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Setlist {
    pub id: String,
    #[serde(default)]
    pub church: String,
    pub title: String,
    #[serde(default)]
    pub service_date: Option<String>,
    #[serde(default)]
    pub status: SetlistStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Entity for Setlist {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

impl Entity for Song {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SetlistSongExpand {
    #[serde(default)]
    pub song: Option<Song>,
}

/// A song slot inside a setlist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetlistSong {
    pub id: String,
    pub setlist: String,
    pub song: String,
    pub order_position: i64,
    #[serde(default)]
    pub duration_override: Option<u32>,
    #[serde(default)]
    pub key_override: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<SetlistSongExpand>,
}

impl SetlistSong {
    /// Slot duration: explicit override, then the song's stored duration, then zero.
    pub fn effective_duration(&self) -> u32 {
        self.duration_override
            .or_else(|| {
                self.expand
                    .as_ref()
                    .and_then(|e| e.song.as_ref())
                    .and_then(|s| s.duration_seconds)
            })
            .unwrap_or(0)
    }

    pub fn song_title(&self) -> Option<&str> {
        self.expand
            .as_ref()
            .and_then(|e| e.song.as_ref())
            .map(|s| s.title.as_str())
    }
}

impl Entity for SetlistSong {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Ordered for SetlistSong {
    fn order_position(&self) -> i64 {
        self.order_position
    }

    fn set_order_position(&mut self, position: i64) {
        self.order_position = position;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    #[serde(default)]
    pub church: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Skill {
    /// Bare skill with only an id and a name.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            church: String::new(),
            name: name.into(),
            description: String::new(),
            category: None,
            created: String::new(),
            updated: String::new(),
        }
    }
}

impl Entity for Skill {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSkillExpand {
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    pub skill: Option<Skill>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSkill {
    pub id: String,
    pub user: String,
    pub skill: String,
    #[serde(default)]
    pub church: String,
    #[serde(default)]
    pub proficiency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<UserSkillExpand>,
}

impl Entity for UserSkill {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Per-church integration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChurchSettings {
    pub id: String,
    pub church: String,
    #[serde(default)]
    pub mistral_api_key: Option<String>,
    #[serde(default)]
    pub elvanto_api_key: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub default_service_time: Option<String>,
}

impl ChurchSettings {
    pub fn has_mistral_key(&self) -> bool {
        self.mistral_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn has_elvanto_key(&self) -> bool {
        self.elvanto_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Entity for ChurchSettings {
    fn id(&self) -> &str {
        &self.id
    }
}
