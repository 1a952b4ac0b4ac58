//! # psalter-core
//!
//! Entity model and local-cache reconciliation for the Psalter stores.
//!
//! This crate is pure and synchronous. It provides:
//! - Typed records for roles, setlists, skills and church settings
//! - `MirrorState`, the cached copy of a remote collection plus status flags
//! - Folding of real-time create/update/delete events into a mirror
//! - Ordered-collection helpers for `order_position` based children
//! - Permission coverage and setlist duration derivations
//! - Error message normalization for heterogeneous error payloads
//!
//! ## Example
//!
//! ```rust
//! use psalter_core::{Action, MirrorState, Placement, RealtimeEvent, Skill};
//!
//! let mut state: MirrorState<Skill> = MirrorState::new();
//! state.insert(Skill::named("skill-1", "Vocals"), Placement::Append);
//!
//! let mut renamed = Skill::named("skill-1", "Lead Vocals");
//! renamed.category = Some("Music".into());
//! assert!(state.fold(RealtimeEvent::new(Action::Update, renamed.clone())));
//! assert!(!state.fold(RealtimeEvent::new(Action::Update, renamed)));
//! assert_eq!(state.items[0].name, "Lead Vocals");
//! ```

pub mod builder;
pub mod coverage;
pub mod entity;
pub mod event;
pub mod mirror;
pub mod model;
pub mod normalize;
pub mod ordering;

pub use builder::{format_duration, BuilderState, DragPayload};
pub use coverage::{missing_coverage, permissions_for_user};
pub use entity::{Entity, Ordered};
pub use event::{Action, RealtimeEvent};
pub use mirror::{MirrorState, Placement};
pub use model::{
    ChurchSettings, Permission, Role, Setlist, SetlistSong, SetlistSongExpand, SetlistStatus,
    Skill, Song, UserRole, UserRoleExpand, UserSkill, UserSkillExpand, UserSummary,
};
pub use normalize::{normalize_error, FALLBACK_MESSAGE};
pub use ordering::{apply_positions, insert_sorted, next_position, sort_by_position, ReorderEntry};
