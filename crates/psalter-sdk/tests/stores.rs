//! Integration tests for the concrete stores.
//!
//! These tests verify:
//! - Once-only loading makes a single gateway read
//! - Writes leave the server's version in the cache, exactly once
//! - Failed writes keep the cache, record the message and propagate
//! - Reordering slots follows the requested positions
//! - Settings key checks and the Elvanto import

use psalter_core::{Permission, ReorderEntry, SetlistStatus};
use psalter_sdk::stores::settings::{ELVANTO_IMPORT_PATH, MISTRAL_TEST_PATH};
use psalter_sdk::stores::{CHURCH_SETTINGS, SETLISTS, SETLIST_SONGS, SKILLS};
use psalter_sdk::{
    AuthContext, ChurchClient, GatewayError, MemoryGateway, Operation, RoleDraft, SetlistDraft, SkillDraft,
    StaticAuth, StoreConfig, StoreError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

const VALID_KEY: &str = "abcdefghijklmnopqrstuvwxyz012345";

/// Route store logs through the test harness; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client() -> ChurchClient<MemoryGateway> {
    init_tracing();
    let auth = Arc::new(StaticAuth::new(AuthContext::new("c1", "u1")));
    let client = ChurchClient::with_memory_gateway(auth, StoreConfig::default());
    client.gateway().relate(SETLIST_SONGS, "song", "songs");
    client
}

#[tokio::test]
async fn test_load_once_reads_once_per_store() {
    let client = client();
    let gateway = Arc::clone(client.gateway());

    let skills = client.skill_store();
    let roles = client.role_store();
    let setlists = client.setlist_store();
    let settings = client.settings_store();

    for _ in 0..3 {
        skills.load_skills_once().await;
        roles.load_roles_once().await;
        setlists.load_setlists_once().await;
        settings.load_settings_once().await;
    }

    assert_eq!(gateway.call_count(Operation::GetFullList, SKILLS), 1);
    assert_eq!(gateway.call_count(Operation::GetFullList, "roles"), 1);
    assert_eq!(gateway.call_count(Operation::GetList, SETLISTS), 1);
    assert_eq!(gateway.call_count(Operation::GetFullList, CHURCH_SETTINGS), 1);
}

#[tokio::test]
async fn test_delete_skill_success() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(SKILLS, json!({"id": "skill-1", "name": "Drums", "church": "c1"}));
    gateway.seed(SKILLS, json!({"id": "skill-2", "name": "Keys", "church": "c1"}));

    let skills = client.skill_store();
    skills.load_skills().await;
    assert_ok!(skills.delete_skill("skill-1").await);

    let ids: Vec<_> = skills.skills().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["skill-2"]);
    assert!(skills.error().is_none());
}

#[tokio::test]
async fn test_delete_skill_rejection_keeps_cache() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(SKILLS, json!({"id": "skill-1", "name": "Drums", "church": "c1"}));
    gateway.seed(SKILLS, json!({"id": "skill-2", "name": "Keys", "church": "c1"}));

    let skills = client.skill_store();
    skills.load_skills().await;

    gateway.fail_next(
        Operation::Delete,
        SKILLS,
        GatewayError::bad_request("Failed to delete record.")
            .with_data(json!({"message": "Cannot delete skill with assigned users"})),
    );
    let err = assert_err!(skills.delete_skill("skill-1").await);

    assert_eq!(err.display_message(), "Cannot delete skill with assigned users");
    assert_eq!(skills.error().as_deref(), Some("Cannot delete skill with assigned users"));
    let ids: Vec<_> = skills.skills().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["skill-1", "skill-2"]);
    assert!(!skills.is_loading());

    skills.clear_error();
    skills.clear_error();
    assert!(skills.error().is_none());
}

#[tokio::test]
async fn test_wrapped_error_message_is_normalized() {
    let client = client();
    client.gateway().fail_next(
        Operation::Create,
        "roles",
        GatewayError::new(0, "Request failed")
            .with_response(json!({"data": {"message": "Name must be unique"}})),
    );

    let roles = client.role_store();
    assert_err!(roles.create_role(RoleDraft::new("Band")).await);
    assert_eq!(roles.error().as_deref(), Some("Name must be unique"));
    assert!(roles.roles().is_empty());
}

#[tokio::test]
async fn test_writes_cache_server_versions() {
    let client = client();
    let setlists = client.setlist_store();

    let easter = assert_ok!(
        setlists
            .create_setlist(SetlistDraft::new("Easter").service_date("2026-04-05"))
            .await
    );
    let advent = assert_ok!(setlists.create_setlist(SetlistDraft::new("Advent")).await);

    // Newest first.
    let ids: Vec<_> = setlists.setlists().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![advent.id.clone(), easter.id.clone()]);
    assert_eq!(easter.created_by.as_deref(), Some("u1"));
    assert_eq!(setlists.total_items(), 2);

    let published = assert_ok!(
        setlists
            .update_setlist(&easter.id, json!({"status": "published"}))
            .await
    );
    assert_eq!(published.status, SetlistStatus::Published);
    assert_ne!(published.updated, easter.updated);
    assert_eq!(setlists.mirror().get(&easter.id), Some(published));
    assert_eq!(setlists.count_by_status().published, 1);

    assert_ok!(setlists.delete_setlist(&advent.id).await);
    assert!(setlists.mirror().get(&advent.id).is_none());
    assert_eq!(setlists.setlists().len(), 1);
}

#[tokio::test]
async fn test_reorder_follows_requested_positions() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(SETLISTS, json!({"id": "sl1", "church": "c1", "title": "Sunday"}));
    gateway.seed("songs", json!({"id": "song-a", "title": "Holy", "duration_seconds": 240}));
    gateway.seed("songs", json!({"id": "song-b", "title": "Grace", "duration_seconds": 200}));
    gateway.seed(SETLIST_SONGS, json!({"id": "a", "setlist": "sl1", "song": "song-a", "order_position": 1}));
    gateway.seed(SETLIST_SONGS, json!({"id": "b", "setlist": "sl1", "song": "song-b", "order_position": 2}));

    let setlists = client.setlist_store();
    setlists.load_setlist("sl1").await;
    assert_eq!(setlists.formatted_duration(), "7:20");

    assert_ok!(
        setlists
            .reorder_songs(vec![ReorderEntry::new("a", 2), ReorderEntry::new("b", 1)])
            .await
    );

    let builder = setlists.builder();
    let order: Vec<_> = builder
        .songs
        .iter()
        .map(|s| (s.id.as_str(), s.order_position))
        .collect();
    assert_eq!(order, vec![("b", 1), ("a", 2)]);
    assert!(builder.is_dirty);
    assert_eq!(gateway.call_count(Operation::Update, SETLIST_SONGS), 2);

    setlists.mark_clean();
    assert!(!setlists.builder().is_dirty);
}

#[tokio::test]
async fn test_failed_reorder_keeps_local_order() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(SETLISTS, json!({"id": "sl1", "church": "c1", "title": "Sunday"}));
    gateway.seed(SETLIST_SONGS, json!({"id": "a", "setlist": "sl1", "song": "x", "order_position": 1}));
    gateway.seed(SETLIST_SONGS, json!({"id": "b", "setlist": "sl1", "song": "y", "order_position": 2}));

    let setlists = client.setlist_store();
    setlists.load_setlist("sl1").await;
    gateway.fail_next(Operation::Update, SETLIST_SONGS, GatewayError::new(500, "Write failed"));

    assert_err!(
        setlists
            .reorder_songs(vec![ReorderEntry::new("a", 2), ReorderEntry::new("b", 1)])
            .await
    );

    let ids: Vec<_> = setlists.builder().songs.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(!setlists.builder().is_dirty);
    assert_eq!(setlists.error().as_deref(), Some("Write failed"));
}

#[tokio::test]
async fn test_builder_session_lifecycle() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed("songs", json!({"id": "song-a", "title": "Holy", "duration_seconds": 240}));
    gateway.seed("songs", json!({"id": "song-b", "title": "Grace", "duration_seconds": 3500}));

    let setlists = client.setlist_store();
    let err = assert_err!(setlists.add_song("song-a").await);
    assert!(matches!(err, StoreError::Validation(_)));

    let sunday = assert_ok!(setlists.create_setlist(SetlistDraft::new("Sunday")).await);
    setlists.load_setlist(&sunday.id).await;

    let first = assert_ok!(setlists.add_song("song-a").await);
    let second = assert_ok!(setlists.add_song("song-b").await);
    assert_eq!((first.order_position, second.order_position), (1, 2));
    assert_eq!(first.song_title(), Some("Holy"));
    assert_eq!(setlists.formatted_duration(), "1:02:20");

    assert_ok!(setlists.update_song(&first.id, json!({"duration_override": 60})).await);
    assert_eq!(setlists.total_duration(), 3560);

    assert!(setlists.toggle_selected(&first.id));
    assert!(setlists.toggle_selected(&second.id));
    assert_eq!(assert_ok!(setlists.remove_selected_songs().await), 2);
    assert!(setlists.builder().songs.is_empty());
    assert!(setlists.builder().selected.is_empty());

    assert_ok!(setlists.delete_setlist(&sunday.id).await);
    assert!(setlists.current_setlist().is_none());
}

#[tokio::test]
async fn test_builder_loading_spans_the_fetch() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(SETLISTS, json!({"id": "sl1", "church": "c1", "title": "Sunday"}));
    gateway.set_latency(Some(Duration::from_millis(30)));

    let setlists = client.setlist_store();
    let observe = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        setlists.builder().is_loading
    };
    let (_, mid_flight) = tokio::join!(setlists.load_setlist("sl1"), observe);

    assert!(mid_flight);
    assert!(!setlists.builder().is_loading);
    assert_eq!(setlists.current_setlist().map(|s| s.title).as_deref(), Some("Sunday"));
}

#[tokio::test]
async fn test_missing_setlist_is_recorded_not_thrown() {
    let client = client();
    let setlists = client.setlist_store();

    setlists.load_setlist("nope").await;

    assert!(setlists.error().is_some());
    assert!(setlists.current_setlist().is_none());
    assert!(!setlists.builder().is_loading);
}

#[tokio::test]
async fn test_has_mistral_key() {
    let keyed = client();
    keyed
        .gateway()
        .seed(CHURCH_SETTINGS, json!({"church": "c1", "mistral_api_key": "sk-test"}));
    let settings = keyed.settings_store();
    settings.load_settings().await;
    assert!(settings.has_mistral_key());

    let empty = client();
    empty.gateway().seed(CHURCH_SETTINGS, json!({"church": "c1"}));
    let settings = empty.settings_store();
    settings.load_settings().await;
    assert!(settings.initialized());
    assert!(!settings.has_mistral_key());
}

#[tokio::test]
async fn test_save_settings_creates_then_updates() {
    let client = client();
    let settings = client.settings_store();
    settings.load_settings().await;
    assert!(settings.settings().is_none());

    let created = assert_ok!(settings.set_mistral_api_key(VALID_KEY).await);
    assert_eq!(created.church, "c1");
    assert!(settings.has_mistral_key());

    let cleared = assert_ok!(settings.clear_mistral_api_key().await);
    assert_eq!(cleared.id, created.id);
    assert!(!settings.has_mistral_key());
    assert_eq!(client.gateway().records(CHURCH_SETTINGS).len(), 1);
}

#[tokio::test]
async fn test_save_before_load_updates_existing_settings() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(CHURCH_SETTINGS, json!({"id": "set-1", "church": "c1"}));
    gateway.seed(CHURCH_SETTINGS, json!({"id": "set-2", "church": "c2"}));

    let settings = client.settings_store();
    let saved = assert_ok!(settings.set_mistral_api_key(VALID_KEY).await);
    assert_eq!(saved.id, "set-1");
    assert!(settings.has_mistral_key());

    let ours = gateway
        .records(CHURCH_SETTINGS)
        .into_iter()
        .filter(|r| r["church"] == "c1")
        .count();
    assert_eq!(ours, 1);
    assert_eq!(gateway.call_count(Operation::Create, CHURCH_SETTINGS), 0);
}

#[tokio::test]
async fn test_malformed_mistral_key_skips_connection_test() {
    let client = client();
    let settings = client.settings_store();

    let outcome = settings.test_mistral_api_key("invalid-key").await;

    assert!(!outcome.success);
    assert_eq!(settings.api_key_valid(), Some(false));
    assert_eq!(settings.error().as_deref(), Some("Invalid API key format"));
    assert_eq!(client.gateway().call_count(Operation::Send, MISTRAL_TEST_PATH), 0);
}

#[tokio::test]
async fn test_mistral_key_checked_remotely() {
    let client = client();
    client.gateway().on_send(MISTRAL_TEST_PATH, |body| {
        let valid = body["api_key"] == VALID_KEY;
        let message = if valid { "Connected" } else { "Unauthorized" };
        Ok(json!({"valid": valid, "message": message}))
    });
    let settings = client.settings_store();

    let outcome = settings.test_mistral_api_key(VALID_KEY).await;
    assert!(outcome.success);
    assert_eq!(settings.api_key_valid(), Some(true));
    assert_eq!(settings.success().as_deref(), Some("Connected"));

    let outcome = settings.test_mistral_api_key("ABCDEFGHIJKLMNOPQRSTUVWXYZ012345").await;
    assert!(!outcome.success);
    assert_eq!(settings.api_key_valid(), Some(false));
    assert_eq!(settings.error().as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn test_elvanto_import() {
    let client = client();
    let gateway = client.gateway();
    gateway.on_send(ELVANTO_IMPORT_PATH, |_| {
        Ok(json!({"services_imported": 4, "songs_imported": 17, "skipped": 1}))
    });

    let settings = client.settings_store();
    let err = assert_err!(settings.import_from_elvanto().await);
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(gateway.call_count(Operation::Send, ELVANTO_IMPORT_PATH), 0);

    assert_ok!(settings.save_settings(json!({"elvanto_api_key": "elv-key"})).await);
    let summary = assert_ok!(settings.import_from_elvanto().await);

    assert_eq!(summary.songs_imported, 17);
    assert_eq!(
        settings.success().as_deref(),
        Some("Imported 4 services and 17 songs (1 skipped)")
    );
    assert!(!settings.is_importing());
}

#[tokio::test]
async fn test_elvanto_import_runs_once_at_a_time() {
    let client = client();
    let gateway = client.gateway();
    gateway.seed(CHURCH_SETTINGS, json!({"church": "c1", "elvanto_api_key": "elv-key"}));
    gateway.on_send(ELVANTO_IMPORT_PATH, |_| Ok(json!({"services_imported": 1})));

    let settings = client.settings_store();
    settings.load_settings().await;
    gateway.set_latency(Some(Duration::from_millis(30)));

    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        settings.import_from_elvanto().await
    };
    let (first, second) = tokio::join!(settings.import_from_elvanto(), second);

    assert_ok!(first);
    assert!(matches!(second, Err(StoreError::Busy(_))));
    assert_eq!(gateway.call_count(Operation::Send, ELVANTO_IMPORT_PATH), 1);
}

#[tokio::test]
async fn test_coverage_revalidates_after_roster_changes() {
    let client = client();
    let roles = client.role_store();

    let mut leader = RoleDraft::new("Leader");
    for permission in Permission::REQUIRED {
        leader = leader.grant(permission);
    }
    let leader = assert_ok!(roles.create_role(leader).await);
    let band = assert_ok!(roles.create_role(RoleDraft::new("Band").grant(Permission::ViewSchedule)).await);

    assert_ok!(roles.assign_role("u2", &band.id).await);
    assert_eq!(roles.missing_permissions().len(), Permission::REQUIRED.len() - 1);

    assert_ok!(roles.assign_role("u1", &leader.id).await);
    assert!(roles.missing_permissions().is_empty());

    assert_ok!(roles.delete_role(&leader.id).await);
    assert!(roles.missing_permissions().contains(&Permission::ManageChurch));
    assert!(roles.roles_for_user("u1").is_empty());
}
