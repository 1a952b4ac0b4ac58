//! Scripted scenarios, one per store.

use crate::display::{self, failed, header, ok, section, step};
use chrono::{Datelike, Duration as Days, Local};
use psalter_core::{Action, DragPayload, Permission, ReorderEntry, SetlistStatus};
use psalter_sdk::stores::settings::{ELVANTO_IMPORT_PATH, MISTRAL_TEST_PATH};
use psalter_sdk::stores::{ROLES, SETLIST_SONGS, SKILLS, USER_ROLES, USER_SKILLS};
use psalter_sdk::{
    AuthContext, ChurchClient, GatewayError, MemoryGateway, Operation, Result, RoleDraft, SetlistDraft,
    SkillDraft, StaticAuth, StoreConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CHURCH: &str = "grace-chapel";
const ME: &str = "user-ruth";

/// A client signed in as Ruth, over a gateway holding members, songs and the
/// church's system role.
fn seeded_client(config: StoreConfig) -> ChurchClient<MemoryGateway> {
    let auth = Arc::new(StaticAuth::new(
        AuthContext::new(CHURCH, ME).with_membership("member-ruth"),
    ));
    let client = ChurchClient::with_memory_gateway(auth, config);
    let gateway = client.gateway();

    gateway.relate(USER_ROLES, "user", "users");
    gateway.relate(USER_ROLES, "role", ROLES);
    gateway.relate(USER_SKILLS, "user", "users");
    gateway.relate(USER_SKILLS, "skill", SKILLS);
    gateway.relate(SETLIST_SONGS, "song", "songs");

    for (id, name) in [(ME, "Ruth"), ("user-sam", "Sam"), ("user-ines", "Inès")] {
        gateway.seed("users", json!({"id": id, "name": name, "email": format!("{}@example.org", id)}));
    }
    for (id, title, seconds) in [
        ("song-holy", "Holy, Holy, Holy", 245),
        ("song-grace", "Amazing Grace", 270),
        ("song-cornerstone", "Cornerstone", 310),
        ("song-doxology", "Doxology", 65),
    ] {
        gateway.seed("songs", json!({"id": id, "title": title, "duration_seconds": seconds}));
    }
    gateway.seed(
        ROLES,
        json!({
            "id": "role-owner",
            "church": CHURCH,
            "name": "Owner",
            "permissions": ["manage_church"],
            "is_system": true,
        }),
    );
    client
}

fn upcoming_sundays(count: usize) -> Vec<String> {
    let today = Local::now().date_naive();
    let offset = (7 - today.weekday().num_days_from_sunday()) % 7;
    (0..count)
        .map(|week| {
            let date = today + Days::days(i64::from(offset) + 7 * week as i64);
            date.format("%Y-%m-%d").to_string()
        })
        .collect()
}

fn permissions(list: &[Permission]) -> String {
    if list.is_empty() {
        return "none".to_string();
    }
    list.iter().map(Permission::as_str).collect::<Vec<_>>().join(", ")
}

// ─── Roles ─────────────────────────────────────────────────────────────────

pub async fn run_roles(config: StoreConfig) -> Result<()> {
    header("ROLES: coverage follows the roster");
    let client = seeded_client(config);
    let roles = client.role_store();

    section("Loading the roster once");
    roles.load_roles_once().await;
    roles.load_roles_once().await;
    roles.load_user_roles().await;
    step(&format!(
        "{} role(s), {} gateway read(s)",
        roles.roles().len(),
        client.gateway().call_count(Operation::GetFullList, ROLES)
    ));

    section("Creating roles");
    let mut leader = RoleDraft::new("Worship Leader");
    for permission in Permission::REQUIRED {
        if permission != Permission::ManageChurch {
            leader = leader.grant(permission);
        }
    }
    let leader = roles.create_role(leader).await?;
    let band = roles
        .create_role(RoleDraft::new("Band").grant(Permission::ViewSchedule))
        .await?;
    step(&format!("missing: {}", permissions(&roles.missing_permissions())));

    section("Assigning members");
    roles.assign_role(ME, &leader.id).await?;
    roles.assign_role("user-sam", &band.id).await?;
    roles.assign_role("user-sam", &band.id).await?;
    roles.assign_role("user-ines", "role-owner").await?;
    step(&format!("missing: {}", permissions(&roles.missing_permissions())));
    step(&format!(
        "Ruth can manage setlists: {}",
        roles.current_user_can(Permission::ManageSetlists)
    ));
    let band_members: Vec<_> = roles
        .users_with_role(&band.id)
        .await
        .into_iter()
        .map(|u| u.name)
        .collect();
    step(&format!("Band: {}", band_members.join(", ")));

    section("Deleting the system role");
    match roles.delete_role("role-owner").await {
        Ok(()) => ok("deleted"),
        Err(e) => failed(&e.to_string()),
    }
    display::status(roles.is_loading(), roles.error(), None);
    roles.clear_error();
    Ok(())
}

// ─── Setlist ───────────────────────────────────────────────────────────────

pub async fn run_setlist(config: StoreConfig) -> Result<()> {
    header("SETLIST: filters and a builder session");
    let client = seeded_client(config);
    let setlists = client.setlist_store();
    let sundays = upcoming_sundays(3);

    section("Planning the next Sundays");
    for (i, date) in sundays.iter().enumerate() {
        let status = if i == 0 { SetlistStatus::Published } else { SetlistStatus::Draft };
        setlists
            .create_setlist(SetlistDraft::new(format!("Sunday Morning {}", i + 1)).service_date(date).status(status))
            .await?;
    }
    setlists
        .create_setlist(SetlistDraft::new("Good Friday Vigil").status(SetlistStatus::Archived))
        .await?;
    setlists.load_setlists().await;
    display::setlists(&setlists.setlists());

    section("Filtering");
    setlists.set_status_filter(Some(SetlistStatus::Draft)).await;
    step(&format!("drafts: {} of {}", setlists.setlists().len(), setlists.total_items()));
    setlists.set_search("vigil").await;
    step(&format!("drafts matching \"vigil\": {}", setlists.setlists().len()));
    setlists.reset_filters().await;
    let counts = setlists.count_by_status();
    step(&format!(
        "draft {} / published {} / archived {}",
        counts.draft, counts.published, counts.archived
    ));

    section("Building the first Sunday");
    let Some(first) = setlists.setlists().into_iter().find(|s| s.status == SetlistStatus::Published) else {
        failed("no published setlist");
        return Ok(());
    };
    setlists.load_setlist(&first.id).await;
    let holy = setlists.add_song("song-holy").await?;
    let grace = setlists.add_song("song-grace").await?;
    let cornerstone = setlists.add_song("song-cornerstone").await?;
    let doxology = setlists.add_song("song-doxology").await?;
    setlists.update_song(&doxology.id, json!({"duration_override": 90})).await?;
    display::builder(&setlists.builder(), &setlists.formatted_duration());

    section("Dragging Cornerstone to the top");
    setlists.begin_drag(DragPayload {
        song_id: None,
        setlist_song_id: Some(cornerstone.id.clone()),
        from_index: Some(2),
    });
    if let Some(drag) = setlists.end_drag() {
        step(&format!("dropped {:?}", drag.setlist_song_id.unwrap_or_default()));
    }
    setlists
        .reorder_songs(vec![
            ReorderEntry::new(&cornerstone.id, 1),
            ReorderEntry::new(&holy.id, 2),
            ReorderEntry::new(&grace.id, 3),
        ])
        .await?;
    display::builder(&setlists.builder(), &setlists.formatted_duration());
    setlists.mark_clean();

    section("Removing the selected songs");
    setlists.toggle_selected(&grace.id);
    setlists.toggle_selected(&doxology.id);
    let removed = setlists.remove_selected_songs().await?;
    step(&format!("removed {}", removed));
    display::builder(&setlists.builder(), &setlists.formatted_duration());

    setlists.clear_builder();
    Ok(())
}

// ─── Skills ────────────────────────────────────────────────────────────────

pub async fn run_skills(config: StoreConfig) -> Result<()> {
    header("SKILLS: one shared catalogue");
    let client = seeded_client(config);
    let editor = client.skill_store();
    let viewer = client.skill_store();

    section("Creating the catalogue");
    let keys = editor.create_skill(SkillDraft::new("Keys").category("Band")).await?;
    let drums = editor.create_skill(SkillDraft::new("Drums").category("Band")).await?;
    editor.create_skill(SkillDraft::new("Sound Desk").category("Tech")).await?;
    editor.create_skill(SkillDraft::new("Welcome")).await?;
    for (category, skills) in viewer.skills_by_category() {
        let names: Vec<_> = skills.into_iter().map(|s| s.name).collect();
        step(&format!("{}: {}", category, names.join(", ")));
    }

    section("Assigning skills");
    editor.assign_skill(ME, &keys.id, Some("lead")).await?;
    editor.assign_skill("user-sam", &drums.id, None).await?;
    let held: Vec<_> = viewer.skills_for_user(ME).into_iter().map(|s| s.name).collect();
    step(&format!("Ruth plays: {}", held.join(", ")));
    let drummers: Vec<_> = viewer.users_with_skill(&drums.id).await.into_iter().map(|u| u.name).collect();
    step(&format!("Drums: {}", drummers.join(", ")));

    section("Deleting a skill that is still assigned");
    client.gateway().fail_next(
        Operation::Delete,
        SKILLS,
        GatewayError::bad_request("Failed to delete record.")
            .with_data(json!({"message": "Cannot delete skill with assigned users"})),
    );
    match editor.delete_skill(&drums.id).await {
        Ok(()) => ok("deleted"),
        Err(e) => failed(&e.display_message()),
    }
    step(&format!("catalogue still holds {} skills", viewer.skills().len()));
    display::status(viewer.is_loading(), viewer.error(), None);
    Ok(())
}

// ─── Settings ──────────────────────────────────────────────────────────────

pub async fn run_settings(config: StoreConfig) -> Result<()> {
    header("SETTINGS: API keys and the Elvanto import");
    let client = seeded_client(config);
    let gateway = client.gateway();
    let valid_key = "a".repeat(16) + "0123456789ABCDEF";

    let expected = valid_key.clone();
    gateway.on_send(MISTRAL_TEST_PATH, move |body| {
        let valid = body["api_key"] == expected.as_str();
        let message = if valid { "Mistral connection works" } else { "Mistral rejected the key" };
        Ok(json!({"valid": valid, "message": message}))
    });
    gateway.on_send(ELVANTO_IMPORT_PATH, |_| {
        Ok(json!({"services_imported": 6, "songs_imported": 41, "skipped": 3}))
    });

    let settings = client.settings_store();
    settings.load_settings_once().await;
    step(&format!("Mistral key on file: {}", settings.has_mistral_key()));

    section("Testing keys");
    let outcome = settings.test_mistral_api_key("invalid-key").await;
    failed(&outcome.message);
    step(&format!(
        "connection tests sent: {}",
        gateway.call_count(Operation::Send, MISTRAL_TEST_PATH)
    ));
    let outcome = settings.test_mistral_api_key(&valid_key).await;
    ok(&outcome.message);
    settings.set_mistral_api_key(&valid_key).await?;
    step(&format!("Mistral key on file: {}", settings.has_mistral_key()));

    section("Importing from Elvanto");
    if let Err(e) = settings.import_from_elvanto().await {
        failed(&e.display_message());
    }
    settings.save_settings(json!({"elvanto_api_key": "elvanto-demo-key"})).await?;
    settings.clear_error();
    settings.import_from_elvanto().await?;
    display::status(settings.is_loading(), settings.error(), settings.success());
    settings.clear_success();
    Ok(())
}

// ─── Realtime ──────────────────────────────────────────────────────────────

pub async fn run_realtime(config: StoreConfig) -> Result<()> {
    header("REALTIME: another client edits the setlist");
    let client = seeded_client(config);
    let gateway = Arc::clone(client.gateway());
    let setlists = client.setlist_store();

    let sunday = setlists.create_setlist(SetlistDraft::new("Evening Prayer")).await?;
    setlists.load_setlist(&sunday.id).await;
    let holy = setlists.add_song("song-holy").await?;
    let songs = setlists.subscribe_to_setlist_songs().await?;
    let list = setlists.subscribe_to_updates().await?;

    section("Events arrive");
    gateway.emit(
        SETLIST_SONGS,
        Action::Update,
        json!({"id": holy.id, "setlist": sunday.id, "song": "song-holy", "order_position": 1, "key_override": "D"}),
    );
    gateway.emit(
        SETLIST_SONGS,
        Action::Create,
        json!({"id": "remote-slot", "setlist": sunday.id, "song": "song-grace", "order_position": 2, "duration_override": 200}),
    );
    gateway.emit(
        SETLIST_SONGS,
        Action::Update,
        json!({"id": "not-cached", "setlist": sunday.id, "song": "song-grace", "order_position": 9}),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    display::builder(&setlists.builder(), &setlists.formatted_duration());

    section("Unsubscribing");
    songs.unsubscribe();
    list.unsubscribe();
    gateway.emit(
        SETLIST_SONGS,
        Action::Delete,
        json!({"id": holy.id, "setlist": sunday.id, "song": "song-holy", "order_position": 1}),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    step(&format!("slots after unsubscribe: {}", setlists.builder().songs.len()));
    Ok(())
}
