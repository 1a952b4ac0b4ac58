//! Per-church integration settings: API keys and the Elvanto import.

use crate::auth::StoreContext;
use crate::error::{Result, StoreError};
use crate::gateway::{Gateway, ListQuery, SendOptions};
use crate::mirror::{decode, CollectionMirror};
use crate::realtime::SubscriptionHandle;
use parking_lot::RwLock;
use psalter_core::{ChurchSettings, Placement};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub const CHURCH_SETTINGS: &str = "church_settings";

pub const MISTRAL_TEST_PATH: &str = "/api/mistral/test-key";
pub const ELVANTO_IMPORT_PATH: &str = "/api/elvanto/import";

const MISTRAL_KEY_LEN: usize = 32;

/// Result of checking a Mistral API key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyTestOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Deserialize)]
struct KeyCheck {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Counts reported by an Elvanto import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    #[serde(default)]
    pub services_imported: u32,
    #[serde(default)]
    pub songs_imported: u32,
    #[serde(default)]
    pub skipped: u32,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Imported {} {} and {} {}",
            self.services_imported,
            plural(self.services_imported, "service"),
            self.songs_imported,
            plural(self.songs_imported, "song"),
        );
        if self.skipped > 0 {
            message.push_str(&format!(" ({} skipped)", self.skipped));
        }
        message
    }
}

fn plural(n: u32, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Mistral keys are exactly 32 ASCII letters and digits.
pub fn is_valid_mistral_key(key: &str) -> bool {
    key.len() == MISTRAL_KEY_LEN && key.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Clears the import flag when an import settles or is dropped.
struct Importing<'a>(&'a AtomicBool);

impl Drop for Importing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The settings record of the signed-in church, if one exists.
pub struct SettingsStore<G: Gateway> {
    settings: CollectionMirror<ChurchSettings, G>,
    api_key_valid: RwLock<Option<bool>>,
    importing: AtomicBool,
}

impl<G: Gateway> SettingsStore<G> {
    pub fn new(ctx: StoreContext<G>) -> Self {
        Self {
            settings: CollectionMirror::new(CHURCH_SETTINGS, ctx, Placement::Append).scoped_by("church"),
            api_key_valid: RwLock::new(None),
            importing: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> Option<ChurchSettings> {
        self.settings.items().into_iter().next()
    }

    pub fn mirror(&self) -> &CollectionMirror<ChurchSettings, G> {
        &self.settings
    }

    pub fn has_mistral_key(&self) -> bool {
        self.settings().is_some_and(|s| s.has_mistral_key())
    }

    pub fn has_elvanto_key(&self) -> bool {
        self.settings().is_some_and(|s| s.has_elvanto_key())
    }

    /// Outcome of the last key test, `None` before any test ran.
    pub fn api_key_valid(&self) -> Option<bool> {
        *self.api_key_valid.read()
    }

    pub fn is_importing(&self) -> bool {
        self.importing.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.settings.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.settings.error()
    }

    pub fn success(&self) -> Option<String> {
        self.settings.success()
    }

    pub fn initialized(&self) -> bool {
        self.settings.initialized()
    }

    pub fn clear_error(&self) {
        self.settings.clear_error();
    }

    pub fn clear_success(&self) {
        self.settings.clear_success();
    }

    async fn fetch_settings(&self) -> Result<Vec<ChurchSettings>> {
        let auth = self.settings.context().require_auth()?;
        let query = ListQuery::new().eq("church", auth.church_id);
        let mut rows = self.settings.fetch_all(&query).await?;
        rows.truncate(1);
        Ok(rows)
    }

    pub async fn load_settings(&self) {
        self.settings.load_from(self.fetch_settings()).await;
    }

    pub async fn load_settings_once(&self) {
        self.settings.load_once_from(|| self.fetch_settings()).await;
    }

    /// Write `patch` to the church's settings, creating the record on first save.
    ///
    /// With nothing cached the server is asked first, so a save before any
    /// load updates the existing record instead of adding a second one.
    pub async fn save_settings(&self, patch: Value) -> Result<ChurchSettings> {
        let current = match self.settings() {
            Some(current) => Some(current),
            None => self.find_remote_settings().await?,
        };
        match current {
            Some(current) => self.settings.update(&current.id, patch).await,
            None => self.settings.create(patch).await,
        }
    }

    async fn find_remote_settings(&self) -> Result<Option<ChurchSettings>> {
        let found = self
            .settings
            .track("save_settings", self.fetch_settings())
            .await?
            .into_iter()
            .next();
        if let Some(existing) = &found {
            self.settings.modify(|state| state.insert(existing.clone(), Placement::Append));
        }
        Ok(found)
    }

    pub async fn set_mistral_api_key(&self, key: &str) -> Result<ChurchSettings> {
        let saved = self.save_settings(json!({ "mistral_api_key": key.trim() })).await?;
        *self.api_key_valid.write() = None;
        Ok(saved)
    }

    pub async fn clear_mistral_api_key(&self) -> Result<ChurchSettings> {
        let saved = self.save_settings(json!({ "mistral_api_key": null })).await?;
        *self.api_key_valid.write() = None;
        Ok(saved)
    }

    /// Check `key` locally, then against the server.
    ///
    /// A malformed key never reaches the server. Failures are recorded in
    /// `error` and reported in the outcome rather than returned.
    pub async fn test_mistral_api_key(&self, key: &str) -> KeyTestOutcome {
        if !is_valid_mistral_key(key.trim()) {
            let err = StoreError::Validation("Invalid API key format".to_string());
            self.settings.record_error("test_mistral_api_key", &err);
            *self.api_key_valid.write() = Some(false);
            return KeyTestOutcome {
                success: false,
                message: err.display_message(),
            };
        }

        let ctx = self.settings.context();
        let checked = self
            .settings
            .track("test_mistral_api_key", async {
                let raw = ctx
                    .gateway
                    .send(MISTRAL_TEST_PATH, SendOptions::post(json!({ "api_key": key.trim() })))
                    .await?;
                decode::<KeyCheck>(MISTRAL_TEST_PATH, raw)
            })
            .await;

        match checked {
            Ok(check) if check.valid => {
                *self.api_key_valid.write() = Some(true);
                let message = check.message.unwrap_or_else(|| "API key is valid".to_string());
                self.settings.set_success(message.clone());
                KeyTestOutcome {
                    success: true,
                    message,
                }
            }
            Ok(check) => {
                let err = StoreError::Validation(
                    check.message.unwrap_or_else(|| "API key was rejected".to_string()),
                );
                self.settings.record_error("test_mistral_api_key", &err);
                *self.api_key_valid.write() = Some(false);
                KeyTestOutcome {
                    success: false,
                    message: err.display_message(),
                }
            }
            Err(e) => {
                *self.api_key_valid.write() = Some(false);
                KeyTestOutcome {
                    success: false,
                    message: e.display_message(),
                }
            }
        }
    }

    /// Import services and songs from Elvanto.
    ///
    /// Only one import runs at a time; a second call while one is running
    /// fails with [`StoreError::Busy`]. The summary lands in `success`.
    pub async fn import_from_elvanto(&self) -> Result<ImportSummary> {
        if self.importing.swap(true, Ordering::SeqCst) {
            let err = StoreError::Busy("Elvanto import".to_string());
            self.settings.record_error("import_from_elvanto", &err);
            return Err(err);
        }
        let _importing = Importing(&self.importing);

        if !self.has_elvanto_key() {
            let err = StoreError::Validation("Add an Elvanto API key before importing".to_string());
            self.settings.record_error("import_from_elvanto", &err);
            return Err(err);
        }

        let ctx = self.settings.context();
        let summary = self
            .settings
            .track("import_from_elvanto", async {
                let auth = ctx.require_auth()?;
                let raw = ctx
                    .gateway
                    .send(ELVANTO_IMPORT_PATH, SendOptions::post(json!({ "church": auth.church_id })))
                    .await?;
                decode::<ImportSummary>(ELVANTO_IMPORT_PATH, raw)
            })
            .await?;

        let message = summary.message();
        info!("Elvanto import finished: {}", message);
        self.settings.set_success(message);
        Ok(summary)
    }

    pub async fn subscribe_to_updates(&self) -> Result<SubscriptionHandle> {
        match self.settings() {
            Some(current) => self.settings.subscribe_to_updates(&current.id).await,
            None => self.settings.subscribe_to_updates("*").await,
        }
    }
}
