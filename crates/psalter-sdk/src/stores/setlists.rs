//! Setlists and the setlist builder.
//!
//! The list side is a newest-first mirror of one page of setlists, driven by
//! a [`SetlistFilter`]; changing the filter reloads. The builder side holds
//! one open setlist with its ordered song slots plus UI scratch state, see
//! [`BuilderState`].

use crate::auth::StoreContext;
use crate::error::{Result, StoreError};
use crate::gateway::{Gateway, ListQuery, RecordOptions};
use crate::mirror::{decode, decode_all, CollectionMirror};
use crate::realtime::SubscriptionHandle;
use futures::future::{join_all, try_join_all};
use parking_lot::RwLock;
use psalter_core::{
    apply_positions, format_duration, next_position, Action, BuilderState, DragPayload, Placement,
    RealtimeEvent, ReorderEntry, Setlist, SetlistSong, SetlistStatus,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SETLISTS: &str = "setlists";
pub const SETLIST_SONGS: &str = "setlist_songs";

const SEARCH_FIELDS: [&str; 2] = ["title", "notes"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetlistFilter {
    pub search: String,
    pub status: Option<SetlistStatus>,
    pub sort: String,
}

impl SetlistFilter {
    pub fn sorted_by(sort: impl Into<String>) -> Self {
        Self {
            search: String::new(),
            status: None,
            sort: sort.into(),
        }
    }

    /// Whether `setlist` would be part of a page fetched with this filter.
    pub fn matches(&self, setlist: &Setlist) -> bool {
        if self.status.is_some_and(|status| status != setlist.status) {
            return false;
        }
        let term = self.search.to_lowercase();
        term.is_empty()
            || setlist.title.to_lowercase().contains(&term)
            || setlist.notes.to_lowercase().contains(&term)
    }
}

/// Fields for a new setlist. Church and author come from the signed-in user.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SetlistDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_date: Option<String>,
    pub status: SetlistStatus,
    pub notes: String,
}

impl SetlistDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn service_date(mut self, date: impl Into<String>) -> Self {
        self.service_date = Some(date.into());
        self
    }

    pub fn status(mut self, status: SetlistStatus) -> Self {
        self.status = status;
        self
    }
}

/// Number of cached setlists per status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub draft: usize,
    pub published: usize,
    pub archived: usize,
}

/// Clears `is_loading` on the builder when a builder call settles or is dropped.
struct BuilderPending<'a>(&'a RwLock<BuilderState>);

impl<'a> BuilderPending<'a> {
    fn begin(builder: &'a RwLock<BuilderState>) -> Self {
        builder.write().is_loading = true;
        Self(builder)
    }
}

impl Drop for BuilderPending<'_> {
    fn drop(&mut self) {
        self.0.write().is_loading = false;
    }
}

fn song_options() -> RecordOptions {
    RecordOptions::expand("song")
}

/// Keep the cached song expansion when a pushed slot arrives without one.
fn keep_expansion(builder: &BuilderState, mut event: RealtimeEvent<SetlistSong>) -> RealtimeEvent<SetlistSong> {
    if event.action != Action::Delete && event.record.expand.is_none() {
        event.record.expand = builder
            .songs
            .iter()
            .find(|s| s.id == event.record.id && s.song == event.record.song)
            .and_then(|s| s.expand.clone());
    }
    event
}

pub struct SetlistStore<G: Gateway> {
    setlists: CollectionMirror<Setlist, G>,
    filter: Arc<RwLock<SetlistFilter>>,
    total_items: Arc<RwLock<usize>>,
    builder: Arc<RwLock<BuilderState>>,
}

impl<G: Gateway> SetlistStore<G> {
    pub fn new(ctx: StoreContext<G>) -> Self {
        let filter = SetlistFilter::sorted_by(ctx.config.default_setlist_sort.clone());
        Self {
            setlists: CollectionMirror::new(SETLISTS, ctx, Placement::Prepend).scoped_by("church"),
            filter: Arc::new(RwLock::new(filter)),
            total_items: Arc::new(RwLock::new(0)),
            builder: Arc::new(RwLock::new(BuilderState::new())),
        }
    }

    fn ctx(&self) -> &StoreContext<G> {
        self.setlists.context()
    }

    pub fn setlists(&self) -> Vec<Setlist> {
        self.setlists.items()
    }

    pub fn mirror(&self) -> &CollectionMirror<Setlist, G> {
        &self.setlists
    }

    /// Matching setlists on the server, beyond the loaded page.
    pub fn total_items(&self) -> usize {
        *self.total_items.read()
    }

    pub fn filter(&self) -> SetlistFilter {
        self.filter.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.setlists.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.setlists.error()
    }

    pub fn initialized(&self) -> bool {
        self.setlists.initialized()
    }

    pub fn clear_error(&self) {
        self.setlists.clear_error();
    }

    pub fn count_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for setlist in self.setlists.items() {
            match setlist.status {
                SetlistStatus::Draft => counts.draft += 1,
                SetlistStatus::Published => counts.published += 1,
                SetlistStatus::Archived => counts.archived += 1,
            }
        }
        counts
    }

    async fn fetch_page(&self) -> Result<Vec<Setlist>> {
        let auth = self.ctx().require_auth()?;
        let filter = self.filter();

        let mut query = ListQuery::new()
            .eq("church", auth.church_id)
            .search(SEARCH_FIELDS, filter.search)
            .sort(filter.sort);
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }

        let page = self
            .ctx()
            .gateway
            .get_list(SETLISTS, 1, self.ctx().config.page_size, &query)
            .await?;
        let items = decode_all(SETLISTS, page.items)?;
        *self.total_items.write() = page.total_items;
        Ok(items)
    }

    pub async fn load_setlists(&self) {
        self.setlists.load_from(self.fetch_page()).await;
    }

    pub async fn load_setlists_once(&self) {
        self.setlists.load_once_from(|| self.fetch_page()).await;
    }

    pub async fn set_search(&self, search: impl Into<String>) {
        self.filter.write().search = search.into();
        self.load_setlists().await;
    }

    pub async fn set_status_filter(&self, status: Option<SetlistStatus>) {
        self.filter.write().status = status;
        self.load_setlists().await;
    }

    pub async fn set_sort(&self, sort: impl Into<String>) {
        self.filter.write().sort = sort.into();
        self.load_setlists().await;
    }

    pub async fn reset_filters(&self) {
        *self.filter.write() = SetlistFilter::sorted_by(self.ctx().config.default_setlist_sort.clone());
        self.load_setlists().await;
    }

    pub async fn create_setlist(&self, draft: SetlistDraft) -> Result<Setlist> {
        let mut data = json!(draft);
        if let (Some(auth), Some(object)) = (self.ctx().auth.current(), data.as_object_mut()) {
            object.insert("created_by".to_string(), Value::String(auth.user_id));
        }

        let setlist = self.setlists.create(data).await?;
        *self.total_items.write() += 1;
        Ok(setlist)
    }

    pub async fn update_setlist(&self, id: &str, patch: Value) -> Result<Setlist> {
        let setlist = self.setlists.update(id, patch).await?;
        let mut builder = self.builder.write();
        if builder.is_open_for(id) {
            builder.setlist = Some(setlist.clone());
        }
        Ok(setlist)
    }

    /// Delete a setlist, closing the builder if it was open on it.
    pub async fn delete_setlist(&self, id: &str) -> Result<()> {
        self.setlists.delete(id).await?;
        {
            let mut total = self.total_items.write();
            *total = total.saturating_sub(1);
        }
        let mut builder = self.builder.write();
        if builder.is_open_for(id) {
            builder.clear();
        }
        Ok(())
    }

    // Builder

    /// Snapshot of the builder session.
    pub fn builder(&self) -> BuilderState {
        self.builder.read().clone()
    }

    pub fn current_setlist(&self) -> Option<Setlist> {
        self.builder.read().setlist.clone()
    }

    pub fn total_duration(&self) -> u32 {
        self.builder.read().total_duration()
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.total_duration())
    }

    async fn track_builder<R, Fut>(&self, operation: &str, call: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        debug!("builder {} dispatched", operation);
        self.setlists.clear_error();
        let _pending = BuilderPending::begin(&self.builder);
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.setlists.record_error(operation, &e);
                Err(e)
            }
        }
    }

    fn open_setlist_id(&self) -> Result<String> {
        self.builder
            .read()
            .setlist_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Validation("No setlist is open".to_string()))
    }

    /// Open the builder on `id`, fetching the setlist and its ordered slots.
    ///
    /// Failures are recorded and leave the builder as it was.
    pub async fn load_setlist(&self, id: &str) {
        let loaded = self
            .track_builder("load_setlist", async {
                self.ctx().require_auth()?;
                let gateway = &self.ctx().gateway;
                let options = RecordOptions::default();
                let query = ListQuery::new()
                    .eq("setlist", id)
                    .sort("order_position")
                    .expand("song");
                let (setlist, songs) = futures::try_join!(
                    gateway.get_one(SETLISTS, id, &options),
                    gateway.get_full_list(SETLIST_SONGS, &query),
                )?;
                let setlist: Setlist = decode(SETLISTS, setlist)?;
                let songs: Vec<SetlistSong> = decode_all(SETLIST_SONGS, songs)?;
                Ok::<_, StoreError>((setlist, songs))
            })
            .await;

        if let Ok((setlist, songs)) = loaded {
            self.setlists.modify(|state| state.replace(setlist.clone()));
            self.builder.write().open(setlist, songs);
        }
    }

    /// Append `song_id` to the open setlist.
    pub async fn add_song(&self, song_id: &str) -> Result<SetlistSong> {
        let slot = self
            .track_builder("add_song", async {
                let setlist_id = self.open_setlist_id()?;
                let position = next_position(&self.builder.read().songs);
                let data = json!({
                    "setlist": setlist_id,
                    "song": song_id,
                    "order_position": position,
                });
                let raw = self.ctx().gateway.create(SETLIST_SONGS, data, &song_options()).await?;
                decode::<SetlistSong>(SETLIST_SONGS, raw)
            })
            .await?;

        let mut builder = self.builder.write();
        if builder.is_open_for(&slot.setlist) {
            builder.upsert_song(slot.clone());
        }
        Ok(slot)
    }

    /// Update a slot, e.g. its key or duration override.
    pub async fn update_song(&self, setlist_song_id: &str, patch: Value) -> Result<SetlistSong> {
        let slot = self
            .track_builder("update_song", async {
                let raw = self
                    .ctx()
                    .gateway
                    .update(SETLIST_SONGS, setlist_song_id, patch, &song_options())
                    .await?;
                decode::<SetlistSong>(SETLIST_SONGS, raw)
            })
            .await?;

        self.builder.write().replace_song(slot.clone());
        Ok(slot)
    }

    pub async fn remove_song(&self, setlist_song_id: &str) -> Result<()> {
        self.track_builder("remove_song", async {
            self.ctx().gateway.delete(SETLIST_SONGS, setlist_song_id).await?;
            Ok::<_, StoreError>(())
        })
        .await?;

        self.builder.write().remove_song(setlist_song_id);
        Ok(())
    }

    /// Delete every selected slot. Slots whose delete succeeded leave the
    /// builder even when others fail; the first failure is returned.
    pub async fn remove_selected_songs(&self) -> Result<usize> {
        let selected: Vec<String> = self.builder.read().selected.iter().cloned().collect();
        if selected.is_empty() {
            return Ok(0);
        }

        self.track_builder("remove_selected_songs", async {
            let gateway = &self.ctx().gateway;
            let results = join_all(selected.iter().map(|id| gateway.delete(SETLIST_SONGS, id))).await;

            let mut removed = 0;
            let mut failure = None;
            {
                let mut builder = self.builder.write();
                for (id, result) in selected.iter().zip(results) {
                    match result {
                        Ok(()) => {
                            builder.remove_song(id);
                            removed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to remove setlist song {}: {}", id, e);
                            failure.get_or_insert(e);
                        }
                    }
                }
            }

            match failure {
                Some(e) => Err(StoreError::from(e)),
                None => Ok(removed),
            }
        })
        .await
    }

    /// Persist new slot positions, then reorder the builder to match.
    ///
    /// The local order follows `entries` once every update succeeded.
    pub async fn reorder_songs(&self, entries: Vec<ReorderEntry>) -> Result<()> {
        self.track_builder("reorder_songs", async {
            let gateway = &self.ctx().gateway;
            let options = RecordOptions::default();
            try_join_all(entries.iter().map(|entry| {
                gateway.update(
                    SETLIST_SONGS,
                    &entry.id,
                    json!({ "order_position": entry.order_position }),
                    &options,
                )
            }))
            .await?;
            Ok::<_, StoreError>(())
        })
        .await?;

        let mut builder = self.builder.write();
        apply_positions(&mut builder.songs, &entries);
        builder.is_dirty = true;
        Ok(())
    }

    pub fn begin_drag(&self, payload: DragPayload) {
        self.builder.write().begin_drag(payload);
    }

    pub fn end_drag(&self) -> Option<DragPayload> {
        self.builder.write().end_drag()
    }

    pub fn toggle_selected(&self, setlist_song_id: &str) -> bool {
        self.builder.write().toggle_selected(setlist_song_id)
    }

    pub fn select_all(&self) {
        self.builder.write().select_all();
    }

    pub fn clear_selection(&self) {
        self.builder.write().clear_selection();
    }

    pub fn mark_clean(&self) {
        self.builder.write().is_dirty = false;
    }

    pub fn clear_builder(&self) {
        self.builder.write().clear();
    }

    /// Follow slot changes of the open setlist.
    pub async fn subscribe_to_setlist_songs(&self) -> Result<SubscriptionHandle> {
        let subscription = self
            .track_builder("subscribe_to_setlist_songs", async {
                self.open_setlist_id()?;
                Ok::<_, StoreError>(self.ctx().gateway.subscribe(SETLIST_SONGS, "*").await?)
            })
            .await?;

        let builder = Arc::clone(&self.builder);
        Ok(SubscriptionHandle::spawn(SETLIST_SONGS, subscription, move |raw| {
            match raw.try_map(|r| decode::<SetlistSong>(SETLIST_SONGS, r)) {
                Ok(event) => {
                    let mut builder = builder.write();
                    let event = keep_expansion(&builder, event);
                    builder.fold_song_event(event);
                }
                Err(e) => warn!("Dropping undecodable {} event: {}", SETLIST_SONGS, e),
            }
        }))
    }

    /// Follow pushed setlist changes.
    ///
    /// Creates the active filter would exclude are skipped. New and removed
    /// rows adjust `total_items`.
    pub async fn subscribe_to_updates(&self) -> Result<SubscriptionHandle> {
        let filter = Arc::clone(&self.filter);
        let total = Arc::clone(&self.total_items);
        self.setlists
            .subscribe_with("*", move |event, state| {
                let cached = state.contains(&event.record.id);
                match event.action {
                    Action::Create if cached => true,
                    Action::Create => {
                        if !filter.read().matches(&event.record) {
                            return false;
                        }
                        *total.write() += 1;
                        true
                    }
                    Action::Delete if cached => {
                        let mut total = total.write();
                        *total = total.saturating_sub(1);
                        true
                    }
                    Action::Update | Action::Delete => true,
                }
            })
            .await
    }
}
