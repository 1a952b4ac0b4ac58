//! Builder state for an open setlist editing session.
//!
//! The builder holds the setlist being edited, its ordered song slots, a
//! dirty flag and UI scratch state (drag payload, multi-selection). None of
//! the scratch state is ever persisted; [`BuilderState::clear`] resets all of
//! it together.

use crate::event::{Action, RealtimeEvent};
use crate::model::{Setlist, SetlistSong};
use crate::ordering::{insert_sorted, sort_by_position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What is currently being dragged in the builder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragPayload {
    /// A library song being dragged in.
    pub song_id: Option<String>,
    /// An existing slot being moved.
    pub setlist_song_id: Option<String>,
    pub from_index: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuilderState {
    pub setlist: Option<Setlist>,
    pub songs: Vec<SetlistSong>,
    pub is_dirty: bool,
    pub is_loading: bool,
    pub drag: Option<DragPayload>,
    pub selected: BTreeSet<String>,
}

impl BuilderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session on `setlist` with a clean slate.
    pub fn open(&mut self, setlist: Setlist, mut songs: Vec<SetlistSong>) {
        sort_by_position(&mut songs);
        self.setlist = Some(setlist);
        self.songs = songs;
        self.is_dirty = false;
        self.drag = None;
        self.selected.clear();
    }

    /// Reset every field, scratch state included.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn setlist_id(&self) -> Option<&str> {
        self.setlist.as_ref().map(|s| s.id.as_str())
    }

    pub fn is_open_for(&self, setlist_id: &str) -> bool {
        self.setlist_id() == Some(setlist_id)
    }

    /// Sum of slot durations, recomputed on every call.
    pub fn total_duration(&self) -> u32 {
        self.songs.iter().map(SetlistSong::effective_duration).sum()
    }

    pub fn toggle_selected(&mut self, setlist_song_id: &str) -> bool {
        if self.selected.remove(setlist_song_id) {
            false
        } else {
            self.selected.insert(setlist_song_id.to_string());
            true
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.songs.iter().map(|s| s.id.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn begin_drag(&mut self, payload: DragPayload) {
        self.drag = Some(payload);
    }

    pub fn end_drag(&mut self) -> Option<DragPayload> {
        self.drag.take()
    }

    pub fn upsert_song(&mut self, song: SetlistSong) {
        insert_sorted(&mut self.songs, song);
    }

    /// Replace an existing slot and restore order. Absent ids are ignored.
    pub fn replace_song(&mut self, song: SetlistSong) -> bool {
        match self.songs.iter().position(|s| s.id == song.id) {
            Some(at) => {
                self.songs[at] = song;
                sort_by_position(&mut self.songs);
                true
            }
            None => false,
        }
    }

    pub fn remove_song(&mut self, setlist_song_id: &str) -> Option<SetlistSong> {
        let at = self.songs.iter().position(|s| s.id == setlist_song_id)?;
        self.selected.remove(setlist_song_id);
        Some(self.songs.remove(at))
    }

    /// Fold a real-time slot event. Events for other setlists are ignored.
    pub fn fold_song_event(&mut self, event: RealtimeEvent<SetlistSong>) -> bool {
        if !self.is_open_for(&event.record.setlist) {
            return false;
        }

        let RealtimeEvent { action, record } = event;
        match action {
            Action::Create => {
                if self.songs.iter().any(|s| *s == record) {
                    return false;
                }
                self.upsert_song(record);
                true
            }
            Action::Update => {
                if self.songs.iter().any(|s| *s == record) {
                    return false;
                }
                self.replace_song(record)
            }
            Action::Delete => self.remove_song(&record.id).is_some(),
        }
    }
}

/// Render seconds as `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SetlistSongExpand, SetlistStatus, Song};

    fn setlist(id: &str) -> Setlist {
        Setlist {
            id: id.into(),
            church: "c1".into(),
            title: "Sunday AM".into(),
            service_date: Some("2026-10-18".into()),
            status: SetlistStatus::Draft,
            notes: String::new(),
            created_by: None,
            created: String::new(),
            updated: String::new(),
        }
    }

    fn slot(id: &str, setlist: &str, position: i64, seconds: Option<u32>) -> SetlistSong {
        SetlistSong {
            id: id.into(),
            setlist: setlist.into(),
            song: format!("song-{}", id),
            order_position: position,
            duration_override: None,
            key_override: None,
            notes: String::new(),
            expand: Some(SetlistSongExpand {
                song: Some(Song {
                    id: format!("song-{}", id),
                    title: id.to_uppercase(),
                    artist: None,
                    key: None,
                    duration_seconds: seconds,
                }),
            }),
        }
    }

    #[test]
    fn test_open_sorts_and_resets_scratch() {
        let mut builder = BuilderState::new();
        builder.is_dirty = true;
        builder.selected.insert("stale".into());

        builder.open(
            setlist("set-1"),
            vec![slot("b", "set-1", 2, None), slot("a", "set-1", 1, None)],
        );

        assert_eq!(builder.songs[0].id, "a");
        assert!(!builder.is_dirty);
        assert!(builder.selected.is_empty());
    }

    #[test]
    fn test_total_duration_tracks_changes() {
        let mut builder = BuilderState::new();
        builder.open(
            setlist("set-1"),
            vec![
                slot("a", "set-1", 1, Some(200)),
                slot("b", "set-1", 2, None),
            ],
        );
        assert_eq!(builder.total_duration(), 200);

        let mut overridden = slot("b", "set-1", 2, None);
        overridden.duration_override = Some(100);
        builder.replace_song(overridden);
        assert_eq!(builder.total_duration(), 300);

        builder.remove_song("a");
        assert_eq!(builder.total_duration(), 100);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut builder = BuilderState::new();
        builder.open(setlist("set-1"), vec![slot("a", "set-1", 1, None)]);
        builder.is_dirty = true;
        builder.toggle_selected("a");
        builder.begin_drag(DragPayload {
            setlist_song_id: Some("a".into()),
            from_index: Some(0),
            ..Default::default()
        });

        builder.clear();
        assert_eq!(builder, BuilderState::default());
    }

    #[test]
    fn test_selection_and_removal() {
        let mut builder = BuilderState::new();
        builder.open(
            setlist("set-1"),
            vec![slot("a", "set-1", 1, None), slot("b", "set-1", 2, None)],
        );

        assert!(builder.toggle_selected("a"));
        assert!(!builder.toggle_selected("a"));
        builder.select_all();
        assert_eq!(builder.selected.len(), 2);

        builder.remove_song("a");
        assert_eq!(builder.selected.len(), 1);
    }

    #[test]
    fn test_fold_ignores_other_setlists() {
        let mut builder = BuilderState::new();
        builder.open(setlist("set-1"), vec![slot("a", "set-1", 2, None)]);

        let foreign = RealtimeEvent::new(Action::Create, slot("x", "set-2", 1, None));
        assert!(!builder.fold_song_event(foreign));

        let local = RealtimeEvent::new(Action::Create, slot("b", "set-1", 1, None));
        assert!(builder.fold_song_event(local.clone()));
        assert!(!builder.fold_song_event(local));
        assert_eq!(builder.songs[0].id, "b");

        let gone = RealtimeEvent::new(Action::Delete, slot("a", "set-1", 2, None));
        assert!(builder.fold_song_event(gone));
        assert_eq!(builder.songs.len(), 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(245), "4:05");
        assert_eq!(format_duration(3725), "1:02:05");
    }
}
