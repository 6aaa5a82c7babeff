use serde::{Deserialize, Serialize};
use std::fmt;

/// A track descriptor as read from the source catalog.
/// Equality and hashing are structural, so identical descriptors share one
/// resolution result within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    /// Free-text query used against the target catalog's search.
    pub fn search_query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.album)
    }
}

/// A source playlist flattened to its ordered track list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<Track>,
}

/// A playlist listing entry; `id` is used to fetch the tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
}

/// One page of an offset/limit listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Raw entries the source returned for this page, before unusable ones
    /// were dropped from `items`. Pagination advances by this count.
    pub consumed: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        let consumed = items.len();
        Self { items, has_more, consumed }
    }

    /// Page built from `consumed` raw entries, some of which were filtered out.
    pub fn filtered(items: Vec<T>, has_more: bool, consumed: usize) -> Self {
        Self {
            consumed: consumed.max(items.len()),
            items,
            has_more,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Songs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Like,
}

/// Terminal state of one like replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeReport {
    pub liked: Vec<String>,
    pub failed: Vec<String>,
    /// Number of tracks for which search produced no identifier.
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistReport {
    /// (source playlist name, target playlist id)
    pub created: Vec<(String, String)>,
    /// (source playlist name, error message)
    pub failed: Vec<(String, String)>,
}
