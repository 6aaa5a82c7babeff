pub mod spotify;
pub mod mock;
pub mod ytmusic;
pub mod spotify_auth;
pub mod ytmusic_auth;

use crate::models::{Page, PlaylistRef, Rating, SearchKind, SearchResult, Track};
use anyhow::Result;

/// Read side: the catalog the library is migrated from.
/// Implementations: spotify::SpotifySource, mock::MockSource.
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// One page of the user's saved tracks, oldest-saved last as the source stores them.
    async fn list_saved_tracks(&self, limit: usize, offset: usize) -> Result<Page<Track>>;

    /// One page of the user's playlists.
    async fn list_playlists(&self, limit: usize, offset: usize) -> Result<Page<PlaylistRef>>;

    /// All tracks of a playlist, in playlist order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Return the catalog's name (for logging, UI, etc)
    fn name(&self) -> &str;

    /// Return true if credentials are present
    fn is_authenticated(&self) -> bool;
}

/// Write side: the catalog the library is migrated to.
/// Implementations: ytmusic::YtMusicTarget, mock::MockTarget.
#[async_trait::async_trait]
pub trait TargetCatalog: Send + Sync {
    /// Fuzzy text search. May return zero results; results may lack an id.
    async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<SearchResult>>;

    /// Create a playlist holding `ids` and return its remote id.
    async fn create_playlist(&self, title: &str, description: &str, ids: &[String]) -> Result<String>;

    /// Rate an item. There is no success signal beyond the absence of an error.
    async fn rate(&self, id: &str, rating: Rating) -> Result<()>;

    /// Total number of liked items. `limit` bounds the fetched page, not the total.
    async fn liked_count(&self, limit: usize) -> Result<u64>;

    fn name(&self) -> &str;

    fn is_authenticated(&self) -> bool;
}
