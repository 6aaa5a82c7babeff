use super::{SourceCatalog, TargetCatalog};
use crate::models::{Page, PlaylistRef, Rating, SearchKind, SearchResult, Track};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// In-memory source catalog used in tests.
/// Pages are served from the stored vectors with the same offset/limit contract as the real API.
#[derive(Default)]
pub struct MockSource {
    saved: Vec<Track>,
    playlists: Vec<(PlaylistRef, Vec<Track>)>,
    page_requests: AtomicU32,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_saved_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.saved = tracks;
        self
    }

    pub fn with_playlist(mut self, id: &str, name: &str, tracks: Vec<Track>) -> Self {
        self.playlists.push((
            PlaylistRef { id: id.to_string(), name: name.to_string() },
            tracks,
        ));
        self
    }

    /// Number of list_* page requests served so far.
    pub fn page_requests(&self) -> u32 {
        self.page_requests.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(&self, all: &[T], limit: usize, offset: usize) -> Page<T> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let start = offset.min(all.len());
        let end = offset.saturating_add(limit).min(all.len());
        Page::new(all[start..end].to_vec(), end < all.len())
    }
}

#[async_trait]
impl SourceCatalog for MockSource {
    fn name(&self) -> &str {
        "mock"
    }
    fn is_authenticated(&self) -> bool {
        true
    }

    async fn list_saved_tracks(&self, limit: usize, offset: usize) -> Result<Page<Track>> {
        debug!("MockSource: saved tracks limit={} offset={}", limit, offset);
        Ok(self.page(&self.saved, limit, offset))
    }

    async fn list_playlists(&self, limit: usize, offset: usize) -> Result<Page<PlaylistRef>> {
        let refs: Vec<PlaylistRef> = self.playlists.iter().map(|(r, _)| r.clone()).collect();
        Ok(self.page(&refs, limit, offset))
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.playlists
            .iter()
            .find(|(r, _)| r.id == playlist_id)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| anyhow!("mock: unknown playlist {}", playlist_id))
    }
}

/// Scriptable target catalog used in tests.
///
/// By default every search hits with id `yt:{query}`, rating an id adds it to
/// an internal liked set, and the liked count is the size of that set.
/// Builder methods replace each of these behaviours with a script.
pub struct MockTarget {
    results: HashMap<String, Vec<SearchResult>>,
    default_hit: bool,
    failing_queries: HashSet<String>,
    search_failures: AtomicU32,
    search_calls: AtomicU32,
    queries: Mutex<Vec<String>>,
    liked: Mutex<BTreeSet<String>>,
    liked_counts: Mutex<VecDeque<u64>>,
    count_failures: AtomicU32,
    count_calls: AtomicU32,
    rate_errors: bool,
    rated: Mutex<Vec<String>>,
    create_failures: AtomicU32,
    create_calls: AtomicU32,
    created: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl Default for MockTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            default_hit: true,
            failing_queries: HashSet::new(),
            search_failures: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
            liked: Mutex::new(BTreeSet::new()),
            liked_counts: Mutex::new(VecDeque::new()),
            count_failures: AtomicU32::new(0),
            count_calls: AtomicU32::new(0),
            rate_errors: false,
            rated: Mutex::new(Vec::new()),
            create_failures: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Fixed result list for one query.
    pub fn with_results(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    /// Queries without a scripted result return no results.
    pub fn with_default_miss(mut self) -> Self {
        self.default_hit = false;
        self
    }

    /// The next `n` search calls fail, whatever the query.
    pub fn with_search_failures(self, n: u32) -> Self {
        self.search_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Searches for this query always fail.
    pub fn with_failing_query(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }

    /// Successive liked_count reads return these values; the last one repeats.
    pub fn with_liked_counts(self, counts: Vec<u64>) -> Self {
        if let Ok(mut g) = self.liked_counts.lock() {
            *g = counts.into();
        }
        self
    }

    pub fn with_count_failures(self, n: u32) -> Self {
        self.count_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every rate call returns an error (the like may still "land" per the count script).
    pub fn with_rate_errors(mut self) -> Self {
        self.rate_errors = true;
        self
    }

    pub fn with_create_failures(self, n: u32) -> Self {
        self.create_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn count_calls(&self) -> u32 {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Ids passed to rate, in call order.
    pub fn rated(&self) -> Vec<String> {
        self.rated.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// (title, description, ids) of each successful create_playlist call.
    pub fn created(&self) -> Vec<(String, String, Vec<String>)> {
        self.created.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TargetCatalog for MockTarget {
    fn name(&self) -> &str {
        "mock"
    }
    fn is_authenticated(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, _kind: SearchKind) -> Result<Vec<SearchResult>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        if Self::take_failure(&self.search_failures) || self.failing_queries.contains(query) {
            return Err(anyhow!("mock: search unavailable for {:?}", query));
        }
        if let Some(r) = self.results.get(query) {
            return Ok(r.clone());
        }
        if self.default_hit {
            return Ok(vec![SearchResult {
                id: Some(format!("yt:{}", query)),
                title: Some(query.to_string()),
            }]);
        }
        Ok(Vec::new())
    }

    async fn create_playlist(&self, title: &str, description: &str, ids: &[String]) -> Result<String> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.create_failures) {
            return Err(anyhow!("mock: create playlist failed"));
        }
        let mut created = self
            .created
            .lock()
            .map_err(|_| anyhow!("mock: poisoned"))?;
        created.push((title.to_string(), description.to_string(), ids.to_vec()));
        Ok(format!("mock-playlist-{}-{}", title, n))
    }

    async fn rate(&self, id: &str, rating: Rating) -> Result<()> {
        if let Ok(mut r) = self.rated.lock() {
            r.push(id.to_string());
        }
        if self.rate_errors {
            return Err(anyhow!("mock: rate failed for {}", id));
        }
        let mut liked = self.liked.lock().map_err(|_| anyhow!("mock: poisoned"))?;
        match rating {
            Rating::Like => {
                liked.insert(id.to_string());
            }
        }
        Ok(())
    }

    async fn liked_count(&self, _limit: usize) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.count_failures) {
            return Err(anyhow!("mock: liked count unavailable"));
        }
        let mut script = self
            .liked_counts
            .lock()
            .map_err(|_| anyhow!("mock: poisoned"))?;
        if let Some(&front) = script.front() {
            if script.len() > 1 {
                script.pop_front();
            }
            return Ok(front);
        }
        drop(script);
        let liked = self.liked.lock().map_err(|_| anyhow!("mock: poisoned"))?;
        Ok(liked.len() as u64)
    }
}
