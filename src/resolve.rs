use crate::api::TargetCatalog;
use crate::models::{SearchKind, Track};
use crate::retry::RetryPolicy;
use crate::util::chunks;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of concurrent resolution workers per batch.
pub const NUM_WORKERS: usize = 32;

/// Maps one track to a target-catalog identifier through fuzzy search.
#[derive(Clone)]
pub struct Resolver {
    target: Arc<dyn TargetCatalog>,
    policy: RetryPolicy,
}

impl Resolver {
    pub fn new(target: Arc<dyn TargetCatalog>, policy: RetryPolicy) -> Self {
        Self { target, policy }
    }

    /// First search result carrying a non-empty id, or None.
    /// Search errors are retried per the policy; only exhaustion is an error.
    pub async fn resolve(&self, track: &Track) -> Result<Option<String>> {
        let query = track.search_query();
        let results = self
            .policy
            .run("search", || self.target.search(&query, SearchKind::Songs))
            .await
            .with_context(|| format!("resolving {}", track))?;
        let id = results
            .into_iter()
            .filter_map(|r| r.id)
            .find(|id| !id.is_empty());
        if id.is_none() {
            debug!("no match for {}", track);
        }
        Ok(id)
    }
}

/// Shared resolution results for one batch call.
///
/// Chunk boundaries are positional, so the same track can sit in two chunks and
/// be resolved by both. Writes are last-writer-wins: identical input yields an
/// equally valid id, so no per-key locking is done. The lock is never held
/// across an await.
type ResolvedMap = Arc<Mutex<HashMap<Track, Option<String>>>>;

/// Resolves whole track collections with bounded concurrency, preserving order.
#[derive(Clone)]
pub struct BatchResolver {
    resolver: Resolver,
    workers: usize,
}

impl BatchResolver {
    pub fn new(resolver: Resolver, workers: usize) -> Self {
        Self { resolver, workers: workers.max(1) }
    }

    pub fn with_default_workers(resolver: Resolver) -> Self {
        Self::new(resolver, NUM_WORKERS)
    }

    /// Resolve `tracks`; output[i] belongs to tracks[i].
    ///
    /// Every chunk task runs to completion (or its own first failure) before
    /// any failure is reported; the earliest failing chunk's error is returned.
    pub async fn resolve_batch(&self, tracks: &[Track]) -> Result<Vec<Option<String>>> {
        if tracks.is_empty() {
            return Ok(Vec::new());
        }
        let map: ResolvedMap = Arc::new(Mutex::new(HashMap::new()));
        let parts = chunks(tracks, self.workers);
        info!(tracks = tracks.len(), chunks = parts.len(), "resolving batch");

        let mut set = JoinSet::new();
        for (index, part) in parts.into_iter().enumerate() {
            let resolver = self.resolver.clone();
            let map = map.clone();
            let part = part.to_vec();
            set.spawn(async move { (index, resolve_chunk(resolver, map, part).await) });
        }

        let mut failures: Vec<(usize, anyhow::Error)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(e))) => {
                    warn!(chunk = index, "chunk failed: {:#}", e);
                    failures.push((index, e));
                }
                Err(e) => failures.push((usize::MAX, anyhow!("resolution task aborted: {}", e))),
            }
        }
        if !failures.is_empty() {
            let total = failures.len();
            failures.sort_by_key(|(i, _)| *i);
            let (_, first) = failures.swap_remove(0);
            return Err(first.context(format!("{} of the batch's chunks failed", total)));
        }

        let map = map.lock().map_err(|_| anyhow!("resolution map poisoned"))?;
        Ok(tracks
            .iter()
            .map(|t| map.get(t).cloned().flatten())
            .collect())
    }
}

async fn resolve_chunk(resolver: Resolver, map: ResolvedMap, tracks: Vec<Track>) -> Result<()> {
    for track in tracks {
        let known = map
            .lock()
            .map_err(|_| anyhow!("resolution map poisoned"))?
            .contains_key(&track);
        if known {
            continue;
        }
        let id = resolver.resolve(&track).await?;
        map.lock()
            .map_err(|_| anyhow!("resolution map poisoned"))?
            .insert(track, id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTarget;
    use crate::models::SearchResult;

    fn result(id: Option<&str>) -> SearchResult {
        SearchResult { id: id.map(String::from), title: None }
    }

    #[tokio::test]
    async fn skips_results_without_id() {
        let t = Track::new("Song", "Artist", "Album");
        let target = MockTarget::new().with_results(
            "Song Artist",
            vec![result(None), result(Some("")), result(Some("abc")), result(Some("def"))],
        );
        let r = Resolver::new(Arc::new(target), RetryPolicy::default());
        assert_eq!(r.resolve(&t).await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn empty_results_resolve_to_none() {
        let t = Track::new("Song", "Artist", "Album");
        let target = MockTarget::new().with_results("Song Artist", vec![]);
        let r = Resolver::new(Arc::new(target), RetryPolicy::default());
        assert_eq!(r.resolve(&t).await.unwrap(), None);
    }

    #[tokio::test]
    async fn within_chunk_duplicates_are_searched_once() {
        let t = Track::new("Song", "Artist", "Album");
        let target = Arc::new(MockTarget::new());
        let r = Resolver::new(target.clone(), RetryPolicy::default());
        let out = BatchResolver::new(r, 1)
            .resolve_batch(&[t.clone(), t.clone(), t])
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(target.search_calls(), 1);
    }
}
