use crate::api::TargetCatalog;
use crate::models::{LikeOutcome, LikeReport, Rating, Track};
use crate::resolve::BatchResolver;
use crate::retry::RetryPolicy;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Marks items as liked on the target and confirms each like through the
/// liked-items counter, since the rate call itself carries no success signal.
pub struct LikeReplicator {
    target: Arc<dyn TargetCatalog>,
    count_policy: RetryPolicy,
    max_attempts: u32,
    count_limit: usize,
}

impl LikeReplicator {
    pub fn new(target: Arc<dyn TargetCatalog>, count_policy: RetryPolicy, max_attempts: u32, count_limit: usize) -> Self {
        Self {
            target,
            count_policy,
            max_attempts: max_attempts.max(1),
            count_limit,
        }
    }

    async fn liked_count(&self) -> Result<u64> {
        self.count_policy
            .run("liked_count", || self.target.liked_count(self.count_limit))
            .await
    }

    /// Like one item. Write errors are logged and the counter is re-checked
    /// anyway; only an exhausted counter read is an error.
    pub async fn like(&self, id: &str) -> Result<LikeOutcome> {
        let initial = self.liked_count().await?;
        let mut attempts = 0u32;
        while attempts < self.max_attempts {
            if let Err(e) = self.target.rate(id, Rating::Like).await {
                warn!("rate {}: {:#}", id, e);
            }
            attempts += 1;
            let current = self.liked_count().await?;
            if current != initial {
                info!("LIKED {}", id);
                return Ok(LikeOutcome::Liked);
            }
        }
        warn!(attempts, "FAILED TO LIKE {}", id);
        Ok(LikeOutcome::Failed)
    }

    /// Like every resolved id in order. Unresolved entries are counted and skipped.
    pub async fn like_all(&self, ids: &[Option<String>]) -> Result<LikeReport> {
        let mut report = LikeReport::default();
        for (position, id) in ids.iter().enumerate() {
            let Some(id) = id else {
                warn!(position, "no target match, skipping like");
                report.unresolved += 1;
                continue;
            };
            match self.like(id).await? {
                LikeOutcome::Liked => report.liked.push(id.clone()),
                LikeOutcome::Failed => report.failed.push(id.clone()),
            }
        }
        Ok(report)
    }
}

/// Recreates a source playlist on the target from batch-resolved tracks.
pub struct PlaylistReplicator {
    target: Arc<dyn TargetCatalog>,
    resolver: BatchResolver,
    create_policy: RetryPolicy,
    description: String,
}

impl PlaylistReplicator {
    pub fn new(
        target: Arc<dyn TargetCatalog>,
        resolver: BatchResolver,
        create_policy: RetryPolicy,
        description: impl Into<String>,
    ) -> Self {
        Self {
            target,
            resolver,
            create_policy,
            description: description.into(),
        }
    }

    /// Resolve `tracks`, drop the misses and create the playlist.
    /// Only the creation call is retried here; resolution retries per track.
    pub async fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<String> {
        let resolved = self.resolver.resolve_batch(tracks).await?;
        let ids: Vec<String> = resolved.into_iter().flatten().collect();
        if ids.len() < tracks.len() {
            warn!(
                playlist = name,
                missing = tracks.len() - ids.len(),
                "some tracks have no target match"
            );
        }
        let id = self
            .create_policy
            .run("create_playlist", || {
                self.target.create_playlist(name, &self.description, &ids)
            })
            .await?;
        info!(playlist = name, remote_id = %id, tracks = ids.len(), "created playlist");
        Ok(id)
    }
}
