use crate::api::{SourceCatalog, TargetCatalog};
use crate::catalog;
use crate::config::Config;
use crate::models::{LikeReport, Playlist, PlaylistReport, Track};
use crate::replicate::{LikeReplicator, PlaylistReplicator};
use crate::resolve::{BatchResolver, Resolver};
use anyhow::{anyhow, Context, Result};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{info, warn};

/// Wires the catalog reader, batch resolver and replicators for one run.
pub struct Migrator {
    source: Arc<dyn SourceCatalog>,
    batch: BatchResolver,
    likes: LikeReplicator,
    playlists: PlaylistReplicator,
    page_limit: usize,
}

impl Migrator {
    pub fn new(source: Arc<dyn SourceCatalog>, target: Arc<dyn TargetCatalog>, cfg: &Config) -> Self {
        let resolver = Resolver::new(target.clone(), cfg.retry.search.clone());
        let batch = BatchResolver::new(resolver, cfg.num_workers);
        let likes = LikeReplicator::new(
            target.clone(),
            cfg.retry.liked_count.clone(),
            cfg.like_max_attempts,
            cfg.liked_count_limit,
        );
        let playlists = PlaylistReplicator::new(
            target,
            batch.clone(),
            cfg.retry.create_playlist.clone(),
            cfg.playlist_description.clone(),
        );
        Self {
            source,
            batch,
            likes,
            playlists,
            page_limit: cfg.page_limit,
        }
    }

    /// Saved tracks in the order they will be liked on the target:
    /// reversed from the source listing, so the newest save is applied last.
    pub async fn saved_tracks_oldest_first(&self) -> Result<Vec<Track>> {
        let mut tracks: Vec<Track> = catalog::saved_tracks(self.source.clone(), self.page_limit)
            .try_collect()
            .await
            .context("listing saved tracks")?;
        tracks.reverse();
        Ok(tracks)
    }

    pub async fn export_saved_tracks(&self) -> Result<LikeReport> {
        let tracks = self.saved_tracks_oldest_first().await?;
        info!(tracks = tracks.len(), source = self.source.name(), "exporting saved tracks");
        let ids = self
            .batch
            .resolve_batch(&tracks)
            .await
            .context("resolving saved tracks")?;
        let report = self.likes.like_all(&ids).await?;
        info!(
            liked = report.liked.len(),
            failed = report.failed.len(),
            unresolved = report.unresolved,
            "saved tracks exported"
        );
        Ok(report)
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        catalog::playlists(self.source.clone(), self.page_limit)
            .await
            .context("listing playlists")
    }

    /// Recreate every non-empty source playlist. A failing playlist does not
    /// stop the others; the run fails afterwards naming every failed playlist.
    pub async fn export_playlists(&self) -> Result<PlaylistReport> {
        let playlists = self.list_playlists().await?;
        info!(playlists = playlists.len(), "exporting playlists");
        let mut report = PlaylistReport::default();
        for pl in playlists {
            match self.playlists.create_playlist(&pl.name, &pl.tracks).await {
                Ok(id) => report.created.push((pl.name, id)),
                Err(e) => {
                    warn!(playlist = %pl.name, "playlist export failed: {:#}", e);
                    report.failed.push((pl.name, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }
}

impl PlaylistReport {
    /// Turn recorded per-playlist failures into a run-level error.
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            return Ok(self);
        }
        let names: Vec<&str> = self.failed.iter().map(|(n, _)| n.as_str()).collect();
        Err(anyhow!(
            "{} playlist(s) failed to export: {}",
            names.len(),
            names.join(", ")
        ))
    }
}
