use crate::api::SourceCatalog;
use crate::models::{Page, Playlist, PlaylistRef, Track};
use anyhow::{Context, Result};
use futures::stream::{self, Stream, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Drive an offset/limit listing to its end.
///
/// The listing ends on a page shorter than `limit`, an empty page, or a page
/// that reports nothing more. Length and offset come from `Page::consumed`,
/// so entries dropped by the source never end the listing early.
/// Nothing is fetched until the stream is polled.
pub fn paginate<T, F, Fut>(limit: usize, fetch: F) -> impl Stream<Item = Result<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    stream::try_unfold((fetch, 0usize, false), move |(mut fetch, offset, done)| async move {
        if done {
            return Ok(None);
        }
        let page = fetch(limit, offset).await?;
        let n = page.consumed;
        let done = n == 0 || n < limit || !page.has_more;
        let items = stream::iter(page.items.into_iter().map(Ok::<T, anyhow::Error>));
        Ok::<_, anyhow::Error>(Some((items, (fetch, offset + n, done))))
    })
    .try_flatten()
}

/// The user's saved tracks in source order.
pub fn saved_tracks(source: Arc<dyn SourceCatalog>, limit: usize) -> impl Stream<Item = Result<Track>> {
    paginate(limit, move |limit, offset| {
        let source = source.clone();
        async move { source.list_saved_tracks(limit, offset).await }
    })
}

pub fn playlist_refs(source: Arc<dyn SourceCatalog>, limit: usize) -> impl Stream<Item = Result<PlaylistRef>> {
    paginate(limit, move |limit, offset| {
        let source = source.clone();
        async move { source.list_playlists(limit, offset).await }
    })
}

/// Every playlist with its tracks; empty playlists are dropped.
pub async fn playlists(source: Arc<dyn SourceCatalog>, limit: usize) -> Result<Vec<Playlist>> {
    let refs: Vec<PlaylistRef> = playlist_refs(source.clone(), limit).try_collect().await?;
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        let tracks = source
            .playlist_tracks(&r.id)
            .await
            .with_context(|| format!("listing tracks of playlist {}", r.name))?;
        if tracks.is_empty() {
            debug!(playlist = %r.name, "skipping empty playlist");
            continue;
        }
        out.push(Playlist { name: r.name, tracks });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockSource;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n).map(|i| Track::new(format!("t{}", i), "a", "b")).collect()
    }

    #[tokio::test]
    async fn reads_all_pages_in_order() {
        let src = Arc::new(MockSource::new().with_saved_tracks(tracks(7)));
        let got: Vec<Track> = saved_tracks(src.clone(), 3).try_collect().await.unwrap();
        assert_eq!(got, tracks(7));
        assert_eq!(src.page_requests(), 3);
    }

    #[tokio::test]
    async fn exact_multiple_of_limit_needs_trailing_empty_page() {
        let src = Arc::new(MockSource::new().with_saved_tracks(tracks(6)));
        let got: Vec<Track> = saved_tracks(src.clone(), 3).try_collect().await.unwrap();
        assert_eq!(got.len(), 6);
        // has_more is false on the second page, so no third request
        assert_eq!(src.page_requests(), 2);
    }

    #[tokio::test]
    async fn short_page_ends_even_if_source_claims_more() {
        let mut calls = 0;
        let got: Vec<u32> = paginate(5, |_limit, offset| {
            calls += 1;
            async move {
                assert_eq!(offset, 0);
                Ok::<_, anyhow::Error>(Page::new(vec![1, 2], true))
            }
        })
        .try_collect()
        .await
        .unwrap();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn filtered_entries_neither_end_nor_shift_the_listing() {
        let mut offsets = Vec::new();
        let got: Vec<u32> = paginate(2, |_limit, offset| {
            offsets.push(offset);
            async move {
                let page = match offset {
                    // two raw entries, one unusable
                    0 => Page::filtered(vec![1], true, 2),
                    2 => Page::new(vec![3], false),
                    other => panic!("unexpected offset {}", other),
                };
                Ok::<_, anyhow::Error>(page)
            }
        })
        .try_collect()
        .await
        .unwrap();
        assert_eq!(got, vec![1, 3]);
        assert_eq!(offsets, vec![0, 2]);
    }

    #[tokio::test]
    async fn stream_is_lazy_and_restartable() {
        let src = Arc::new(MockSource::new().with_saved_tracks(tracks(2)));
        let s = saved_tracks(src.clone(), 50);
        assert_eq!(src.page_requests(), 0);
        drop(s);
        let a: Vec<Track> = saved_tracks(src.clone(), 50).try_collect().await.unwrap();
        let b: Vec<Track> = saved_tracks(src.clone(), 50).try_collect().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_playlists_are_dropped() {
        let src = Arc::new(
            MockSource::new()
                .with_playlist("p1", "Road", tracks(2))
                .with_playlist("p2", "Empty", vec![])
                .with_playlist("p3", "Gym", tracks(1)),
        );
        let got = playlists(src, 1).await.unwrap();
        let names: Vec<&str> = got.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Road", "Gym"]);
    }
}
