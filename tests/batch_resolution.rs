use music_library_migrate::api::mock::MockTarget;
use music_library_migrate::api::TargetCatalog;
use music_library_migrate::models::{SearchResult, Track};
use music_library_migrate::resolve::{BatchResolver, Resolver, NUM_WORKERS};
use music_library_migrate::retry::RetryPolicy;
use std::sync::Arc;

fn tracks(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| Track::new(format!("Song {}", i), format!("Artist {}", i), "Album"))
        .collect()
}

fn batch(target: Arc<MockTarget>, workers: usize) -> BatchResolver {
    let target: Arc<dyn TargetCatalog> = target;
    BatchResolver::new(Resolver::new(target, RetryPolicy::with_attempts(20)), workers)
}

fn expected(t: &Track) -> Option<String> {
    Some(format!("yt:{}", t.search_query()))
}

#[tokio::test]
async fn order_preserved_when_fewer_tracks_than_workers() {
    let input = tracks(5);
    let target = Arc::new(MockTarget::new());
    let out = batch(target.clone(), NUM_WORKERS).resolve_batch(&input).await.unwrap();
    assert_eq!(out.len(), input.len());
    for (t, id) in input.iter().zip(&out) {
        assert_eq!(id, &expected(t));
    }
    assert_eq!(target.search_calls(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_preserved_across_many_chunks() {
    let input = tracks(101);
    let target = Arc::new(MockTarget::new());
    let out = batch(target.clone(), NUM_WORKERS).resolve_batch(&input).await.unwrap();
    assert_eq!(out.len(), 101);
    for (t, id) in input.iter().zip(&out) {
        assert_eq!(id, &expected(t));
    }
}

#[tokio::test]
async fn misses_stay_in_position() {
    let input = tracks(6);
    let mut target = MockTarget::new().with_default_miss();
    for i in [1usize, 4] {
        target = target.with_results(
            &input[i].search_query(),
            vec![SearchResult { id: Some(format!("hit{}", i)), title: None }],
        );
    }
    let out = batch(Arc::new(target), 3).resolve_batch(&input).await.unwrap();
    assert_eq!(
        out,
        vec![None, Some("hit1".into()), None, None, Some("hit4".into()), None]
    );
}

#[tokio::test]
async fn empty_batch_makes_no_searches() {
    let target = Arc::new(MockTarget::new());
    let out = batch(target.clone(), 4).resolve_batch(&[]).await.unwrap();
    assert!(out.is_empty());
    assert_eq!(target.search_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_track_in_different_chunks_resolves_identically() {
    let mut input = tracks(64);
    let dup = input[0].clone();
    input[63] = dup;
    let target = Arc::new(MockTarget::new());
    let out = batch(target.clone(), 32).resolve_batch(&input).await.unwrap();
    assert_eq!(out.len(), 64);
    assert!(out[0].is_some());
    assert_eq!(out[0], out[63]);
    // the duplicate is searched at most twice (once per racing chunk)
    assert!(target.search_calls() <= 64);
}

#[tokio::test(start_paused = true)]
async fn resolver_retries_until_twentieth_attempt_succeeds() {
    let t = Track::new("Song", "Artist", "Album");
    let target = Arc::new(MockTarget::new().with_search_failures(19));
    let dyn_target: Arc<dyn TargetCatalog> = target.clone();
    let r = Resolver::new(dyn_target, RetryPolicy::with_attempts(20));
    let id = r.resolve(&t).await.unwrap();
    assert_eq!(id.as_deref(), Some("yt:Song Artist"));
    assert_eq!(target.search_calls(), 20);
}

#[tokio::test(start_paused = true)]
async fn resolver_fails_after_twenty_attempts() {
    let t = Track::new("Song", "Artist", "Album");
    let target = Arc::new(MockTarget::new().with_search_failures(20));
    let dyn_target: Arc<dyn TargetCatalog> = target.clone();
    let r = Resolver::new(dyn_target, RetryPolicy::with_attempts(20));
    let err = r.resolve(&t).await.unwrap_err();
    assert_eq!(target.search_calls(), 20);
    assert!(format!("{:#}", err).contains("search failed after 20 attempts"));
}

#[tokio::test(start_paused = true)]
async fn chunk_failure_surfaces_after_siblings_finish() {
    let input = tracks(8);
    let bad = input[1].search_query();
    let target = Arc::new(MockTarget::new().with_failing_query(&bad));
    let err = batch(target.clone(), 4).resolve_batch(&input).await.unwrap_err();

    let msg = format!("{:#}", err);
    assert!(msg.contains("1 of the batch's chunks failed"), "{}", msg);
    assert!(msg.contains("Song 1"), "{}", msg);

    let queries = target.queries();
    // every track outside the failing chunk was still resolved
    for t in &input[2..] {
        assert!(queries.contains(&t.search_query()), "missing {}", t);
    }
    assert_eq!(queries.iter().filter(|q| **q == bad).count(), 20);
}
