use music_library_migrate::api::mock::MockTarget;
use music_library_migrate::api::TargetCatalog;
use music_library_migrate::models::LikeOutcome;
use music_library_migrate::replicate::LikeReplicator;
use music_library_migrate::retry::RetryPolicy;
use std::sync::Arc;

fn replicator(target: &Arc<MockTarget>) -> LikeReplicator {
    let t: Arc<dyn TargetCatalog> = target.clone();
    LikeReplicator::new(t, RetryPolicy::with_attempts(20), 5, 5)
}

#[tokio::test]
async fn liked_on_second_iteration_when_counter_moves_late() {
    let target = Arc::new(MockTarget::new().with_liked_counts(vec![10, 10, 11]));
    let outcome = replicator(&target).like("vid").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Liked);
    assert_eq!(target.rated(), vec!["vid".to_string(), "vid".to_string()]);
    assert_eq!(target.count_calls(), 3);
}

#[tokio::test]
async fn failed_after_five_writes_when_counter_never_moves() {
    let target = Arc::new(MockTarget::new().with_liked_counts(vec![10; 6]));
    let outcome = replicator(&target).like("vid").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Failed);
    assert_eq!(target.rated().len(), 5);
    assert_eq!(target.count_calls(), 6);
}

#[tokio::test]
async fn first_write_that_lands_is_liked_immediately() {
    // default mock: liking grows the liked set, so the count moves at once
    let target = Arc::new(MockTarget::new());
    let outcome = replicator(&target).like("vid").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Liked);
    assert_eq!(target.rated().len(), 1);
    assert_eq!(target.count_calls(), 2);
}

#[tokio::test]
async fn write_errors_do_not_stop_the_confirmation_loop() {
    let target = Arc::new(
        MockTarget::new()
            .with_rate_errors()
            .with_liked_counts(vec![3, 3, 3, 4]),
    );
    let outcome = replicator(&target).like("vid").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Liked);
    assert_eq!(target.rated().len(), 3);
}

#[tokio::test]
async fn persistent_write_errors_end_as_failed_not_error() {
    let target = Arc::new(MockTarget::new().with_rate_errors().with_liked_counts(vec![3]));
    let outcome = replicator(&target).like("bad-id").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Failed);
    assert_eq!(target.rated().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn counter_reads_are_retried() {
    let target = Arc::new(MockTarget::new().with_count_failures(4));
    let outcome = replicator(&target).like("vid").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Liked);
    assert_eq!(target.count_calls(), 4 + 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_counter_read_is_an_error() {
    let target = Arc::new(MockTarget::new().with_count_failures(20));
    let err = replicator(&target).like("vid").await.unwrap_err();
    assert!(format!("{:#}", err).contains("liked_count failed after 20 attempts"));
    assert!(target.rated().is_empty());
}

#[tokio::test]
async fn like_all_reports_each_outcome_in_order() {
    // vid-a: 0 -> 1 liked; None skipped; vid-b: 1, 1, 1, ... never moves
    let target = Arc::new(MockTarget::new().with_liked_counts(vec![0, 1, 1]));
    let ids = vec![Some("vid-a".to_string()), None, Some("vid-b".to_string())];
    let report = replicator(&target).like_all(&ids).await.unwrap();
    assert_eq!(report.liked, vec!["vid-a".to_string()]);
    assert_eq!(report.failed, vec!["vid-b".to_string()]);
    assert_eq!(report.unresolved, 1);
    let rated = target.rated();
    assert_eq!(rated[0], "vid-a");
    assert!(rated[1..].iter().all(|id| id == "vid-b"));
    assert_eq!(rated.len(), 1 + 5);
}
