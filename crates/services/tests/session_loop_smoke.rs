use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use api::{ApiError, InMemorySource, StatsProvider};
use async_trait::async_trait;
use drill_core::model::{DifficultyTier, ResourceId, ReviewItem, SessionStats};
use drill_core::time::fixed_now;
use services::{Clock, LoadOutcome, PoolConfig, PoolError, SessionError, SessionLoopService};

fn resource() -> ResourceId {
    ResourceId::new("deck-7")
}

fn seeded_source(count: usize) -> InMemorySource {
    let source = InMemorySource::new();
    source.insert_items(
        &resource(),
        (0..count).map(|i| ReviewItem::new(format!("card-{i}"), format!("Q{i}"), format!("A{i}"))),
    );
    source
}

fn service(source: &InMemorySource, page_size: u32) -> SessionLoopService {
    SessionLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(source.clone()),
        Arc::new(source.clone()),
        Arc::new(source.clone()),
    )
    .with_config(PoolConfig {
        page_size,
        ..PoolConfig::default()
    })
    .with_seed(42)
}

#[tokio::test]
async fn session_loop_runs_to_completion_across_pages() {
    let source = seeded_source(12);
    let loop_svc = service(&source, 5);

    let mut session = loop_svc.start_session(resource()).await.unwrap();
    let mut shown = HashSet::new();
    let mut last = None;
    while let Some(item) = loop_svc.next_item(&mut session).await.unwrap() {
        assert!(shown.insert(item.id.clone()), "item shown twice");
        last = Some(
            loop_svc
                .answer_current(&mut session, DifficultyTier::Medium)
                .await
                .unwrap(),
        );
    }

    assert_eq!(shown.len(), 12);
    let last = last.expect("at least one answer");
    assert!(last.is_complete);
    assert_eq!(last.progress.answered, 12);
    assert_eq!(last.progress.expected, Some(12));

    let summary = last.summary.expect("summary after completion");
    assert_eq!(summary.items_answered, 12);
    assert_eq!(summary.xp_earned, 120);
    assert_eq!(summary.level_ups, 1);
    assert_eq!(summary.completed_at, fixed_now());
    assert_eq!(summary.stats.items_reviewed, 12);
    assert_eq!(source.stats_requests(), 1);
    assert_eq!(source.answers().len(), 12);
}

#[tokio::test]
async fn discovered_total_completes_after_last_page() {
    let source = seeded_source(7);
    source.hide_total_count();
    let loop_svc = service(&source, 3);

    let mut session = loop_svc.start_session(resource()).await.unwrap();
    assert_eq!(session.progress().expected, None);

    let mut answered = 0;
    while loop_svc.next_item(&mut session).await.unwrap().is_some() {
        loop_svc
            .answer_current(&mut session, DifficultyTier::Easy)
            .await
            .unwrap();
        answered += 1;
    }

    assert_eq!(answered, 7);
    assert!(session.is_complete());
    assert_eq!(source.stats_requests(), 1);
}

#[tokio::test]
async fn answering_twice_without_drawing_is_rejected() {
    let source = seeded_source(4);
    let loop_svc = service(&source, 10);
    let mut session = loop_svc.start_session(resource()).await.unwrap();

    let err = loop_svc
        .answer_current(&mut session, DifficultyTier::Hard)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoCurrentItem));

    let first = loop_svc.next_item(&mut session).await.unwrap().unwrap();
    let again = loop_svc.next_item(&mut session).await.unwrap().unwrap();
    assert_eq!(first.id, again.id);
}

#[tokio::test]
async fn empty_resource_cannot_start() {
    let source = InMemorySource::new();
    let loop_svc = service(&source, 10);

    let err = loop_svc.start_session(resource()).await.unwrap_err();
    assert!(matches!(err, SessionError::Empty));
}

#[tokio::test]
async fn restart_builds_a_fresh_pool() {
    let source = seeded_source(9);
    let loop_svc = service(&source, 4);
    let mut session = loop_svc.start_session(resource()).await.unwrap();

    for _ in 0..3 {
        loop_svc.next_item(&mut session).await.unwrap();
        loop_svc
            .answer_current(&mut session, DifficultyTier::Easy)
            .await
            .unwrap();
    }
    let old_pool = session.pool().clone();

    let session = loop_svc.handle_restart(session).await.unwrap();

    assert!(session.seen().is_empty());
    assert!(session.current_item().is_none());
    assert_eq!(session.pool().loaded_len(), 4);
    assert_eq!(session.pool().snapshot().next_page, 2);
    assert_eq!(old_pool.resource_id(), session.pool().resource_id());
}

#[tokio::test]
async fn failed_page_is_reported_until_reloaded() {
    let source = seeded_source(6);
    let loop_svc = service(&source, 3);
    let mut session = loop_svc.start_session(resource()).await.unwrap();

    source.fail_next_fetches(1);
    for _ in 0..3 {
        loop_svc.next_item(&mut session).await.unwrap();
        loop_svc
            .answer_current(&mut session, DifficultyTier::Easy)
            .await
            .unwrap();
    }
    tokio::task::yield_now().await;

    let err = loop_svc.next_item(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::Pool(PoolError::Refill(_))));
    assert!(!session.is_complete());

    assert_eq!(loop_svc.reload(&session).await.unwrap(), LoadOutcome::Appended(3));
    assert!(loop_svc.next_item(&mut session).await.unwrap().is_some());
}

struct FlakyStats {
    inner: InMemorySource,
    failures_left: AtomicU32,
}

#[async_trait]
impl StatsProvider for FlakyStats {
    async fn session_stats(&self, resource_id: &ResourceId) -> Result<SessionStats, ApiError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ApiError::Connection("stats offline".into()));
        }
        self.inner.session_stats(resource_id).await
    }
}

#[tokio::test]
async fn finalize_summary_retries_failed_stats_fetch() {
    let source = seeded_source(2);
    let stats = Arc::new(FlakyStats {
        inner: source.clone(),
        failures_left: AtomicU32::new(1),
    });
    let loop_svc = SessionLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(source.clone()),
        Arc::new(source.clone()),
        stats,
    );
    let mut session = loop_svc.start_session(resource()).await.unwrap();

    let err = loop_svc.finalize_summary(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::NotComplete));

    let mut last = None;
    while loop_svc.next_item(&mut session).await.unwrap().is_some() {
        last = Some(
            loop_svc
                .answer_current(&mut session, DifficultyTier::Medium)
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(last.is_complete);
    assert!(last.summary.is_none());

    let summary = loop_svc.finalize_summary(&mut session).await.unwrap();
    assert_eq!(summary.items_answered, 2);
    assert_eq!(summary.stats.items_reviewed, 2);

    // Already fetched: no further request.
    loop_svc.finalize_summary(&mut session).await.unwrap();
    assert_eq!(source.stats_requests(), 1);
}
