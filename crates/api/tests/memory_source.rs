use api::{AnswerSubmitter, InMemorySource, ItemSource, PageRequest, StatsProvider};
use drill_core::model::{DifficultyTier, ItemId, ResourceId, ReviewItem};

fn seeded(resource: &ResourceId, count: u32) -> InMemorySource {
    let source = InMemorySource::new();
    source.insert_items(
        resource,
        (0..count).map(|i| ReviewItem::new(format!("i-{i}"), format!("Q{i}"), format!("A{i}"))),
    );
    source
}

fn page(page: u32, page_size: u32) -> PageRequest {
    PageRequest {
        page,
        page_size,
        group: None,
    }
}

#[tokio::test]
async fn pages_through_items_in_order() {
    let resource = ResourceId::new("deck-1");
    let source = seeded(&resource, 25);

    let first = source.fetch_page(&resource, &page(1, 10)).await.unwrap();
    let third = source.fetch_page(&resource, &page(3, 10)).await.unwrap();
    let beyond = source.fetch_page(&resource, &page(4, 10)).await.unwrap();

    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_count, Some(25));
    assert!(first.has_more);
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.items[0].id, ItemId::new("i-20"));
    assert!(!third.has_more);
    assert!(beyond.items.is_empty());
    assert_eq!(source.fetched_pages(), vec![1, 3, 4]);
}

#[tokio::test]
async fn group_filter_and_hidden_total() {
    let resource = ResourceId::new("deck-2");
    let source = InMemorySource::new();
    source.insert_items(
        &resource,
        (0..6).map(|i| ReviewItem::new(format!("i-{i}"), "Q", "A").with_group(i % 2)),
    );
    source.hide_total_count();

    let request = PageRequest {
        page: 1,
        page_size: 10,
        group: Some(1),
    };
    let odd = source.fetch_page(&resource, &request).await.unwrap();
    assert_eq!(odd.items.len(), 3);
    assert!(odd.items.iter().all(|item| item.group_index == Some(1)));
    assert_eq!(odd.total_count, None);
}

#[tokio::test]
async fn injected_failures_are_consumed() {
    let resource = ResourceId::new("deck-3");
    let source = seeded(&resource, 3);
    source.fail_next_fetches(1);

    assert!(source.fetch_page(&resource, &page(1, 10)).await.is_err());
    assert!(source.fetch_page(&resource, &page(1, 10)).await.is_ok());
}

#[tokio::test]
async fn answers_accumulate_xp_and_level() {
    let resource = ResourceId::new("deck-4");
    let source = seeded(&resource, 12);

    let mut leveled = 0;
    for i in 0..10 {
        let outcome = source
            .submit_answer(&resource, &ItemId::new(format!("i-{i}")), DifficultyTier::Medium)
            .await
            .unwrap();
        assert_eq!(outcome.xp_gained, 10);
        if outcome.leveled_up {
            leveled += 1;
            assert_eq!(outcome.new_level, Some(2));
        }
    }
    assert_eq!(leveled, 1);

    let stats = source.session_stats(&resource).await.unwrap();
    assert_eq!(stats.items_reviewed, 10);
    assert_eq!(stats.total_xp, 100);
    assert_eq!(stats.level, 2);
    assert_eq!(source.stats_requests(), 1);
}
