//! Search facade: ranking, bounded fetching, supersession and remote fallback.

mod common;

use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use pecs_board::{
    config::SearchConfig,
    keyword_index::{KeywordIndex, LearnedTerms},
    models::FetchState,
    search::{SearchFacade, SearchHit, SearchOutcome},
};

const DATASET: &str = r#"{
    "version": 1,
    "entry_count": 5,
    "entries": [
        {"term": "mjölk", "pictogram_id": "P001", "locale": "sv"},
        {"term": "mjölk kallt", "pictogram_id": "P002", "locale": "sv"},
        {"term": "chokladmjölk", "pictogram_id": "P003", "locale": "sv"},
        {"term": "milk", "pictogram_id": "P001", "locale": "en"},
        {"term": "café", "pictogram_id": "P010", "locale": "en"}
    ]
}"#;

struct Fixture {
    _dir: tempfile::TempDir,
    source: Arc<FakeSource>,
    facade: Arc<SearchFacade>,
}

async fn fixture(source: FakeSource, config: SearchConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(source);
    let coordinator = coordinator(
        open_cache(dir.path()).await,
        Arc::clone(&source),
        Duration::from_secs(3600),
    );
    let facade = SearchFacade::new(
        Arc::new(KeywordIndex::build(DATASET.as_bytes()).unwrap()),
        coordinator,
        Arc::new(LearnedTerms::in_memory()),
        config,
    );
    Fixture {
        _dir: dir,
        source,
        facade: Arc::new(facade),
    }
}

fn ids(hits: &[SearchHit]) -> Vec<&str> {
    hits.iter().map(|hit| hit.id().as_str()).collect()
}

#[tokio::test]
async fn ranked_results_are_fetched_and_cached() {
    let fx = fixture(FakeSource::new(Behaviour::Serve), SearchConfig::default()).await;

    let hits = fx.facade.search("mjölk", "sv").await.into_hits().unwrap();
    assert_eq!(ids(&hits), vec!["P001", "P002", "P003"]);
    assert!(hits.iter().all(|hit| matches!(hit, SearchHit::Asset(a) if a.is_cached())));
    assert_eq!(fx.source.fetch_count(), 3);

    let again = fx.facade.search("mjölk", "sv-SE").await.into_hits().unwrap();
    assert_eq!(ids(&again), vec!["P001", "P002", "P003"]);
    assert_eq!(fx.source.fetch_count(), 3);
}

#[rstest]
#[case("giraff", "sv")]
#[case("", "sv")]
#[case("milk", "fi")]
#[tokio::test]
async fn no_match_is_an_empty_result(#[case] query: &str, #[case] locale: &str) {
    let fx = fixture(FakeSource::new(Behaviour::Serve), SearchConfig::default()).await;

    assert_eq!(
        fx.facade.search(query, locale).await,
        SearchOutcome::Results(vec![])
    );
    assert_eq!(fx.source.fetch_count(), 0);
}

#[tokio::test]
async fn accents_fold_outside_nordic_locales() {
    let fx = fixture(FakeSource::new(Behaviour::Serve), SearchConfig::default()).await;

    let hits = fx.facade.search("CAFE", "en").await.into_hits().unwrap();
    assert_eq!(ids(&hits), vec!["P010"]);
}

#[tokio::test]
async fn fetches_are_capped_per_query() {
    let config = SearchConfig {
        max_fetches_per_query: 2,
        ..SearchConfig::default()
    };
    let fx = fixture(FakeSource::new(Behaviour::Serve), config).await;

    let hits = fx.facade.search("mjölk", "sv").await.into_hits().unwrap();
    assert_eq!(ids(&hits), vec!["P001", "P002", "P003"]);
    assert_eq!(fx.source.fetch_count(), 2);

    assert!(hits[0].asset().is_cached());
    assert!(hits[1].asset().is_cached());
    match &hits[2] {
        SearchHit::Placeholder { asset, placeholder } => {
            assert_eq!(asset.fetch_state(), FetchState::Unfetched);
            assert!(!placeholder.glyph.is_empty());
        }
        other => panic!("expected a placeholder, got {other:?}"),
    }
}

#[tokio::test]
async fn results_are_capped() {
    let config = SearchConfig {
        max_results: 1,
        ..SearchConfig::default()
    };
    let fx = fixture(FakeSource::new(Behaviour::Serve), config).await;

    let hits = fx.facade.search("mjölk", "sv").await.into_hits().unwrap();
    assert_eq!(ids(&hits), vec!["P001"]);
}

#[tokio::test]
async fn failed_fetches_become_placeholders() {
    let fx = fixture(FakeSource::new(Behaviour::Fail), SearchConfig::default()).await;

    let hits = fx.facade.search("milk", "en").await.into_hits().unwrap();
    assert_eq!(hits.len(), 1);
    assert!(matches!(
        &hits[0],
        SearchHit::Placeholder { asset, .. } if asset.fetch_state() == FetchState::Failed
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_query_supersedes_the_running_one() {
    let config = SearchConfig {
        parallel_fetches: 1,
        ..SearchConfig::default()
    };
    let fx = fixture(FakeSource::gated(Behaviour::Serve), config).await;

    let facade = Arc::clone(&fx.facade);
    let first = tokio::spawn(async move { facade.search("mjölk", "sv").await });
    fx.source.started.notified().await;

    let second = fx.facade.search("giraff", "sv").await;
    assert_eq!(second, SearchOutcome::Results(vec![]));
    assert_eq!(first.await.unwrap(), SearchOutcome::Superseded);

    // The fetch that had started still completes and lands in the cache
    fx.source.open_gate();
    let hits = fx.facade.search("milk", "en").await.into_hits().unwrap();
    assert!(hits[0].asset().is_cached());
    assert_eq!(fx.source.fetch_count(), 1);
}

#[tokio::test]
async fn remote_fallback_learns_unknown_terms() {
    let config = SearchConfig {
        remote_fallback: true,
        ..SearchConfig::default()
    };
    let source = FakeSource::new(Behaviour::Serve).with_remote("giraff", &["2413"]);
    let fx = fixture(source, config).await;

    let hits = fx.facade.search("giraff", "sv").await.into_hits().unwrap();
    assert_eq!(ids(&hits), vec!["2413"]);
    assert_eq!(fx.source.search_count(), 1);

    fx.facade.search("Giraff", "sv").await;
    assert_eq!(fx.source.search_count(), 1);

    // Offline matches never reach the remote search
    fx.facade.search("mjölk", "sv").await;
    assert_eq!(fx.source.search_count(), 1);
}

#[tokio::test]
async fn remote_fallback_is_off_by_default() {
    let source = FakeSource::new(Behaviour::Serve).with_remote("giraff", &["2413"]);
    let fx = fixture(source, SearchConfig::default()).await;

    assert_eq!(
        fx.facade.search("giraff", "sv").await,
        SearchOutcome::Results(vec![])
    );
    assert_eq!(fx.source.search_count(), 0);
}
