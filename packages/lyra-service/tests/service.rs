use std::{sync::Arc, time::Duration};

use lyra_domain::fusion::FusionWeights;
use lyra_service::{
	Backends, CacheHitKind, CacheStore, Error, LyraService, RankRequest, RankedResponse,
	cache::{self, FeatureCacheEntry, FeatureCacheItem, FullCacheEntry},
};
use lyra_testkit::{
	FailingCacheStore, FixtureRetriever, Harness, RecordingMemoryStore, StaticEmbedder,
	TEST_DIMENSIONS, candidate, test_config,
};

fn corpus() -> Vec<lyra_domain::Candidate> {
	vec![
		candidate("1", "Mitochondria are the powerhouse of the cell.", 0.1),
		candidate("2", "Cells contain organelles.", 0.5),
		candidate("3", "Photosynthesis happens in chloroplasts of plant cells.", 0.7),
	]
}

fn request(query: &str, top_k: Option<u32>) -> RankRequest {
	RankRequest { query: query.to_string(), top_k, context: None }
}

fn ids(response: &RankedResponse) -> Vec<&str> {
	response.results.iter().map(|item| item.id.as_str()).collect()
}

async fn plant<T>(harness: &Harness, key: &str, entry: &T)
where
	T: serde::Serialize,
{
	let raw = serde_json::to_vec(entry).expect("Failed to encode entry.");

	harness.cache.set(key, raw, Duration::from_secs(60)).await.expect("Failed to plant entry.");
}

#[tokio::test]
async fn weights_sum_to_one_after_update() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");

	for (a, b) in [(1.0, 0.0), (0.0, 2.0), (0.3, 0.7), (5.0, 3.0), (1e-6, 1e6)] {
		let updated = harness.service.update_fusion_weights(a, b).expect("Update failed.");
		let read = harness.service.get_fusion_weights();

		assert_eq!(updated, read);
		assert!((read.w_ltr + read.w_concept - 1.0).abs() < 1e-9);
	}

	assert_eq!(harness.service.get_fusion_weights().version, 5);
}

#[tokio::test]
async fn zero_weights_read_as_even_split() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let read = harness.service.update_fusion_weights(0.0, 0.0).expect("Update failed.");

	assert_eq!((read.w_ltr, read.w_concept), (0.5, 0.5));
}

#[tokio::test]
async fn negative_weights_are_rejected_without_bumping_version() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let err = harness.service.update_fusion_weights(-1.0, 0.5).expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(harness.service.get_fusion_weights().version, 0);
}

#[tokio::test]
async fn worked_example_ranks_closest_first() {
	let retriever = FixtureRetriever::new(corpus().into_iter().take(2).collect());
	let harness = Harness::new(test_config(), retriever).expect("Harness.");
	let response =
		harness.service.rank(request("mitochondria", Some(2))).await.expect("Rank failed.");

	assert_eq!(ids(&response), vec!["1", "2"]);
	assert!((response.results[0].conceptual_score - 1.0 / 1.1).abs() < 1e-9);
	assert!((response.results[1].conceptual_score - 1.0 / 1.5).abs() < 1e-9);
	assert_eq!(response.results[0].normalized_ltr_score, 1.0);
	assert_eq!(response.results[1].normalized_ltr_score, 0.0);
	assert_eq!(response.feature_schema_version, 1);
	assert_eq!(response.feature_names, vec!["similarity", "log_length", "bias"]);
	assert_eq!(response.fusion_weights_version, 0);
	assert_eq!(response.cache_hit_kind, CacheHitKind::None);
	assert!(response.error_note.is_none());
}

#[tokio::test]
async fn equal_raw_scores_normalize_to_half() {
	let retriever = FixtureRetriever::new(vec![
		candidate("a", "same text", 0.3),
		candidate("b", "same text", 0.3),
		candidate("c", "same text", 0.3),
	]);
	let harness = Harness::new(test_config(), retriever).expect("Harness.");
	let response = harness.service.rank(request("q", None)).await.expect("Rank failed.");

	assert_eq!(ids(&response), vec!["a", "b", "c"]);

	for item in &response.results {
		assert_eq!(item.normalized_ltr_score, 0.5);
	}
}

#[tokio::test]
async fn identical_inputs_give_identical_order() {
	let first = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let second = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let a = first.service.rank(request("cells", Some(3))).await.expect("Rank failed.");
	let b = second.service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(ids(&a), ids(&b));
	assert_eq!(a.results, b.results);
}

#[tokio::test]
async fn weight_update_downgrades_repeat_query_to_feature_hit() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let service = &harness.service;
	let cold = service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(cold.cache_hit_kind, CacheHitKind::None);
	assert_eq!(harness.retriever.calls(), 1);

	let warm = service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(warm.cache_hit_kind, CacheHitKind::Full);
	assert_eq!(warm.results, cold.results);

	service.update_fusion_weights(0.1, 0.9).expect("Update failed.");

	let refused = service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(refused.cache_hit_kind, CacheHitKind::Feature);
	assert_eq!(refused.fusion_weights_version, 1);
	assert!((refused.fusion_weights.w_concept - 0.9).abs() < 1e-9);
	assert_eq!(harness.retriever.calls(), 1);
	assert_eq!(harness.embedder.calls(), 1);

	let rewarmed = service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(rewarmed.cache_hit_kind, CacheHitKind::Full);
	assert_eq!(rewarmed.fusion_weights_version, 1);
	assert_eq!(harness.retriever.calls(), 1);
}

#[tokio::test]
async fn full_hit_reports_only_cache_check_timing() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let cold = harness.service.rank(request("cells", None)).await.expect("Rank failed.");
	let stages: Vec<&str> = cold.timings_by_stage.keys().map(String::as_str).collect();

	assert_eq!(stages, vec!["assemble", "cache_check", "embed", "fuse", "retrieve", "score"]);

	let warm = harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	let stages: Vec<&str> = warm.timings_by_stage.keys().map(String::as_str).collect();

	assert_eq!(stages, vec!["cache_check"]);
}

#[tokio::test]
async fn degraded_retrieval_notes_error_and_skips_caching() {
	let harness = Harness::new(test_config(), FixtureRetriever::failing()).expect("Harness.");
	let response = harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	assert!(response.results.is_empty());
	assert!(response.error_note.as_deref().is_some_and(|note| note.contains("Retrieval failed")));
	assert!(harness.cache.is_empty());

	let again = harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	assert_eq!(again.cache_hit_kind, CacheHitKind::None);
	assert_eq!(harness.retriever.calls(), 2);
}

#[tokio::test]
async fn empty_corpus_has_no_error_note() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(Vec::new())).expect("Harness.");
	let response = harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	assert!(response.results.is_empty());
	assert!(response.error_note.is_none());
}

#[tokio::test]
async fn embedding_failure_is_fatal() {
	let harness = Harness::with_parts(
		test_config(),
		StaticEmbedder::failing(),
		FixtureRetriever::new(corpus()),
		RecordingMemoryStore::default(),
	)
	.expect("Harness.");
	let err = harness.service.rank(request("cells", None)).await.expect_err("Expected error.");

	assert!(matches!(err, Error::Provider { .. }));
	assert_eq!(harness.retriever.calls(), 0);
}

#[tokio::test]
async fn wrong_embedding_dimension_is_fatal() {
	let harness = Harness::with_parts(
		test_config(),
		StaticEmbedder::new(TEST_DIMENSIONS + 1),
		FixtureRetriever::new(corpus()),
		RecordingMemoryStore::default(),
	)
	.expect("Harness.");
	let err = harness.service.rank(request("cells", None)).await.expect_err("Expected error.");

	assert!(matches!(err, Error::Provider { .. }));
}

#[tokio::test]
async fn rejects_empty_query_and_zero_top_k() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let empty = harness.service.rank(request("   ", None)).await.expect_err("Expected error.");
	let zero = harness.service.rank(request("cells", Some(0))).await.expect_err("Expected error.");

	assert!(matches!(empty, Error::InvalidRequest { .. }));
	assert!(matches!(zero, Error::InvalidRequest { .. }));
	assert_eq!(harness.embedder.calls(), 0);
}

#[tokio::test]
async fn top_k_is_clamped_to_max() {
	let many = (0..30_u32).map(|idx| candidate(&format!("p{idx}"), "text", 0.01 * f64::from(idx)));
	let harness =
		Harness::new(test_config(), FixtureRetriever::new(many.collect())).expect("Harness.");
	let response = harness.service.rank(request("text", Some(100))).await.expect("Rank failed.");

	assert_eq!(response.results.len(), 20);
}

#[tokio::test]
async fn failing_cache_backend_degrades_to_miss() {
	let cache = Arc::new(FailingCacheStore::default());
	let backends = Backends::new(
		Arc::new(StaticEmbedder::new(TEST_DIMENSIONS)),
		Arc::new(FixtureRetriever::new(corpus())),
		cache.clone(),
		Arc::new(RecordingMemoryStore::default()),
	);
	let service = LyraService::new(test_config(), backends).expect("Service.");

	for _ in 0..2 {
		let response = service.rank(request("cells", None)).await.expect("Rank failed.");

		assert_eq!(response.cache_hit_kind, CacheHitKind::None);
		assert_eq!(response.results.len(), 3);
		assert_eq!(response.error_note.as_deref(), Some("Cache backend unavailable."));
	}

	// One failed read per request; the rest of the request skips the store.
	assert_eq!(cache.attempts(), 2);
}

#[tokio::test]
async fn cache_note_follows_retrieval_note() {
	let backends = Backends::new(
		Arc::new(StaticEmbedder::new(TEST_DIMENSIONS)),
		Arc::new(FixtureRetriever::failing()),
		Arc::new(FailingCacheStore::default()),
		Arc::new(RecordingMemoryStore::default()),
	);
	let service = LyraService::new(test_config(), backends).expect("Service.");
	let response = service.rank(request("cells", None)).await.expect("Rank failed.");
	let note = response.error_note.expect("Expected a note.");

	assert!(note.starts_with("Retrieval failed"));
	assert!(note.ends_with("Cache backend unavailable."));
}

#[tokio::test]
async fn full_entry_with_foreign_weights_falls_back_to_features() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
	let cold = harness.service.rank(request("cells", Some(3))).await.expect("Rank failed.");
	let planted = FullCacheEntry {
		weights: FusionWeights { w_ltr: 0.9, w_concept: 0.1, version: 0 },
		response: cold,
	};
	let key = cache::build_full_cache_key("lyra_test", "cells", 3).expect("Key.");

	plant(&harness, &key, &planted).await;

	let response = harness.service.rank(request("cells", Some(3))).await.expect("Rank failed.");

	assert_eq!(response.cache_hit_kind, CacheHitKind::Feature);
	assert!((response.fusion_weights.w_ltr - 0.6).abs() < 1e-9);
	assert_eq!(harness.retriever.calls(), 1);
	assert_eq!(harness.embedder.calls(), 1);
}

#[tokio::test]
async fn feature_entry_from_another_schema_is_a_miss() {
	let foreign = [(2, vec![0.5, 1.0, 1.0]), (1, vec![0.5, 1.0])];

	for (schema, features) in foreign {
		let harness =
			Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");
		let planted = FeatureCacheEntry {
			feature_schema_version: schema,
			feature_names: vec!["similarity".to_string(), "log_length".to_string()],
			items: vec![FeatureCacheItem {
				id: "stale".to_string(),
				text_preview: "stale".to_string(),
				distance: 0.0,
				source: "main".to_string(),
				features,
				raw_ltr_score: 9.0,
			}],
		};
		let key = cache::build_feature_cache_key("lyra_test", "cells", 3).expect("Key.");

		plant(&harness, &key, &planted).await;

		let response =
			harness.service.rank(request("cells", Some(3))).await.expect("Rank failed.");

		assert_eq!(response.cache_hit_kind, CacheHitKind::None);
		assert_eq!(ids(&response), vec!["1", "2", "3"]);
		assert_eq!(harness.retriever.calls(), 1);
		assert!(response.results.iter().all(|item| item.features.len() == 3));
	}
}

#[tokio::test]
async fn disabled_cache_is_bypassed() {
	let mut cfg = test_config();

	cfg.cache.enabled = false;

	let harness = Harness::new(cfg, FixtureRetriever::new(corpus())).expect("Harness.");

	for _ in 0..2 {
		let response = harness.service.rank(request("cells", None)).await.expect("Rank failed.");

		assert_eq!(response.cache_hit_kind, CacheHitKind::None);
	}

	assert!(harness.cache.is_empty());
	assert_eq!(harness.retriever.calls(), 2);
}

#[tokio::test]
async fn oversized_payloads_are_not_cached() {
	let mut cfg = test_config();

	cfg.cache.max_payload_bytes = Some(16);

	let harness = Harness::new(cfg, FixtureRetriever::new(corpus())).expect("Harness.");

	harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn cache_entries_carry_tier_ttls() {
	let harness = Harness::new(test_config(), FixtureRetriever::new(corpus())).expect("Harness.");

	harness.service.rank(request("cells", None)).await.expect("Rank failed.");

	let mut ttls: Vec<u64> = harness.cache.ttls().iter().map(|ttl| ttl.as_secs()).collect();

	ttls.sort_unstable();

	assert_eq!(ttls, vec![300, 3_600]);
}

#[tokio::test]
async fn previews_are_truncated() {
	let mut cfg = test_config();

	cfg.cache.preview_chars = 5;

	let harness = Harness::new(cfg, FixtureRetriever::new(corpus())).expect("Harness.");
	let response = harness.service.rank(request("cells", Some(1))).await.expect("Rank failed.");

	assert_eq!(response.results[0].text_preview, "Mitoc");
}
