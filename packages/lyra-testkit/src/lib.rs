//! Deterministic in-memory stand-ins for the ranking service's external collaborators.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use serde_json::Map;

use lyra_config::{
	Cache, Config, EmbeddingProviderConfig, Memory, Providers, Qdrant, Ranking, RankingFusion,
	Service, Storage, Streaming,
};
use lyra_domain::Candidate;
use lyra_service::{
	Backends, BoxFuture, CacheStore, Embedder, LyraService, MemoryRecord, MemoryStore, Retriever,
};

pub const TEST_DIMENSIONS: u32 = 4;

pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "lyra_test".to_string(),
				vector_dim: TEST_DIMENSIONS,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: TEST_DIMENSIONS,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		ranking: Ranking {
			default_top_k: 5,
			max_top_k: 20,
			ltr_weights: Vec::new(),
			fusion: RankingFusion { w_ltr: 0.6, w_concept: 0.4 },
		},
		cache: Cache {
			enabled: true,
			namespace: "lyra_test".to_string(),
			full_ttl_secs: 300,
			feature_ttl_secs: 3_600,
			max_entries: 1_000,
			max_payload_bytes: None,
			preview_chars: 240,
		},
		streaming: Streaming {
			memory_augmentation: true,
			memory_weight: 0.5,
			phase_delay_ms: 0,
			max_phase_delay_ms: 1_000,
			channel_capacity: 8,
			overlap_boost: 0.03,
			top_boost_ratio: 0.05,
			tail_penalty_ratio: 0.02,
			tail_start_rank: 5,
		},
		memory: Memory {
			triggers: vec![
				"hey jarvice remember this".to_string(),
				"hey jarvice remember".to_string(),
				"remember this".to_string(),
			],
			source_label: "memory".to_string(),
		},
	}
}

pub fn candidate(id: &str, text: &str, distance: f64) -> Candidate {
	Candidate {
		id: id.to_string(),
		text: text.to_string(),
		distance,
		source: "corpus".to_string(),
	}
}

pub fn memory_candidate(id: &str, text: &str, distance: f64) -> Candidate {
	Candidate { source: "memory".to_string(), ..candidate(id, text, distance) }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the same vector for every input.
pub struct StaticEmbedder {
	vector: Vec<f32>,
	fail: bool,
	calls: AtomicUsize,
}
impl StaticEmbedder {
	pub fn new(dimensions: u32) -> Self {
		Self { vector: vec![0.5; dimensions as usize], fail: false, calls: AtomicUsize::new(0) }
	}

	pub fn failing() -> Self {
		Self { fail: true, ..Self::new(TEST_DIMENSIONS) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl Embedder for StaticEmbedder {
	fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.fail {
				return Err(eyre::eyre!("Embedding backend unavailable."));
			}

			Ok(self.vector.clone())
		})
	}

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.fail {
				return Err(eyre::eyre!("Embedding backend unavailable."));
			}

			Ok(vec![self.vector.clone(); texts.len()])
		})
	}
}

/// Serves scripted candidates per scope. `None` is the main corpus.
pub struct FixtureRetriever {
	scopes: HashMap<Option<String>, Vec<Candidate>>,
	fail: bool,
	latency: Duration,
	calls: AtomicUsize,
	completed: AtomicUsize,
}
impl FixtureRetriever {
	pub fn new(main: Vec<Candidate>) -> Self {
		let mut scopes = HashMap::new();

		scopes.insert(None, main);

		Self {
			scopes,
			fail: false,
			latency: Duration::ZERO,
			calls: AtomicUsize::new(0),
			completed: AtomicUsize::new(0),
		}
	}

	pub fn failing() -> Self {
		Self { fail: true, ..Self::new(Vec::new()) }
	}

	pub fn with_scope(mut self, scope: &str, candidates: Vec<Candidate>) -> Self {
		self.scopes.insert(Some(scope.to_string()), candidates);

		self
	}

	/// Every search sleeps for `latency` before answering.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Searches that ran to the end rather than being dropped mid-flight.
	pub fn completed(&self) -> usize {
		self.completed.load(Ordering::SeqCst)
	}
}
impl Retriever for FixtureRetriever {
	fn vector_search<'a>(
		&'a self,
		_vector: &'a [f32],
		top_k: u32,
		scope: Option<&'a str>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Candidate>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if !self.latency.is_zero() {
				tokio::time::sleep(self.latency).await;
			}

			self.completed.fetch_add(1, Ordering::SeqCst);

			if self.fail {
				return Err(eyre::eyre!("Retriever unavailable."));
			}

			let mut hits =
				self.scopes.get(&scope.map(str::to_string)).cloned().unwrap_or_default();

			hits.truncate(top_k as usize);

			Ok(hits)
		})
	}
}

/// Plain map keeping the last TTL per key. Entries never expire.
#[derive(Default)]
pub struct InMemoryCacheStore {
	entries: Mutex<HashMap<String, (Vec<u8>, Duration)>>,
}
impl InMemoryCacheStore {
	pub fn len(&self) -> usize {
		lock(&self.entries).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn ttls(&self) -> Vec<Duration> {
		lock(&self.entries).values().map(|(_, ttl)| *ttl).collect()
	}
}
impl CacheStore for InMemoryCacheStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Vec<u8>>>> {
		let hit = lock(&self.entries).get(key).map(|(payload, _)| payload.clone());

		Box::pin(async move { Ok(hit) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		payload: Vec<u8>,
		ttl: Duration,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		lock(&self.entries).insert(key.to_string(), (payload, ttl));

		Box::pin(async move { Ok(()) })
	}
}

/// Every read and write fails.
#[derive(Default)]
pub struct FailingCacheStore {
	attempts: AtomicUsize,
}
impl FailingCacheStore {
	pub fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}
}
impl CacheStore for FailingCacheStore {
	fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Vec<u8>>>> {
		self.attempts.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Err(eyre::eyre!("Cache backend unavailable.")) })
	}

	fn set<'a>(
		&'a self,
		_key: &'a str,
		_payload: Vec<u8>,
		_ttl: Duration,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		self.attempts.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Err(eyre::eyre!("Cache backend unavailable.")) })
	}
}

#[derive(Default)]
pub struct RecordingMemoryStore {
	records: Mutex<Vec<MemoryRecord>>,
	fail: bool,
}
impl RecordingMemoryStore {
	pub fn failing() -> Self {
		Self { records: Mutex::new(Vec::new()), fail: true }
	}

	pub fn records(&self) -> Vec<MemoryRecord> {
		lock(&self.records).clone()
	}
}
impl MemoryStore for RecordingMemoryStore {
	fn store<'a>(
		&'a self,
		record: &'a MemoryRecord,
		_vector: &'a [f32],
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			if self.fail {
				return Err(eyre::eyre!("Memory store unavailable."));
			}

			lock(&self.records).push(record.clone());

			Ok(())
		})
	}
}

/// A service wired to fakes, keeping handles to each fake for assertions.
pub struct Harness {
	pub service: Arc<LyraService>,
	pub embedder: Arc<StaticEmbedder>,
	pub retriever: Arc<FixtureRetriever>,
	pub cache: Arc<InMemoryCacheStore>,
	pub memory: Arc<RecordingMemoryStore>,
}
impl Harness {
	pub fn new(cfg: Config, retriever: FixtureRetriever) -> lyra_service::Result<Self> {
		Self::with_parts(
			cfg,
			StaticEmbedder::new(TEST_DIMENSIONS),
			retriever,
			RecordingMemoryStore::default(),
		)
	}

	pub fn with_parts(
		cfg: Config,
		embedder: StaticEmbedder,
		retriever: FixtureRetriever,
		memory: RecordingMemoryStore,
	) -> lyra_service::Result<Self> {
		let embedder = Arc::new(embedder);
		let retriever = Arc::new(retriever);
		let cache = Arc::new(InMemoryCacheStore::default());
		let memory = Arc::new(memory);
		let backends =
			Backends::new(embedder.clone(), retriever.clone(), cache.clone(), memory.clone());
		let service = Arc::new(LyraService::new(cfg, backends)?);

		Ok(Self { service, embedder, retriever, cache, memory })
	}
}
