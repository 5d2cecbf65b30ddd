pub mod cache;
pub mod memory;
pub mod rank;
pub mod retrieval;
pub mod stream;
pub mod weights;

mod error;

pub use error::{Error, Result};
pub use memory::{Acknowledgment, MemoryRecord};
pub use rank::{CacheHitKind, RankRequest, RankedItem, RankedResponse};
pub use stream::{StreamEvent, StreamMeta, StreamPhase, StreamRequest};
pub use weights::{FusionWeightsCell, FusionWeightsView};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use lyra_config::Config;
use lyra_domain::{Candidate, memory_trigger::TriggerSet};
use lyra_providers::embedding::EmbeddingClient;
use lyra_storage::{kv::KvStore, qdrant::QdrantStore};

use crate::cache::CacheLayer;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait Retriever
where
	Self: Send + Sync,
{
	/// `scope` restricts the search to one source label, e.g. memory records.
	fn vector_search<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		scope: Option<&'a str>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Candidate>>>;
}

pub trait CacheStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Vec<u8>>>>;

	fn set<'a>(
		&'a self,
		key: &'a str,
		payload: Vec<u8>,
		ttl: Duration,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

pub trait MemoryStore
where
	Self: Send + Sync,
{
	fn store<'a>(
		&'a self,
		record: &'a MemoryRecord,
		vector: &'a [f32],
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Clone)]
pub struct Backends {
	pub embedder: Arc<dyn Embedder>,
	pub retriever: Arc<dyn Retriever>,
	pub cache: Arc<dyn CacheStore>,
	pub memory: Arc<dyn MemoryStore>,
}
impl Backends {
	pub fn new(
		embedder: Arc<dyn Embedder>,
		retriever: Arc<dyn Retriever>,
		cache: Arc<dyn CacheStore>,
		memory: Arc<dyn MemoryStore>,
	) -> Self {
		Self { embedder, retriever, cache, memory }
	}

	/// Production wiring: HTTP embedder, Qdrant for retrieval and memories, moka for caching.
	/// Creates the Qdrant collection when it is missing.
	pub async fn connect(cfg: &Config) -> Result<Self> {
		let embedder = EmbeddingClient::new(cfg.providers.embedding.clone())
			.map_err(|err| Error::Config { message: err.to_string() })?;
		let qdrant = Arc::new(QdrantStore::new(&cfg.storage.qdrant)?);

		qdrant.ensure_collection().await?;

		let cache = KvStore::new(&cfg.cache.namespace, cfg.cache.max_entries);

		Ok(Self {
			embedder: Arc::new(HttpEmbedder(embedder)),
			retriever: Arc::new(QdrantBackend(qdrant.clone())),
			cache: Arc::new(MokaCache(cache)),
			memory: Arc::new(QdrantBackend(qdrant)),
		})
	}
}

pub struct LyraService {
	pub cfg: Config,
	pub backends: Backends,
	pub weights: FusionWeightsCell,
	cache: CacheLayer,
	ltr_weights: Arc<[f64]>,
	triggers: TriggerSet,
}
impl LyraService {
	pub fn new(cfg: Config, backends: Backends) -> Result<Self> {
		let triggers = TriggerSet::new(&cfg.memory.triggers)
			.map_err(|err| Error::Config { message: format!("Invalid memory trigger: {err}") })?;
		let weights = FusionWeightsCell::new(cfg.ranking.fusion.w_ltr, cfg.ranking.fusion.w_concept);
		let ltr_weights: Arc<[f64]> =
			cfg.ranking.ltr_weights.iter().map(|weight| f64::from(*weight)).collect();

		let cache = CacheLayer::new(backends.cache.clone(), cfg.cache.clone());

		Ok(Self { cfg, backends, weights, cache, ltr_weights, triggers })
	}

	pub fn get_fusion_weights(&self) -> FusionWeightsView {
		FusionWeightsView::from(self.weights.get())
	}

	pub fn update_fusion_weights(&self, w_ltr: f64, w_concept: f64) -> Result<FusionWeightsView> {
		let updated = self.weights.update(w_ltr, w_concept)?;

		tracing::info!(
			w_ltr = updated.w_ltr,
			w_concept = updated.w_concept,
			version = updated.version,
			"Fusion weights updated."
		);

		Ok(FusionWeightsView::from(updated))
	}

	pub(crate) fn ltr_weights(&self) -> Arc<[f64]> {
		self.ltr_weights.clone()
	}

	pub(crate) fn cache(&self) -> &CacheLayer {
		&self.cache
	}

	pub(crate) fn triggers(&self) -> &TriggerSet {
		&self.triggers
	}

	/// Embeds `text`, checking the dimension. Any failure is fatal for the request.
	pub(crate) async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
		let vector = self
			.backends
			.embedder
			.embed(text)
			.await
			.map_err(|err| Error::Provider { message: format!("Embedding failed: {err}") })?;

		if vector.len() != self.cfg.providers.embedding.dimensions as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}
}

struct HttpEmbedder(EmbeddingClient);
impl Embedder for HttpEmbedder {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(self.0.embed(text))
	}

	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(self.0.embed_batch(texts))
	}
}

struct QdrantBackend(Arc<QdrantStore>);
impl Retriever for QdrantBackend {
	fn vector_search<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		scope: Option<&'a str>,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Candidate>>> {
		Box::pin(async move {
			let hits = self.0.search(vector, top_k, scope).await?;

			Ok(hits
				.into_iter()
				.map(|hit| Candidate {
					id: hit.id,
					text: hit.text,
					distance: f64::from(hit.distance),
					source: hit.source,
				})
				.collect())
		})
	}
}
impl MemoryStore for QdrantBackend {
	fn store<'a>(
		&'a self,
		record: &'a MemoryRecord,
		vector: &'a [f32],
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			self.0.upsert_passage(&record.id, &record.text, &record.source, vector).await?;

			Ok(())
		})
	}
}

struct MokaCache(KvStore);
impl CacheStore for MokaCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Vec<u8>>>> {
		Box::pin(async move { Ok(self.0.get(key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		payload: Vec<u8>,
		ttl: Duration,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			self.0.set(key, payload, ttl);

			Ok(())
		})
	}
}
