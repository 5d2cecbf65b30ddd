//! Two-tier ranking cache over a best-effort [`CacheStore`].
//!
//! The full tier holds a finished response together with the fusion weights that produced it.
//! The feature tier holds per-candidate features and raw LTR scores, which stay valid across
//! weight changes. Undecodable or stale entries are misses. A failing backing store is reported
//! as [`CacheUnavailable`] so the caller can serve uncached and say so.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use lyra_config::Cache;
use lyra_domain::{
	features::{FEATURE_SCHEMA_VERSION, restore_row},
	fusion::FusionWeights,
};

use crate::{CacheStore, Error, Result, rank::RankedResponse};

const FULL_CACHE_SCHEMA_VERSION: u32 = 1;
const FEATURE_CACHE_SCHEMA_VERSION: u32 = 1;

/// The backing store rejected a read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheUnavailable;

pub type CacheRead<T> = std::result::Result<Option<T>, CacheUnavailable>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
	Full,
	Feature,
}
impl CacheKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Full => "full",
			Self::Feature => "feature",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullCacheEntry {
	/// Raw weights and version used to fuse `response`.
	pub weights: FusionWeights,
	pub response: RankedResponse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureCacheItem {
	pub id: String,
	pub text_preview: String,
	pub distance: f64,
	pub source: String,
	pub features: Vec<f64>,
	pub raw_ltr_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureCacheEntry {
	pub feature_schema_version: u32,
	pub feature_names: Vec<String>,
	pub items: Vec<FeatureCacheItem>,
}

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

pub fn build_full_cache_key(namespace: &str, query: &str, top_k: u32) -> Result<String> {
	let payload = serde_json::json!({
		"kind": CacheKind::Full.as_str(),
		"schema_version": FULL_CACHE_SCHEMA_VERSION,
		"namespace": namespace,
		"query": query.trim(),
		"top_k": top_k,
	});

	hash_cache_key(&payload)
}

pub fn build_feature_cache_key(namespace: &str, query: &str, top_k: u32) -> Result<String> {
	let payload = serde_json::json!({
		"kind": CacheKind::Feature.as_str(),
		"schema_version": FEATURE_CACHE_SCHEMA_VERSION,
		"feature_schema_version": FEATURE_SCHEMA_VERSION,
		"namespace": namespace,
		"query": query.trim(),
		"top_k": top_k,
	});

	hash_cache_key(&payload)
}

pub struct CacheLayer {
	store: Arc<dyn CacheStore>,
	cfg: Cache,
}
impl CacheLayer {
	pub fn new(store: Arc<dyn CacheStore>, cfg: Cache) -> Self {
		Self { store, cfg }
	}

	pub fn enabled(&self) -> bool {
		self.cfg.enabled
	}

	/// Returns the entry only when it was built with exactly the `current` weights, comparing both
	/// version and normalized values.
	pub async fn get_full(
		&self,
		query: &str,
		top_k: u32,
		current: &FusionWeights,
	) -> CacheRead<FullCacheEntry> {
		let Some(key) = self.key(CacheKind::Full, query, top_k) else { return Ok(None) };
		let Some(entry) = self.fetch::<FullCacheEntry>(CacheKind::Full, &key).await? else {
			return Ok(None);
		};

		if entry.weights.version != current.version {
			tracing::debug!(
				cache_kind = CacheKind::Full.as_str(),
				cache_key_prefix = cache_key_prefix(&key),
				cached_version = entry.weights.version,
				current_version = current.version,
				"Cache entry is stale."
			);

			return Ok(None);
		}
		if !entry.weights.same_snapshot(current) {
			tracing::warn!(
				cache_kind = CacheKind::Full.as_str(),
				cache_key_prefix = cache_key_prefix(&key),
				version = current.version,
				"Cache entry weights differ at the same version."
			);

			return Ok(None);
		}
		if entry.response.feature_schema_version != FEATURE_SCHEMA_VERSION {
			tracing::warn!(
				cache_kind = CacheKind::Full.as_str(),
				cache_key_prefix = cache_key_prefix(&key),
				cached_schema = entry.response.feature_schema_version,
				live_schema = FEATURE_SCHEMA_VERSION,
				"Cache entry schema mismatch."
			);

			return Ok(None);
		}

		Ok(Some(entry))
	}

	pub async fn put_full(
		&self,
		query: &str,
		top_k: u32,
		entry: &FullCacheEntry,
	) -> std::result::Result<(), CacheUnavailable> {
		let Some(key) = self.key(CacheKind::Full, query, top_k) else { return Ok(()) };

		self.store_payload(CacheKind::Full, &key, entry, self.cfg.full_ttl_secs).await
	}

	/// Returns the entry only when every stored vector matches the live feature schema.
	pub async fn get_feature(&self, query: &str, top_k: u32) -> CacheRead<FeatureCacheEntry> {
		let Some(key) = self.key(CacheKind::Feature, query, top_k) else { return Ok(None) };
		let Some(entry) = self.fetch::<FeatureCacheEntry>(CacheKind::Feature, &key).await? else {
			return Ok(None);
		};
		let schema_matches = entry.feature_schema_version == FEATURE_SCHEMA_VERSION
			&& entry
				.items
				.iter()
				.all(|item| restore_row(entry.feature_schema_version, &item.features).is_some());

		if !schema_matches {
			tracing::warn!(
				cache_kind = CacheKind::Feature.as_str(),
				cache_key_prefix = cache_key_prefix(&key),
				cached_schema = entry.feature_schema_version,
				live_schema = FEATURE_SCHEMA_VERSION,
				"Cache entry schema mismatch."
			);

			return Ok(None);
		}

		Ok(Some(entry))
	}

	pub async fn put_feature(
		&self,
		query: &str,
		top_k: u32,
		entry: &FeatureCacheEntry,
	) -> std::result::Result<(), CacheUnavailable> {
		let Some(key) = self.key(CacheKind::Feature, query, top_k) else { return Ok(()) };

		self.store_payload(CacheKind::Feature, &key, entry, self.cfg.feature_ttl_secs).await
	}

	fn key(&self, kind: CacheKind, query: &str, top_k: u32) -> Option<String> {
		if !self.cfg.enabled {
			return None;
		}

		let built = match kind {
			CacheKind::Full => build_full_cache_key(&self.cfg.namespace, query, top_k),
			CacheKind::Feature => build_feature_cache_key(&self.cfg.namespace, query, top_k),
		};

		match built {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, cache_kind = kind.as_str(), "Cache key build failed.");

				None
			},
		}
	}

	async fn fetch<T>(&self, kind: CacheKind, key: &str) -> CacheRead<T>
	where
		T: DeserializeOwned,
	{
		let ttl_secs = self.ttl_secs(kind);

		match self.store.get(key).await {
			Ok(Some(raw)) => {
				tracing::info!(
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					hit = true,
					payload_size = raw.len() as u64,
					ttl_secs,
					"Cache hit."
				);

				match serde_json::from_slice(&raw) {
					Ok(value) => Ok(Some(value)),
					Err(err) => {
						tracing::warn!(
							error = %err,
							cache_kind = kind.as_str(),
							cache_key_prefix = cache_key_prefix(key),
							"Cache payload decode failed."
						);

						Ok(None)
					},
				}
			},
			Ok(None) => {
				tracing::info!(
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					payload_size = 0_u64,
					ttl_secs,
					"Cache miss."
				);

				Ok(None)
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache read failed."
				);

				Err(CacheUnavailable)
			},
		}
	}

	async fn store_payload<T>(
		&self,
		kind: CacheKind,
		key: &str,
		value: &T,
		ttl_secs: u64,
	) -> std::result::Result<(), CacheUnavailable>
	where
		T: Serialize,
	{
		let raw = match serde_json::to_vec(value) {
			Ok(raw) => raw,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload encode failed."
				);

				return Ok(());
			},
		};
		let payload_size = raw.len() as u64;

		if self.cfg.max_payload_bytes.is_some_and(|max| payload_size > max) {
			tracing::warn!(
				cache_kind = kind.as_str(),
				cache_key_prefix = cache_key_prefix(key),
				hit = false,
				payload_size,
				ttl_secs,
				"Cache payload skipped due to size."
			);

			return Ok(());
		}

		match self.store.set(key, raw, Duration::from_secs(ttl_secs)).await {
			Ok(()) => {
				tracing::info!(
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					payload_size,
					ttl_secs,
					"Cache stored."
				);

				Ok(())
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = kind.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache write failed."
				);

				Err(CacheUnavailable)
			},
		}
	}

	fn ttl_secs(&self, kind: CacheKind) -> u64 {
		match kind {
			CacheKind::Full => self.cfg.full_ttl_secs,
			CacheKind::Feature => self.cfg.feature_ttl_secs,
		}
	}
}
