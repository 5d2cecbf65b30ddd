//! In-process namespaced key-value store with per-entry TTL, backed by moka.

use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use moka::{Expiry, sync::Cache};

#[derive(Clone, Debug)]
struct Entry {
	payload: Arc<[u8]>,
	ttl: Duration,
}

struct PerEntryTtl;
impl Expiry<String, Entry> for PerEntryTtl {
	fn expire_after_create(
		&self,
		_key: &String,
		value: &Entry,
		_created_at: Instant,
	) -> Option<Duration> {
		Some(value.ttl)
	}

	fn expire_after_update(
		&self,
		_key: &String,
		value: &Entry,
		_updated_at: Instant,
		_duration_until_expiry: Option<Duration>,
	) -> Option<Duration> {
		Some(value.ttl)
	}
}

#[derive(Clone)]
pub struct KvStore {
	namespace: String,
	cache: Cache<String, Entry>,
}
impl KvStore {
	pub fn new(namespace: &str, max_entries: u64) -> Self {
		let cache = Cache::builder().max_capacity(max_entries).expire_after(PerEntryTtl).build();

		Self { namespace: namespace.to_string(), cache }
	}

	pub fn get(&self, key: &str) -> Option<Vec<u8>> {
		self.cache.get(&self.namespaced(key)).map(|entry| entry.payload.to_vec())
	}

	pub fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
		self.cache.insert(self.namespaced(key), Entry { payload: payload.into(), ttl });
	}

	fn namespaced(&self, key: &str) -> String {
		format!("{}:{key}", self.namespace)
	}
}
