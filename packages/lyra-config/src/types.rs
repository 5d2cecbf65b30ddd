use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub ranking: Ranking,
	pub cache: Cache,
	pub streaming: Streaming,
	pub memory: Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ranking {
	pub default_top_k: u32,
	pub max_top_k: u32,
	/// Linear LTR weights, one per feature of the live schema. Empty means all ones.
	#[serde(default)]
	pub ltr_weights: Vec<f32>,
	pub fusion: RankingFusion,
}

/// Initial fusion weights. Live updates go through the admin API and are not written back.
#[derive(Clone, Debug, Deserialize)]
pub struct RankingFusion {
	pub w_ltr: f64,
	pub w_concept: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	#[serde(default = "default_cache_namespace")]
	pub namespace: String,
	pub full_ttl_secs: u64,
	pub feature_ttl_secs: u64,
	pub max_entries: u64,
	pub max_payload_bytes: Option<u64>,
	#[serde(default = "default_preview_chars")]
	pub preview_chars: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Streaming {
	pub memory_augmentation: bool,
	/// Multiplier applied to memory-scope distances. Below one pulls memories closer.
	pub memory_weight: f32,
	pub phase_delay_ms: u64,
	pub max_phase_delay_ms: u64,
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
	#[serde(default = "default_overlap_boost")]
	pub overlap_boost: f32,
	#[serde(default = "default_top_boost_ratio")]
	pub top_boost_ratio: f32,
	#[serde(default = "default_tail_penalty_ratio")]
	pub tail_penalty_ratio: f32,
	#[serde(default = "default_tail_start_rank")]
	pub tail_start_rank: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Memory {
	pub triggers: Vec<String>,
	#[serde(default = "default_memory_source_label")]
	pub source_label: String,
}

fn default_cache_namespace() -> String {
	"lyra".to_string()
}

fn default_preview_chars() -> usize {
	240
}

fn default_channel_capacity() -> usize {
	8
}

fn default_overlap_boost() -> f32 {
	0.03
}

fn default_top_boost_ratio() -> f32 {
	0.05
}

fn default_tail_penalty_ratio() -> f32 {
	0.02
}

fn default_tail_start_rank() -> u32 {
	5
}

fn default_memory_source_label() -> String {
	"memory".to_string()
}
