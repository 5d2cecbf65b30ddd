mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, Memory, Providers, Qdrant, Ranking, RankingFusion,
	Service, Storage, Streaming,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (field, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
		("providers.embedding.api_key", &cfg.providers.embedding.api_key),
		("cache.namespace", &cfg.cache.namespace),
		("memory.source_label", &cfg.memory.source_label),
	] {
		if value.trim().is_empty() {
			return Err(invalid(field, "must be non-empty."));
		}
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(invalid("providers.embedding.dimensions", "must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(invalid(
			"providers.embedding.dimensions",
			"must match storage.qdrant.vector_dim.",
		));
	}

	validate_ranking(cfg)?;
	validate_cache(cfg)?;
	validate_streaming(cfg)?;

	if cfg.memory.triggers.is_empty() {
		return Err(invalid("memory.triggers", "must be non-empty."));
	}
	if cfg.memory.triggers.iter().any(|trigger| trigger.trim().is_empty()) {
		return Err(invalid("memory.triggers", "must not contain blank entries."));
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	if ranking.max_top_k == 0 {
		return Err(invalid("ranking.max_top_k", "must be greater than zero."));
	}
	if ranking.default_top_k == 0 || ranking.default_top_k > ranking.max_top_k {
		return Err(invalid("ranking.default_top_k", "must be in the range 1-max_top_k."));
	}
	if ranking.ltr_weights.iter().any(|weight| !weight.is_finite()) {
		return Err(invalid("ranking.ltr_weights", "must contain only finite numbers."));
	}

	for (field, weight) in [
		("ranking.fusion.w_ltr", ranking.fusion.w_ltr),
		("ranking.fusion.w_concept", ranking.fusion.w_concept),
	] {
		if !weight.is_finite() {
			return Err(invalid(field, "must be a finite number."));
		}
		if weight < 0.0 {
			return Err(invalid(field, "must be zero or greater."));
		}
	}

	Ok(())
}

fn validate_cache(cfg: &Config) -> Result<()> {
	let cache = &cfg.cache;

	if cache.full_ttl_secs == 0 {
		return Err(invalid("cache.full_ttl_secs", "must be greater than zero."));
	}
	if cache.feature_ttl_secs == 0 {
		return Err(invalid("cache.feature_ttl_secs", "must be greater than zero."));
	}
	if cache.max_entries == 0 {
		return Err(invalid("cache.max_entries", "must be greater than zero."));
	}

	if let Some(max) = cache.max_payload_bytes
		&& max == 0
	{
		return Err(invalid("cache.max_payload_bytes", "must be greater than zero."));
	}

	if cache.preview_chars == 0 {
		return Err(invalid("cache.preview_chars", "must be greater than zero."));
	}

	Ok(())
}

fn validate_streaming(cfg: &Config) -> Result<()> {
	let streaming = &cfg.streaming;

	if !streaming.memory_weight.is_finite()
		|| streaming.memory_weight <= 0.0
		|| streaming.memory_weight >= 1.0
	{
		return Err(invalid("streaming.memory_weight", "must be in the open range 0.0-1.0."));
	}
	if streaming.phase_delay_ms > streaming.max_phase_delay_ms {
		return Err(invalid("streaming.phase_delay_ms", "must not exceed max_phase_delay_ms."));
	}
	if streaming.channel_capacity == 0 {
		return Err(invalid("streaming.channel_capacity", "must be greater than zero."));
	}

	for (field, value) in [
		("streaming.overlap_boost", streaming.overlap_boost),
		("streaming.top_boost_ratio", streaming.top_boost_ratio),
		("streaming.tail_penalty_ratio", streaming.tail_penalty_ratio),
	] {
		if !value.is_finite() || value < 0.0 {
			return Err(invalid(field, "must be a finite number, zero or greater."));
		}
	}

	if streaming.tail_penalty_ratio >= 1.0 {
		return Err(invalid("streaming.tail_penalty_ratio", "must be less than 1.0."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.cache.namespace = cfg.cache.namespace.trim().to_string();
	cfg.memory.source_label = cfg.memory.source_label.trim().to_string();

	for trigger in &mut cfg.memory.triggers {
		*trigger = trigger.trim().to_lowercase();
	}

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}

fn invalid(field: &'static str, message: &str) -> Error {
	Error::Validation { field, message: message.to_string() }
}
