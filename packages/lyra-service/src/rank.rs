use std::{collections::BTreeMap, time::Instant};

use serde::{Deserialize, Serialize};

use lyra_domain::{
	Candidate,
	features::{self, FEATURE_SCHEMA_VERSION, FeatureMatrix, SIMILARITY_COLUMN},
	fusion::{self, FusionWeights},
	ltr::{self, WeightFit},
	text_preview,
};

use crate::{
	Error, FusionWeightsView, LyraService, Result,
	cache::{CacheUnavailable, FeatureCacheEntry, FeatureCacheItem, FullCacheEntry},
};

const CACHE_UNAVAILABLE_NOTE: &str = "Cache backend unavailable.";

#[derive(Clone, Debug, Deserialize)]
pub struct RankRequest {
	pub query: String,
	#[serde(default)]
	pub top_k: Option<u32>,
	/// Caller context. No feature of the live schema reads it, so it is not part of cache keys.
	#[serde(default)]
	pub context: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheHitKind {
	None,
	Feature,
	Full,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
	pub rank: u32,
	pub id: String,
	pub text_preview: String,
	pub distance: f64,
	pub source: String,
	pub features: Vec<f64>,
	pub raw_ltr_score: f64,
	pub normalized_ltr_score: f64,
	pub conceptual_score: f64,
	pub fused_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedResponse {
	pub results: Vec<RankedItem>,
	pub feature_schema_version: u32,
	pub feature_names: Vec<String>,
	pub fusion_weights: FusionWeightsView,
	pub fusion_weights_version: u64,
	/// Milliseconds per pipeline stage. Stages that did not run are absent.
	pub timings_by_stage: BTreeMap<String, f64>,
	pub cache_hit_kind: CacheHitKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_note: Option<String>,
}

#[derive(Debug, Default)]
struct StageTimings(BTreeMap<String, f64>);
impl StageTimings {
	fn record(&mut self, stage: &str, started: Instant) {
		self.0.insert(stage.to_string(), started.elapsed().as_secs_f64() * 1_000.0);
	}
}

impl LyraService {
	pub async fn rank(&self, req: RankRequest) -> Result<RankedResponse> {
		let query = validate_query(&req.query)?;
		let top_k = self.resolve_top_k(req.top_k)?;
		// One snapshot for the whole request, so a concurrent update never mixes in.
		let weights = self.weights.get();
		let mut timings = StageTimings::default();
		let started = Instant::now();
		let mut cache_up = true;

		match self.cache().get_full(query, top_k, &weights).await {
			Ok(Some(entry)) => {
				timings.record("cache_check", started);

				let mut response = entry.response;

				response.cache_hit_kind = CacheHitKind::Full;
				response.timings_by_stage = timings.0;

				return Ok(response);
			},
			Ok(None) => {},
			Err(CacheUnavailable) => cache_up = false,
		}

		// An unreachable store is not asked again within the same request.
		let cached_features = if cache_up {
			self.cache().get_feature(query, top_k).await.unwrap_or_else(|CacheUnavailable| {
				cache_up = false;

				None
			})
		} else {
			None
		};

		timings.record("cache_check", started);

		if let Some(entry) = cached_features {
			let started = Instant::now();
			let mut response = respond(
				entry.items,
				entry.feature_names,
				&weights,
				CacheHitKind::Feature,
				None,
				&mut timings,
				started,
			);

			if self.remember_full(query, top_k, &weights, &response).await.is_err() {
				response.error_note = Some(CACHE_UNAVAILABLE_NOTE.to_string());
			}

			return Ok(response);
		}

		let started = Instant::now();
		let vector = self.embed_query(query).await?;

		timings.record("embed", started);

		let started = Instant::now();
		let retrieved = self.retrieve_main(&vector, top_k).await;

		timings.record("retrieve", started);

		let started = Instant::now();
		let matrix = features::assemble(query, &retrieved.candidates);

		timings.record("assemble", started);

		let started = Instant::now();
		let raw = self.score_matrix(&matrix);

		timings.record("score", started);

		let items =
			feature_items(&retrieved.candidates, &matrix, &raw, self.cfg.cache.preview_chars);
		let degraded = retrieved.error_note.is_some();
		let started = Instant::now();
		let mut response = respond(
			items.clone(),
			matrix.names.clone(),
			&weights,
			CacheHitKind::None,
			retrieved.error_note,
			&mut timings,
			started,
		);

		// A degraded pass would pin an empty result for the whole TTL.
		if cache_up && !degraded {
			let entry = FeatureCacheEntry {
				feature_schema_version: matrix.schema_version,
				feature_names: matrix.names,
				items,
			};

			cache_up = self.cache().put_feature(query, top_k, &entry).await.is_ok()
				&& self.remember_full(query, top_k, &weights, &response).await.is_ok();
		}
		if !cache_up {
			response.error_note = Some(match response.error_note.take() {
				Some(note) => format!("{note} {CACHE_UNAVAILABLE_NOTE}"),
				None => CACHE_UNAVAILABLE_NOTE.to_string(),
			});
		}

		Ok(response)
	}

	pub(crate) fn resolve_top_k(&self, requested: Option<u32>) -> Result<u32> {
		let ranking = &self.cfg.ranking;
		let top_k = requested.unwrap_or(ranking.default_top_k);

		if top_k == 0 {
			return Err(Error::InvalidRequest {
				message: "top_k must be greater than zero.".to_string(),
			});
		}

		Ok(top_k.min(ranking.max_top_k))
	}

	/// Raw LTR scores under the configured weights, logging any resize.
	pub(crate) fn score_matrix(&self, matrix: &FeatureMatrix) -> Vec<f64> {
		let ltr_weights = self.ltr_weights();
		let (raw, fit) = ltr::score(matrix, &ltr_weights);

		match fit {
			WeightFit::Exact => {},
			WeightFit::Defaulted { columns } => {
				tracing::debug!(columns, "No LTR weights configured; using all ones.");
			},
			WeightFit::Truncated { from, to } | WeightFit::Padded { from, to } => {
				tracing::warn!(
					configured = from,
					columns = to,
					schema_version = matrix.schema_version,
					"LTR weight count does not match the feature schema; resized."
				);
			},
		}

		raw
	}

	async fn remember_full(
		&self,
		query: &str,
		top_k: u32,
		weights: &FusionWeights,
		response: &RankedResponse,
	) -> std::result::Result<(), CacheUnavailable> {
		let entry = FullCacheEntry { weights: *weights, response: response.clone() };

		self.cache().put_full(query, top_k, &entry).await
	}
}

pub(crate) fn validate_query(query: &str) -> Result<&str> {
	let query = query.trim();

	if query.is_empty() {
		return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
	}

	Ok(query)
}

fn feature_items(
	candidates: &[Candidate],
	matrix: &FeatureMatrix,
	raw: &[f64],
	preview_chars: usize,
) -> Vec<FeatureCacheItem> {
	candidates
		.iter()
		.zip(matrix.rows.iter())
		.zip(raw.iter())
		.map(|((candidate, row), raw_ltr_score)| FeatureCacheItem {
			id: candidate.id.clone(),
			text_preview: text_preview(&candidate.text, preview_chars),
			distance: candidate.distance,
			source: candidate.source.clone(),
			features: row.to_vec(),
			raw_ltr_score: *raw_ltr_score,
		})
		.collect()
}

fn respond(
	items: Vec<FeatureCacheItem>,
	feature_names: Vec<String>,
	weights: &FusionWeights,
	cache_hit_kind: CacheHitKind,
	error_note: Option<String>,
	timings: &mut StageTimings,
	started: Instant,
) -> RankedResponse {
	let raw: Vec<f64> = items.iter().map(|item| item.raw_ltr_score).collect();
	let conceptual: Vec<f64> = items
		.iter()
		.map(|item| item.features.get(SIMILARITY_COLUMN).copied().unwrap_or_default())
		.collect();
	let fused = fusion::fuse(&raw, &conceptual, weights);
	let mut slots: Vec<Option<FeatureCacheItem>> = items.into_iter().map(Some).collect();
	let mut results = Vec::with_capacity(fused.order.len());

	for idx in fused.order.iter().copied() {
		let Some(item) = slots[idx].take() else { continue };

		results.push(RankedItem {
			rank: results.len() as u32 + 1,
			id: item.id,
			text_preview: item.text_preview,
			distance: item.distance,
			source: item.source,
			features: item.features,
			raw_ltr_score: item.raw_ltr_score,
			normalized_ltr_score: fused.normalized_ltr[idx],
			conceptual_score: conceptual[idx],
			fused_score: fused.fused[idx],
		});
	}

	timings.record("fuse", started);

	RankedResponse {
		results,
		feature_schema_version: FEATURE_SCHEMA_VERSION,
		feature_names,
		fusion_weights: FusionWeightsView::from(weights),
		fusion_weights_version: weights.version,
		timings_by_stage: std::mem::take(&mut timings.0),
		cache_hit_kind,
		error_note,
	}
}
