use serde::{Deserialize, Serialize};

use crate::Candidate;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const FEATURE_COUNT: usize = 3;
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["similarity", "log_length", "bias"];
/// Column of the similarity feature, reused as the conceptual fusion input.
pub const SIMILARITY_COLUMN: usize = 0;

pub type FeatureRow = [f64; FEATURE_COUNT];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
	pub schema_version: u32,
	pub names: Vec<String>,
	pub rows: Vec<FeatureRow>,
}
impl FeatureMatrix {
	pub fn empty() -> Self {
		Self { schema_version: FEATURE_SCHEMA_VERSION, names: feature_names(), rows: Vec::new() }
	}

	pub fn columns(&self) -> usize {
		FEATURE_COUNT
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn conceptual_scores(&self) -> Vec<f64> {
		self.rows.iter().map(|row| row[SIMILARITY_COLUMN]).collect()
	}
}

pub fn feature_names() -> Vec<String> {
	FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

pub fn similarity(distance: f64) -> f64 {
	1.0 / (1.0 + distance.max(0.0))
}

/// Builds one row per candidate under the current schema. The query does not contribute to any
/// v1 feature; it stays in the signature so later schemas can add query-dependent columns.
pub fn assemble(_query: &str, candidates: &[Candidate]) -> FeatureMatrix {
	let rows = candidates.iter().map(feature_row).collect();

	FeatureMatrix { schema_version: FEATURE_SCHEMA_VERSION, names: feature_names(), rows }
}

pub fn feature_row(candidate: &Candidate) -> FeatureRow {
	let length = candidate.text.chars().count().max(1) as f64;

	[similarity(candidate.distance), length.ln(), 1.0]
}

/// Rebuilds a typed row from a serialized vector. Returns `None` when the stored schema differs.
pub fn restore_row(schema_version: u32, values: &[f64]) -> Option<FeatureRow> {
	if schema_version != FEATURE_SCHEMA_VERSION {
		return None;
	}

	values.try_into().ok()
}
