use serde::{Deserialize, Serialize};

use crate::cmp_f64_desc;

/// Weights used when the configured pair sums to zero or less.
pub const FALLBACK_WEIGHT: f64 = 0.5;
/// Score given to every member when all raw LTR scores are equal.
pub const DEGENERATE_NORMALIZED_SCORE: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
	pub w_ltr: f64,
	pub w_concept: f64,
	pub version: u64,
}
impl FusionWeights {
	/// Scales the pair so it sums to one, keeping the version.
	pub fn normalized(&self) -> Self {
		let (w_ltr, w_concept) = normalize_pair(self.w_ltr, self.w_concept);

		Self { w_ltr, w_concept, version: self.version }
	}

	/// True when version and normalized values both match.
	pub fn same_snapshot(&self, other: &Self) -> bool {
		let lhs = self.normalized();
		let rhs = other.normalized();

		lhs.version == rhs.version && lhs.w_ltr == rhs.w_ltr && lhs.w_concept == rhs.w_concept
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fused {
	pub normalized_ltr: Vec<f64>,
	pub fused: Vec<f64>,
	/// Candidate indices, best first.
	pub order: Vec<usize>,
}

pub fn normalize_pair(w_ltr: f64, w_concept: f64) -> (f64, f64) {
	let sum = w_ltr + w_concept;

	if !sum.is_finite() || sum <= 0.0 {
		return (FALLBACK_WEIGHT, FALLBACK_WEIGHT);
	}

	(w_ltr / sum, w_concept / sum)
}

pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
	let Some(first) = scores.first() else { return Vec::new() };
	let (min, max) = scores
		.iter()
		.fold((*first, *first), |(min, max), score| (min.min(*score), max.max(*score)));

	if max == min {
		return vec![DEGENERATE_NORMALIZED_SCORE; scores.len()];
	}

	let span = max - min;

	scores.iter().map(|score| (score - min) / span).collect()
}

/// Blends normalized LTR scores with conceptual scores. Ties keep retrieval order.
pub fn fuse(raw_ltr: &[f64], conceptual: &[f64], weights: &FusionWeights) -> Fused {
	let normalized_ltr = min_max_normalize(raw_ltr);
	let weights = weights.normalized();
	let fused: Vec<f64> = normalized_ltr
		.iter()
		.zip(conceptual.iter())
		.map(|(ltr, concept)| weights.w_ltr * ltr + weights.w_concept * concept)
		.collect();
	let mut order: Vec<usize> = (0..fused.len()).collect();

	order.sort_by(|a, b| cmp_f64_desc(fused[*a], fused[*b]));

	Fused { normalized_ltr, fused, order }
}
