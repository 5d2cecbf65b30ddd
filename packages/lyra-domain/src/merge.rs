use std::collections::HashMap;

use crate::{Candidate, cmp_f64_asc};

/// Applies the memory discount to each distance in place.
pub fn discount_memory(candidates: &mut [Candidate], memory_weight: f64) {
	for candidate in candidates {
		candidate.distance *= memory_weight;
	}
}

/// Merges retrieval scopes by id, keeping the closest copy, sorted by distance and truncated.
///
/// Ties on distance keep first-seen order, with earlier scopes first.
pub fn merge_by_id(scopes: Vec<Vec<Candidate>>, top_k: usize) -> Vec<Candidate> {
	let mut merged: Vec<Candidate> = Vec::new();
	let mut index_by_id: HashMap<String, usize> = HashMap::new();

	for candidate in scopes.into_iter().flatten() {
		match index_by_id.get(&candidate.id) {
			Some(&idx) =>
				if candidate.distance < merged[idx].distance {
					merged[idx] = candidate;
				},
			None => {
				index_by_id.insert(candidate.id.clone(), merged.len());
				merged.push(candidate);
			},
		}
	}

	merged.sort_by(|a, b| cmp_f64_asc(a.distance, b.distance));
	merged.truncate(top_k);

	merged
}
