use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Scores closer than this are treated as unchanged between phases.
pub const SCORE_EPSILON: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseItem {
	pub id: String,
	/// One-based position within the phase.
	pub rank: u32,
	pub score: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub score_delta: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankDelta {
	New { id: String, new_rank: u32, score: f64 },
	Moved { id: String, old_rank: u32, new_rank: u32, rank_delta: i64, score: f64 },
}
impl RankDelta {
	pub fn id(&self) -> &str {
		match self {
			Self::New { id, .. } | Self::Moved { id, .. } => id,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaMode {
	/// Only ids whose rank moved.
	RankOnly,
	/// Ids whose rank moved or whose score changed.
	RankOrScore,
}

/// Assigns one-based ranks to `(id, score)` pairs that are already in phase order.
pub fn rank_items(scored: Vec<(String, f64)>) -> Vec<PhaseItem> {
	scored
		.into_iter()
		.enumerate()
		.map(|(idx, (id, score))| PhaseItem { id, rank: idx as u32 + 1, score, score_delta: None })
		.collect()
}

/// Fills `score_delta` on `next` from `previous` and returns the delta list in `next` order.
///
/// Positive `rank_delta` means the item moved up.
pub fn compute_delta(
	previous: &[PhaseItem],
	next: &mut [PhaseItem],
	mode: DeltaMode,
) -> Vec<RankDelta> {
	let by_id: HashMap<&str, &PhaseItem> =
		previous.iter().map(|item| (item.id.as_str(), item)).collect();
	let mut out = Vec::new();

	for item in next.iter_mut() {
		let Some(prev) = by_id.get(item.id.as_str()) else {
			item.score_delta = None;
			out.push(RankDelta::New { id: item.id.clone(), new_rank: item.rank, score: item.score });

			continue;
		};
		let score_delta = item.score - prev.score;
		let rank_changed = prev.rank != item.rank;
		let score_changed = score_delta.abs() > SCORE_EPSILON;

		item.score_delta = Some(score_delta);

		let include = match mode {
			DeltaMode::RankOnly => rank_changed,
			DeltaMode::RankOrScore => rank_changed || score_changed,
		};

		if include {
			out.push(RankDelta::Moved {
				id: item.id.clone(),
				old_rank: prev.rank,
				new_rank: item.rank,
				rank_delta: i64::from(prev.rank) - i64::from(item.rank),
				score: item.score,
			});
		}
	}

	out
}
