use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::{cmp_f64_desc, delta::PhaseItem};

#[derive(Clone, Copy, Debug)]
pub struct ContextAdjustment {
	/// Added once per distinct query token found in the candidate text.
	pub overlap_boost: f64,
	/// Fraction of its own score the rank-one item gains.
	pub top_boost_ratio: f64,
	/// Fraction of its own score every item ranked past `tail_start_rank` loses.
	pub tail_penalty_ratio: f64,
	pub tail_start_rank: u32,
}
impl Default for ContextAdjustment {
	fn default() -> Self {
		Self {
			overlap_boost: 0.03,
			top_boost_ratio: 0.05,
			tail_penalty_ratio: 0.02,
			tail_start_rank: 5,
		}
	}
}

pub fn tokenize(text: &str) -> HashSet<String> {
	text.unicode_words().map(|word| word.to_lowercase()).collect()
}

pub fn token_overlap(query_tokens: &HashSet<String>, text: &str) -> usize {
	if query_tokens.is_empty() {
		return 0;
	}

	tokenize(text).iter().filter(|token| query_tokens.contains(*token)).count()
}

/// Scores one item of the ranked phase. The positional term uses the item's incoming rank and is
/// applied to the overlap-boosted score.
pub fn adjusted_score(score: f64, rank: u32, overlap: usize, cfg: &ContextAdjustment) -> f64 {
	let boosted = score + cfg.overlap_boost * overlap as f64;

	if rank == 1 {
		boosted * (1.0 + cfg.top_boost_ratio)
	} else if rank > cfg.tail_start_rank {
		boosted * (1.0 - cfg.tail_penalty_ratio)
	} else {
		boosted
	}
}

/// Applies overlap and positional adjustments to `ranked` and returns `(id, score)` pairs in the
/// new order. `text_of` resolves each id to its passage text.
pub fn adjust_phase<'a, F>(
	query: &str,
	ranked: &[PhaseItem],
	text_of: F,
	cfg: &ContextAdjustment,
) -> Vec<(String, f64)>
where
	F: Fn(&str) -> Option<&'a str>,
{
	let query_tokens = tokenize(query);
	let mut adjusted: Vec<(String, f64)> = ranked
		.iter()
		.map(|item| {
			let overlap = text_of(item.id.as_str())
				.map(|text| token_overlap(&query_tokens, text))
				.unwrap_or(0);

			(item.id.clone(), adjusted_score(item.score, item.rank, overlap, cfg))
		})
		.collect();

	adjusted.sort_by(|a, b| cmp_f64_desc(a.1, b.1));

	adjusted
}
