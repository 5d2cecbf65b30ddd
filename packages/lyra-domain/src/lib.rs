pub mod delta;
pub mod features;
pub mod fusion;
pub mod ltr;
pub mod memory_trigger;
pub mod merge;
pub mod phases;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A passage returned by the retriever. `distance` is non-negative; smaller is closer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub id: String,
	pub text: String,
	pub distance: f64,
	pub source: String,
}

/// Descending order that sorts NaN last.
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

pub fn cmp_f64_asc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
	}
}

pub fn text_preview(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => text[..idx].to_string(),
		None => text.to_string(),
	}
}
