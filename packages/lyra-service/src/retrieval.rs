use lyra_domain::{
	Candidate,
	merge::{discount_memory, merge_by_id},
};

use crate::LyraService;

/// Candidates plus a note when a scope failed and contributed nothing.
#[derive(Debug, Default)]
pub struct Retrieved {
	pub candidates: Vec<Candidate>,
	pub error_note: Option<String>,
}

impl LyraService {
	/// Main-corpus retrieval for the orchestrator. Failures degrade to an empty list.
	pub(crate) async fn retrieve_main(&self, vector: &[f32], top_k: u32) -> Retrieved {
		match self.search_scope(vector, top_k, None).await {
			Ok(mut candidates) => {
				candidates.truncate(top_k as usize);

				Retrieved { candidates, error_note: None }
			},
			Err(note) => Retrieved { candidates: Vec::new(), error_note: Some(note) },
		}
	}

	/// Main corpus merged with the discounted memory scope when augmentation is on.
	pub(crate) async fn retrieve_with_memory(&self, vector: &[f32], top_k: u32) -> Retrieved {
		if !self.cfg.streaming.memory_augmentation {
			return self.retrieve_main(vector, top_k).await;
		}

		let scope = self.cfg.memory.source_label.as_str();
		let (main, memory) = tokio::join!(
			self.search_scope(vector, top_k, None),
			self.search_scope(vector, top_k, Some(scope)),
		);
		let mut notes = Vec::new();
		let main = main.unwrap_or_else(|note| {
			notes.push(note);

			Vec::new()
		});
		let mut memory = memory.unwrap_or_else(|note| {
			notes.push(note);

			Vec::new()
		});

		discount_memory(&mut memory, f64::from(self.cfg.streaming.memory_weight));

		let candidates = merge_by_id(vec![main, memory], top_k as usize);
		let error_note = if notes.is_empty() { None } else { Some(notes.join(" ")) };

		Retrieved { candidates, error_note }
	}

	async fn search_scope(
		&self,
		vector: &[f32],
		top_k: u32,
		scope: Option<&str>,
	) -> std::result::Result<Vec<Candidate>, String> {
		match self.backends.retriever.vector_search(vector, top_k, scope).await {
			Ok(candidates) => Ok(sanitize(candidates)),
			Err(err) => {
				tracing::warn!(error = %err, scope = scope.unwrap_or("main"), "Retrieval failed.");

				Err(format!("Retrieval failed for scope {}: {err}", scope.unwrap_or("main")))
			},
		}
	}
}

/// Drops candidates with non-finite distances and clamps negatives to zero.
fn sanitize(candidates: Vec<Candidate>) -> Vec<Candidate> {
	let before = candidates.len();
	let kept: Vec<Candidate> = candidates
		.into_iter()
		.filter(|candidate| candidate.distance.is_finite())
		.map(|mut candidate| {
			candidate.distance = candidate.distance.max(0.0);

			candidate
		})
		.collect();

	if kept.len() != before {
		tracing::warn!(dropped = before - kept.len(), "Dropped candidates with invalid distance.");
	}

	kept
}
