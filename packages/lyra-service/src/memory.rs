use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LyraService;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
	pub id: String,
	pub text: String,
	pub source: String,
	/// Trigger phrase that created the record.
	pub trigger: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
	pub ack: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stored_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl Acknowledgment {
	pub fn stored(id: String) -> Self {
		Self { ack: true, stored_id: Some(id), error: None }
	}

	pub fn rejected(error: impl Into<String>) -> Self {
		Self { ack: false, stored_id: None, error: Some(error.into()) }
	}
}

impl LyraService {
	/// Stores the text after a trigger phrase as a memory record. `None` when no trigger matched.
	pub async fn maybe_store(&self, query_text: &str) -> Option<Acknowledgment> {
		let found = self.triggers().detect(query_text)?;

		if found.content.is_empty() {
			tracing::info!(trigger = %found.trigger, "Memory trigger without content.");

			return Some(Acknowledgment::rejected("no content"));
		}

		let vector = match self.embed_query(&found.content).await {
			Ok(vector) => vector,
			Err(err) => {
				tracing::warn!(error = %err, trigger = %found.trigger, "Memory embedding failed.");

				return Some(Acknowledgment::rejected(err.to_string()));
			},
		};
		let record = MemoryRecord {
			id: Uuid::new_v4().to_string(),
			text: found.content,
			source: self.cfg.memory.source_label.clone(),
			trigger: found.trigger,
		};

		match self.backends.memory.store(&record, &vector).await {
			Ok(()) => {
				tracing::info!(record_id = %record.id, trigger = %record.trigger, "Memory stored.");

				Some(Acknowledgment::stored(record.id))
			},
			Err(err) => {
				tracing::warn!(error = %err, record_id = %record.id, "Memory store failed.");

				Some(Acknowledgment::rejected(format!("Memory store failed: {err}")))
			},
		}
	}
}
