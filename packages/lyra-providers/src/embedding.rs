use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::{Client, header::HeaderMap};
use serde::Deserialize;

use lyra_config::EmbeddingProviderConfig;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}
impl EmbeddingResponse {
	/// Vectors in input order. Items without an `index` keep their position in `data`.
	fn into_vectors(self, inputs: usize, dimensions: u32) -> Result<Vec<Vec<f32>>> {
		if self.data.len() != inputs {
			return Err(eyre::eyre!(
				"Embedding provider returned {} vectors for {inputs} inputs.",
				self.data.len()
			));
		}

		let mut slots: Vec<Option<Vec<f32>>> = vec![None; inputs];

		for (position, item) in self.data.into_iter().enumerate() {
			let index = item.index.unwrap_or(position);

			if item.embedding.len() != dimensions as usize {
				return Err(eyre::eyre!(
					"Embedding {index} has {} dimensions, expected {dimensions}.",
					item.embedding.len()
				));
			}

			let Some(slot) = slots.get_mut(index) else {
				return Err(eyre::eyre!("Embedding index {index} is out of range."));
			};

			if slot.replace(item.embedding).is_some() {
				return Err(eyre::eyre!("Embedding index {index} is repeated."));
			}
		}

		// Equal counts and no repeats leave every slot filled.
		Ok(slots.into_iter().flatten().collect())
	}
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	#[serde(default)]
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client. One `Client` per provider keeps the connection pool.
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
	client: Client,
	headers: HeaderMap,
	url: String,
	cfg: EmbeddingProviderConfig,
}
impl EmbeddingClient {
	pub fn new(cfg: EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::provider_headers(&cfg.api_key, &cfg.default_headers)?;
		let url = format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path);

		Ok(Self { client, headers, url, cfg })
	}

	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": texts,
			"dimensions": self.cfg.dimensions,
		});
		let res = self
			.client
			.post(&self.url)
			.headers(self.headers.clone())
			.json(&body)
			.send()
			.await?;
		let parsed: EmbeddingResponse = res.error_for_status()?.json().await?;
		let vectors = parsed.into_vectors(texts.len(), self.cfg.dimensions)?;

		tracing::debug!(
			provider_id = %self.cfg.provider_id,
			inputs = texts.len(),
			"Embedding batch completed."
		);

		Ok(vectors)
	}

	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		self.embed_batch(std::slice::from_ref(&text.to_string()))
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| eyre::eyre!("Embedding provider returned no vectors."))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(json: serde_json::Value) -> serde_json::Result<EmbeddingResponse> {
		serde_json::from_value(json)
	}

	#[test]
	fn orders_vectors_by_index() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let vectors = parse(json).expect("Decode failed.").into_vectors(2, 2).expect("Invalid.");

		assert_eq!(vectors, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn missing_index_keeps_position() {
		let json = serde_json::json!({ "data": [{ "embedding": [1.0] }, { "embedding": [2.0] }] });
		let vectors = parse(json).expect("Decode failed.").into_vectors(2, 1).expect("Invalid.");

		assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
	}

	#[test]
	fn rejects_wrong_dimensions() {
		let json = serde_json::json!({ "data": [{ "index": 0, "embedding": [1.0, 2.0] }] });
		let err = parse(json)
			.expect("Decode failed.")
			.into_vectors(1, 3)
			.expect_err("Expected a dimension error.");

		assert!(err.to_string().contains("expected 3"));
	}

	#[test]
	fn rejects_repeated_index() {
		let json = serde_json::json!({
			"data": [{ "index": 0, "embedding": [1.0] }, { "index": 0, "embedding": [2.0] }]
		});

		assert!(parse(json).expect("Decode failed.").into_vectors(2, 1).is_err());
	}

	#[test]
	fn rejects_count_mismatch() {
		let json = serde_json::json!({ "data": [{ "index": 0, "embedding": [1.0] }] });

		assert!(parse(json).expect("Decode failed.").into_vectors(2, 1).is_err());
	}

	#[test]
	fn rejects_missing_data_and_non_numeric_values() {
		assert!(parse(serde_json::json!({ "object": "list" })).is_err());
		assert!(parse(serde_json::json!({ "data": [{ "embedding": ["x"] }] })).is_err());
	}
}
