use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, ScoredPoint,
		SearchPointsBuilder, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder,
		VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
	},
};

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const PASSAGE_ID_FIELD: &str = "passage_id";
pub const TEXT_FIELD: &str = "text";
pub const SOURCE_FIELD: &str = "source";

/// One search hit. `distance` is cosine distance, `1 - similarity`, clamped at zero.
#[derive(Clone, Debug, PartialEq)]
pub struct PassageHit {
	pub id: String,
	pub text: String,
	pub distance: f32,
	pub source: String,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &lyra_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let builder =
			CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config);

		match self.client.create_collection(builder).await {
			Ok(_) => {
				tracing::info!(collection = %self.collection, "Qdrant collection created.");

				Ok(())
			},
			Err(err) =>
				if err.to_string().contains("already exists") {
					tracing::debug!(collection = %self.collection, "Qdrant collection exists.");

					Ok(())
				} else {
					Err(err.into())
				},
		}
	}

	/// Nearest passages to `vector`. `source` restricts hits to one source label.
	pub async fn search(
		&self,
		vector: &[f32],
		limit: u32,
		source: Option<&str>,
	) -> Result<Vec<PassageHit>> {
		self.check_dim(vector)?;

		let mut search =
			SearchPointsBuilder::new(self.collection.clone(), vector.to_vec(), u64::from(limit))
				.vector_name(DENSE_VECTOR_NAME)
				.with_payload(true);

		if let Some(source) = source {
			search = search.filter(Filter::must([Condition::matches(
				SOURCE_FIELD,
				source.to_string(),
			)]));
		}

		let response = self.client.search_points(search).await?;

		Ok(response.result.iter().filter_map(point_to_hit).collect())
	}

	pub async fn upsert_passage(
		&self,
		id: &str,
		text: &str,
		source: &str,
		vector: &[f32],
	) -> Result<()> {
		self.check_dim(vector)?;

		let mut payload_map = HashMap::new();

		payload_map.insert(PASSAGE_ID_FIELD.to_string(), Value::from(id.to_string()));
		payload_map.insert(TEXT_FIELD.to_string(), Value::from(text.to_string()));
		payload_map.insert(SOURCE_FIELD.to_string(), Value::from(source.to_string()));

		let mut vector_map = HashMap::new();

		vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector.to_vec()));

		let point = PointStruct::new(id.to_string(), vector_map, Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	fn check_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector has {} dimensions; collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		Ok(())
	}
}

fn point_to_hit(point: &ScoredPoint) -> Option<PassageHit> {
	let id = payload_string(&point.payload, PASSAGE_ID_FIELD)
		.or_else(|| point.id.as_ref().and_then(point_id_to_string))?;
	let text = payload_string(&point.payload, TEXT_FIELD).unwrap_or_default();
	let source = payload_string(&point.payload, SOURCE_FIELD).unwrap_or_default();

	Some(PassageHit { id, text, distance: (1.0 - point.score).max(0.0), source })
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}
