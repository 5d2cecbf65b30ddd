use std::convert::Infallible;

use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use lyra_service::{
	Error, FusionWeightsView, RankRequest, RankedResponse, StreamEvent, StreamPhase, StreamRequest,
};

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateFusionWeightsRequest {
	pub w_ltr: f64,
	pub w_concept: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			Error::Provider { message } =>
				ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE", message, None),
			Error::Storage { message } =>
				ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", message, None),
			Error::Config { message } => {
				tracing::error!(error = %message, "Service configuration error.");

				ApiError::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL_ERROR",
					"Internal error.",
					None,
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/rank", post(rank))
		.route("/v1/rank/stream", post(rank_stream))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/fusion_weights", get(get_fusion_weights).put(update_fusion_weights))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn rank(
	State(state): State<AppState>,
	Json(payload): Json<RankRequest>,
) -> Result<Json<RankedResponse>, ApiError> {
	let response = state.service.rank(payload).await?;

	Ok(Json(response))
}

async fn rank_stream(
	State(state): State<AppState>,
	Json(payload): Json<StreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
	let cancel = CancellationToken::new();
	let rx = state.service.stream_rank(payload, cancel.clone())?;
	// Dropped with the response stream, which happens when the client disconnects.
	let guard = cancel.drop_guard();
	let stream = ReceiverStream::new(rx).map(move |event| {
		let _guard = &guard;

		Ok::<_, Infallible>(sse_event(&event))
	});

	Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &StreamEvent) -> Event {
	match Event::default().event(event.phase.as_str()).json_data(event) {
		Ok(sse) => sse,
		Err(err) => {
			tracing::warn!(error = %err, phase = event.phase.as_str(), "Stream event encode failed.");

			Event::default().event(StreamPhase::Error.as_str()).data(err.to_string())
		},
	}
}

async fn get_fusion_weights(State(state): State<AppState>) -> Json<FusionWeightsView> {
	Json(state.service.get_fusion_weights())
}

async fn update_fusion_weights(
	State(state): State<AppState>,
	Json(payload): Json<UpdateFusionWeightsRequest>,
) -> Result<Json<FusionWeightsView>, ApiError> {
	let updated = state.service.update_fusion_weights(payload.w_ltr, payload.w_concept)?;

	Ok(Json(updated))
}
