//! Three-phase streaming ranker.
//!
//! `P0` orders retrieval hits by similarity, `P1` by raw LTR score and `P2` by the contextually
//! adjusted score. Each phase is sent as soon as it is computed together with the rank changes
//! against the previous phase. A trigger phrase replaces all three with a single `MEM` event.
//! The stream never reads or writes the ranking cache.

use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lyra_domain::{
	cmp_f64_desc,
	delta::{self, DeltaMode, PhaseItem, RankDelta},
	features::{self, similarity},
	phases::{self, ContextAdjustment},
};

use crate::{Acknowledgment, LyraService, Result, rank::validate_query};

#[derive(Clone, Debug, Deserialize)]
pub struct StreamRequest {
	pub query: String,
	#[serde(default)]
	pub top_k: Option<u32>,
	/// Echoed in every event's meta.
	#[serde(default)]
	pub context: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamPhase {
	P0,
	P1,
	P2,
	#[serde(rename = "MEM")]
	Mem,
	#[serde(rename = "ERROR")]
	Error,
}
impl StreamPhase {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::P0 => "P0",
			Self::P1 => "P1",
			Self::P2 => "P2",
			Self::Mem => "MEM",
			Self::Error => "ERROR",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamMeta {
	pub query: String,
	pub top_k: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<String>,
	pub elapsed_ms: u64,
	pub memory_augmented: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
	pub phase: StreamPhase,
	#[serde(default)]
	pub results: Vec<PhaseItem>,
	/// Changes against the previous phase. Absent on `P0`, `MEM` and `ERROR`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delta: Option<Vec<RankDelta>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ack: Option<Acknowledgment>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub meta: StreamMeta,
}

struct StreamCtx {
	query: String,
	top_k: u32,
	context: Option<String>,
	memory_augmented: bool,
	started: Instant,
	tx: mpsc::Sender<StreamEvent>,
	cancel: CancellationToken,
}
impl StreamCtx {
	fn meta(&self) -> StreamMeta {
		StreamMeta {
			query: self.query.clone(),
			top_k: self.top_k,
			context: self.context.clone(),
			elapsed_ms: self.started.elapsed().as_millis() as u64,
			memory_augmented: self.memory_augmented,
		}
	}

	fn event(&self, phase: StreamPhase) -> StreamEvent {
		StreamEvent {
			phase,
			results: Vec::new(),
			delta: None,
			ack: None,
			error: None,
			meta: self.meta(),
		}
	}

	fn stopped(&self) -> bool {
		self.cancel.is_cancelled() || self.tx.is_closed()
	}

	/// Drives `work` until it finishes, or drops it as soon as the stream is cancelled or the
	/// consumer leaves.
	async fn until_stopped<F>(&self, stage: &str, work: F) -> Option<F::Output>
	where
		F: Future,
	{
		tokio::select! {
			biased;

			_ = self.cancel.cancelled() => {
				tracing::debug!(stage, "Stream cancelled.");

				None
			}
			_ = self.tx.closed() => {
				tracing::debug!(stage, "Stream consumer gone.");

				None
			}
			out = work => Some(out),
		}
	}

	/// False once the consumer is gone.
	async fn send(&self, event: StreamEvent) -> bool {
		if self.stopped() {
			return false;
		}

		self.tx.send(event).await.is_ok()
	}
}

impl LyraService {
	/// Validates the request and starts the phase engine on its own task.
	///
	/// Cancelling `cancel` or dropping the receiver drops in-flight embedding or retrieval and
	/// stops further phase computation.
	pub fn stream_rank(
		self: &Arc<Self>,
		req: StreamRequest,
		cancel: CancellationToken,
	) -> Result<mpsc::Receiver<StreamEvent>> {
		let query = validate_query(&req.query)?.to_string();
		let top_k = self.resolve_top_k(req.top_k)?;
		let (tx, rx) = mpsc::channel(self.cfg.streaming.channel_capacity);
		let ctx = StreamCtx {
			query,
			top_k,
			context: req.context,
			memory_augmented: self.cfg.streaming.memory_augmentation,
			started: Instant::now(),
			tx,
			cancel,
		};
		let service = self.clone();

		tokio::spawn(async move { service.run_stream(ctx).await });

		Ok(rx)
	}

	async fn run_stream(&self, ctx: StreamCtx) {
		let Some(command) = ctx.until_stopped("memory", self.maybe_store(&ctx.query)).await else {
			return;
		};

		if let Some(ack) = command {
			let mut event = ctx.event(StreamPhase::Mem);

			event.ack = Some(ack);
			ctx.send(event).await;

			return;
		}

		let Some(embedded) = ctx.until_stopped("embed", self.embed_query(&ctx.query)).await else {
			return;
		};
		let vector = match embedded {
			Ok(vector) => vector,
			Err(err) => {
				tracing::warn!(error = %err, "Stream embedding failed.");

				let mut event = ctx.event(StreamPhase::Error);

				event.error = Some(err.to_string());
				ctx.send(event).await;

				return;
			},
		};

		let Some(retrieved) =
			ctx.until_stopped("retrieve", self.retrieve_with_memory(&vector, ctx.top_k)).await
		else {
			return;
		};
		let candidates = retrieved.candidates;
		let p0 = delta::rank_items(
			candidates
				.iter()
				.map(|candidate| (candidate.id.clone(), similarity(candidate.distance)))
				.collect(),
		);
		let mut event = ctx.event(StreamPhase::P0);

		event.results = p0.clone();
		event.error = retrieved.error_note;

		if !ctx.send(event).await {
			tracing::debug!(phase = StreamPhase::P0.as_str(), "Stream consumer gone.");

			return;
		}

		let matrix = features::assemble(&ctx.query, &candidates);
		let raw = self.score_matrix(&matrix);
		let mut scored: Vec<(String, f64)> =
			candidates.iter().map(|candidate| candidate.id.clone()).zip(raw).collect();

		scored.sort_by(|a, b| cmp_f64_desc(a.1, b.1));

		let mut p1 = delta::rank_items(scored);
		let p1_delta = delta::compute_delta(&p0, &mut p1, DeltaMode::RankOnly);
		let mut event = ctx.event(StreamPhase::P1);

		event.results = p1.clone();
		event.delta = Some(p1_delta);

		if !ctx.send(event).await {
			tracing::debug!(phase = StreamPhase::P1.as_str(), "Stream consumer gone.");

			return;
		}

		let delay = Duration::from_millis(
			self.cfg.streaming.phase_delay_ms.min(self.cfg.streaming.max_phase_delay_ms),
		);

		if ctx.until_stopped("phase_delay", tokio::time::sleep(delay)).await.is_none() {
			return;
		}

		let texts: HashMap<&str, &str> = candidates
			.iter()
			.map(|candidate| (candidate.id.as_str(), candidate.text.as_str()))
			.collect();
		let adjusted =
			phases::adjust_phase(&ctx.query, &p1, |id| texts.get(id).copied(), &self.adjustment());
		let mut p2 = delta::rank_items(adjusted);
		let p2_delta = delta::compute_delta(&p1, &mut p2, DeltaMode::RankOrScore);
		let mut event = ctx.event(StreamPhase::P2);

		event.results = p2;
		event.delta = Some(p2_delta);
		ctx.send(event).await;
	}

	fn adjustment(&self) -> ContextAdjustment {
		let streaming = &self.cfg.streaming;

		ContextAdjustment {
			overlap_boost: f64::from(streaming.overlap_boost),
			top_boost_ratio: f64::from(streaming.top_boost_ratio),
			tail_penalty_ratio: f64::from(streaming.tail_penalty_ratio),
			tail_start_rank: streaming.tail_start_rank,
		}
	}
}
