use lyra_domain::{
	Candidate,
	delta::{self, DeltaMode},
	features::{self, FEATURE_SCHEMA_VERSION},
	fusion::{self, FusionWeights},
	ltr, merge, text_preview,
};

fn candidate(id: &str, text: &str, distance: f64) -> Candidate {
	Candidate { id: id.to_string(), text: text.to_string(), distance, source: "corpus".to_string() }
}

#[test]
fn mitochondria_example_ranks_closest_first() {
	let candidates = vec![
		candidate("1", &"The mitochondria is the powerhouse of the cell. ".repeat(3), 0.1),
		candidate("2", &"Cells contain organelles with specialised roles. ".repeat(2), 0.5),
	];
	let matrix = features::assemble("mitochondria", &candidates);

	assert_eq!(matrix.schema_version, FEATURE_SCHEMA_VERSION);

	let conceptual = matrix.conceptual_scores();

	assert!((conceptual[0] - 0.909).abs() < 1e-3);
	assert!((conceptual[1] - 0.667).abs() < 1e-3);

	let (raw, fit) = ltr::score(&matrix, &[]);

	assert_eq!(fit, ltr::WeightFit::Defaulted { columns: 3 });

	let weights = FusionWeights { w_ltr: 0.6, w_concept: 0.4, version: 1 };
	let fused = fusion::fuse(&raw, &conceptual, &weights);

	assert_eq!(fused.order, vec![0, 1]);
	assert_eq!(fused.normalized_ltr, vec![1.0, 0.0]);
}

#[test]
fn equal_raw_scores_do_not_produce_nan() {
	let candidates = vec![candidate("a", "same text", 0.3), candidate("b", "same text", 0.3)];
	let matrix = features::assemble("q", &candidates);
	let (raw, _) = ltr::score(&matrix, &[1.0, 1.0, 1.0]);
	let weights = FusionWeights { w_ltr: 1.0, w_concept: 1.0, version: 0 };
	let fused = fusion::fuse(&raw, &matrix.conceptual_scores(), &weights);

	assert_eq!(fused.normalized_ltr, vec![0.5, 0.5]);
	assert!(fused.fused.iter().all(|score| score.is_finite()));
}

#[test]
fn fusion_is_deterministic_across_calls() {
	let candidates: Vec<Candidate> = (0..20)
		.map(|idx| {
			candidate(&idx.to_string(), &"x".repeat(idx * 7 % 13 + 1), (idx % 4) as f64 * 0.1)
		})
		.collect();
	let matrix = features::assemble("q", &candidates);
	let (raw, _) = ltr::score(&matrix, &[0.5, 0.1]);
	let weights = FusionWeights { w_ltr: 0.3, w_concept: 0.7, version: 9 };
	let first = fusion::fuse(&raw, &matrix.conceptual_scores(), &weights);

	for _ in 0..5 {
		assert_eq!(fusion::fuse(&raw, &matrix.conceptual_scores(), &weights), first);
	}
}

#[test]
fn merged_scopes_feed_identical_deltas() {
	let merged = merge::merge_by_id(
		vec![
			vec![candidate("a", "alpha", 0.4), candidate("b", "beta", 0.3)],
			vec![candidate("a", "alpha", 0.2)],
		],
		5,
	);

	assert_eq!(merged.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

	let previous = delta::rank_items(
		merged.iter().map(|c| (c.id.clone(), features::similarity(c.distance))).collect(),
	);
	let mut same = previous.clone();

	assert!(delta::compute_delta(&previous, &mut same, DeltaMode::RankOrScore).is_empty());
}

#[test]
fn preview_truncates_on_char_boundaries() {
	assert_eq!(text_preview("héllo wörld", 4), "héll");
	assert_eq!(text_preview("short", 10), "short");
}
