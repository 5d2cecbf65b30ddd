use crate::features::FeatureMatrix;

/// How a configured weight vector had to be fitted to the feature columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightFit {
	Exact,
	/// No weights were configured; all ones were used.
	Defaulted { columns: usize },
	Truncated { from: usize, to: usize },
	Padded { from: usize, to: usize },
}

/// Fits `weights` to `columns`: empty becomes all ones, longer is truncated, shorter is
/// zero-padded. Never fails, so a stale weight vector keeps scoring after a schema change.
pub fn fit_weights(weights: &[f64], columns: usize) -> (Vec<f64>, WeightFit) {
	if weights.is_empty() {
		return (vec![1.0; columns], WeightFit::Defaulted { columns });
	}

	let from = weights.len();

	if from == columns {
		return (weights.to_vec(), WeightFit::Exact);
	}

	let mut fitted = weights.to_vec();

	fitted.resize(columns, 0.0);

	let fit = if from > columns {
		WeightFit::Truncated { from, to: columns }
	} else {
		WeightFit::Padded { from, to: columns }
	};

	(fitted, fit)
}

pub fn score(matrix: &FeatureMatrix, weights: &[f64]) -> (Vec<f64>, WeightFit) {
	let (fitted, fit) = fit_weights(weights, matrix.columns());
	let scores: Vec<f64> = matrix
		.rows
		.iter()
		.map(|row| {
			row.iter().zip(fitted.iter()).map(|(value, weight)| value * weight).sum::<f64>()
		})
		.collect();

	(scores, fit)
}
