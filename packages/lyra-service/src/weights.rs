use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use lyra_domain::fusion::FusionWeights;

use crate::{Error, Result};

/// Normalized weights as reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionWeightsView {
	pub w_ltr: f64,
	pub w_concept: f64,
	pub version: u64,
}
impl From<&FusionWeights> for FusionWeightsView {
	fn from(weights: &FusionWeights) -> Self {
		let normalized = weights.normalized();

		Self { w_ltr: normalized.w_ltr, w_concept: normalized.w_concept, version: normalized.version }
	}
}
impl From<Arc<FusionWeights>> for FusionWeightsView {
	fn from(weights: Arc<FusionWeights>) -> Self {
		Self::from(weights.as_ref())
	}
}

/// Process-wide fusion weights. Readers clone the current snapshot; writers swap a new one.
pub struct FusionWeightsCell {
	current: Mutex<Arc<FusionWeights>>,
}
impl FusionWeightsCell {
	pub fn new(w_ltr: f64, w_concept: f64) -> Self {
		Self { current: Mutex::new(Arc::new(FusionWeights { w_ltr, w_concept, version: 0 })) }
	}

	/// Raw stored pair and version. Use `normalized()` before fusing.
	pub fn get(&self) -> Arc<FusionWeights> {
		self.lock().clone()
	}

	pub fn update(&self, w_ltr: f64, w_concept: f64) -> Result<Arc<FusionWeights>> {
		for (field, value) in [("w_ltr", w_ltr), ("w_concept", w_concept)] {
			if !value.is_finite() || value < 0.0 {
				return Err(Error::InvalidRequest {
					message: format!("{field} must be a finite number >= 0."),
				});
			}
		}

		let mut current = self.lock();
		let next = Arc::new(FusionWeights { w_ltr, w_concept, version: current.version + 1 });

		*current = next.clone();

		Ok(next)
	}

	fn lock(&self) -> MutexGuard<'_, Arc<FusionWeights>> {
		self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use std::thread;

	use super::*;

	#[test]
	fn update_bumps_version_and_normalizes_on_read() {
		let cell = FusionWeightsCell::new(0.6, 0.4);
		let updated = cell.update(3.0, 1.0).expect("Update failed.");
		let view = FusionWeightsView::from(cell.get());

		assert_eq!(updated.version, 1);
		assert_eq!(view.version, 1);
		assert!((view.w_ltr - 0.75).abs() < 1e-9);
		assert!((view.w_concept - 0.25).abs() < 1e-9);
	}

	#[test]
	fn zero_pair_reads_as_even_split() {
		let cell = FusionWeightsCell::new(0.6, 0.4);

		cell.update(0.0, 0.0).expect("Update failed.");

		let view = FusionWeightsView::from(cell.get());

		assert_eq!((view.w_ltr, view.w_concept), (0.5, 0.5));
	}

	#[test]
	fn rejects_negative_and_non_finite_weights() {
		let cell = FusionWeightsCell::new(0.6, 0.4);

		assert!(matches!(cell.update(-0.1, 1.0), Err(Error::InvalidRequest { .. })));
		assert!(matches!(cell.update(1.0, f64::NAN), Err(Error::InvalidRequest { .. })));
		assert_eq!(cell.get().version, 0);
	}

	#[test]
	fn concurrent_updates_never_lose_a_version() {
		let cell = Arc::new(FusionWeightsCell::new(0.5, 0.5));
		let handles: Vec<_> = (0..8_u32)
			.map(|idx| {
				let cell = cell.clone();

				thread::spawn(move || {
					for _ in 0..50 {
						cell.update(f64::from(idx), 1.0).expect("Update failed.");
					}
				})
			})
			.collect();

		for handle in handles {
			handle.join().expect("Updater panicked.");
		}

		let last = cell.get();

		assert_eq!(last.version, 400);
		assert_eq!(last.w_concept, 1.0);
	}
}
