use std::sync::Arc;

use lyra_service::{Backends, LyraService};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LyraService>,
}
impl AppState {
	pub async fn new(config: lyra_config::Config) -> color_eyre::Result<Self> {
		let backends = Backends::connect(&config).await?;
		let service = LyraService::new(config, backends)?;

		Ok(Self::from_service(Arc::new(service)))
	}

	pub fn from_service(service: Arc<LyraService>) -> Self {
		Self { service }
	}
}
