use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lyra_api::Args::parse();

	lyra_api::run(args).await
}
