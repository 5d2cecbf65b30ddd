//! Shared command-line surface for Lyra binaries.

use std::path::PathBuf;

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

/// `<crate version>-<git sha>-<target triple>`, filled in by the workspace build script.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

/// Flattened into every binary that reads a Lyra TOML config.
#[derive(Clone, Debug, clap::Args)]
pub struct ConfigArgs {
	/// Path to the Lyra TOML config.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.usage(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[derive(Debug, Parser)]
	struct Probe {
		#[command(flatten)]
		config: ConfigArgs,
	}

	#[test]
	fn parses_short_and_long_config_flags() {
		let short = Probe::try_parse_from(["probe", "-c", "lyra.toml"]).expect("Parse failed.");
		let long = Probe::try_parse_from(["probe", "--config", "lyra.toml"]).expect("Parse failed.");

		assert_eq!(short.config.config, PathBuf::from("lyra.toml"));
		assert_eq!(long.config.config, short.config.config);
	}

	#[test]
	fn version_starts_with_package_version() {
		assert!(VERSION.starts_with(env!("CARGO_PKG_VERSION")));
	}
}
