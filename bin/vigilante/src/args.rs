//! Parses command-line arguments for the vigilante daemon.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "vigilante",
    about = "Watches Bitcoin for BTC staking misbehavior and reports it to the App chain",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'c',
        env = "VIGILANTE_CONFIG",
        help = "The file containing the configuration for the tracker",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}
