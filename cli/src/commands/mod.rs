//! CLI definition and dispatch.

mod pull;

use clap::Parser;

pub use pull::PullArgs;

/// docker-pull: fetch an image from a v2 registry as a `docker load` tarball.
#[derive(Parser)]
#[command(name = "docker-pull", about)]
pub struct Cli {
    #[command(flatten)]
    pub pull: PullArgs,
}

/// Run the command described by `cli`.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    pull::execute(cli.pull).await
}
