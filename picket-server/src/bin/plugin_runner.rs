//! `picket-plugin-runner`: hosts one plugin for one session.
//!
//! Launched by the Plugin Service with the session id and callback address
//! in its environment. The exit code tells the supervisor how the plugin
//! ended.

use clap::Parser;
use picket_core::{plugins::builtin_catalog, runner::run_from_env};
use picket_server::infra::{init_tracing, shutdown_token};

#[derive(Parser, Debug)]
#[command(name = "picket-plugin-runner")]
#[command(about = "Runs a single Picket plugin session")]
struct Cli {
    /// Name of the plugin to run
    #[arg(long)]
    plugin: String,

    /// Verbose logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if cli.debug {
        "debug,reqwest=info,hyper_util=info"
    } else {
        "info"
    });

    let catalog = builtin_catalog();
    let code = run_from_env(&cli.plugin, &catalog, shutdown_token()).await;
    std::process::exit(code);
}
