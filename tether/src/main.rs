use clap::Parser;
use tracing::{error, info};

use tether::cli::{Cli, Commands};
use tether::cmd;
use tether::errors::display_error;
use tether::settings::TetherSettings;
use tether::tracing_init::init_tracing;

fn main() {
    let cli = Cli::parse();
    let log_path = TetherSettings::load().ok().and_then(|s| s.log_path);
    init_tracing(log_path, cli.verbose);
    info!(args = ?std::env::args().collect::<Vec<_>>(), "tether started");

    let result = match cli.command {
        Commands::Check { file, json } => cmd::check::run(&file, json),
        Commands::Watch {
            file,
            interval_ms,
            rules,
        } => cmd::watch::run(file, interval_ms, rules),
        Commands::Lines {
            file,
            rules,
            runtime_only,
        } => cmd::lines::run(&file, &rules, runtime_only),
    };

    if let Err(e) = result {
        error!(error = ?e, "command failed");
        display_error(&e, cli.verbose);
        std::process::exit(1);
    }
}
