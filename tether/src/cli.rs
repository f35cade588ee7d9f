use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::version::version_long;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version = version_long())]
#[command(about = "Compile, merge, and hot-reload agent sandbox policy")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a policy file and print its rules, or the compile error
    Check {
        /// Policy file to compile
        file: PathBuf,
        /// Print rules (or the error) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch a policy file and publish every change
    Watch {
        /// Policy file (defaults to the configured policy_path)
        file: Option<PathBuf>,
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Runtime rule to apply on start, e.g. "deny net.send evil.com" (repeatable)
        #[arg(long = "rule", value_name = "RULE")]
        rules: Vec<String>,
    },

    /// Print the active rules after merging runtime rules over a policy file
    Lines {
        /// Policy file to compile
        file: PathBuf,
        /// Runtime rule to merge, e.g. "allow file.open /tmp/" (repeatable)
        #[arg(long = "rule", value_name = "RULE")]
        rules: Vec<String>,
        /// Ignore the file layer and show runtime rules only
        #[arg(long)]
        runtime_only: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_rules() {
        let cli = Cli::parse_from([
            "tether",
            "lines",
            "p.cedar",
            "--rule",
            "deny net.send a.com",
            "--rule",
            "allow file.open /tmp/",
            "--runtime-only",
        ]);
        let Commands::Lines { file, rules, runtime_only } = cli.command else {
            panic!("expected lines")
        };
        assert_eq!(file, PathBuf::from("p.cedar"));
        assert_eq!(rules.len(), 2);
        assert!(runtime_only);
    }
}
