// Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kcast_baseball::model::GameRequest;
use kcast_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "kcast", about = "Strikeout projections for starting pitchers")]
pub struct Cli {
    /// Verbose logging to stderr.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Project one pitcher against one opponent.
    Predict {
        #[arg(long)]
        pitcher: String,
        /// Opponent team abbreviation, e.g. PHI.
        #[arg(long)]
        opponent: String,
        #[arg(long, default_value = "")]
        park: String,
        /// Seed for reproducible simulations.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Project every game in a CSV slate (`pitcher,opponent,park`).
    Slate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    pub fn seed(&self) -> Option<u64> {
        match self {
            Command::Predict { seed, .. } | Command::Slate { seed, .. } => *seed,
        }
    }

    pub fn json(&self) -> bool {
        match self {
            Command::Predict { json, .. } | Command::Slate { json, .. } => *json,
        }
    }

    /// The single game of a `predict` invocation.
    pub fn game(&self) -> Option<GameRequest> {
        match self {
            Command::Predict {
                pitcher,
                opponent,
                park,
                ..
            } => Some(GameRequest::new(pitcher.trim(), opponent.trim(), park.trim())),
            Command::Slate { .. } => None,
        }
    }
}

impl Cli {
    /// Command-line values that take precedence over kcast.toml.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(seed) = self.command.seed() {
            config.simulation.seed = Some(seed);
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "kcast=debug,kcast_app=debug,kcast_baseball=debug,kcast_core=debug,info"
        } else {
            "kcast=info,kcast_app=info,kcast_baseball=info,kcast_core=info,warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_arguments() {
        let cli = Cli::try_parse_from([
            "kcast", "predict", "--pitcher", " Paul Skenes ", "--opponent", "PHI", "--seed", "7",
        ])
        .unwrap();
        assert!(!cli.debug);
        assert_eq!(cli.command.seed(), Some(7));
        assert!(!cli.command.json());
        assert_eq!(
            cli.command.game(),
            Some(GameRequest::new("Paul Skenes", "PHI", ""))
        );

        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.simulation.seed, Some(7));
    }

    #[test]
    fn slate_arguments() {
        let cli = Cli::try_parse_from(["kcast", "--debug", "slate", "--file", "today.csv", "--json"])
            .unwrap();
        assert!(cli.debug);
        assert!(cli.command.json());
        assert!(cli.command.game().is_none());
        match cli.command {
            Command::Slate { file, .. } => assert_eq!(file, PathBuf::from("today.csv")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn seed_absent_keeps_config() {
        let cli = Cli::try_parse_from(["kcast", "predict", "--pitcher", "X", "--opponent", "NYM"])
            .unwrap();
        let mut config = Config::default();
        config.simulation.seed = Some(42);
        cli.apply_overrides(&mut config);
        assert_eq!(config.simulation.seed, Some(42));
    }

    #[test]
    fn pitcher_is_required() {
        assert!(Cli::try_parse_from(["kcast", "predict", "--opponent", "NYM"]).is_err());
    }
}
