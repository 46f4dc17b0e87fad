// Commandline argument parsers using clap for the touchfloor binaries

use crate::config::{BoardConfig, TransportConfig};
use crate::registry::BoardRegistration;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct FloorArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: FloorCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum FloorCommand {
    /// Run the pipeline and log touches as they come and go
    #[command(about)]
    Run(RunCommand),

    /// List the serial devices on this machine
    #[command(about)]
    Ports,

    /// Write a configuration file to start from
    #[command(about)]
    Init(InitCommand),
}

/// Describes one board given on the command line rather than in a
/// configuration file.
#[derive(Debug, Args, Clone)]
pub struct BoardArgs {
    /// Hardware version of the board
    #[arg(short = 'm', long = "model", default_value_t = 4)]
    pub model_version: u8,

    /// Number of sensing modes the board runs
    #[arg(long = "modes", default_value_t = 5)]
    pub mode_count: u8,
}

impl BoardArgs {
    /// A single board with id 0 at the origin, reached through `transport`.
    pub fn board_config(&self, transport: TransportConfig) -> BoardConfig {
        BoardConfig {
            board: BoardRegistration {
                board_id: 0,
                model_version: self.model_version,
                mode_count: self.mode_count,
                panel_layout: (0, 0),
            },
            transport,
        }
    }
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    /// Configuration file listing the boards and tuning
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Serial device of a single board, used instead of the configured boards
    #[arg(short = 'p', long = "port", conflicts_with = "synthetic")]
    pub port: Option<PathBuf>,

    /// Pick the serial device of a single board from a list
    #[arg(short = 's', long = "select", conflicts_with_all = ["port", "synthetic"])]
    pub select: bool,

    /// Run a single synthetic board instead of the configured boards
    #[arg(long = "synthetic")]
    pub synthetic: bool,

    #[command(flatten)]
    pub board: BoardArgs,

    /// Stop after this many processing ticks
    #[arg(short = 't', long = "ticks")]
    pub ticks: Option<u64>,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct InitCommand {
    /// Filename for the configuration to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

/// Arguments of the terminal monitor.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MonitorArgs {
    /// Configuration file listing the boards; a synthetic board is used if
    /// none is given
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub board: BoardArgs,

    /// Number of touches on the synthetic board
    #[arg(long = "touches", default_value_t = 2)]
    pub touches: usize,

    /// Noise amplitude on the synthetic board
    #[arg(long = "noise", default_value_t = 200)]
    pub noise: u16,
}
