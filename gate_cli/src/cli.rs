//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "gate", version, about = "Gate motion controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/gate_config.toml")]
    pub config: PathBuf,

    /// Status and logs as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl From<gate_config::MemLock> for RtLock {
    fn from(m: gate_config::MemLock) -> Self {
        match m {
            gate_config::MemLock::None => Self::None,
            gate_config::MemLock::Current => Self::Current,
            gate_config::MemLock::All => Self::All,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller and print status snapshots
    Run {
        /// Post an open command (source: button) once the loops are running
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "close")]
        open: bool,
        /// Post a close command (source: button) once the loops are running
        #[arg(long, action = ArgAction::SetTrue)]
        close: bool,
        /// Stop after this many seconds; runs until Ctrl-C when omitted
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
        /// Interval between status lines
        #[arg(long, value_name = "MS", default_value_t = 500)]
        status_ms: u64,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux builds with the `rt` feature.\n\nAttempts SCHED_FIFO priority, pins the process to one CPU and locks memory with mlockall. Needs CAP_SYS_NICE / CAP_IPC_LOCK or root. Also enabled by [runtime].rt in the config."
        )]
        rt: bool,
        /// SCHED_FIFO priority (1..=max); defaults to [runtime].priority, then max
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,
        /// CPU index to pin the process to; defaults to [runtime].cpu, then 0
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Load and validate the config, then print the effective values
    CheckConfig,
    /// Build the controller, run it briefly and report loop timing
    SelfCheck,
    /// Print the door transition table
    Table,
}
