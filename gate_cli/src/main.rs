#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions)]
//! `gate` command-line front end.

mod cli;
mod error_fmt;
mod rt;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use eyre::WrapErr;
use gate_core::DoorEvent;
use gate_core::error::GateError;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = dispatch(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn load_config(path: &Path) -> eyre::Result<gate_config::Config> {
    gate_config::load_file(path).wrap_err_with(|| GateError::Config(path.display().to_string()))
}

fn dispatch(cli: &Cli) -> eyre::Result<()> {
    if matches!(cli.cmd, Commands::Table) {
        init_tracing(cli, None);
        run::print_table(cli.json);
        return Ok(());
    }

    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(cli, None);
            return Err(e);
        }
    };
    init_tracing(cli, Some(&cfg.logging));
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            open,
            close,
            seconds,
            status_ms,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let initial = if open {
                Some(DoorEvent::OpenCmd)
            } else if close {
                Some(DoorEvent::CloseCmd)
            } else {
                None
            };
            let opts = run::RunOpts {
                initial,
                seconds,
                status_ms,
                rt: run::rt_request(&cfg, rt, rt_prio, rt_lock, rt_cpu),
                json: cli.json,
            };

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Relaxed);
            })
            .wrap_err("install Ctrl-C handler")?;

            let status = run::run_gate(&cfg, &opts, &shutdown)?;
            tracing::info!(state = %status.state, position = status.position, "run finished");
            Ok(())
        }
        Commands::CheckConfig => run::check_config(&cfg, cli.json),
        Commands::SelfCheck => run::self_check(&cfg, cli.json).map(|_| ()),
        Commands::Table => Ok(()),
    }
}

/// Console logs go to stderr so stdout stays machine-readable. An optional
/// JSON file sink comes from `[logging]`.
fn init_tracing(cli: &Cli, logging: Option<&gate_config::Logging>) {
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.and_then(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let console_json = cli.json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_pretty = (!cli.json).then(|| fmt::layer().compact().with_writer(std::io::stderr));

    let file_layer = logging.and_then(|l| l.file.as_deref()).map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "gate.log".into(), |n| n.to_os_string());
        let rotation = logging.and_then(|l| l.rotation.as_deref()).unwrap_or("never");
        let appender = match rotation {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_pretty)
        .with(file_layer)
        .try_init();
}
