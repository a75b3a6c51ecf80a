//! Main application entry point and CLI dispatch.
//!
//! Argument parsing happens first so `--help`/`--version` exit before any
//! resources are touched; the `--config` override is installed before the
//! chosen action runs, since every action resolves paths through it.

use meltr::args::{CliAction, ParsedArgs, print_help};
use meltr::{Meltr, log_error_exit, log_version, run_preview, run_stop};

fn main() {
    let parsed = match ParsedArgs::parse(std::env::args()) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("meltr: {message}");
            std::process::exit(2);
        }
    };

    if let Some(dir) = parsed.config_dir {
        meltr::config::set_config_dir(dir);
    }

    let result = match parsed.action {
        CliAction::Help => {
            print_help();
            return;
        }
        CliAction::Version => {
            println!("meltr {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        CliAction::Run { debug } => {
            log_version!();
            Meltr::new(debug).run()
        }
        CliAction::Preview { group, hours } => run_preview(&group, hours),
        CliAction::Stop => run_stop(),
    };

    if let Err(e) = result {
        log_error_exit!("{e:#}");
        std::process::exit(1);
    }
}
