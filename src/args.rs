//! Command-line argument parsing and help/version display.
//!
//! Parsing is hand-rolled: the surface is three commands and two flags, and
//! keeping it dependency-free keeps startup instant.

use std::path::PathBuf;

/// What the process should do after parsing.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon.
    Run { debug: bool },
    /// Print the offline schedule preview for one group.
    Preview {
        group: String,
        hours: Option<u32>,
    },
    /// Signal the running instance to shut down.
    Stop,
    /// Print help and exit.
    Help,
    /// Print version and exit.
    Version,
}

/// Parsed command line: the action plus global options.
#[derive(Debug, PartialEq)]
pub struct ParsedArgs {
    pub action: CliAction,
    pub config_dir: Option<PathBuf>,
}

impl ParsedArgs {
    /// Parse `std::env::args`-style input (first element is the binary name).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut args = args.into_iter().skip(1).peekable();

        let mut debug = false;
        let mut config_dir = None;
        let mut action: Option<CliAction> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => return Ok(Self::with(CliAction::Help, config_dir)),
                "--version" | "-V" => return Ok(Self::with(CliAction::Version, config_dir)),
                "--debug" | "-d" => debug = true,
                "--config" | "-c" => {
                    let dir = args
                        .next()
                        .ok_or_else(|| "--config requires a directory argument".to_string())?;
                    config_dir = Some(PathBuf::from(dir));
                }
                "preview" => {
                    let group = args
                        .next()
                        .ok_or_else(|| "preview requires a group name".to_string())?;
                    let mut hours = None;
                    if args.peek().map(String::as_str) == Some("--hours") {
                        args.next();
                        let value = args
                            .next()
                            .ok_or_else(|| "--hours requires a number".to_string())?;
                        hours = Some(
                            value
                                .parse()
                                .map_err(|_| format!("invalid hours value '{value}'"))?,
                        );
                    }
                    action = Some(CliAction::Preview { group, hours });
                }
                "stop" => action = Some(CliAction::Stop),
                other => return Err(format!("unknown argument '{other}' (see --help)")),
            }
        }

        Ok(Self::with(action.unwrap_or(CliAction::Run { debug }), config_dir))
    }

    fn with(action: CliAction, config_dir: Option<PathBuf>) -> Self {
        Self { action, config_dir }
    }
}

/// Print usage information.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\
meltr v{version} — weather-aware scheduling for networked relay groups

USAGE:
    meltr [OPTIONS]                     run the daemon
    meltr preview <GROUP> [--hours N]   print the offline schedule preview
    meltr stop                          stop the running instance

OPTIONS:
    -c, --config <DIR>    use an alternate configuration directory
    -d, --debug           enable debug output
    -h, --help            print this help
    -V, --version         print the version"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParsedArgs, String> {
        let full: Vec<String> = std::iter::once("meltr".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        ParsedArgs::parse(full)
    }

    #[test]
    fn bare_invocation_runs_the_daemon() {
        let parsed = parse(&[]).unwrap();
        assert_eq!(parsed.action, CliAction::Run { debug: false });
        assert!(parsed.config_dir.is_none());
    }

    #[test]
    fn debug_and_config_flags_are_recognized() {
        let parsed = parse(&["--debug", "--config", "/tmp/alt"]).unwrap();
        assert_eq!(parsed.action, CliAction::Run { debug: true });
        assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/alt")));
    }

    #[test]
    fn preview_takes_group_and_optional_hours() {
        let parsed = parse(&["preview", "front-walk"]).unwrap();
        assert_eq!(
            parsed.action,
            CliAction::Preview {
                group: "front-walk".to_string(),
                hours: None
            }
        );

        let parsed = parse(&["preview", "front-walk", "--hours", "48"]).unwrap();
        assert_eq!(
            parsed.action,
            CliAction::Preview {
                group: "front-walk".to_string(),
                hours: Some(48)
            }
        );
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(parse(&["preview"]).is_err());
        assert!(parse(&["preview", "walk", "--hours", "soon"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
    }
}
