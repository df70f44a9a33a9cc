use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Verbosity count for a level name or a plain count, as given through
/// `UMBRA_LOG_LEVEL`.
fn parse_verbosity(level: &str) -> Result<u8, String> {
    if let Ok(count) = level.parse::<u8>() {
        return if usize::from(count) < LEVELS.len() {
            Ok(count)
        } else {
            Err(format!("verbosity must be at most {}", LEVELS.len() - 1))
        };
    }

    LEVELS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(level.trim()))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level '{level}', expected one of {}", LEVELS.join(", ")))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("UMBRA_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_verbosity)),
    )
}
