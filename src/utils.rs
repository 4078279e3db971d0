use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Opt-in terminal logger for demos and debugging sessions; safe to call
/// more than once (later calls are ignored).
pub fn init_console_logging(level: LevelFilter) {
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);
}
