//! Logging setup: `[LEVEL stage] message` lines that stay clear of the spinners

use indicatif::MultiProgress;

/// Dependencies that flood `debug` with connection and signing chatter
const NOISY_DEPS: &[&str] = &["hyper_util", "reqwest", "aws_config", "aws_smithy_runtime", "aws_sigv4"];

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Short origin of a record: the module for our own crates
/// (`graphingest_load::dispatch` → `dispatch`), the crate name otherwise.
fn stage(target: &str) -> &str {
    match target.strip_prefix("graphingest_") {
        Some(own) => own.rsplit("::").next().unwrap_or(own),
        None => target.split("::").next().unwrap_or(target),
    }
}

fn render(record: &log::Record, color: bool) -> String {
    let level = record.level();
    let stage = stage(record.target());
    if color {
        format!(
            "[{}{level:<5}\x1b[0m \x1b[2m{stage}\x1b[0m] {}",
            level_color(level),
            record.args()
        )
    } else {
        format!("[{level:<5} {stage}] {}", record.args())
    }
}

/// Routes log lines through `MultiProgress::suspend` so they never tear a spinner.
pub struct SpinnerSafeLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl SpinnerSafeLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { filter, multi }
    }
}

impl log::Log for SpinnerSafeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.filter.matches(record) {
            return;
        }
        let line = render(record, true);
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {}
}

/// Default filter: `debug` wins over `quiet`; `RUST_LOG` overrides both.
///
/// At `debug` the HTTP and AWS stacks stay at `info`.
fn default_filter(quiet: bool, debug: bool) -> String {
    if debug {
        let mut filter = String::from("debug");
        for dep in NOISY_DEPS {
            filter.push_str(&format!(",{dep}=info"));
        }
        filter
    } else if quiet {
        "warn".into()
    } else {
        "info".into()
    }
}

/// Initialize logging.
///
/// With a `MultiProgress` (TTY), colored lines are routed around the spinners.
/// Without one, lines are plain and carry a millisecond timestamp for log
/// aggregation.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));
    let mut builder = env_logger::Builder::from_env(env);

    let Some(multi) = multi else {
        let _ = builder
            .format(|buf, record| writeln!(buf, "{} {}", buf.timestamp_millis(), render(record, false)))
            .try_init();
        return;
    };

    let filter = builder.build();
    let max_level = filter.filter();
    if log::set_boxed_logger(Box::new(SpinnerSafeLogger::new(filter, multi.clone()))).is_ok() {
        log::set_max_level(max_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_precedence() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(true, false), "warn");
        let debug = default_filter(true, true);
        assert!(debug.starts_with("debug,"));
        assert!(debug.contains("aws_smithy_runtime=info"));
    }

    #[test]
    fn stage_names() {
        assert_eq!(stage("graphingest_load::dispatch"), "dispatch");
        assert_eq!(stage("graphingest_neo4j"), "neo4j");
        assert_eq!(stage("reqwest::connect"), "reqwest");
        assert_eq!(stage("aws_config"), "aws_config");
    }

    #[test]
    fn plain_lines_have_no_color() {
        let line = render(
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("graphingest_load::worker")
                .args(format_args!("3 malformed line(s) skipped"))
                .build(),
            false,
        );
        assert_eq!(line, "[WARN  worker] 3 malformed line(s) skipped");
    }
}
