//! Tracing subscriber setup: console formatter, file layer, and initialisation.
//!
//! Both layers render events through [`LogLine`], which recognises the
//! `[<host.id>]` tag that every host-scoped message starts with. The console
//! highlights the tag; the log file keeps it verbatim so lines can be
//! grepped by host.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::Level;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Target of stage headings emitted by [`Log::stage`](super::Log::stage).
const STAGE_TARGET: &str = "nectl::stage";

#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Stage,
    Error,
    Warn,
    Info,
    Debug,
}

impl Kind {
    fn of(level: Level, target: &str) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO if target == STAGE_TARGET => Self::Stage,
            Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// One event, split into its kind, the host it concerns and the text.
#[derive(Debug, PartialEq, Eq)]
struct LogLine {
    kind: Kind,
    host: Option<String>,
    text: String,
}

impl LogLine {
    fn new(level: Level, target: &str, message: &str) -> Self {
        let message = strip_ansi(message);
        let (host, text) = match split_host(&message) {
            Some((host, text)) => (Some(host.to_string()), text.to_string()),
            None => (None, message),
        };
        Self {
            kind: Kind::of(level, target),
            host,
            text,
        }
    }

    fn from_event(event: &tracing::Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        Self::new(*metadata.level(), metadata.target(), &extractor.message)
    }

    /// Message with the host tag, no styling.
    fn message(&self) -> String {
        match &self.host {
            Some(host) => format!("[{host}] {}", self.text),
            None => self.text.clone(),
        }
    }

    /// Line as written to the log file.
    fn plain(&self, ts: &str) -> String {
        let msg = self.message();
        match self.kind {
            Kind::Stage => format!("[{ts}] ==> {msg}"),
            Kind::Error => format!("[{ts}]     [error] {msg}"),
            Kind::Warn => format!("[{ts}]     [warn] {msg}"),
            Kind::Debug => format!("[{ts}]     [debug] {msg}"),
            Kind::Info => format!("[{ts}]     {msg}"),
        }
    }

    /// Line as printed on the console.
    fn styled(&self) -> String {
        let msg = match &self.host {
            Some(host) => format!("\x1b[36m[{host}]\x1b[0m {}", self.text),
            None => self.text.clone(),
        };
        match self.kind {
            Kind::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
            Kind::Error => format!("\x1b[31mERROR\x1b[0m {msg}"),
            Kind::Warn => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            Kind::Info => format!("  {msg}"),
            Kind::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Split `"[core0.lon] rest"` into the host id and the rest.
fn split_host(message: &str) -> Option<(&str, &str)> {
    let tagged = message.strip_prefix('[')?;
    let (host, rest) = tagged.split_once(']')?;
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some((host, rest.strip_prefix(' ').unwrap_or(rest)))
}

/// A [`tracing_subscriber::Layer`] that appends every event to the
/// per-command log file.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log file for `command` and write a run header.
    ///
    /// Returns `None` if the cache directory or the file is unavailable.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let version =
            option_env!("NECTL_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let header = format!(
            "==========================================\n\
             nectl {version} {command} {}\n\
             ==========================================\n",
            format_utc_datetime(),
        );
        fs::write(&path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let line = LogLine::from_event(event).plain(&format_utc_time());
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        writeln!(writer, "{}", LogLine::from_event(event).styled())
    }
}

/// Map the `-v` count onto a console filter directive.
fn console_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "info,nectl=trace",
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// The console level follows `verbosity` unless `RUST_LOG` is set; the file
/// at `$XDG_CACHE_HOME/nectl/<command>.log` always receives `debug` and up.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbosity: u8, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        EnvFilter, Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directive(verbosity)));

    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_filter);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_directive() {
        assert_eq!(console_directive(0), "info");
        assert_eq!(console_directive(1), "debug");
        assert_eq!(console_directive(5), "info,nectl=trace");
    }

    #[test]
    fn host_tag_is_split_off() {
        assert_eq!(
            split_host("[core0.lon] opened connection to host"),
            Some(("core0.lon", "opened connection to host"))
        );
        assert_eq!(split_host("finished rendering 3 hosts"), None);
        assert_eq!(split_host("[edit system] host-name"), None);
        assert_eq!(split_host("[] nothing"), None);
    }

    #[test]
    fn file_line_keeps_host_tag_verbatim() {
        let line = LogLine::new(Level::ERROR, "nectl", "[core0.lon] \x1b[1mcommit failed\x1b[0m");
        assert_eq!(line.host.as_deref(), Some("core0.lon"));
        assert_eq!(line.plain("12:00:00"), "[12:00:00]     [error] [core0.lon] commit failed");
    }

    #[test]
    fn stage_target_renders_as_heading() {
        let line = LogLine::new(Level::INFO, STAGE_TARGET, "applying configs");
        assert_eq!(line.kind, Kind::Stage);
        assert_eq!(line.plain("12:00:00"), "[12:00:00] ==> applying configs");
        assert!(line.styled().contains("==>"));
    }

    #[test]
    fn console_highlights_host() {
        let line = LogLine::new(Level::WARN, "nectl", "[edge0.par] skipping");
        assert_eq!(line.styled(), "\x1b[33mWARN\x1b[0m  \x1b[36m[edge0.par]\x1b[0m skipping");
    }
}
