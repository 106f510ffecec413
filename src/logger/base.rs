//! Configurable logger that formats records and hands them to a sink.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::format::{exclude_ignored, filter_ignore_tags, format_string};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Finest detail.
    Trace,
    /// Diagnostics.
    Debug,
    /// Informational.
    Info,
    /// Plain output; forwarded as `info`.
    Log,
    /// Something unexpected.
    Warn,
    /// A failure.
    Error,
}

impl LogLevel {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One formatted call to [`Logger::print`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Prefix segments with placeholders substituted (unless raw).
    pub prefix: Vec<String>,
    /// Effective label.
    pub label: String,
    /// Message segments with placeholders substituted (unless raw).
    pub message: Vec<String>,
    /// `message` without the ignore tags.
    pub filtered_message: Vec<String>,
    /// `message` without the ignore tags and the segments between them.
    pub excluded_message: Vec<String>,
    /// Timestamp rendered with the datetime format.
    pub datetime: String,
    /// Timestamp rendered with the time format.
    pub time: String,
    /// Whether substitution was skipped.
    pub raw: bool,
}

impl LogRecord {
    /// Prefix and filtered message joined by spaces.
    #[must_use]
    pub fn line(&self) -> String {
        self.prefix
            .iter()
            .chain(&self.filtered_message)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Sink receiving every record.
pub type MessageReceiver = Arc<dyn Fn(&LogRecord) -> anyhow::Result<()> + Send + Sync>;

/// Receiver forwarding each record to `tracing` at the matching level.
#[must_use]
pub fn tracing_receiver() -> MessageReceiver {
    Arc::new(|record: &LogRecord| -> anyhow::Result<()> {
        let line = record.line();
        let label = record.label.as_str();
        match record.level {
            LogLevel::Trace => tracing::trace!(label, "{line}"),
            LogLevel::Debug => tracing::debug!(label, "{line}"),
            LogLevel::Info | LogLevel::Log => tracing::info!(label, "{line}"),
            LogLevel::Warn => tracing::warn!(label, "{line}"),
            LogLevel::Error => tracing::error!(label, "{line}"),
        }
        Ok(())
    })
}

/// Label used when none is set.
pub const ANONYMOUS_LABEL: &str = "Anonymous";

/// Renders `now` with a strftime `format`. An invalid format renders as
/// an empty string.
fn render_time(now: &DateTime<Local>, format: &str) -> String {
    let mut rendered = String::new();
    if write!(rendered, "{}", now.format(format)).is_err() {
        tracing::warn!(format, "invalid logger time format");
        rendered.clear();
    }
    rendered
}

/// Formats messages with a prefix template and a timestamp.
///
/// Prefix segments and message segments may contain `{datetime}`,
/// `{time}`, `{level}` and `{label}` placeholders.
#[derive(Clone)]
pub struct Logger {
    label: Option<String>,
    datetime_format: String,
    time_format: String,
    prefix: Vec<String>,
    enable: bool,
    receiver: MessageReceiver,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            label: Some("BaseLogger".to_string()),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            time_format: "%H:%M:%S".to_string(),
            prefix: vec!["{time}".to_string(), "{level}".to_string(), "[{label}]".to_string()],
            enable: true,
            receiver: tracing_receiver(),
        }
    }
}

impl Logger {
    /// Logger with the default label, formats and prefix, forwarding to
    /// `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label, if set.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Datetime format (chrono strftime).
    #[must_use]
    pub fn datetime_format(&self) -> &str {
        &self.datetime_format
    }

    /// Time format (chrono strftime).
    #[must_use]
    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    /// Prefix segments.
    #[must_use]
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Whether records are produced at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enable
    }

    /// Sets or clears the label.
    pub fn set_label(&mut self, label: Option<String>) -> &mut Self {
        self.label = label;
        self
    }

    /// Sets the datetime format.
    pub fn set_datetime_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.datetime_format = format.into();
        self
    }

    /// Sets the time format.
    pub fn set_time_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.time_format = format.into();
        self
    }

    /// Replaces the prefix segments.
    pub fn set_prefix(&mut self, prefix: Vec<String>) -> &mut Self {
        self.prefix = prefix;
        self
    }

    /// Inserts segments before the current prefix.
    pub fn prepend_prefix<I, S>(&mut self, segments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut prefix: Vec<String> = segments.into_iter().map(Into::into).collect();
        prefix.append(&mut self.prefix);
        self.prefix = prefix;
        self
    }

    /// Adds segments after the current prefix.
    pub fn append_prefix<I, S>(&mut self, segments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix.extend(segments.into_iter().map(Into::into));
        self
    }

    /// Turns record production on or off.
    pub fn set_enable(&mut self, enable: bool) -> &mut Self {
        self.enable = enable;
        self
    }

    /// Replaces the sink.
    pub fn set_message_receiver(&mut self, receiver: MessageReceiver) -> &mut Self {
        self.receiver = receiver;
        self
    }

    /// Builds a record and hands it to the receiver. Receiver failures are
    /// logged and swallowed.
    pub fn print(&self, level: LogLevel, message: &[&str], raw: bool) {
        if !self.enable {
            return;
        }

        let now = Local::now();
        let datetime = render_time(&now, &self.datetime_format);
        let time = render_time(&now, &self.time_format);
        let label = self
            .label
            .as_deref()
            .filter(|label| !label.is_empty())
            .unwrap_or(ANONYMOUS_LABEL)
            .to_string();

        let params = [
            ("datetime", datetime.as_str()),
            ("time", time.as_str()),
            ("level", level.as_str()),
            ("label", label.as_str()),
        ];
        let substitute = |segment: &str| -> String {
            if raw {
                segment.to_string()
            } else {
                format_string(segment, &params)
            }
        };
        let message: Vec<String> = message.iter().map(|segment| substitute(segment)).collect();
        let prefix: Vec<String> = self.prefix.iter().map(|segment| substitute(segment)).collect();

        let record = LogRecord {
            level,
            prefix,
            filtered_message: filter_ignore_tags(&message),
            excluded_message: exclude_ignored(&message),
            message,
            label,
            datetime,
            time,
            raw,
        };

        if let Err(error) = (self.receiver)(&record) {
            tracing::error!(label = %record.label, error = %error, "message receiver failed");
        }
    }

    /// Prints at [`LogLevel::Trace`].
    pub fn trace(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Trace, message, false);
        self
    }

    /// Prints at [`LogLevel::Debug`].
    pub fn debug(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Debug, message, false);
        self
    }

    /// Prints at [`LogLevel::Info`].
    pub fn info(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Info, message, false);
        self
    }

    /// Prints at [`LogLevel::Log`].
    pub fn log(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Log, message, false);
        self
    }

    /// Prints at [`LogLevel::Warn`].
    pub fn warn(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Warn, message, false);
        self
    }

    /// Prints at [`LogLevel::Error`].
    pub fn error(&self, message: &[&str]) -> &Self {
        self.print(LogLevel::Error, message, false);
        self
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("label", &self.label)
            .field("datetime_format", &self.datetime_format)
            .field("time_format", &self.time_format)
            .field("prefix", &self.prefix)
            .field("enable", &self.enable)
            .finish_non_exhaustive()
    }
}
