//! Logging façade: prefix templates, timestamps and ignore tags in front
//! of a pluggable sink. The default sink forwards to `tracing`.

pub mod base;
pub mod format;

pub use base::{ANONYMOUS_LABEL, LogLevel, LogRecord, Logger, MessageReceiver, tracing_receiver};
pub use format::{
    IGNORE_END_TAG, IGNORE_START_TAG, exclude_ignored, filter_ignore_tags, format_string,
};
