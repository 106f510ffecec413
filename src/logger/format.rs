//! Template substitution and `<ignore>` tag handling for log messages.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Opens a run of message segments hidden from the excluded view.
pub const IGNORE_START_TAG: &str = "<ignore>";

/// Closes a run opened by [`IGNORE_START_TAG`].
pub const IGNORE_END_TAG: &str = "</ignore>";

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\s*([^{}]+?)\s*\}").ok());

/// Replaces `{ key }` placeholders (whitespace inside the braces allowed)
/// with the value paired with `key`. Unknown placeholders stay as they are.
#[must_use]
pub fn format_string(template: &str, params: &[(&str, &str)]) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let key = caps.get(1).map_or("", |m| m.as_str());
            params
                .iter()
                .find(|(name, _)| *name == key)
                .map_or_else(|| whole.to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

/// Drops the tag segments themselves, keeping everything between them.
#[must_use]
pub fn filter_ignore_tags(segments: &[String]) -> Vec<String> {
    segments
        .iter()
        .filter(|segment| {
            segment.as_str() != IGNORE_START_TAG && segment.as_str() != IGNORE_END_TAG
        })
        .cloned()
        .collect()
}

/// Drops the tags and every segment between an opening and a closing tag.
#[must_use]
pub fn exclude_ignored(segments: &[String]) -> Vec<String> {
    let mut ignoring = false;
    let mut kept = Vec::new();
    for segment in segments {
        match segment.as_str() {
            IGNORE_START_TAG => ignoring = true,
            IGNORE_END_TAG => ignoring = false,
            _ if !ignoring => kept.push(segment.clone()),
            _ => {}
        }
    }
    kept
}
