//! URL assembly: base joining and `:param` expansion.

use regex::{Captures, Regex};
use serde_json::Value;

/// Matches `:name` segments such as `user/:userId/info`.
pub const DEFAULT_PATH_PARAMS_PATTERN: &str = r"(:[a-zA-Z_]\w*)";

/// Prefixes `path` with `base` unless `path` is already an `http(s)://`
/// URL.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{base}{path}")
}

/// First run of word characters inside a matched placeholder.
fn param_name(placeholder: &str) -> Option<&str> {
    placeholder
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|part| !part.is_empty())
}

/// Replaces every placeholder matched by `pattern` with the value of the
/// same name in `params`.
///
/// Strings are inserted as-is, other values in their JSON form.
/// Placeholders without a value are left untouched.
///
/// # Errors
///
/// Returns the compilation error if `pattern` is not a valid regular
/// expression.
pub fn expand_path_params(
    url: &str,
    params: &Value,
    pattern: &str,
) -> Result<String, regex::Error> {
    let regex = Regex::new(pattern)?;
    let expanded = regex.replace_all(url, |caps: &Captures<'_>| {
        let placeholder = caps.get(0).map_or("", |m| m.as_str());
        let value = param_name(placeholder).and_then(|name| params.get(name));
        match value {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => {
                tracing::debug!(placeholder, url, "path parameter has no value");
                placeholder.to_string()
            }
            Some(other) => other.to_string(),
        }
    });
    Ok(expanded.into_owned())
}
