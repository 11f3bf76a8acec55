//! Helpers for reading configuration overrides from the process environment.

/// Trims whitespace and one layer of matching surrounding quotes.
///
/// Hosting dashboards and `.env` files frequently carry values such as
/// `"https://host/webhook"` or `'token' `; those must resolve to the bare value.
pub fn clean_value(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    trimmed
}

/// Looks up `name` in the process environment and cleans the value.
///
/// Empty values are treated as unset.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| non_empty(&value))
}

/// Cleans a raw value and returns it unless it ends up empty.
pub fn non_empty(raw: &str) -> Option<String> {
    let cleaned = clean_value(raw);
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
