//! Relay URL normalization.
//!
//! Relays are keyed by their normalized URL, so `relay.damus.io`,
//! `wss://Relay.Damus.io/` and `https://relay.damus.io` all name the same
//! relay.

use url::Url;

/// Normalize a relay URL, returning `None` if it cannot name a relay.
///
/// - surrounding whitespace is trimmed
/// - a missing scheme defaults to `wss://`
/// - `http` becomes `ws` and `https` becomes `wss`
/// - schemes other than `ws`/`wss` are rejected
/// - host and scheme are lowercased, default ports and fragments dropped
/// - a trailing `/` is removed
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("wss://{}", trimmed)
    };

    let mut url = Url::parse(&candidate).ok()?;

    match url.scheme() {
        "ws" | "wss" => {}
        "http" => url.set_scheme("ws").ok()?,
        "https" => url.set_scheme("wss").ok()?,
        _ => return None,
    }

    if url.host_str().is_none_or(str::is_empty) {
        return None;
    }

    url.set_fragment(None);

    let normalized = url.to_string();
    Some(normalized.trim_end_matches('/').to_string())
}
