//! Topic strings and subscription patterns (§4.1).

/// Maximum byte length of a `<prefix>/*` pattern's prefix, and of an event
/// topic for it to participate in prefix matching. Longer prefixes are
/// rejected at subscription time; longer event topics simply skip the
/// prefix phase of dispatch.
pub const MAX_PREFIX_LEN: usize = 255;

/// A single parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `"*"` — matches every topic.
    All,
    /// `"<prefix>/*"` — matches `prefix` itself or anything under it.
    Prefix(String),
    /// Any other literal topic string.
    Exact(String),
}

/// Parse one subscription pattern. Returns `None` for a `<prefix>/*`
/// pattern whose prefix exceeds `max_prefix_len` bytes — the caller logs
/// and skips it, the remaining patterns in the handler's registration
/// still apply.
#[must_use]
pub fn parse_pattern(raw: &str, max_prefix_len: usize) -> Option<Pattern> {
    if raw == "*" {
        return Some(Pattern::All);
    }
    if let Some(prefix) = raw.strip_suffix("/*") {
        return if prefix.len() > max_prefix_len {
            None
        } else {
            Some(Pattern::Prefix(prefix.to_string()))
        };
    }
    Some(Pattern::Exact(raw.to_string()))
}

/// Split a comma-separated `event.topics` value into trimmed, deduplicated
/// patterns. Patterns that fail to parse (over-long prefix) are dropped;
/// the caller is expected to log that separately.
#[must_use]
pub fn parse_topics(raw: &str, max_prefix_len: usize) -> Vec<Pattern> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert((*s).to_string()))
        .filter_map(|s| parse_pattern(s, max_prefix_len))
        .collect()
}

/// Whether `topic` is matched by the ancestor prefix `prefix` (i.e. `topic`
/// equals `prefix`, or `topic` starts with `prefix` followed by `/`).
#[must_use]
pub fn is_prefix_match(prefix: &str, topic: &str) -> bool {
    topic == prefix || topic.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Successive ancestor prefixes of `topic`, from the longest (`topic`
/// itself with its last segment stripped) down to the shortest (the first
/// segment). Walks the topic from its tail, stripping one `/`-delimited
/// segment at a time, matching the reference implementation's
/// truncate-at-`/` loop. Topics over `max_prefix_len` bytes yield no
/// candidates — the prefix phase is skipped entirely for them.
#[must_use]
pub fn ancestor_prefixes(topic: &str, max_prefix_len: usize) -> Vec<&str> {
    if topic.len() > max_prefix_len {
        return Vec::new();
    }
    let mut prefixes = Vec::new();
    let mut rest = topic;
    while let Some(idx) = rest.rfind('/') {
        rest = &rest[..idx];
        prefixes.push(rest);
    }
    prefixes
}
