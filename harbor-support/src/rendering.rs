//! Text rendering utilities for human-friendly error messages.
//!
//! Formats resolution chains, trims type paths, and ranks registered
//! service names against a name that could not be found.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use harbor_support::rendering::render_chain;
///
/// let chain = ["service", "repo", "logger", "service"];
/// assert_eq!(render_chain(&chain), "service → repo → logger → service");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use harbor_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::clients::AuthClient"), "AuthClient");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn my_app::log::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '&' | '[' | ']' | ';' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Ranks `available` service names by similarity to `requested`.
///
/// Returns at most `max_suggestions` names, best match first. Matching is
/// case-insensitive even though service names themselves are not, since a
/// casing slip is the most common reason a lookup misses.
pub fn suggest_similar<'a>(
    requested: &str,
    available: impl IntoIterator<Item = &'a str>,
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .into_iter()
        .filter(|&name| name != requested)
        .filter_map(|name| {
            let name_lower = name.to_lowercase();

            if name_lower == requested_lower {
                return Some((name, 120));
            }

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if is_close(&requested_lower, &name_lower) {
                return Some((name, 90));
            }

            let common = name_lower
                .chars()
                .zip(requested_lower.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Cheap typo check: similar length and at least 60% of positions agree.
fn is_close(a: &str, b: &str) -> bool {
    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    if a_len.abs_diff(b_len) > 3 {
        return false;
    }

    let max_len = a_len.max(b_len);
    if max_len == 0 {
        return false;
    }

    let common = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    common * 100 / max_len >= 60
}
