//! Address normalization across provider encodings.
//!
//! Providers encode correspondents three different ways: bare
//! comma-separated strings, structured (address, name) pairs, and
//! RFC-2822-ish address lists that mix both. These helpers reduce all of
//! them to plain address strings.

/// Split a comma-separated address field into trimmed, non-empty tokens.
///
/// Display names are kept in the tokens as posted; providers that want them
/// stripped go through [`extract_addresses`] instead.
pub fn split_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render a structured (address, name) pair as a single address string.
///
/// The display name is always double-quoted, even when it contains nothing
/// special; downstream mail libraries depend on the exact `"name" <addr>`
/// shape.
pub fn format_pair(address: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("\"{name}\" <{address}>"),
        _ => address.to_string(),
    }
}

/// Extract bare addresses from an RFC-2822-ish address list.
///
/// Tolerates mixed bare/display-name entries, quoted display names that
/// contain commas, and an unterminated final angle bracket (seen in real
/// payloads). Tokens without an `@` are dropped; ordering and address case
/// are preserved. Unquoted display names containing commas are resolved
/// heuristically: the name fragment before the comma carries no `@` and
/// falls away on its own.
pub fn extract_addresses(raw: &str) -> Vec<String> {
    split_outside_quotes(raw)
        .iter()
        .filter_map(|token| extract_address(token))
        .collect()
}

/// Split on commas that sit outside double quotes and angle brackets.
fn split_outside_quotes(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                tokens.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    tokens.push(current);
    tokens
}

/// Pull the address out of one list token, if it carries one.
fn extract_address(token: &str) -> Option<String> {
    let token = token.trim();

    if let Some(start) = token.rfind('<') {
        let rest = &token[start + 1..];
        let inner = match rest.find('>') {
            Some(end) => &rest[..end],
            // unterminated bracket: take everything after '<'
            None => rest,
        };
        let inner = inner.trim();
        return inner.contains('@').then(|| inner.to_string());
    }

    let bare = token.trim_matches('"').trim();
    bare.contains('@').then(|| bare.to_string())
}
