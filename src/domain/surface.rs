/// Normalize a free-text surface tag into a canonical token.
///
/// Lowercases, collapses whitespace runs into `_`, unifies the `,` and `/`
/// multi-value delimiters into `;` and trims surrounding underscores.
/// Returns `None` for missing input or input that normalizes to nothing.
pub fn normalize_surface(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    let mut normalized = String::with_capacity(raw.len());
    let mut in_whitespace = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            if !in_whitespace {
                normalized.push('_');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;

        match ch {
            ',' | '/' => normalized.push(';'),
            _ => normalized.push(ch),
        }
    }

    let trimmed = normalized.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a normalized surface into its `;`-delimited components.
pub fn surface_components(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(';').filter(|part| !part.is_empty())
}

/// Extract the value of `key` from an encoded `"key"=>"value"` tag blob.
///
/// The blob is a comma-separated list of quoted pairs, as produced by
/// ogr2ogr's `other_tags` field. `\"` and `\\` escapes are honored.
pub fn extract_tag(blob: &str, key: &str) -> Option<String> {
    let mut rest = blob;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            return None;
        }

        let (tag_key, after_key) = read_quoted(rest)?;
        let after_arrow = after_key.trim_start().strip_prefix("=>")?;
        let (tag_value, after_value) = read_quoted(after_arrow.trim_start())?;

        if tag_key == key {
            return Some(tag_value);
        }
        rest = after_value;
    }
}

/// Extract the raw `surface` value from an `other_tags` blob.
pub fn extract_surface(other_tags: &str) -> Option<String> {
    extract_tag(other_tags, "surface")
}

// Reads one double-quoted string at the start of `input`, returning the
// unescaped contents and the remainder after the closing quote.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(escaped);
            }
            '"' => return Some((value, &body[idx + 1..])),
            _ => value.push(ch),
        }
    }

    None
}
