//! Disambiguation predicate.
//!
//! Only the page header is inspected: later sections routinely mention
//! remakes, sequels and originals sharing the title, which would let the
//! wrong work through.

/// Surnames this short are too common to identify a director on their own.
const MIN_SURNAME_CHARS: usize = 4;

/// True when the first `window` characters of `content` mention the release
/// year or a director name token. `director` may hold several comma-joined
/// names.
pub fn validate(content: &str, year: i32, director: &str, window: usize) -> bool {
    let header = header(content, window).to_lowercase();

    if year > 0 && header.contains(&year.to_string()) {
        return true;
    }

    director_tokens(director)
        .iter()
        .any(|token| header.contains(token.as_str()))
}

fn header(content: &str, window: usize) -> &str {
    match content.char_indices().nth(window) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Lowercased full names plus surnames long enough to be distinctive.
fn director_tokens(director: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for name in director.split(',').map(str::trim) {
        if name.is_empty() || name.eq_ignore_ascii_case(morgue_model::UNKNOWN) {
            continue;
        }
        let lowered = name.to_lowercase();
        if let Some(surname) = lowered.split_whitespace().last()
            && surname != lowered
            && surname.chars().count() >= MIN_SURNAME_CHARS
        {
            tokens.push(surname.to_string());
        }
        tokens.push(lowered);
    }
    tokens
}
