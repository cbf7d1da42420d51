//! Repair passes for generated JSON.
//!
//! Generated output is not guaranteed to be well formed. Each pass is a pure
//! `&str -> String` function; [`parse_generated_deaths`] runs them in order
//! and defaults every element into a [`DeathRecord`].

use morgue_model::{DeathRecord, NOT_APPLICABLE, UNKNOWN};
use scraper::Html;
use serde_json::{Map, Value};

/// Remove a Markdown code fence (with optional language tag) around the
/// payload. Text without a fence is returned trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    let Some(start) = raw.find("```") else {
        return raw.trim().to_string();
    };
    let after = &raw[start + 3..];
    let body = match after.split_once('\n') {
        Some((tag, rest)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => after,
    };
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Cut the first top-level JSON array out of surrounding prose. An array
/// that never closes is returned through the end of the text.
pub fn extract_array_substring(raw: &str) -> String {
    let Some(start) = raw.find('[') else {
        return raw.trim().to_string();
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return raw[start..start + offset + 1].to_string();
                }
            }
            _ => {}
        }
    }
    raw[start..].trim_end().to_string()
}

/// Restore object braces the model dropped around array elements, e.g.
/// `["character": "A", "cause": "B", "character": "C", "cause": "D"]`.
///
/// Bare `"key": value` pairs are grouped into objects; a group ends at a
/// stray closing brace or when a key repeats. Elements that are already
/// objects pass through, with missing closing braces appended.
pub fn repair_missing_braces(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .map(|rest| rest.strip_suffix(']').unwrap_or(rest))
        .unwrap_or(trimmed);

    let mut elements: Vec<String> = Vec::new();
    let mut group: Vec<String> = Vec::new();
    let mut keys: Vec<String> = Vec::new();

    let flush = |group: &mut Vec<String>, keys: &mut Vec<String>, elements: &mut Vec<String>| {
        if !group.is_empty() {
            elements.push(format!("{{{}}}", group.join(",")));
            group.clear();
            keys.clear();
        }
    };

    for segment in split_top_level(inner) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        if segment.starts_with('{') {
            flush(&mut group, &mut keys, &mut elements);
            let missing = brace_balance(segment).max(0) as usize;
            elements.push(format!("{segment}{}", "}".repeat(missing)));
        } else if let Some(key) = pair_key(segment) {
            let (pair, closes) = match segment.strip_suffix('}') {
                Some(pair) if brace_balance(segment) < 0 => (pair.trim_end(), true),
                _ => (segment, false),
            };
            if keys.contains(&key) {
                flush(&mut group, &mut keys, &mut elements);
            }
            group.push(pair.to_string());
            keys.push(key);
            if closes {
                flush(&mut group, &mut keys, &mut elements);
            }
        } else {
            flush(&mut group, &mut keys, &mut elements);
            elements.push(segment.to_string());
        }
    }
    flush(&mut group, &mut keys, &mut elements);

    format!("[{}]", elements.join(","))
}

/// Run the repair chain over raw model output and default each element.
pub fn parse_generated_deaths(raw: &str) -> Result<Vec<DeathRecord>, String> {
    let candidate = extract_array_substring(&strip_code_fences(raw));

    let values: Vec<Value> = match serde_json::from_str(&candidate) {
        Ok(values) => values,
        Err(first) => serde_json::from_str(&repair_missing_braces(&candidate))
            .map_err(|_| format!("output is not a JSON array of deaths: {first}"))?,
    };

    Ok(values
        .iter()
        .filter_map(Value::as_object)
        .map(death_from_object)
        .collect())
}

fn death_from_object(object: &Map<String, Value>) -> DeathRecord {
    let text = |keys: &[&str], default: &str| {
        keys.iter()
            .find_map(|key| object.get(*key).and_then(value_text))
            .map(|value| decode_html_entities(&value))
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    DeathRecord {
        character: text(&["character", "name"], UNKNOWN),
        time_of_death: text(&["timeOfDeath", "time_of_death"], UNKNOWN),
        cause: text(&["cause"], UNKNOWN),
        killed_by: text(&["killedBy", "killed_by"], NOT_APPLICABLE),
        context: text(&["context"], ""),
        is_ambiguous: ["isAmbiguous", "is_ambiguous"]
            .iter()
            .find_map(|key| object.get(*key))
            .is_some_and(|value| match value {
                Value::Bool(flag) => *flag,
                Value::String(s) => s.eq_ignore_ascii_case("true"),
                _ => false,
            }),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode HTML entities (`&amp;`, `&#39;`, ...) by round-tripping through
/// the HTML parser.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    Html::parse_fragment(text)
        .root_element()
        .text()
        .collect::<String>()
}

/// Split on commas outside strings, objects and arrays. Unbalanced closers
/// never drive the depth negative.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                segments.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);
    segments
}

/// Opening minus closing braces outside strings.
fn brace_balance(text: &str) -> i64 {
    let mut balance = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => balance += 1,
            '}' => balance -= 1,
            _ => {}
        }
    }
    balance
}

/// Key of a `"key": value` segment.
fn pair_key(segment: &str) -> Option<String> {
    let rest = segment.strip_prefix('"')?;
    let end = rest.find('"')?;
    let (key, after) = rest.split_at(end);
    after[1..].trim_start().starts_with(':').then(|| key.to_string())
}
