//! Suggestion synthesis for validation failures (SPEC_FULL §4.5.2).
//!
//! `jsonschema`'s error messages are accurate but terse. This module
//! pattern-matches the rendered message text from a handful of common
//! failure shapes and turns each into one plain-English sentence aimed at
//! whoever is building the offending request, never echoing the raw
//! validator message back verbatim.

/// Build a one-sentence suggestion from a validator error's rendered
/// message and the instance path it occurred at. First matching heuristic
/// wins; falls back to a generic pointer at the offending path.
pub fn synthesize_suggestion(message: &str, instance_path: &str) -> String {
    let path = if instance_path.is_empty() { "the request" } else { instance_path };

    if let Some(name) = extract_quoted(message).filter(|_| message.contains("is a required property")) {
        return format!("add the required property \"{name}\" at {path}");
    }

    if message.contains("is not of type") {
        if let Some(expected) = after_marker(message, "is not of type") {
            return format!("change the value at {path} to type {expected}");
        }
    }

    if message.contains("does not match") {
        if let Some(pattern) = after_marker(message, "does not match") {
            return format!("change the value at {path} to match the pattern {pattern}");
        }
    }

    if message.contains("is less than the minimum") {
        if let Some(min) = after_marker(message, "is less than the minimum of") {
            return format!("increase the value at {path} to at least {min}");
        }
    }

    if message.contains("is greater than the maximum") {
        if let Some(max) = after_marker(message, "is greater than the maximum of") {
            return format!("decrease the value at {path} to at most {max}");
        }
    }

    if message.contains("is shorter than") {
        if let Some(min) = after_marker(message, "is shorter than") {
            return format!("lengthen the value at {path} to at least {min} characters");
        }
    }

    if message.contains("is longer than") {
        if let Some(max) = after_marker(message, "is longer than") {
            return format!("shorten the value at {path} to at most {max} characters");
        }
    }

    if message.contains("has too many items") || message.contains("has too few items") {
        return format!("adjust the number of items at {path} to fit the allowed range");
    }

    if message.contains("is not a") && (message.contains("\"date") || message.contains("\"uri") || message.contains("\"email")) {
        if let Some(format_name) = after_marker(message, "is not a") {
            return format!("change the value at {path} to a valid {format_name}");
        }
    }

    if message.contains("is not one of") {
        if let Some(choices) = after_marker(message, "is not one of") {
            return format!("choose one of the allowed values {choices} for {path}");
        }
    }

    if message.contains("Additional properties are not allowed") {
        if let Some(prop) = extract_parenthesized(message) {
            return format!("remove the unexpected property {prop} from {path}");
        }
        return format!("remove the unexpected properties from {path}");
    }

    format!("review the value at {path}")
}

fn extract_quoted(message: &str) -> Option<&str> {
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn extract_parenthesized(message: &str) -> Option<&str> {
    let start = message.find('(')?;
    let rest = &message[start..];
    let end = rest.find(')')?;
    Some(&rest[..=end])
}

fn after_marker<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    let idx = message.find(marker)?;
    let rest = message[idx + marker.len()..].trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.trim_end_matches('.'))
    }
}
