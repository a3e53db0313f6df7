//! `$name` / `${name}` placeholder substitution.
//!
//! Unknown placeholders are left untouched and `$$` collapses to a literal
//! `$`, so user-supplied templates never fail to render.

use std::collections::HashMap;

use regex::{Captures, Regex};

const PLACEHOLDER: &str = r"\$(?:(\$)|([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)\})";

/// Substitute known placeholders in `template`.
pub fn safe_substitute(template: &str, values: &HashMap<String, String>) -> String {
    let re = match Regex::new(PLACEHOLDER) {
        Ok(re) => re,
        Err(_) => return template.to_string(),
    };
    re.replace_all(template, |caps: &Captures| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let name = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
        match name.and_then(|n| values.get(n)) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_both_placeholder_forms() {
        let out = safe_substitute(
            "Previous: ${summary}\nNew: $new_lines",
            &vars(&[("summary", "s"), ("new_lines", "a\nb")]),
        );
        assert_eq!(out, "Previous: s\nNew: a\nb");
    }

    #[test]
    fn test_unknown_placeholders_survive() {
        let out = safe_substitute("$known and ${unknown} and $other", &vars(&[("known", "k")]));
        assert_eq!(out, "k and ${unknown} and $other");
    }

    #[test]
    fn test_escaped_dollar() {
        let out = safe_substitute("costs $$5 for $item", &vars(&[("item", "tea")]));
        assert_eq!(out, "costs $5 for tea");
    }

    #[test]
    fn test_indexed_names() {
        let out = safe_substitute(
            "${content_1} / ${content_2}",
            &vars(&[("content_1", "first"), ("content_2", "second")]),
        );
        assert_eq!(out, "first / second");
    }
}
