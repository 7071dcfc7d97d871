//! `@meta` directives attached to declarations
//!
//! A declaration picks up metadata from the comment directly before it (on any line)
//! and from a comment directly after it that starts on the same line:
//!
//! ```css
//! /* @meta {"spritesheet": {"include": false}} */
//! background: url('../images/a.png'); /* @meta {"spritesheet": {"include": true}} */
//! ```
//!
//! The trailing comment wins on key conflicts. Malformed JSON contributes nothing.

use crate::css::{Node, Rule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn meta_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"@meta\s*\{").expect("meta pattern is valid"))
}

/// Metadata resolved for one declaration.
///
/// Kept as a JSON object so unknown keys survive; [`DeclarationMeta::include`]
/// reads the one key the spriter acts on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationMeta(Map<String, Value>);

impl DeclarationMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Shallow merge: top-level keys of `other` replace existing ones.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// The `spritesheet.include` value, if one is set.
    ///
    /// A falsy `spritesheet` entry (e.g. `null` or `false`) counts as the include
    /// value itself; a truthy non-object entry carries no include value.
    pub fn include(&self) -> Option<&Value> {
        match self.0.get("spritesheet") {
            None => None,
            Some(Value::Object(sheet)) => sheet.get("include"),
            Some(other) if !is_truthy(other) => Some(other),
            Some(_) => None,
        }
    }
}

impl From<Map<String, Value>> for DeclarationMeta {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Whether a JSON value counts as true: `null`, `false`, `0` and `""` do not.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Locate the JSON object following `@meta` in a comment.
///
/// The object runs from the `{` to the first `}` that is not immediately followed by
/// another `}`, and may not cross a line break.
pub fn extract_meta_payload(comment: &str) -> Option<&str> {
    for found in meta_regex().find_iter(comment) {
        let open = found.end() - 1;
        if let Some(len) = closing_brace_len(&comment[open..]) {
            return Some(&comment[open..open + len]);
        }
    }
    None
}

/// Byte length of the candidate object at the start of `text`, including both braces.
fn closing_brace_len(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().skip(1).peekable();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => return None,
            '}' if chars.peek().map(|&(_, next)| next) != Some('}') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Parse the `@meta` directive of a comment.
///
/// Returns `None` when the comment has no directive and an empty map when the
/// directive is not a valid JSON object.
pub fn parse_meta_comment(comment: &str) -> Option<Map<String, Value>> {
    let payload = extract_meta_payload(comment)?;
    match serde_json::from_str::<Map<String, Value>>(payload) {
        Ok(map) => Some(map),
        Err(e) => {
            log::trace!("ignoring malformed @meta payload {payload:?}: {e}");
            Some(Map::new())
        }
    }
}

fn comment_meta(node: &Node) -> Option<Map<String, Value>> {
    node.as_comment().and_then(|c| parse_meta_comment(&c.comment))
}

/// Resolve the metadata for the node at `index` in `rule`.
///
/// Only indices strictly inside `1..rule.nodes.len()` are resolved; the first node
/// of a rule never carries metadata.
pub fn resolve_meta(rule: &Rule, index: usize) -> DeclarationMeta {
    let mut meta = DeclarationMeta::new();

    if index == 0 || index >= rule.nodes.len() {
        return meta;
    }

    let target = &rule.nodes[index];

    if let Some(before) = comment_meta(&rule.nodes[index - 1]) {
        meta.merge(before);
    }

    if let Some(after_node) = rule.nodes.get(index + 1) {
        if after_node.position().start.line == target.position().start.line {
            if let Some(after) = comment_meta(after_node) {
                meta.merge(after);
            }
        }
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;
    use serde_json::json;

    fn first_rule(css: &str) -> Rule {
        parse_stylesheet(css).stylesheet.rules.remove(0)
    }

    fn index_of_property(rule: &Rule, property: &str) -> usize {
        rule.nodes
            .iter()
            .position(|n| n.as_declaration().is_some_and(|d| d.property == property))
            .unwrap()
    }

    #[test]
    fn test_extract_payload_simple() {
        assert_eq!(
            extract_meta_payload(r#" @meta {"spritesheet": {"include": false}} "#),
            Some(r#"{"spritesheet": {"include": false}}"#)
        );
    }

    #[test]
    fn test_extract_payload_whitespace_and_trailing_text() {
        assert_eq!(extract_meta_payload("@meta{\"a\": 1} and more}"), Some("{\"a\": 1}"));
        assert_eq!(extract_meta_payload("@meta\n  {\"a\": 1}"), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_payload_stops_at_inner_brace() {
        // A nested object followed by more keys is cut short at its closing brace
        let comment = r#"@meta {"spritesheet": {"include": false}, "tag": 1}"#;
        assert_eq!(extract_meta_payload(comment), Some(r#"{"spritesheet": {"include": false}"#));
        assert_eq!(parse_meta_comment(comment), Some(Map::new()));
    }

    #[test]
    fn test_extract_payload_absent() {
        assert_eq!(extract_meta_payload(" plain comment "), None);
        assert_eq!(extract_meta_payload("@meta nothing"), None);
        // The object may not cross a line break
        assert_eq!(extract_meta_payload("@meta {\"a\":\n 1}"), None);
    }

    #[test]
    fn test_parse_meta_comment_malformed_json_is_empty() {
        assert_eq!(parse_meta_comment("@meta {spritesheet: nope}"), Some(Map::new()));
        assert_eq!(parse_meta_comment("no directive"), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(2)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn test_include_accessor() {
        let meta = DeclarationMeta::from(json!({"spritesheet": {"include": false}}).as_object().unwrap().clone());
        assert_eq!(meta.include(), Some(&json!(false)));

        let meta = DeclarationMeta::from(json!({"spritesheet": {}}).as_object().unwrap().clone());
        assert_eq!(meta.include(), None);

        let meta = DeclarationMeta::from(json!({"spritesheet": null}).as_object().unwrap().clone());
        assert_eq!(meta.include(), Some(&json!(null)));

        let meta = DeclarationMeta::from(json!({"spritesheet": 5}).as_object().unwrap().clone());
        assert_eq!(meta.include(), None);

        assert_eq!(DeclarationMeta::new().include(), None);
    }

    #[test]
    fn test_preceding_comment_several_lines_above() {
        let rule = first_rule(
            ".a {\n  color: red;\n  /* @meta {\"spritesheet\": {\"include\": false}} */\n\n\n  background: url(a.png);\n}",
        );
        let index = index_of_property(&rule, "background");
        let meta = resolve_meta(&rule, index);
        assert_eq!(meta.include(), Some(&json!(false)));
    }

    #[test]
    fn test_same_line_trailing_comment_overrides_preceding() {
        let rule = first_rule(
            ".a {\n  color: red;\n  /* @meta {\"tag\": 1, \"spritesheet\": {\"include\": false}} */\n  background: url(a.png); /* @meta {\"spritesheet\": {\"include\": true}} */\n}",
        );
        let index = index_of_property(&rule, "background");
        let meta = resolve_meta(&rule, index);
        assert_eq!(meta.include(), Some(&json!(true)));
        // Keys from the preceding comment that aren't overridden survive
        assert_eq!(meta.get("tag"), Some(&json!(1)));
    }

    #[test]
    fn test_trailing_comment_on_next_line_is_ignored() {
        let rule = first_rule(
            ".a {\n  color: red;\n  background: url(a.png);\n  /* @meta {\"spritesheet\": {\"include\": false}} */\n}",
        );
        let index = index_of_property(&rule, "background");
        assert!(resolve_meta(&rule, index).is_empty());
    }

    #[test]
    fn test_first_node_is_never_resolved() {
        let rule = first_rule(
            ".a { background: url(a.png); /* @meta {\"spritesheet\": {\"include\": false}} */ }",
        );
        assert!(resolve_meta(&rule, 0).is_empty());
        assert!(resolve_meta(&rule, 17).is_empty());
    }

    #[test]
    fn test_neighbouring_declarations_are_not_comments() {
        let rule = first_rule(".a { color: red; background: url(a.png); width: 1px; }");
        assert!(resolve_meta(&rule, 1).is_empty());
    }

    #[test]
    fn test_malformed_preceding_comment_contributes_nothing() {
        let rule = first_rule(
            ".a {\n  /* @meta {broken} */\n  background: url(a.png); /* @meta {\"spritesheet\": {\"include\": false}} */\n}",
        );
        let meta = resolve_meta(&rule, 1);
        assert_eq!(meta.include(), Some(&json!(false)));
    }
}
