// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery of JSON from free-form model output.
//!
//! Models wrap JSON in prose or markdown fences despite instructions. The
//! parser tries an ordered list of [`ParseStrategy`] implementations and
//! returns the first one that yields an object or array. Strategies only
//! locate a candidate substring; malformed JSON is never repaired.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use taxsort_core::TaxsortError;

/// One way of locating JSON inside model output.
pub trait ParseStrategy: Send + Sync {
    /// Short name used in trace logs.
    fn name(&self) -> &'static str;

    /// Returns the structured value if this strategy finds one.
    fn extract(&self, raw: &str) -> Option<Value>;
}

/// Only objects and arrays count as structured output.
fn structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// A fenced block: the info string after the opening fence and its body.
struct Fence<'a> {
    tag: &'a str,
    body: &'a str,
}

/// Iterates over ```-fenced blocks in order of appearance.
///
/// The info string runs to the end of the opening line. A fence whose body
/// sits on the same line as both markers (```{"a":1}```) has an empty tag.
fn fences(raw: &str) -> impl Iterator<Item = Fence<'_>> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_open = &rest[open + 3..];
        let close = after_open.find("```")?;
        let inner = &after_open[..close];
        rest = &after_open[close + 3..];

        let fence = match inner.find('\n') {
            Some(newline) => {
                let tag = inner[..newline].trim();
                if tag.starts_with(['{', '[']) {
                    Fence { tag: "", body: inner }
                } else {
                    Fence {
                        tag,
                        body: &inner[newline + 1..],
                    }
                }
            }
            None => Fence { tag: "", body: inner },
        };
        Some(fence)
    })
}

/// The whole response is JSON.
pub struct DirectParse;

impl ParseStrategy for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn extract(&self, raw: &str) -> Option<Value> {
        structured(raw)
    }
}

/// A fence tagged `json` (or a `json`-prefixed variant such as `jsonc`).
pub struct TaggedFence;

impl ParseStrategy for TaggedFence {
    fn name(&self) -> &'static str {
        "tagged-fence"
    }

    fn extract(&self, raw: &str) -> Option<Value> {
        fences(raw)
            .filter(|f| f.tag.to_ascii_lowercase().starts_with("json"))
            .find_map(|f| structured(f.body))
    }
}

/// Any fence, tagged or not.
pub struct AnyFence;

impl ParseStrategy for AnyFence {
    fn name(&self) -> &'static str {
        "any-fence"
    }

    fn extract(&self, raw: &str) -> Option<Value> {
        fences(raw).find_map(|f| structured(f.body))
    }
}

/// From the first opening bracket to the last matching closer.
///
/// Whichever of `{` and `[` appears first is tried first; the other bracket
/// kind is the fallback.
pub struct BracketScan;

impl BracketScan {
    fn span(raw: &str, open: char, close: char) -> Option<&str> {
        let start = raw.find(open)?;
        let end = raw.rfind(close)?;
        (end > start).then(|| &raw[start..=end])
    }
}

impl ParseStrategy for BracketScan {
    fn name(&self) -> &'static str {
        "bracket-scan"
    }

    fn extract(&self, raw: &str) -> Option<Value> {
        let object = raw.find('{');
        let array = raw.find('[');
        let order = match (object, array) {
            (Some(o), Some(a)) if a < o => [('[', ']'), ('{', '}')],
            _ => [('{', '}'), ('[', ']')],
        };
        order
            .into_iter()
            .filter_map(|(open, close)| Self::span(raw, open, close))
            .find_map(structured)
    }
}

/// Ordered chain of strategies; the first success wins.
pub struct ResponseParser {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(DirectParse),
            Box::new(TaggedFence),
            Box::new(AnyFence),
            Box::new(BracketScan),
        ])
    }
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self { strategies }
    }

    /// Recovers an object or array from `raw`.
    pub fn parse(&self, raw: &str) -> Result<Value, TaxsortError> {
        for strategy in &self.strategies {
            match strategy.extract(raw) {
                Some(value) => {
                    debug!(strategy = strategy.name(), "parsed model output");
                    return Ok(value);
                }
                None => trace!(strategy = strategy.name(), "strategy found no JSON"),
            }
        }
        Err(TaxsortError::parse(
            "no JSON object or array found in model output",
            raw,
        ))
    }

    /// Parses and then validates the value into `T`.
    pub fn parse_as<T: DeserializeOwned>(&self, raw: &str) -> Result<T, TaxsortError> {
        let value = self.parse(raw)?;
        serde_json::from_value(value)
            .map_err(|e| TaxsortError::parse(format!("unexpected JSON shape: {e}"), raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn parse(raw: &str) -> Result<Value, TaxsortError> {
        ResponseParser::default().parse(raw)
    }

    #[test]
    fn direct_json() {
        assert_eq!(parse(r#"[{"id": 1}]"#).unwrap(), json!([{"id": 1}]));
        assert_eq!(parse("  {\"a\": true}\n").unwrap(), json!({"a": true}));
    }

    #[test]
    fn tagged_fence_with_prose() {
        let raw = "Here are the results:\n```json\n[{\"id\": 1, \"category_id\": 11}]\n```\nLet me know.";
        assert_eq!(parse(raw).unwrap(), json!([{"id": 1, "category_id": 11}]));
    }

    #[test]
    fn tagged_fence_is_case_insensitive() {
        let raw = "```JSON\n{\"ok\": 1}\n```";
        assert_eq!(parse(raw).unwrap(), json!({"ok": 1}));
    }

    #[test]
    fn tagged_fence_preferred_over_earlier_untagged_fence() {
        let raw = "```\n[1]\n```\nand\n```json\n[2]\n```";
        assert_eq!(TaggedFence.extract(raw), Some(json!([2])));
        assert_eq!(parse(raw).unwrap(), json!([2]));
    }

    #[test]
    fn untagged_fence() {
        let raw = "Result:\n```\n{\"understood_request\": \"x\"}\n```";
        assert_eq!(parse(raw).unwrap(), json!({"understood_request": "x"}));
    }

    #[test]
    fn inline_fence() {
        assert_eq!(parse("```{\"a\": 1}```").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn bracket_scan_with_surrounding_prose() {
        let raw = "Sure! {\"reclassifications\": []} Hope that helps.";
        assert_eq!(parse(raw).unwrap(), json!({"reclassifications": []}));
    }

    #[test]
    fn bracket_scan_prefers_earliest_bracket() {
        let raw = "Output: [{\"a\": 1}, {\"b\": 2}] done";
        assert_eq!(parse(raw).unwrap(), json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn bracket_scan_falls_back_to_other_kind() {
        // The `[` span is not valid JSON, the `{` span is.
        let raw = "note [see below] {\"a\": 1}";
        assert_eq!(BracketScan.extract(raw), Some(json!({"a": 1})));
    }

    #[test]
    fn scalars_are_not_structured_output() {
        assert!(parse("42").is_err());
        assert!(parse("\"just a string\"").is_err());
    }

    #[test]
    fn malformed_json_is_not_repaired() {
        let err = parse("```json\n[{\"id\": 1,}]\n```").unwrap_err();
        assert!(matches!(err, TaxsortError::Parse { .. }));
    }

    #[test]
    fn parse_error_carries_excerpt() {
        let raw = "I could not classify these documents.";
        match parse(raw).unwrap_err() {
            TaxsortError::Parse { excerpt, .. } => assert_eq!(excerpt, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn custom_strategy_order() {
        let parser = ResponseParser::with_strategies(vec![Box::new(DirectParse)]);
        assert!(parser.parse("```json\n[1]\n```").is_err());
        assert!(format!("{parser:?}").contains("direct"));
    }

    #[test]
    fn parse_as_validates_shape() {
        #[derive(serde::Deserialize)]
        struct Reply {
            understood_request: String,
        }
        let parser = ResponseParser::default();
        let reply: Reply = parser
            .parse_as("```json\n{\"understood_request\": \"move\"}\n```")
            .unwrap();
        assert_eq!(reply.understood_request, "move");
        assert!(parser.parse_as::<Reply>("[1, 2]").is_err());
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 äöü`{}\\[\\]]{0,12}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn clean_json_round_trips(value in json_value()) {
            prop_assume!(value.is_object() || value.is_array());
            let raw = serde_json::to_string(&value).unwrap();
            prop_assert_eq!(parse(&raw).unwrap(), value.clone());
            let pretty = serde_json::to_string_pretty(&value).unwrap();
            prop_assert_eq!(parse(&pretty).unwrap(), value);
        }
    }
}
