// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction failures into miette diagnostics.
//!
//! Unknown keys are located in the TOML text they came from so the report
//! can point at the offending line, and a close valid key is offered when
//! one exists.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a valid key must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A problem with the loaded configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(taxsort::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted by the enclosing table.
        valid_keys: String,
        #[label("not a taxsort setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(taxsort::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A setting that has no usable default was left empty.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(taxsort::config::missing_key),
        help("set `{key}` in taxsort.toml or through its TAXSORT_ environment variable")
    )]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(taxsort::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(taxsort::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// The text of one TOML file that took part in loading.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub name: String,
    pub content: String,
}

impl ConfigSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    fn span_of(&self, table: &[String], key: &str) -> Option<(SourceSpan, NamedSource<String>)> {
        let offset = find_key_offset(&self.content, table, key)?;
        Some((
            SourceSpan::new(offset.into(), key.len()),
            NamedSource::new(&self.name, self.content.clone()),
        ))
    }
}

/// Converts every error carried by `err` into a [`ConfigError`].
///
/// `sources` are the TOML files that were merged; they are only used to
/// attach source spans.
pub fn figment_to_config_errors(err: figment::Error, sources: &[ConfigSource]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let table: Vec<String> = error.path.clone();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = source_for(&error, sources)
                        .and_then(|source| source.span_of(&table, field))
                        .map_or((None, None), |(span, src)| (Some(span), Some(src)));
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(actual, expected) => {
                    let key = table.join(".");
                    let located = table.split_last().and_then(|(last, parents)| {
                        source_for(&error, sources).and_then(|source| source.span_of(parents, last))
                    });
                    let (span, src) = located.map_or((None, None), |(span, src)| (Some(span), Some(src)));
                    ConfigError::InvalidType {
                        key,
                        detail: format!("found {actual}, expected {expected}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// The loaded file the error originated from, if it was a file at all.
fn source_for<'a>(error: &figment::error::Error, sources: &'a [ConfigSource]) -> Option<&'a ConfigSource> {
    let origin = match error.metadata.as_ref()?.source.as_ref()? {
        figment::Source::File(path) => path.display().to_string(),
        _ => return sources.first().filter(|s| s.name == "<inline>"),
    };
    sources.iter().find(|s| s.name == origin)
}

/// Byte offset of `key` inside the table named by `table`.
///
/// Table headers are tracked line by line, so a key is only matched while
/// the most recent `[header]` equals the dotted table path. An empty path
/// means the root table, before any header.
pub fn find_key_offset(content: &str, table: &[String], key: &str) -> Option<usize> {
    let wanted = table.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if current == wanted {
            let assigns = trimmed
                .strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if assigns {
                return Some(offset + indent);
            }
        }
        offset += line.len();
    }
    None
}

/// The valid key most similar to `unknown`, if it is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Renders each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn suggests_deployment_for_typo() {
        let valid = &["api_key", "endpoint", "deployment", "embedding_deployment"];
        assert_eq!(suggest_key("deploymnet", valid), Some("deployment".to_string()));
    }

    #[test]
    fn suggests_header_pages_dir() {
        let valid = &["header_pages_dir", "output_dir"];
        assert_eq!(
            suggest_key("header_page_dir", valid),
            Some("header_pages_dir".to_string())
        );
    }

    #[test]
    fn distant_typo_has_no_suggestion() {
        assert_eq!(suggest_key("zzzzzz", &["name", "log_level"]), None);
    }

    #[test]
    fn key_is_found_inside_its_table() {
        let content = "[agent]\nname = \"x\"\n\n[llm]\n  deploymnet = \"gpt-4o\"\n";
        let offset = find_key_offset(content, &path(&["llm"]), "deploymnet").unwrap();
        assert_eq!(&content[offset..offset + 10], "deploymnet");
    }

    #[test]
    fn same_key_in_another_table_is_skipped() {
        let content = "[merge]\nenabled = true\n[memory]\nenabled = false\n";
        let offset = find_key_offset(content, &path(&["memory"]), "enabled").unwrap();
        assert!(content[..offset].contains("[memory]"));
    }

    #[test]
    fn root_keys_stop_at_first_header() {
        let content = "[agent]\nname = \"x\"\n";
        assert!(find_key_offset(content, &[], "name").is_none());
        assert_eq!(find_key_offset("name = 1\n", &[], "name"), Some(0));
    }

    #[test]
    fn prefix_of_longer_key_does_not_match() {
        let content = "[llm]\ndeployment_name = \"x\"\n";
        assert!(find_key_offset(content, &path(&["llm"]), "deployment").is_none());
    }

    #[test]
    fn missing_table_has_no_offset() {
        let content = "[agent]\nname = \"x\"\n";
        assert!(find_key_offset(content, &path(&["merge"]), "output_dir").is_none());
    }
}
