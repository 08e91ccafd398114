//! Field-name auto-rewrite for the condition editor.
//!
//! Suggests replacing loosely written identifiers (`ticket_type`,
//! `TicketType`) with the known field paths of the project (`ticket.type`).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const RESERVED: &[&str] = &[
    "true", "false", "null", "in", "and", "or", "not", "undefined", "nan", "always",
];

/// Minimum similarity a candidate needs before it is rewritten.
const THRESHOLD: f64 = 0.65;

/// A field the editor knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownField {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl KnownField {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    fn variants(&self) -> Vec<String> {
        let mut out = Vec::new();
        for name in std::iter::once(&self.path).chain(&self.aliases) {
            for v in [name.clone(), name.replace('.', "_"), name.replace('_', ".")] {
                let v = v.trim().to_lowercase();
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteChange {
    pub from: String,
    pub to: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoRewrite {
    pub original: String,
    pub rewritten: String,
    pub changes: Vec<RewriteChange>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*").expect("identifier pattern"))
}

/// Byte ranges covered by quoted string literals, quotes included.
fn quoted_spans(expr: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    for (i, c) in expr.char_indices() {
        match open {
            Some((q, start)) if c == q => {
                spans.push((start, i + c.len_utf8()));
                open = None;
            }
            None if c == '\'' || c == '"' => open = Some((c, i)),
            _ => {}
        }
    }
    if let Some((_, start)) = open {
        spans.push((start, expr.len()));
    }
    spans
}

fn flatten(s: &str) -> String {
    s.chars().filter(|c| *c != '.' && *c != '_').collect()
}

fn last_segment(s: &str) -> &str {
    s.rsplit(['.', '_']).next().unwrap_or_default()
}

fn similarity(candidate: &str, field: &KnownField) -> f64 {
    let candidate = candidate.trim().to_lowercase();
    let variants = field.variants();

    if variants.contains(&candidate) {
        return 1.0;
    }
    let flat = flatten(&candidate);
    if variants.iter().any(|v| flatten(v) == flat) {
        return 0.9;
    }
    let last = last_segment(&candidate);
    if !last.is_empty() && variants.iter().any(|v| last_segment(v) == last) {
        return 0.7;
    }
    0.0
}

fn best_match(candidate: &str, fields: &[KnownField]) -> Option<RewriteChange> {
    if RESERVED.contains(&candidate.to_lowercase().as_str()) {
        return None;
    }
    let mut best: Option<(&KnownField, f64)> = None;
    for field in fields {
        let score = similarity(candidate, field);
        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((field, score));
        }
    }
    let (field, score) = best.filter(|(_, s)| *s >= THRESHOLD)?;
    Some(RewriteChange {
        from: candidate.to_string(),
        to: field.path.clone(),
        score,
    })
}

/// Propose a rewrite of `expression` against `known_fields`. Returns `None`
/// when no identifier would change.
pub fn auto_rewrite(expression: &str, known_fields: &[KnownField]) -> Option<AutoRewrite> {
    if expression.is_empty() || known_fields.is_empty() {
        return None;
    }

    let quoted = quoted_spans(expression);
    let candidates: Vec<(usize, usize, &str)> = identifier_pattern()
        .find_iter(expression)
        .filter(|m| !quoted.iter().any(|(s, e)| m.start() >= *s && m.start() < *e))
        .map(|m| (m.start(), m.end(), m.as_str()))
        .collect();

    let mut changes: Vec<RewriteChange> = Vec::new();
    for (_, _, token) in &candidates {
        let Some(change) = best_match(token, known_fields) else {
            continue;
        };
        if change.from == change.to {
            continue;
        }
        match changes
            .iter_mut()
            .find(|c| c.from == change.from && c.to == change.to)
        {
            Some(existing) => existing.score = existing.score.max(change.score),
            None => changes.push(change),
        }
    }
    if changes.is_empty() {
        return None;
    }

    let mut rewritten = expression.to_string();
    for (start, end, token) in candidates.iter().rev() {
        if let Some(change) = changes.iter().find(|c| c.from == *token) {
            rewritten.replace_range(*start..*end, &change.to);
        }
    }

    (rewritten != expression).then(|| AutoRewrite {
        original: expression.to_string(),
        rewritten,
        changes,
    })
}
