//! Literal placeholder substitution for run-script templates.

use serde::{Deserialize, Serialize};

/// The two placeholder roles a run-script template carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// Per-item input (raw item, derived path, or filter output).
    Source,
    /// Per-item result file the script must produce.
    Destination,
}

impl Placeholder {
    pub const ALL: [Placeholder; 2] = [Placeholder::Source, Placeholder::Destination];

    pub fn as_str(&self) -> &'static str {
        match self {
            Placeholder::Source => "source",
            Placeholder::Destination => "destination",
        }
    }
}

/// One token and the value that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub placeholder: Placeholder,
    pub token: String,
    pub value: String,
}

/// Resolved substitutions for a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitutions {
    entries: Vec<Substitution>,
}

impl Substitutions {
    pub fn new(entries: Vec<Substitution>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Substitution> {
        self.entries.iter()
    }

    pub fn value(&self, placeholder: Placeholder) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.placeholder == placeholder)
            .map(|entry| entry.value.as_str())
    }
}

/// Render `template` line by line.
///
/// Every non-overlapping token occurrence is replaced, scanning left to right.
/// Inserted values are never rescanned, so a value that happens to contain a
/// token is written verbatim. Lines without tokens (and all line endings) are
/// copied unchanged. When two tokens match at the same offset the longer wins.
pub fn render_template(template: &str, substitutions: &Substitutions) -> String {
    let mut rendered = String::with_capacity(template.len());
    for line in template.split_inclusive('\n') {
        render_line(line, substitutions, &mut rendered);
    }
    rendered
}

fn render_line(line: &str, substitutions: &Substitutions, out: &mut String) {
    let mut rest = line;
    while let Some((offset, entry)) = next_token(rest, substitutions) {
        out.push_str(&rest[..offset]);
        out.push_str(&entry.value);
        rest = &rest[offset + entry.token.len()..];
    }
    out.push_str(rest);
}

fn next_token<'a>(
    text: &str,
    substitutions: &'a Substitutions,
) -> Option<(usize, &'a Substitution)> {
    substitutions
        .iter()
        .filter(|entry| !entry.token.is_empty())
        .filter_map(|entry| text.find(entry.token.as_str()).map(|offset| (offset, entry)))
        .min_by(|(a_offset, a), (b_offset, b)| {
            a_offset
                .cmp(b_offset)
                .then_with(|| b.token.len().cmp(&a.token.len()))
        })
}

/// Placeholders whose token never appears in `template`.
pub fn missing_placeholders(template: &str, substitutions: &Substitutions) -> Vec<Placeholder> {
    substitutions
        .iter()
        .filter(|entry| !template.contains(entry.token.as_str()))
        .map(|entry| entry.placeholder)
        .collect()
}
