//! # Source Weights
//!
//! Trust weight per configured source, clamped to `[0.0, 1.0]`.
//!
//! - Built from the `[[sources]]` configuration table.
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - A source's display name acts as an alias of its id.
//! - Fallback order: id → alias (name) → `None` (caller applies the neutral default).

use std::collections::HashMap;

use crate::model::Source;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
    aliases: HashMap<String, String>,
    categories: HashMap<String, String>,
}

impl SourceWeights {
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> Self {
        let mut out = Self::default();
        for s in sources {
            let id = normalize(&s.id);
            out.weights.insert(id.clone(), clamp01(s.weight));
            if !s.category.is_empty() {
                out.categories.insert(id.clone(), s.category.clone());
            }
            let name = normalize(&s.name);
            if !name.is_empty() && name != id {
                out.aliases.insert(name, id);
            }
        }
        out
    }

    /// Weight for a source id or display name, if known.
    pub fn weight_for(&self, source: &str) -> Option<f64> {
        let s = normalize(source);
        if let Some(&w) = self.weights.get(&s) {
            return Some(w);
        }
        self.aliases
            .get(&s)
            .and_then(|canon| self.weights.get(canon))
            .copied()
    }

    /// Configured category of a source id, if any.
    pub fn category_for(&self, source: &str) -> Option<&str> {
        self.categories.get(&normalize(source)).map(String::as_str)
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clamp to [0.0, 1.0]; NaN maps to 0.
pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
