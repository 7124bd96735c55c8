// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Identifier for a model the agent process can be switched to at runtime.
///
/// Carried as an opaque string on the wire; validity against the closed
/// model table is checked separately by [`resolve_model_id`] /
/// [`is_known_model`] rather than at construction, so a client can still be
/// told "model not allowed" instead of failing to deserialize at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in the closed short/long model table.
#[derive(Debug, Clone, Copy)]
struct ModelEntry {
    short: &'static str,
    long: &'static str,
}

/// The complete set of models this gateway knows how to switch an agent
/// process to. Closed: there is no mechanism for a deployment to add a
/// model id the gateway doesn't already know about.
const MODEL_TABLE: &[ModelEntry] = &[
    ModelEntry { short: "sonnet", long: "claude-sonnet-4-5" },
    ModelEntry { short: "opus", long: "claude-opus-4-1" },
    ModelEntry { short: "haiku", long: "claude-haiku-4-5" },
];

fn lookup(id: &str) -> Option<ModelEntry> {
    MODEL_TABLE.iter().copied().find(|e| e.short == id || e.long == id)
}

/// `true` if `id` (short or long form) appears in the closed model table.
pub fn is_known_model(id: &str) -> bool {
    lookup(id).is_some()
}

/// Resolve `id` to its long form. Unknown ids pass through unchanged --
/// this is the one place the closed table is deliberately permissive, so a
/// caller that only wants a canonical display form never has to special-
/// case an id the table doesn't recognise.
pub fn resolve_model_id(id: &str) -> String {
    lookup(id).map(|e| e.long.to_owned()).unwrap_or_else(|| id.to_owned())
}

/// Resolve `id` to its short form. Unknown ids pass through unchanged, same
/// rationale as [`resolve_model_id`].
pub fn to_short_model_id(id: &str) -> String {
    lookup(id).map(|e| e.short.to_owned()).unwrap_or_else(|| id.to_owned())
}

/// `(short, long)` pairs for every model in the table, for the
/// `available_models` listing.
pub fn model_table() -> Vec<(&'static str, &'static str)> {
    MODEL_TABLE.iter().map(|e| (e.short, e.long)).collect()
}

/// The set of models a gateway instance is willing to switch the agent to.
///
/// Always a subset of the closed [`MODEL_TABLE`] -- `setModel` never
/// accepts an id the table doesn't know, restricted or not.
#[derive(Debug, Clone)]
pub struct ModelAllowList {
    restriction: Option<Vec<ModelId>>,
}

impl ModelAllowList {
    pub fn new(allowed: Vec<ModelId>) -> Self {
        Self { restriction: Some(allowed) }
    }

    /// No further restriction beyond the closed table itself.
    pub fn unrestricted() -> Self {
        Self { restriction: None }
    }

    pub fn is_allowed(&self, model: &ModelId) -> bool {
        if !is_known_model(model.as_str()) {
            return false;
        }
        match &self.restriction {
            None => true,
            Some(list) => {
                let long = resolve_model_id(model.as_str());
                list.iter().any(|m| resolve_model_id(m.as_str()) == long)
            }
        }
    }

    /// `(short, long)` pairs this allow-list currently permits.
    pub fn entries(&self) -> Vec<(&'static str, &'static str)> {
        model_table().into_iter().filter(|(short, _)| self.is_allowed(&ModelId::new(*short))).collect()
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
