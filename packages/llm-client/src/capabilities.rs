//! Per-model request parameter quirks.
//!
//! Newer reasoning models reject some request parameters that older chat
//! models require. The table is built once at startup and handed to the
//! client, so nothing here is global or mutable.

/// Read-only table of model-name prefixes with parameter restrictions.
#[derive(Debug, Clone)]
pub struct ModelCapabilities {
    /// Prefixes of models that take `max_completion_tokens` instead of `max_tokens`.
    max_completion_tokens_prefixes: Vec<String>,
    /// Prefixes of models that reject a custom `temperature`.
    fixed_temperature_prefixes: Vec<String>,
}

impl ModelCapabilities {
    /// Build a capability table from explicit prefix lists.
    pub fn new(
        max_completion_tokens_prefixes: impl IntoIterator<Item = impl Into<String>>,
        fixed_temperature_prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            max_completion_tokens_prefixes: max_completion_tokens_prefixes
                .into_iter()
                .map(Into::into)
                .collect(),
            fixed_temperature_prefixes: fixed_temperature_prefixes
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }

    /// Check if a model requires `max_completion_tokens` instead of `max_tokens`.
    pub fn uses_max_completion_tokens(&self, model: &str) -> bool {
        matches_any(model, &self.max_completion_tokens_prefixes)
    }

    /// Check if a model accepts a caller-provided temperature.
    pub fn supports_temperature(&self, model: &str) -> bool {
        !matches_any(model, &self.fixed_temperature_prefixes)
    }
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self::new(["o1", "o3", "o4", "gpt-5"], ["o1", "o3", "o4", "gpt-5"])
    }
}

fn matches_any(model: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|p| model.starts_with(p.as_str()) || model.contains(&format!("-{}", p)))
}
