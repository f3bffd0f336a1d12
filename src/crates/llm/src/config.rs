//! Provider selection and model tiering.
//!
//! Simple tasks run on cheap models, standard extraction on mid, complex
//! synthesis on expensive. Model names come from the environment with
//! per-provider defaults; unknown task labels fall back to the mid tier.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use tooling::env::get_env;

/// Model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Moonshot,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Moonshot => "moonshot",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Moonshot => "MOONSHOT_API_KEY",
        }
    }

    /// Read this provider's API key from the environment.
    pub fn api_key(&self) -> Result<String> {
        get_env(self.api_key_var())
            .ok_or_else(|| LlmError::ApiKeyNotFound(self.api_key_var().to_string()))
    }

    /// The first provider with a configured API key, in preference order.
    pub fn detect() -> Option<Provider> {
        [Provider::OpenAi, Provider::Anthropic, Provider::Moonshot]
            .into_iter()
            .find(|p| get_env(p.api_key_var()).is_some())
    }
}

/// Model cost/capability tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Cheap,
    Mid,
    Expensive,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Cheap => "cheap",
            ModelTier::Mid => "mid",
            ModelTier::Expensive => "expensive",
        }
    }
}

/// Map a task label to its tier. Unknown labels default to mid.
pub fn tier_for_task(task_type: &str) -> ModelTier {
    match task_type {
        // Cheap: simple classification, filtering, triage
        "triage" | "classification" | "dedupe_suggestion" | "extraction_draft"
        | "source_filtering" | "simple_extraction" | "regex_validation" | "intent_detection"
        | "query_generation" => ModelTier::Cheap,

        // Mid: standard extraction, entity linking
        "extraction" | "entity_linking" | "source_scoring" | "domain_scouting" => ModelTier::Mid,

        // Expensive: complex reasoning and synthesis
        "ontology_placement" | "contradiction_resolution" | "complex_disambiguation"
        | "multi_source_synthesis" | "evidence_synthesis" => ModelTier::Expensive,

        _ => ModelTier::Mid,
    }
}

/// Resolve the model name for a tier on a provider.
///
/// Overridable per tier via `<PROVIDER>_MODEL_CHEAP|MID|EXPENSIVE`.
pub fn model_for_tier(provider: Provider, tier: ModelTier) -> String {
    let (var, default) = match (provider, tier) {
        (Provider::OpenAi, ModelTier::Cheap) => ("OPENAI_MODEL_CHEAP", "gpt-4o-mini"),
        (Provider::OpenAi, ModelTier::Mid) => ("OPENAI_MODEL_MID", "gpt-4o"),
        (Provider::OpenAi, ModelTier::Expensive) => ("OPENAI_MODEL_EXPENSIVE", "gpt-4-turbo"),
        (Provider::Anthropic, ModelTier::Cheap) => {
            ("ANTHROPIC_MODEL_CHEAP", "claude-3-haiku-20240307")
        }
        (Provider::Anthropic, ModelTier::Mid) => {
            ("ANTHROPIC_MODEL_MID", "claude-3-sonnet-20240229")
        }
        (Provider::Anthropic, ModelTier::Expensive) => {
            ("ANTHROPIC_MODEL_EXPENSIVE", "claude-3-opus-20240229")
        }
        (Provider::Moonshot, ModelTier::Cheap) => ("MOONSHOT_MODEL_CHEAP", "moonshot-v1-8k"),
        (Provider::Moonshot, ModelTier::Mid) => ("MOONSHOT_MODEL_MID", "moonshot-v1-32k"),
        (Provider::Moonshot, ModelTier::Expensive) => {
            ("MOONSHOT_MODEL_EXPENSIVE", "moonshot-v1-128k")
        }
    };
    get_env(var).unwrap_or_else(|| default.to_string())
}

/// Default (untired) model for a provider, overridable via `<PROVIDER>_MODEL`.
pub fn default_model(provider: Provider) -> String {
    let (var, default) = match provider {
        Provider::OpenAi => ("OPENAI_MODEL", "gpt-4o-mini"),
        Provider::Anthropic => ("ANTHROPIC_MODEL", "claude-3-haiku-20240307"),
        Provider::Moonshot => ("MOONSHOT_MODEL", "moonshot-v1-8k"),
    };
    get_env(var).unwrap_or_else(|| default.to_string())
}
