//! Model pricing table (USD per 1M tokens).
//!
//! Unknown models fall back to the `default` row so their calls are tracked
//! rather than rejected.

/// Per-model pricing in USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// The pricing table. Update as providers change their rates.
const MODEL_PRICING: &[(&str, ModelPricing)] = &[
    // OpenAI
    (
        "gpt-4o-mini",
        ModelPricing {
            input_per_million: 0.150,
            output_per_million: 0.600,
        },
    ),
    (
        "gpt-4o",
        ModelPricing {
            input_per_million: 0.250,
            output_per_million: 1.000,
        },
    ),
    (
        "gpt-4-turbo",
        ModelPricing {
            input_per_million: 2.500,
            output_per_million: 10.000,
        },
    ),
    (
        "gpt-3.5-turbo",
        ModelPricing {
            input_per_million: 0.500,
            output_per_million: 1.500,
        },
    ),
    // Anthropic
    (
        "claude-3-haiku-20240307",
        ModelPricing {
            input_per_million: 0.250,
            output_per_million: 1.250,
        },
    ),
    (
        "claude-3-sonnet-20240229",
        ModelPricing {
            input_per_million: 3.000,
            output_per_million: 15.000,
        },
    ),
    (
        "claude-3-opus-20240229",
        ModelPricing {
            input_per_million: 15.000,
            output_per_million: 75.000,
        },
    ),
];

/// Fallback pricing for models not in the table.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_million: 1.000,
    output_per_million: 3.000,
};

/// Look up pricing for a model, falling back to [`DEFAULT_PRICING`].
pub fn pricing_for_model(model: &str) -> ModelPricing {
    MODEL_PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PRICING)
}

/// Cost in USD for a call to `model`.
pub fn calculate_cost(model: &str, input_tokens: usize, output_tokens: usize) -> f64 {
    let pricing = pricing_for_model(model);
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_pricing() {
        let p = pricing_for_model("gpt-4o-mini");
        assert_eq!(p.input_per_million, 0.150);
        assert_eq!(p.output_per_million, 0.600);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        assert_eq!(pricing_for_model("some-future-model"), DEFAULT_PRICING);
    }

    #[test]
    fn test_cost_calculation() {
        // 1M input + 1M output on gpt-4o-mini
        let cost = calculate_cost("gpt-4o-mini", 1_000_000, 1_000_000);
        assert!((cost - 0.750).abs() < 1e-9);

        // Unknown model: default pricing
        let cost = calculate_cost("mystery", 500_000, 0);
        assert!((cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        assert_eq!(calculate_cost("gpt-4o", 0, 0), 0.0);
    }
}
