//! Static per-model pricing.
//!
//! Cost accounting is advisory (budget gating and usage rows), so a
//! compiled-in table with a default tier is enough. Lookup order: exact
//! model id, then longest prefix, then the `*` default.

use crate::model::TokenUsage;
use std::collections::HashMap;
use std::sync::OnceLock;

/// USD per million tokens, input and output.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input as f64 / 1_000_000.0) * self.input_per_million
            + (usage.output as f64 / 1_000_000.0) * self.output_per_million
    }
}

pub struct PricingRegistry {
    table: HashMap<&'static str, ModelPricing>,
}

impl PricingRegistry {
    fn new() -> Self {
        let mut table = HashMap::new();
        table.insert("gpt-4o", ModelPricing::new(2.50, 10.00));
        table.insert("gpt-4o-mini", ModelPricing::new(0.15, 0.60));
        table.insert("gpt-4.1", ModelPricing::new(2.00, 8.00));
        table.insert("gpt-4.1-mini", ModelPricing::new(0.40, 1.60));
        table.insert("claude-sonnet", ModelPricing::new(3.00, 15.00));
        table.insert("claude-haiku", ModelPricing::new(0.80, 4.00));
        table.insert("claude-opus", ModelPricing::new(15.00, 75.00));
        table.insert("gemini-2.0-flash", ModelPricing::new(0.10, 0.40));
        table.insert("gemini-1.5-pro", ModelPricing::new(1.25, 5.00));
        // Default tier for unknown models; priced like a mid-tier model
        // so costs are never silently zero.
        table.insert("*", ModelPricing::new(1.00, 4.00));
        Self { table }
    }

    pub fn global() -> &'static PricingRegistry {
        static REGISTRY: OnceLock<PricingRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PricingRegistry::new)
    }

    /// Pricing for a model id. Exact match, then longest matching
    /// prefix, then the default tier.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        if let Some(p) = self.table.get(model) {
            return *p;
        }
        let mut best: Option<(&str, ModelPricing)> = None;
        for (&key, &pricing) in &self.table {
            if key != "*"
                && model.starts_with(key)
                && best.is_none_or(|(prev, _)| key.len() > prev.len())
            {
                best = Some((key, pricing));
            }
        }
        best.map(|(_, p)| p)
            .unwrap_or_else(|| self.table["*"])
    }

    pub fn cost_for(&self, model: &str, usage: TokenUsage) -> f64 {
        self.lookup(model).cost(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        let registry = PricingRegistry::global();
        let p = registry.lookup("gpt-4o-mini");
        assert_eq!(p.input_per_million, 0.15);
    }

    #[test]
    fn longest_prefix_beats_shorter() {
        let registry = PricingRegistry::global();
        // "gpt-4o-mini-2024-07-18" matches both "gpt-4o" and "gpt-4o-mini".
        let p = registry.lookup("gpt-4o-mini-2024-07-18");
        assert_eq!(p.input_per_million, 0.15);
    }

    #[test]
    fn unknown_model_gets_default_tier() {
        let registry = PricingRegistry::global();
        let p = registry.lookup("totally-unknown-model");
        assert_eq!(p.input_per_million, 1.00);
        assert_eq!(p.output_per_million, 4.00);
    }

    #[test]
    fn cost_scales_with_usage() {
        let pricing = ModelPricing::new(2.0, 10.0);
        let cost = pricing.cost(TokenUsage {
            input: 1_000_000,
            output: 500_000,
        });
        assert!((cost - 7.0).abs() < 1e-9);
    }
}
