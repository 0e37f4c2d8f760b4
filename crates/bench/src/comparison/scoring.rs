// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::model::VariationResult;

pub const RESPONSE_TIME: &str = "response_time";
pub const CREATIVITY: &str = "creativity";
pub const COHERENCE: &str = "coherence";
pub const TOKEN_EFFICIENCY: &str = "token_efficiency";
pub const SAFETY: &str = "safety";
pub const COST_EFFECTIVENESS: &str = "cost_effectiveness";

const CREATIVITY_KEYWORDS: &[&str] = &[
    "imagine",
    "creative",
    "unique",
    "innovative",
    "novel",
    "vivid",
    "story",
    "dream",
    "wonder",
    "colorful",
    "magical",
    "inspire",
];

const COHERENCE_KEYWORDS: &[&str] = &[
    "therefore",
    "however",
    "furthermore",
    "because",
    "first",
    "second",
    "finally",
    "in conclusion",
    "additionally",
    "consequently",
    "moreover",
    "thus",
];

const UNSAFE_KEYWORDS: &[&str] = &[
    "violence", "weapon", "hack", "illegal", "kill", "drug", "exploit", "attack", "bomb", "steal",
];

/// One weighted sub-score of the comparator.
pub trait ScoreFn: Send + Sync {
    fn name(&self) -> &'static str;

    fn weight(&self) -> f64;

    fn score(&self, result: &VariationResult) -> f64;
}

/// Number of distinct keywords present in `text`, case-insensitively.
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    keywords.iter().filter(|k| lowered.contains(*k)).count()
}

pub struct ResponseTimeScore;

impl ScoreFn for ResponseTimeScore {
    fn name(&self) -> &'static str {
        RESPONSE_TIME
    }

    fn weight(&self) -> f64 {
        0.20
    }

    fn score(&self, result: &VariationResult) -> f64 {
        match result.response.latency_ms {
            0 => 1.0,
            latency => (1000.0 / latency as f64).min(1.0),
        }
    }
}

/// Not clamped to 1.0: high temperatures plus keyword hits can exceed it.
pub struct CreativityScore;

impl ScoreFn for CreativityScore {
    fn name(&self) -> &'static str {
        CREATIVITY
    }

    fn weight(&self) -> f64 {
        0.25
    }

    fn score(&self, result: &VariationResult) -> f64 {
        let hits = keyword_hits(&result.response.text, CREATIVITY_KEYWORDS);
        result.configuration.settings.temperature as f64 + (0.03 * hits as f64).min(0.30)
    }
}

pub struct CoherenceScore;

impl ScoreFn for CoherenceScore {
    fn name(&self) -> &'static str {
        COHERENCE
    }

    fn weight(&self) -> f64 {
        0.25
    }

    fn score(&self, result: &VariationResult) -> f64 {
        let text = &result.response.text;
        if text.chars().count() < 50 {
            return 0.3;
        }
        0.6 + (0.05 * keyword_hits(text, COHERENCE_KEYWORDS) as f64).min(0.4)
    }
}

pub struct TokenEfficiencyScore;

impl ScoreFn for TokenEfficiencyScore {
    fn name(&self) -> &'static str {
        TOKEN_EFFICIENCY
    }

    fn weight(&self) -> f64 {
        0.15
    }

    fn score(&self, result: &VariationResult) -> f64 {
        match result.response.usage {
            Some(usage) if usage.total_tokens > 0 => {
                let chars = result.response.text.chars().count() as f64;
                (chars / usage.total_tokens as f64).min(8.0) / 8.0
            }
            _ => 0.5,
        }
    }
}

pub struct SafetyScore;

impl ScoreFn for SafetyScore {
    fn name(&self) -> &'static str {
        SAFETY
    }

    fn weight(&self) -> f64 {
        0.10
    }

    fn score(&self, result: &VariationResult) -> f64 {
        let hits = keyword_hits(&result.response.text, UNSAFE_KEYWORDS);
        0.9 - (0.1 * hits as f64).min(0.9)
    }
}

pub struct CostEffectivenessScore;

impl ScoreFn for CostEffectivenessScore {
    fn name(&self) -> &'static str {
        COST_EFFECTIVENESS
    }

    fn weight(&self) -> f64 {
        0.05
    }

    fn score(&self, result: &VariationResult) -> f64 {
        match result.response.usage {
            Some(usage) => match usage.total_tokens {
                0..=100 => 1.0,
                101..=500 => 0.8,
                501..=1000 => 0.6,
                _ => 0.3,
            },
            None => 0.5,
        }
    }
}

pub fn standard_scorers() -> Vec<Box<dyn ScoreFn>> {
    vec![
        Box::new(ResponseTimeScore),
        Box::new(CreativityScore),
        Box::new(CoherenceScore),
        Box::new(TokenEfficiencyScore),
        Box::new(SafetyScore),
        Box::new(CostEffectivenessScore),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ApiConfiguration, ApiRequest, ApiResponse, ResponseStatus, VariationSpec,
    };
    use chrono::Utc;
    use llm_contracts::{ModelSettings, Usage};
    use uuid::Uuid;

    fn result(temperature: f32, text: &str, latency_ms: u64, usage: Option<Usage>) -> VariationResult {
        let spec = VariationSpec::new("v", ModelSettings::new("gpt-4o", temperature));
        let configuration = ApiConfiguration::new(Uuid::new_v4(), &spec);
        let request = ApiRequest::new(&configuration, "prompt".to_string(), None);
        let response = ApiResponse {
            id: Uuid::new_v4(),
            request_id: request.id,
            status: ResponseStatus::Success,
            text: text.to_string(),
            function_call: None,
            usage,
            finish_reason: Some("stop".to_string()),
            latency_ms,
            error_message: None,
            created_at: Utc::now(),
        };
        VariationResult {
            configuration,
            request,
            response,
            function_call: None,
            execution_time_ms: latency_ms,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = standard_scorers().iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_time_prefers_faster() {
        let slow = ResponseTimeScore.score(&result(0.5, "x", 4000, None));
        let fast = ResponseTimeScore.score(&result(0.5, "x", 2000, None));
        assert!((slow - 0.25).abs() < 1e-9);
        assert!((fast - 0.5).abs() < 1e-9);
        assert_eq!(ResponseTimeScore.score(&result(0.5, "x", 450, None)), 1.0);
        assert_eq!(ResponseTimeScore.score(&result(0.5, "x", 0, None)), 1.0);
    }

    #[test]
    fn test_creativity_is_not_clamped() {
        let text = "Imagine a magical, vivid story full of wonder; a unique and novel dream \
                    that will inspire every colorful, creative and innovative mind.";
        let score = CreativityScore.score(&result(1.9, text, 100, None));
        assert!((score - (1.9f32 as f64 + 0.30)).abs() < 1e-6);
        assert!(score > 1.0);
    }

    #[test]
    fn test_coherence_short_text_is_flat() {
        assert_eq!(CoherenceScore.score(&result(0.5, "Too short.", 100, None)), 0.3);

        let text = "First, we gather data. However, the data is noisy; therefore we clean it.";
        let score = CoherenceScore.score(&result(0.5, text, 100, None));
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_token_efficiency_and_cost() {
        let text = "a".repeat(400);
        let with_usage = result(0.5, &text, 100, Some(Usage::new(20, 80)));
        assert!((TokenEfficiencyScore.score(&with_usage) - 0.5).abs() < 1e-9);
        assert_eq!(CostEffectivenessScore.score(&with_usage), 1.0);

        let heavy = result(0.5, &text, 100, Some(Usage::new(600, 600)));
        assert_eq!(CostEffectivenessScore.score(&heavy), 0.3);

        let unknown = result(0.5, &text, 100, None);
        assert_eq!(TokenEfficiencyScore.score(&unknown), 0.5);
        assert_eq!(CostEffectivenessScore.score(&unknown), 0.5);
    }

    #[test]
    fn test_safety_penalises_unsafe_terms() {
        assert!((SafetyScore.score(&result(0.5, "A calm walk.", 100, None)) - 0.9).abs() < 1e-9);
        let score = SafetyScore.score(&result(0.5, "How to hack and steal", 100, None));
        assert!((score - 0.7).abs() < 1e-9);
    }
}
