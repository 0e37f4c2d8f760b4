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

pub mod scoring;

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::error::ComparisonError;
use crate::model::{ComparisonResult, ConfigurationScore, VariationResult};

pub use scoring::{standard_scorers, ScoreFn};

/// Ranks the successful variations of a run by a weighted sum of sub-scores.
pub struct Comparator {
    scorers: Vec<Box<dyn ScoreFn>>,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(standard_scorers())
    }
}

impl Comparator {
    pub fn new(scorers: Vec<Box<dyn ScoreFn>>) -> Self {
        Self { scorers }
    }

    pub fn score(&self, result: &VariationResult) -> ConfigurationScore {
        let mut metrics = BTreeMap::new();
        let mut overall = 0.0;
        for scorer in &self.scorers {
            let value = scorer.score(result);
            overall += scorer.weight() * value;
            metrics.insert(scorer.name().to_string(), value);
        }
        ConfigurationScore {
            configuration_id: result.configuration.id,
            configuration_name: result.configuration.name.clone(),
            metrics,
            overall_score: overall,
        }
    }

    pub fn compare(
        &self,
        run_id: Uuid,
        results: &[VariationResult],
    ) -> Result<ComparisonResult, ComparisonError> {
        if self.scorers.is_empty() {
            return Err(ComparisonError::NoScorers);
        }

        let candidates: Vec<&VariationResult> = results.iter().filter(|r| r.succeeded()).collect();
        if candidates.is_empty() {
            return Err(ComparisonError::NoSuccessfulResults);
        }

        let scored: Vec<(&VariationResult, ConfigurationScore)> =
            candidates.iter().map(|r| (*r, self.score(r))).collect();

        // Ties keep the earliest submitted variation.
        let mut best = &scored[0];
        for entry in &scored[1..] {
            if entry.1.overall_score > best.1.overall_score {
                best = entry;
            }
        }

        let analysis_notes = analysis_notes(&scored, best);
        debug!(
            run_id = %run_id,
            best = %best.1.configuration_name,
            overall = best.1.overall_score,
            "Comparison complete"
        );

        Ok(ComparisonResult {
            id: Uuid::new_v4(),
            run_id,
            best_configuration_id: best.1.configuration_id,
            scores: scored
                .iter()
                .map(|(_, score)| (score.configuration_id, score.clone()))
                .collect::<HashMap<_, _>>(),
            analysis_notes,
            created_at: Utc::now(),
        })
    }
}

fn analysis_notes(
    scored: &[(&VariationResult, ConfigurationScore)],
    best: &(&VariationResult, ConfigurationScore),
) -> String {
    let (_, winner) = best;
    let mut notes = vec![format!(
        "Best configuration: {} with an overall score of {:.3}.",
        winner.configuration_name, winner.overall_score
    )];

    let mut strengths: Vec<(&String, &f64)> = winner.metrics.iter().collect();
    strengths.sort_by(|a, b| b.1.total_cmp(a.1));
    let top: Vec<String> = strengths
        .iter()
        .take(2)
        .map(|(name, value)| format!("{} ({:.2})", name.replace('_', " "), value))
        .collect();
    if !top.is_empty() {
        notes.push(format!("Strongest metrics: {}.", top.join(", ")));
    }

    let mut fastest = &scored[0];
    for entry in &scored[1..] {
        if entry.0.response.latency_ms < fastest.0.response.latency_ms {
            fastest = entry;
        }
    }
    if fastest.1.configuration_id != winner.configuration_id {
        notes.push(format!(
            "Fastest response: {} ({} ms).",
            fastest.1.configuration_name, fastest.0.response.latency_ms
        ));
    }

    let creativity = |s: &ConfigurationScore| s.metrics.get(scoring::CREATIVITY).copied();
    let mut most_creative: Option<&ConfigurationScore> = None;
    for (_, score) in scored {
        if let Some(value) = creativity(score) {
            if most_creative
                .and_then(creativity)
                .map_or(true, |current| value > current)
            {
                most_creative = Some(score);
            }
        }
    }
    if let Some(creative) = most_creative {
        if creative.configuration_id != winner.configuration_id {
            notes.push(format!(
                "Most creative: {} (creativity {:.2}).",
                creative.configuration_name,
                creativity(creative).unwrap_or_default()
            ));
        }
    }

    notes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApiConfiguration, ApiRequest, ApiResponse, ResponseStatus, VariationSpec};
    use llm_contracts::{ModelSettings, Usage};

    fn result(
        name: &str,
        temperature: f32,
        text: &str,
        latency_ms: u64,
        status: ResponseStatus,
    ) -> VariationResult {
        let spec = VariationSpec::new(name, ModelSettings::new("gpt-4o", temperature));
        let configuration = ApiConfiguration::new(Uuid::nil(), &spec);
        let request = ApiRequest::new(&configuration, "prompt".to_string(), None);
        let response = ApiResponse {
            id: Uuid::new_v4(),
            request_id: request.id,
            status,
            text: text.to_string(),
            function_call: None,
            usage: Some(Usage::new(40, 60)),
            finish_reason: None,
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

    const TEXT: &str = "The committee reviewed the proposal and recorded its findings.";

    #[test]
    fn test_faster_variation_ranks_higher_on_response_time() {
        let comparator = Comparator::default();
        let slow = result("slow", 0.5, TEXT, 1450, ResponseStatus::Success);
        let fast = result("fast", 0.5, TEXT, 1380, ResponseStatus::Success);

        let comparison = comparator
            .compare(Uuid::nil(), &[slow.clone(), fast.clone()])
            .unwrap();
        let slow_score = &comparison.scores[&slow.configuration.id];
        let fast_score = &comparison.scores[&fast.configuration.id];
        assert!(fast_score.metrics[scoring::RESPONSE_TIME] > slow_score.metrics[scoring::RESPONSE_TIME]);
        assert_eq!(comparison.best_configuration_id, fast.configuration.id);
    }

    #[test]
    fn test_notes_mention_fastest_when_not_winner() {
        let comparator = Comparator::default();
        let creative = result("creative", 0.9, TEXT, 450, ResponseStatus::Success);
        let quick = result("quick", 0.1, TEXT, 380, ResponseStatus::Success);

        let comparison = comparator
            .compare(Uuid::nil(), &[creative.clone(), quick.clone()])
            .unwrap();

        let creative_score = &comparison.scores[&creative.configuration.id];
        let quick_score = &comparison.scores[&quick.configuration.id];
        assert_eq!(creative_score.metrics[scoring::RESPONSE_TIME], 1.0);
        assert_eq!(quick_score.metrics[scoring::RESPONSE_TIME], 1.0);

        assert_eq!(comparison.best_configuration_id, creative.configuration.id);
        assert!(comparison.analysis_notes.contains("Best configuration: creative"));
        assert!(comparison.analysis_notes.contains("Fastest response: quick (380 ms)"));
        assert!(!comparison.analysis_notes.contains("Most creative"));
    }

    #[test]
    fn test_failed_variations_are_not_candidates() {
        let comparator = Comparator::default();
        let failed = result("failed", 1.0, "", 10, ResponseStatus::Error);
        let ok = result("ok", 0.2, TEXT, 900, ResponseStatus::Success);

        let comparison = comparator
            .compare(Uuid::nil(), &[failed.clone(), ok.clone()])
            .unwrap();
        assert_eq!(comparison.best_configuration_id, ok.configuration.id);
        assert!(!comparison.scores.contains_key(&failed.configuration.id));

        assert_eq!(
            comparator.compare(Uuid::nil(), &[failed]).unwrap_err(),
            ComparisonError::NoSuccessfulResults
        );
    }

    #[test]
    fn test_custom_scorer_replaces_heuristics() {
        struct LengthScore;
        impl ScoreFn for LengthScore {
            fn name(&self) -> &'static str {
                "length"
            }
            fn weight(&self) -> f64 {
                1.0
            }
            fn score(&self, result: &VariationResult) -> f64 {
                result.response.text.len() as f64
            }
        }

        let comparator = Comparator::new(vec![Box::new(LengthScore)]);
        let short = result("short", 0.5, "abc", 100, ResponseStatus::Success);
        let long = result("long", 0.5, TEXT, 100, ResponseStatus::Success);
        let comparison = comparator.compare(Uuid::nil(), &[short, long.clone()]).unwrap();
        assert_eq!(comparison.best_configuration_id, long.configuration.id);
        assert!(comparison.analysis_notes.contains("length"));

        assert_eq!(
            Comparator::new(Vec::new())
                .compare(Uuid::nil(), &[long])
                .unwrap_err(),
            ComparisonError::NoScorers
        );
    }
}
