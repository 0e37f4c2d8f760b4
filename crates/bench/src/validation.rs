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

use std::collections::HashSet;

use crate::error::{BenchError, BenchResult};
use crate::model::{ExecutionRequest, VariationSpec};

/// Rejects structurally invalid submissions before any run record exists.
pub fn validate_request(request: &ExecutionRequest) -> BenchResult<()> {
    if request.run_name.trim().is_empty() {
        return Err(BenchError::InvalidRequest("run name is required".to_string()));
    }
    if request.base_prompt.trim().is_empty() {
        return Err(BenchError::InvalidRequest("base prompt is required".to_string()));
    }
    if request.configurations.is_empty() {
        return Err(BenchError::InvalidRequest(
            "at least one configuration is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in &request.configurations {
        validate_variation(spec)?;
        if !seen.insert(spec.name.trim()) {
            return Err(invalid(spec, "variation names must be unique within a run"));
        }
    }

    for tool in &request.tools {
        if tool.name.trim().is_empty() {
            return Err(BenchError::InvalidRequest(
                "tool declarations need a name".to_string(),
            ));
        }
    }

    Ok(())
}

pub fn validate_variation(spec: &VariationSpec) -> BenchResult<()> {
    if spec.name.trim().is_empty() {
        return Err(BenchError::InvalidConfiguration {
            variation: "<unnamed>".to_string(),
            reason: "variation name is required".to_string(),
        });
    }

    let settings = &spec.settings;
    if settings.model.trim().is_empty() {
        return Err(invalid(spec, "model name is required"));
    }

    let provider = settings.resolved_provider();
    let (min, max) = provider.temperature_range();
    if !settings.temperature.is_finite()
        || settings.temperature < min
        || settings.temperature > max
    {
        return Err(invalid(
            spec,
            &format!(
                "temperature {} is outside the supported range [{min}, {max}] for {provider}",
                settings.temperature
            ),
        ));
    }

    if let Some(top_p) = settings.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(invalid(spec, &format!("top_p {top_p} must be within [0, 1]")));
        }
    }
    if settings.max_tokens == Some(0) {
        return Err(invalid(spec, "max_tokens must be greater than zero"));
    }
    if settings.top_k == Some(0) {
        return Err(invalid(spec, "top_k must be greater than zero"));
    }

    Ok(())
}

fn invalid(spec: &VariationSpec, reason: &str) -> BenchError {
    BenchError::InvalidConfiguration {
        variation: spec.name.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::ModelSettings;

    fn request(configurations: Vec<VariationSpec>) -> ExecutionRequest {
        ExecutionRequest {
            run_name: "tone study".to_string(),
            description: String::new(),
            base_prompt: "Describe autumn.".to_string(),
            context: None,
            enable_function_calling: false,
            configurations,
            tools: Vec::new(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let specs = vec![
            VariationSpec::new("cool", ModelSettings::new("gpt-4o", 0.2)),
            VariationSpec::new("warm", ModelSettings::new("gpt-4o", 1.5)),
        ];
        assert!(validate_request(&request(specs)).is_ok());
    }

    #[test]
    fn test_missing_model_rejected() {
        let specs = vec![VariationSpec::new("blank", ModelSettings::new("  ", 0.5))];
        let err = validate_request(&request(specs)).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfiguration { ref variation, .. } if variation == "blank"));
    }

    #[test]
    fn test_missing_variation_name_rejected() {
        let specs = vec![VariationSpec::new("", ModelSettings::new("gpt-4o", 0.5))];
        assert!(matches!(
            validate_request(&request(specs)),
            Err(BenchError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_temperature_range_depends_on_provider() {
        let anthropic = VariationSpec::new("hot", ModelSettings::new("claude-3-5-sonnet", 1.5));
        assert!(validate_variation(&anthropic).is_err());

        let openai = VariationSpec::new("hot", ModelSettings::new("gpt-4o", 1.5));
        assert!(validate_variation(&openai).is_ok());

        let negative = VariationSpec::new("cold", ModelSettings::new("gpt-4o", -0.1));
        assert!(validate_variation(&negative).is_err());
    }

    #[test]
    fn test_empty_and_duplicate_configurations_rejected() {
        assert!(matches!(
            validate_request(&request(Vec::new())),
            Err(BenchError::InvalidRequest(_))
        ));

        let specs = vec![
            VariationSpec::new("same", ModelSettings::new("gpt-4o", 0.2)),
            VariationSpec::new("same", ModelSettings::new("gpt-4o", 0.8)),
        ];
        assert!(validate_request(&request(specs)).is_err());
    }

    #[test]
    fn test_top_p_and_max_tokens_bounds() {
        let mut settings = ModelSettings::new("gpt-4o", 0.5);
        settings.top_p = Some(1.2);
        assert!(validate_variation(&VariationSpec::new("p", settings.clone())).is_err());

        settings.top_p = Some(0.9);
        settings.max_tokens = Some(0);
        assert!(validate_variation(&VariationSpec::new("p", settings)).is_err());
    }
}
