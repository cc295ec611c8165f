//! Embedded JSON Schemas for oracle answers.

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::{Value, json};

use crate::oracle::coerce::coerce_step_plan;

const PROJECT_SPEC_SCHEMA: &str = include_str!("../../schemas/project_spec.schema.json");
const RISK_REGISTER_SCHEMA: &str = include_str!("../../schemas/risk_register.schema.json");
const STEP_PLAN_SCHEMA: &str = include_str!("../../schemas/step_plan.schema.json");
const FILE_CONTENT_SCHEMA: &str = include_str!("../../schemas/file_content.schema.json");
const DONE_CHECK_SCHEMA: &str = include_str!("../../schemas/done_check.schema.json");

/// Shape the oracle is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    ProjectSpec,
    RiskRegister,
    StepPlan,
    FileContent,
    DoneCheck,
}

impl SchemaKind {
    pub fn name(self) -> &'static str {
        match self {
            SchemaKind::ProjectSpec => "ProjectSpec",
            SchemaKind::RiskRegister => "RiskRegister",
            SchemaKind::StepPlan => "StepPlan",
            SchemaKind::FileContent => "FileContent",
            SchemaKind::DoneCheck => "DoneCheck",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            SchemaKind::ProjectSpec => "project_spec.schema.json",
            SchemaKind::RiskRegister => "risk_register.schema.json",
            SchemaKind::StepPlan => "step_plan.schema.json",
            SchemaKind::FileContent => "file_content.schema.json",
            SchemaKind::DoneCheck => "done_check.schema.json",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            SchemaKind::ProjectSpec => PROJECT_SPEC_SCHEMA,
            SchemaKind::RiskRegister => RISK_REGISTER_SCHEMA,
            SchemaKind::StepPlan => STEP_PLAN_SCHEMA,
            SchemaKind::FileContent => FILE_CONTENT_SCHEMA,
            SchemaKind::DoneCheck => DONE_CHECK_SCHEMA,
        }
    }

    pub fn validator(self) -> Result<Validator> {
        let schema: Value = serde_json::from_str(self.source())
            .with_context(|| format!("parse embedded schema {}", self.name()))?;
        validator_for(&schema).map_err(|err| anyhow!("invalid schema {}: {}", self.name(), err))
    }

    /// Normalize loosely shaped answers. Only step plans have known aliases.
    pub fn coerce(self, value: Value) -> Value {
        match self {
            SchemaKind::StepPlan => coerce_step_plan(value),
            _ => value,
        }
    }

    /// Compact example or schema text shown to the JSON repair pass.
    pub fn hint(self) -> String {
        match self {
            SchemaKind::StepPlan => serde_json::to_string_pretty(&json!({
                "step_goal": "Concise goal",
                "rationale": "Why this step is needed",
                "file_writes": [{"path": "path/to/file.ext", "content": "", "mode": "overwrite"}],
                "commands": [{"cmd": "python -m pytest", "purpose": "Run tests", "timeout_sec": 300}],
                "expected_outcomes": ["What should be true after the step"],
                "new_tasks": [],
                "notes": [],
            }))
            .unwrap_or_default(),
            _ => self.source().chars().take(3000).collect(),
        }
    }
}

/// Validation messages for `value`; empty when valid.
pub fn validation_errors(validator: &Validator, value: &Value) -> Vec<String> {
    if validator.is_valid(value) {
        return Vec::new();
    }
    validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SchemaKind; 5] = [
        SchemaKind::ProjectSpec,
        SchemaKind::RiskRegister,
        SchemaKind::StepPlan,
        SchemaKind::FileContent,
        SchemaKind::DoneCheck,
    ];

    #[test]
    fn embedded_schemas_compile() {
        for kind in ALL {
            kind.validator().expect(kind.name());
            assert!(kind.file_name().ends_with(".schema.json"));
        }
    }

    #[test]
    fn schemas_reject_extra_keys_and_bad_enums() {
        let validator = SchemaKind::DoneCheck.validator().expect("validator");
        let ok = json!({"done": false, "rationale": "r", "remaining_gaps": [], "next_tasks": []});
        assert!(validation_errors(&validator, &ok).is_empty());

        let mut extra = ok.clone();
        extra["verdict"] = json!("?");
        assert!(!validation_errors(&validator, &extra).is_empty());

        let validator = SchemaKind::RiskRegister.validator().expect("validator");
        let bad = json!({"risks": [{
            "id": "R1", "area": "a", "title": "t", "description": "d",
            "severity": "extreme", "confidence": 1.5, "signals": [],
            "resolution_modes": [], "user_questions": [], "suggested_experiments": []
        }]});
        assert!(validation_errors(&validator, &bad).len() >= 2);
    }

    #[test]
    fn step_plan_hint_is_canonical() {
        let hint: Value = serde_json::from_str(&SchemaKind::StepPlan.hint()).expect("json");
        let validator = SchemaKind::StepPlan.validator().expect("validator");
        assert!(validation_errors(&validator, &hint).is_empty());
    }
}
