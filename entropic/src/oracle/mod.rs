//! Oracle adapter: structured proposals from an external backend.
//!
//! Every call renders a prompt, runs the backend against an embedded JSON
//! Schema, then extracts, normalizes, validates and deserializes the answer.
//! Malformed answers are retried with stricter instructions; answers that
//! parse but fail validation get one repair pass that resubmits only the
//! invalid JSON plus the validation errors. Backend failures propagate.
//!
//! Each call and attempt leaves its prompt, raw answer and backend log under
//! `.entropic/calls/<session>/<call>-<attempt>/`.

pub mod coerce;
pub mod schema;

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use minijinja::context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::backend::{Backend, BackendRequest, exec_and_read};
use crate::io::config::{OracleConfig, SamplingProfile};
use crate::io::paths::WorkspacePaths;
use crate::io::prompt::{PromptBuilder, PromptKind};

pub use schema::SchemaKind;

const JSON_ONLY_SUFFIX: &str = "Return ONLY a valid JSON object. If needed, reduce list sizes.";
const KEEP_SHORT_SUFFIX: &str = "Keep responses short: 6-8 items max, 1-2 short sentences per field.";
const RAW_PREVIEW_BYTES: usize = 4000;

/// Which sampling profile a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Low diversity; everything except risk registers.
    Planning,
    /// High diversity; risk registers only.
    Scan,
}

/// Why a single answer could not be accepted.
#[derive(Debug)]
enum AnswerError {
    /// Not JSON at all.
    Syntax(anyhow::Error),
    /// JSON that fails the schema or the typed shape.
    Invalid { json: String, errors: Vec<String> },
}

impl AnswerError {
    fn into_error(self) -> anyhow::Error {
        match self {
            AnswerError::Syntax(err) => err,
            AnswerError::Invalid { errors, .. } => {
                anyhow!("schema validation failed: {}", errors.join("; "))
            }
        }
    }
}

pub struct Oracle<B> {
    backend: B,
    workdir: PathBuf,
    schemas_dir: PathBuf,
    session_dir: PathBuf,
    config: OracleConfig,
    prompts: PromptBuilder,
    calls: Cell<u32>,
}

impl<B: Backend> Oracle<B> {
    pub fn new(
        backend: B,
        paths: &WorkspacePaths,
        config: OracleConfig,
        prompt_budget_bytes: usize,
        session: &str,
    ) -> Result<Self> {
        Ok(Self {
            backend,
            workdir: paths.root.clone(),
            schemas_dir: paths.schemas_dir.clone(),
            session_dir: paths.calls_dir.join(session),
            config,
            prompts: PromptBuilder::new(prompt_budget_bytes)?,
            calls: Cell::new(0),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Calls issued so far by this adapter.
    pub fn call_count(&self) -> u32 {
        self.calls.get()
    }

    /// Obtain a value of `kind` for `prompt`, retrying and repairing as needed.
    #[instrument(skip_all, fields(purpose = %purpose, schema = kind.name()))]
    pub fn propose<T: DeserializeOwned>(
        &self,
        purpose: &str,
        kind: SchemaKind,
        prompt: &str,
        profile: Profile,
    ) -> Result<T> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        let schema_path = self.write_schema(kind)?;
        let validator = kind.validator()?;
        let base = format!("{prompt}\n\n{JSON_ONLY_SUFFIX}");

        info!(call, purpose, schema = kind.name(), ?profile, "oracle call");
        let started = Instant::now();
        let mut last_error = None;
        let mut last_raw = String::new();
        for attempt in 1..=self.config.retries {
            let prompt = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}\n{KEEP_SHORT_SUFFIX}")
            };
            let label = format!("{call:03}-{attempt}");
            let raw = self
                .exec(&label, purpose, &prompt, &schema_path, self.profile(profile))
                .with_context(|| format!("oracle call {call} ({purpose})"))?;

            match parse_answer::<T>(kind, &validator, &raw) {
                Ok(value) => {
                    info!(call, attempt, elapsed_ms = elapsed_ms(started), "oracle call completed");
                    return Ok(value);
                }
                Err(AnswerError::Syntax(err)) => {
                    warn!(call, attempt, err = %err, "oracle answer is not JSON");
                    last_error = Some(err);
                }
                Err(AnswerError::Invalid { json, errors }) => {
                    warn!(call, attempt, errors = errors.len(), "oracle answer failed validation");
                    match self.repair::<T>(&label, purpose, kind, &validator, &schema_path, &json, &errors) {
                        Ok(value) => {
                            info!(call, attempt, elapsed_ms = elapsed_ms(started), "oracle answer repaired");
                            return Ok(value);
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
            }
            last_raw = raw;
        }

        let preview: String = last_raw.chars().take(RAW_PREVIEW_BYTES).collect();
        let cause = last_error.unwrap_or_else(|| anyhow!("no attempts were made"));
        Err(cause.context(format!(
            "{purpose}: failed to parse {} after {} attempts\nRaw:\n{preview}",
            kind.name(),
            self.config.retries
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn repair<T: DeserializeOwned>(
        &self,
        label: &str,
        purpose: &str,
        kind: SchemaKind,
        validator: &jsonschema::Validator,
        schema_path: &Path,
        invalid: &str,
        errors: &[String],
    ) -> Result<T> {
        let prompt = self.prompts.render(
            PromptKind::FixJson,
            context! {
                schema_name => kind.name(),
                hint => kind.hint(),
                errors => errors,
                invalid => invalid,
            },
        )?;
        let mut profile = self.config.planning.clone();
        profile.reasoning_effort = "low".to_string();
        let raw = self
            .exec(&format!("{label}-repair"), purpose, &prompt, schema_path, profile)
            .context("json repair pass")?;
        parse_answer::<T>(kind, validator, &raw).map_err(AnswerError::into_error)
    }

    fn exec(
        &self,
        label: &str,
        purpose: &str,
        prompt: &str,
        schema_path: &Path,
        profile: SamplingProfile,
    ) -> Result<String> {
        let dir = self.session_dir.join(label);
        fs::create_dir_all(&dir).with_context(|| format!("create call dir {}", dir.display()))?;
        let prompt_path = dir.join("prompt.md");
        fs::write(&prompt_path, prompt)
            .with_context(|| format!("write {}", prompt_path.display()))?;

        let request = BackendRequest {
            workdir: self.workdir.clone(),
            purpose: purpose.to_string(),
            prompt: prompt.to_string(),
            output_schema_path: schema_path.to_path_buf(),
            output_path: dir.join("output.json"),
            log_path: dir.join("backend.log"),
            profile,
            timeout: Duration::from_secs(self.config.timeout_secs),
            output_limit_bytes: self.config.output_limit_bytes,
        };
        debug!(label, "invoking backend");
        exec_and_read(&self.backend, &request)
    }

    fn profile(&self, profile: Profile) -> SamplingProfile {
        match profile {
            Profile::Planning => self.config.planning.clone(),
            Profile::Scan => self.config.scan.clone(),
        }
    }

    fn write_schema(&self, kind: SchemaKind) -> Result<PathBuf> {
        fs::create_dir_all(&self.schemas_dir)
            .with_context(|| format!("create {}", self.schemas_dir.display()))?;
        let path = self.schemas_dir.join(kind.file_name());
        fs::write(&path, kind.source()).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// The outermost `{...}` span of `raw`, or the trimmed text when there is none.
pub fn extract_json_object(raw: &str) -> &str {
    let text = raw.trim();
    if text.starts_with('{') && text.ends_with('}') {
        return text;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

fn parse_answer<T: DeserializeOwned>(
    kind: SchemaKind,
    validator: &jsonschema::Validator,
    raw: &str,
) -> std::result::Result<T, AnswerError> {
    let cleaned = extract_json_object(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|err| AnswerError::Syntax(anyhow!(err).context("parse oracle json")))?;
    let value = kind.coerce(value);
    let errors = schema::validation_errors(validator, &value);
    if !errors.is_empty() {
        return Err(AnswerError::Invalid {
            json: cleaned.to_string(),
            errors,
        });
    }
    serde_json::from_value(value).map_err(|err| AnswerError::Invalid {
        json: cleaned.to_string(),
        errors: vec![err.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DoneCheck, FileContent, StepPlan};
    use crate::test_support::{Reply, ScriptedBackend, TestWorkspace};

    fn oracle(ws: &TestWorkspace, replies: Vec<Reply>) -> Oracle<ScriptedBackend> {
        Oracle::new(
            ScriptedBackend::new(replies),
            &ws.paths,
            OracleConfig::default(),
            100_000,
            "session",
        )
        .expect("oracle")
    }

    #[test]
    fn extracts_json_from_chatter() {
        assert_eq!(extract_json_object("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(
            extract_json_object("Sure!\n```json\n{\"a\":{\"b\":2}}\n```"),
            "{\"a\":{\"b\":2}}"
        );
        assert_eq!(extract_json_object("no json"), "no json");
    }

    #[test]
    fn valid_answer_is_accepted_first_time() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(&ws, vec![Reply::raw("{\"content\":\"hello\"}")]);
        let fc: FileContent = oracle
            .propose("content", SchemaKind::FileContent, "write it", Profile::Planning)
            .expect("propose");
        assert_eq!(fc.content, "hello");
        assert_eq!(oracle.call_count(), 1);
        oracle.backend().assert_drained().expect("drained");

        let call_dir = ws.paths.calls_dir.join("session/001-1");
        let prompt = fs::read_to_string(call_dir.join("prompt.md")).expect("prompt");
        assert!(prompt.starts_with("write it"));
        assert!(prompt.ends_with(JSON_ONLY_SUFFIX));
        assert!(ws.paths.schemas_dir.join("file_content.schema.json").is_file());
    }

    #[test]
    fn loose_step_plan_is_coerced_before_validation() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(
            &ws,
            vec![Reply::raw(
                r#"Plan: {"objective":"Add tests","files":[{"file":"t.py"}],"cmds":[{"command":"pytest"}],"notes":"careful"}"#,
            )],
        );
        let plan: StepPlan = oracle
            .propose("plan", SchemaKind::StepPlan, "p", Profile::Planning)
            .expect("propose");
        assert_eq!(plan.step_goal, "Add tests");
        assert_eq!(plan.rationale, "careful");
        assert_eq!(plan.file_writes[0].path, "t.py");
        assert_eq!(plan.commands[0].purpose, "Run command");
        assert_eq!(plan.notes, vec!["careful"]);
        assert_eq!(plan.closes_task, None);
    }

    #[test]
    fn garbage_then_valid_retries_with_stricter_prompt() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(
            &ws,
            vec![
                Reply::raw("I cannot comply"),
                Reply::raw(r#"{"done":true,"rationale":"ok","remaining_gaps":[],"next_tasks":[]}"#),
            ],
        );
        let dc: DoneCheck = oracle
            .propose("done", SchemaKind::DoneCheck, "judge", Profile::Planning)
            .expect("propose");
        assert!(dc.done);

        let prompts = oracle.backend().prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains(KEEP_SHORT_SUFFIX));
        assert!(prompts[1].contains(KEEP_SHORT_SUFFIX));
        assert!(ws.paths.calls_dir.join("session/001-2/prompt.md").is_file());
    }

    #[test]
    fn invalid_answer_is_repaired_with_errors_and_payload() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(
            &ws,
            vec![
                Reply::raw(r#"{"done":"maybe","rationale":"r","remaining_gaps":[],"next_tasks":[]}"#),
                Reply::raw(r#"{"done":false,"rationale":"r","remaining_gaps":["x"],"next_tasks":[]}"#),
            ],
        );
        let dc: DoneCheck = oracle
            .propose("done", SchemaKind::DoneCheck, "judge", Profile::Planning)
            .expect("propose");
        assert_eq!(dc.remaining_gaps, vec!["x"]);

        let prompts = oracle.backend().prompts();
        assert!(prompts[1].contains("does NOT match schema DoneCheck"));
        assert!(prompts[1].contains("\"done\":\"maybe\""));
        assert!(!prompts[1].contains("judge"), "repair sees only the invalid output");
        assert!(ws.paths.calls_dir.join("session/001-1-repair").is_dir());
        oracle.backend().assert_drained().expect("drained");
    }

    #[test]
    fn exhausted_retries_report_raw_preview() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(&ws, vec![Reply::raw("nope"), Reply::raw("still nope")]);
        let err = oracle
            .propose::<FileContent>("content", SchemaKind::FileContent, "p", Profile::Planning)
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("failed to parse FileContent after 2 attempts"));
        assert!(msg.contains("still nope"));
    }

    #[test]
    fn backend_failure_propagates_without_retry() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(&ws, vec![Reply::fail("backend down"), Reply::raw("{}")]);
        let err = oracle
            .propose::<FileContent>("content", SchemaKind::FileContent, "p", Profile::Planning)
            .unwrap_err();
        assert!(format!("{err:#}").contains("backend down"));
        assert_eq!(oracle.backend().prompts().len(), 1);
    }

    #[test]
    fn call_counter_is_per_adapter() {
        let ws = TestWorkspace::new().expect("ws");
        let first = oracle(&ws, vec![Reply::raw("{\"content\":\"a\"}")]);
        let second = oracle(&ws, vec![Reply::raw("{\"content\":\"b\"}")]);
        let _: FileContent = first
            .propose("a", SchemaKind::FileContent, "p", Profile::Planning)
            .expect("first");
        let _: FileContent = second
            .propose("b", SchemaKind::FileContent, "p", Profile::Planning)
            .expect("second");
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 1);
    }

    #[test]
    fn scan_profile_is_forwarded() {
        let ws = TestWorkspace::new().expect("ws");
        let oracle = oracle(&ws, vec![Reply::raw("{\"risks\":[]}")]);
        let _: crate::core::types::RiskRegister = oracle
            .propose("scan", SchemaKind::RiskRegister, "p", Profile::Scan)
            .expect("propose");
        let profiles = oracle.backend().profiles();
        assert_eq!(profiles[0].reasoning_effort, "minimal");
    }
}
