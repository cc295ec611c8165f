//! First-run bootstrap: spec, clarifying questions and `SPEC.md`.

use anyhow::Result;
use minijinja::context;
use tracing::info;

use crate::core::backlog::append_unique_tasks;
use crate::core::types::{AnswerType, ClarifyingQuestion, ProjectSpec};
use crate::io::artifacts::write_spec_md;
use crate::io::backend::Backend;
use crate::io::human::Human;
use crate::io::prompt::PromptKind;
use crate::oracle::{Profile, SchemaKind};
use crate::session::Session;

/// Obtain the spec once. Later calls are no-ops.
///
/// Seeds the backlog and done criteria, asks unanswered clarifying
/// questions (optional ones are skipped in auto mode) and writes `SPEC.md`.
pub fn collect_spec<B: Backend, H: Human>(session: &mut Session<B, H>) -> Result<()> {
    if session.state.spec.is_some() {
        return Ok(());
    }

    let prompt = session.oracle.prompts().render(
        PromptKind::Spec,
        context! { goal => session.state.goal },
    )?;
    let spec: ProjectSpec = session.oracle.propose(
        "Collecting spec",
        SchemaKind::ProjectSpec,
        &prompt,
        Profile::Planning,
    )?;

    append_unique_tasks(&mut session.state.tasks, &spec.initial_tasks);
    session.state.done_criteria = spec.definition_of_done.clone();
    session.state.spec = Some(spec.clone());
    session.save()?;

    ask_clarifying_questions(session, &spec.clarifying_questions)?;
    session.save()?;

    let md = write_spec_md(
        &session.paths.spec_md_path,
        &session.state.goal,
        &spec,
        &session.state,
    )?;
    session.worklog.append("Collected spec", &md)?;
    info!(
        tasks = session.state.tasks.len(),
        answers = session.state.answers.len(),
        "wrote SPEC.md and initialized task list"
    );
    Ok(())
}

fn ask_clarifying_questions<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    questions: &[ClarifyingQuestion],
) -> Result<()> {
    if questions.is_empty() {
        return Ok(());
    }
    let listing = questions
        .iter()
        .map(|q| format!("- ({}) {}\n  why: {}", q.id, q.question, q.why))
        .collect::<Vec<_>>()
        .join("\n");
    session.human.panel("Clarifying questions", &listing);

    for question in questions {
        if session.state.answers.contains_key(&question.id) {
            continue;
        }
        if session.auto && !question.required {
            continue;
        }
        let answer = answer_question(&session.human, question)?;
        session.state.answers.insert(question.id.clone(), answer);
    }
    Ok(())
}

/// Ask one question according to its answer type.
///
/// Yes/no answers are stored as `yes`/`no`; a choice question without
/// choices is asked as free text.
pub fn answer_question<H: Human>(human: &H, question: &ClarifyingQuestion) -> Result<String> {
    let prompt = format!("[{}] {}", question.id, question.question);
    match question.answer_type {
        AnswerType::YesNo => {
            let yes = human.confirm(&prompt)?;
            Ok(if yes { "yes" } else { "no" }.to_string())
        }
        AnswerType::Choice if !question.choices.is_empty() => {
            human.choose(&prompt, &question.choices)
        }
        AnswerType::Choice | AnswerType::FreeText => human.ask_text(&prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::EntropicConfig;
    use crate::session::SessionOptions;
    use crate::test_support::{
        Reply, ScriptedBackend, ScriptedHuman, TestWorkspace, project_spec,
    };

    fn question(id: &str, answer_type: AnswerType, required: bool) -> ClarifyingQuestion {
        ClarifyingQuestion {
            id: id.to_string(),
            question: format!("{id}?"),
            why: "matters".to_string(),
            answer_type,
            choices: Vec::new(),
            required,
        }
    }

    fn session(
        ws: &TestWorkspace,
        replies: Vec<Reply>,
        answers: &[&str],
        auto: bool,
    ) -> Session<ScriptedBackend, ScriptedHuman> {
        Session::open(
            ws.root(),
            EntropicConfig::default(),
            ScriptedBackend::new(replies),
            ScriptedHuman::new(answers),
            &SessionOptions {
                goal: Some("Build a todo CLI".to_string()),
                auto,
                max_iters: None,
            },
        )
        .expect("session")
    }

    fn spec_with_questions() -> ProjectSpec {
        let mut choice = question("db", AnswerType::Choice, true);
        choice.choices = vec!["sqlite".to_string(), "postgres".to_string()];
        let mut spec = project_spec(&["Scaffold", "Add tests", "Scaffold"]);
        spec.clarifying_questions = vec![
            question("tests", AnswerType::YesNo, true),
            choice,
            question("style", AnswerType::FreeText, false),
        ];
        spec
    }

    #[test]
    fn collects_spec_answers_and_writes_spec_md() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(
            &ws,
            vec![Reply::json(&spec_with_questions())],
            &["Yes please", "2", "terse"],
            false,
        );
        collect_spec(&mut session).expect("collect");

        let state = &session.state;
        assert_eq!(state.tasks, vec!["Scaffold", "Add tests"]);
        assert_eq!(state.done_criteria, vec!["tests pass"]);
        assert_eq!(state.answers["tests"], "yes");
        assert_eq!(state.answers["db"], "postgres");
        assert_eq!(state.answers["style"], "terse");
        assert_eq!(session.human.panel_titles(), vec!["Clarifying questions"]);

        let md = ws.read_file("SPEC.md").expect("SPEC.md");
        assert!(md.contains("## Goal\nBuild a todo CLI"));
        assert!(md.contains("- db: postgres"));
        session.oracle.backend().assert_drained().expect("backend drained");
        session.human.assert_drained().expect("human drained");
    }

    #[test]
    fn auto_mode_skips_optional_questions() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(
            &ws,
            vec![Reply::json(&spec_with_questions())],
            &["n", "sqlite"],
            true,
        );
        collect_spec(&mut session).expect("collect");
        assert_eq!(session.state.answers["tests"], "no");
        assert_eq!(session.state.answers["db"], "sqlite");
        assert!(!session.state.answers.contains_key("style"));
        session.human.assert_drained().expect("human drained");
    }

    #[test]
    fn existing_spec_is_not_requested_again() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, Vec::new(), &[], false);
        session.state.spec = Some(project_spec(&["T1"]));
        collect_spec(&mut session).expect("collect");
        assert_eq!(session.oracle.call_count(), 0);
    }

    #[test]
    fn choice_without_choices_is_free_text() {
        let human = ScriptedHuman::new(&["whatever"]);
        let q = question("q", AnswerType::Choice, true);
        assert_eq!(answer_question(&human, &q).expect("answer"), "whatever");
        assert_eq!(human.asked(), vec!["[q] q?"]);
    }
}
