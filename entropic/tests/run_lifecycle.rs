//! Loop-level harness tests for full `run_loop` scenarios.
//!
//! These tests drive a fresh workspace from goal to done verdict with a
//! scripted oracle and a scripted human, then check the persisted state and
//! the artifacts written along the way.

use entropic::core::state::HistoryEntry;
use entropic::core::types::{DoneCheck, FileContent, FileWrite, Risk, Severity, WriteMode};
use entropic::io::config::EntropicConfig;
use entropic::io::state_store::load_state;
use entropic::looping::{LoopStop, run_loop};
use entropic::session::{Session, SessionOptions};
use entropic::test_support::{
    Reply, ScriptedBackend, ScriptedHuman, TestWorkspace, project_spec, register, risk, step_plan,
};

fn timeouts() -> Risk {
    let mut r = risk("R2", "Timeouts");
    r.severity = Severity::High;
    r.user_questions = vec!["What timeout budget is acceptable?".to_string()];
    r
}

/// Full lifecycle: spec → scan → ask → implement → done.
///
/// Risk samples:
/// ```text
/// A: Cache invalidation (R1), Timeouts (R2, high, has a question)
/// B: cache invalidation
/// C: Cache Invalidation!
/// ```
///
/// Execution sequence:
/// 1. Bootstrap: spec with one task, three registers; only R2 disagrees enough
/// 2. Iter 1: ask about R2
/// 3. Iter 2: implement the task; file content is generated separately
/// 4. Iter 3: done check says done
#[test]
fn fresh_workspace_runs_to_done() {
    let ws = TestWorkspace::new().expect("ws");

    let mut step = step_plan("Write hello.txt");
    step.file_writes = vec![FileWrite {
        path: "hello.txt".to_string(),
        content: "TBD".to_string(),
        mode: WriteMode::Overwrite,
    }];
    let replies = vec![
        Reply::json(&project_spec(&["Write hello.txt"])),
        Reply::json(&register(vec![risk("R1", "Cache invalidation"), timeouts()])),
        Reply::json(&register(vec![risk("X1", "cache invalidation")])),
        Reply::json(&register(vec![risk("Y1", "Cache Invalidation!")])),
        Reply::json(&step),
        Reply::json(&FileContent {
            content: "hello\n".to_string(),
        }),
        Reply::json(&DoneCheck {
            done: true,
            rationale: "hello.txt exists".to_string(),
            remaining_gaps: Vec::new(),
            next_tasks: Vec::new(),
        }),
    ];

    let mut session = Session::open(
        ws.root(),
        EntropicConfig::default(),
        ScriptedBackend::new(replies),
        ScriptedHuman::new(&["30 seconds"]),
        &SessionOptions {
            goal: Some("Say hello".to_string()),
            auto: true,
            max_iters: Some(10),
        },
    )
    .expect("open");

    let outcome = run_loop(&mut session).expect("run");
    assert_eq!(outcome.iterations, 3);
    assert_eq!(
        outcome.stop,
        LoopStop::Done {
            rationale: "hello.txt exists".to_string()
        }
    );

    session.oracle.backend().assert_drained().expect("backend drained");
    session.human.assert_drained().expect("human drained");
    assert_eq!(
        session.oracle.backend().purposes(),
        vec![
            "Collecting spec",
            "Risk register sample 1/3",
            "Risk register sample 2/3",
            "Risk register sample 3/3",
            "Planning step for task: Write hello.txt",
            "Writing file content: hello.txt",
            "Done check",
        ]
    );

    assert_eq!(ws.read_file("hello.txt").expect("hello"), "hello\n");
    let risks_md = ws.read_file("RISKS.md").expect("RISKS.md");
    assert!(risks_md.contains("Timeouts (R2)"));
    assert!(ws.read_file("SPEC.md").expect("SPEC.md").contains("Say hello"));

    let state = load_state(&session.paths.state_path).expect("state");
    assert_eq!(state.iterations, 3);
    assert!(state.tasks.is_empty());
    assert_eq!(state.risks[0].id(), "R2");
    assert!(state.high_entropy_risk_ids.is_empty());
    assert_eq!(state.resolved_risk_ids, vec!["R2"]);
    assert!(matches!(
        &state.history[0],
        HistoryEntry::RiskUserAnswers { risk_id, answers }
            if risk_id == "R2" && answers[0].answer == "30 seconds"
    ));
    assert!(matches!(&state.history[1], HistoryEntry::Step { step, .. }
        if step.closes_task.as_deref() == Some("Write hello.txt")));

    let log = ws.read_file(".entropic/worklog.md").expect("worklog");
    let order = [
        "Collected spec",
        "Built risk register",
        "User input for risk R2: Timeouts",
        "Executed step: Write hello.txt",
        "Done check",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|title| log.find(title).unwrap_or_else(|| panic!("{title} logged")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

/// A resumed workspace keeps its spec and risks: no new spec or scan calls.
#[test]
fn resumed_workspace_skips_bootstrap() {
    let ws = TestWorkspace::new().expect("ws");
    let options = SessionOptions {
        goal: Some("Say hello".to_string()),
        auto: true,
        max_iters: Some(1),
    };

    let not_done = DoneCheck {
        done: false,
        rationale: "nothing yet".to_string(),
        remaining_gaps: vec!["no greeting".to_string()],
        next_tasks: vec!["Print hello".to_string()],
    };
    let mut first = Session::open(
        ws.root(),
        EntropicConfig::default(),
        ScriptedBackend::new(vec![
            Reply::json(&project_spec(&[])),
            Reply::json(&register(vec![risk("R1", "Encoding")])),
            Reply::json(&register(vec![risk("R1", "Encoding")])),
            Reply::json(&register(vec![risk("R1", "Encoding")])),
            Reply::json(&not_done),
        ]),
        ScriptedHuman::default(),
        &options,
    )
    .expect("open");
    let outcome = run_loop(&mut first).expect("first run");
    assert_eq!(outcome.stop, LoopStop::MaxIterations { max_iters: 1 });
    first.oracle.backend().assert_drained().expect("drained");
    let panels = first.human.panels();
    let (_, body) = panels
        .iter()
        .find(|(title, _)| title == "Done check")
        .expect("done check panel");
    assert_eq!(body, "done=false\n\nnothing yet\n\nRemaining gaps:\n- no greeting");
    drop(first);

    let mut resumed = Session::open(
        ws.root(),
        EntropicConfig::default(),
        ScriptedBackend::new(vec![
            Reply::json(&step_plan("Print hello")),
            Reply::json(&DoneCheck {
                done: true,
                rationale: "printed".to_string(),
                remaining_gaps: Vec::new(),
                next_tasks: Vec::new(),
            }),
        ]),
        ScriptedHuman::default(),
        &SessionOptions {
            goal: None,
            auto: true,
            max_iters: Some(5),
        },
    )
    .expect("resume");
    let outcome = run_loop(&mut resumed).expect("resumed run");
    assert_eq!(outcome.iterations, 2);
    assert!(matches!(outcome.stop, LoopStop::Done { .. }));
    assert_eq!(resumed.state.iterations, 3);
    resumed.oracle.backend().assert_drained().expect("drained");
}
