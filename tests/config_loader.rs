// tests/config_loader.rs

mod common;
use crate::common::init_tracing;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use dagvisor::config::{
    default_workflow_path, load_and_validate, load_from_path, parse_and_validate, parse_duration,
};
use dagvisor::errors::DagvisorError;
use dagvisor::exec::{BackoffStrategy, EngineOptions};
use tempfile::tempdir;

const PIPELINE: &str = r#"
[workflow]
max_parallel = 2
stop_on_failure = true
sample_interval = "250ms"

[defaults]
timeout = "10m"
cwd = "/tmp"
env = { CI = "1", LEVEL = "default" }

[defaults.retry]
strategy = "exponential"
max_attempts = 4
base_delay = "500ms"
max_delay = "8s"

[task.fetch]
program = "git"
args = ["fetch", "--all"]
retry = { strategy = "none" }

[task.build]
cmd = "make -j4"
depends_on = ["fetch"]
env = { LEVEL = "build" }
timeout = "30s"

[task.test]
cmd = "make test SIZE=${matrix.size} MODE=${matrix.mode}"
after = ["build"]
matrix = { size = [1, 10], mode = ["a", "b"] }

[task.report]
cmd = "make report"
depends_on = ["test"]
run_always = true
skip_if = "build.status == skipped"
"#;

#[test]
fn full_document_is_loaded_and_validated() {
    init_tracing();
    let wf = parse_and_validate(PIPELINE).expect("valid workflow");

    assert_eq!(wf.settings.max_parallel, 2);
    assert!(wf.settings.stop_on_failure);
    assert_eq!(wf.settings.sample_interval, Duration::from_millis(250));

    let ids: Vec<&str> = wf.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["build", "fetch", "report", "test"], "sorted by id");

    let fetch = &wf.tasks()[1];
    assert_eq!(fetch.request.program, "git");
    assert_eq!(fetch.request.args, vec!["fetch", "--all"]);
    assert_eq!(fetch.request.effective_retry().strategy(), BackoffStrategy::None);
    assert_eq!(fetch.request.timeout, Some(Duration::from_secs(600)));

    let build = &wf.tasks()[0];
    assert_eq!(build.request.timeout, Some(Duration::from_secs(30)));
    assert_eq!(build.request.env.get("LEVEL").map(String::as_str), Some("build"));
    assert_eq!(build.request.env.get("CI").map(String::as_str), Some("1"));
    assert_eq!(build.request.working_dir, Some(PathBuf::from("/tmp")));
    let retry = build.request.effective_retry();
    assert_eq!(retry.strategy(), BackoffStrategy::Exponential);
    assert_eq!(retry.max_attempts(), 4);
    assert_eq!(retry.base_delay(), Duration::from_millis(500));
    assert_eq!(retry.max_delay(), Duration::from_secs(8));

    let report = &wf.tasks()[2];
    assert!(report.run_always);
    assert_eq!(
        report.skip_if.as_ref().map(|c| c.source.as_str()),
        Some("build.status == skipped")
    );
}

#[test]
fn document_builds_an_expanded_graph() {
    let wf = parse_and_validate(PIPELINE).unwrap();
    let graph = wf.build_graph().expect("graph builds");

    assert_eq!(graph.len(), 3 + 4);
    assert_eq!(graph.dependencies_of("report").len(), 4);
    let instance = graph.get("test[mode=b,size=10]").expect("matrix instance");
    assert_eq!(
        instance.request.args.last().map(String::as_str),
        Some("make test SIZE=10 MODE=b")
    );
    assert_eq!(graph.dependencies_of("test[mode=a,size=1]"), ["build".to_string()]);
    assert_eq!(graph.levels().len(), 4);

    let options: EngineOptions = wf.engine_options();
    assert_eq!(options.sample_interval, Duration::from_millis(250));
    assert_eq!(options.jitter_seed, None);
}

#[test]
fn minimal_document_uses_defaults() {
    let wf = parse_and_validate("[task.only]\ncmd = \"true\"\n").unwrap();
    assert_eq!(wf.settings.max_parallel, 4);
    assert!(!wf.settings.stop_on_failure);

    let only = &wf.tasks()[0];
    assert_eq!(only.request.timeout, None);
    assert_eq!(only.request.retry, None);
    assert_eq!(only.request.effective_retry().max_attempts(), 1);
}

#[test]
fn retry_defaults_fill_missing_fields() {
    let wf = parse_and_validate(
        r#"
[task.flaky]
cmd = "curl example.invalid"
retry = { strategy = "fibonacci" }
"#,
    )
    .unwrap();
    let retry = wf.tasks()[0].request.effective_retry();
    assert_eq!(retry.strategy(), BackoffStrategy::Fibonacci);
    assert_eq!(retry.max_attempts(), 3);
    assert_eq!(retry.base_delay(), Duration::from_secs(1));
}

fn config_error(doc: &str) -> DagvisorError {
    parse_and_validate(doc).expect_err("document should be rejected")
}

#[test]
fn invalid_documents_are_rejected() {
    let cases = [
        ("", "no tasks"),
        ("[task.a]\n", "no command"),
        ("[task.a]\ncmd = \"x\"\nprogram = \"y\"\n", "both cmd and program"),
        ("[task.a]\ncmd = \"x\"\nargs = [\"1\"]\n", "args with cmd"),
        ("[workflow]\nmax_parallel = 0\n[task.a]\ncmd = \"x\"\n", "zero parallelism"),
        ("[workflow]\nsample_interval = \"0ms\"\n[task.a]\ncmd = \"x\"\n", "zero interval"),
        ("[task.a]\ncmd = \"x\"\ntimeout = \"0s\"\n", "zero timeout"),
        ("[task.a]\ncmd = \"x\"\ntimeout = \"ten seconds\"\n", "bad duration"),
    ];
    for (doc, what) in cases {
        let err = config_error(doc);
        assert!(
            matches!(err, DagvisorError::ConfigError(_)),
            "{what}: got {err:?}"
        );
    }
}

#[test]
fn invalid_retry_and_condition_are_rejected() {
    let err = config_error("[task.a]\ncmd = \"x\"\nretry = { strategy = \"quadratic\" }\n");
    assert!(matches!(err, DagvisorError::InvalidRetryPolicy(_)), "{err:?}");

    let err = config_error(
        "[task.a]\ncmd = \"x\"\nretry = { strategy = \"linear\", max_attempts = 0 }\n",
    );
    assert!(
        matches!(err, DagvisorError::InvalidRetryPolicy(ref m) if m.contains("[task.a].retry"))
    );

    let err = config_error("[task.a]\ncmd = \"x\"\nskip_if = \"a.status ==\"\n");
    assert!(matches!(err, DagvisorError::InvalidCondition { .. }), "{err:?}");
}

#[test]
fn unknown_keys_are_toml_errors() {
    let err = config_error("[task.a]\ncmd = \"x\"\ncommand = \"y\"\n");
    assert!(matches!(err, DagvisorError::TomlError(_)), "{err:?}");

    let err = config_error("[workflow]\nparallel = 3\n[task.a]\ncmd = \"x\"\n");
    assert!(matches!(err, DagvisorError::TomlError(_)), "{err:?}");
}

#[test]
fn graph_errors_surface_from_build_graph() {
    let wf = parse_and_validate(
        r#"
[task.a]
cmd = "x"
depends_on = ["b"]

[task.b]
cmd = "y"
depends_on = ["a"]
"#,
    )
    .unwrap();
    let err = wf.build_graph().unwrap_err();
    assert!(err.is_graph_error());
    assert!(err.to_string().contains("Cycle detected"));
}

#[test]
fn load_from_disk() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Dagvisor.toml");
    fs::write(&path, PIPELINE).unwrap();

    let raw = load_from_path(&path).unwrap();
    assert_eq!(raw.task.len(), 4);
    assert_eq!(raw.workflow.max_parallel, Some(2));

    let wf = load_and_validate(&path).unwrap();
    assert_eq!(wf.tasks().len(), 4);

    let missing = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, DagvisorError::IoError(_)));

    assert_eq!(default_workflow_path(), PathBuf::from("Dagvisor.toml"));
}

#[test]
fn durations_parse_with_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration(" 10m "), Ok(Duration::from_secs(600)));
    assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    assert_eq!(parse_duration("5S"), Ok(Duration::from_secs(5)));

    for bad in ["", "10", "ms", "1.5s", "3 weeks", "-1s", "99999999999999999999h"] {
        assert!(parse_duration(bad).is_err(), "'{bad}' should be rejected");
    }
}
