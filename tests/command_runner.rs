// tests/command_runner.rs
#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use batchdag::cli::CliArgs;
use batchdag::engine::{EXIT_SUCCESS, EXIT_TASK_FAILURE};
use batchdag::exec::{
    ClusterHint, CommandJobRunner, JobFailure, JobRequest, JobRunner, RunResult, ScriptJobRunner,
};
use batchdag::params::Parameters;
use batchdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn request(task_id: &str, pairs: &[(&str, &str)]) -> JobRequest {
    JobRequest {
        task_id: task_id.to_string(),
        parameters: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Parameters>(),
        cluster: None,
    }
}

#[tokio::test]
async fn command_success_and_crash_are_classified() -> TestResult {
    init_tracing();
    let ok = CommandJobRunner::new("true");
    assert_eq!(
        ok.run(&request("t", &[]), CancellationToken::new()).await,
        RunResult::Success
    );

    let crash = CommandJobRunner::new("echo boom >&2; exit 3");
    assert_eq!(
        crash.run(&request("t", &[]), CancellationToken::new()).await,
        RunResult::Failure(JobFailure::Crashed { exit_code: Some(3) })
    );
    Ok(())
}

#[tokio::test]
async fn command_placeholders_and_env_come_from_parameters() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let runner = CommandJobRunner::new("printf '%s' \"$GREETING\" > {FILE}").with_workdir(dir.path());
    assert_eq!(
        runner.required_parameters(),
        vec!["FILE".to_string()]
    );

    let req = request("t1", &[("FILE", "out.txt"), ("GREETING", "hello")]);
    assert!(runner.run(&req, CancellationToken::new()).await.is_success());
    assert_eq!(fs::read_to_string(dir.path().join("out.txt"))?, "hello");
    Ok(())
}

#[tokio::test]
async fn bound_command_runs_verbatim_and_leaves_shell_expansion_alone() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let runner = CommandJobRunner::bound("printf '%s|%s' \"${GREETING}\" '{x}' > out.txt")
        .with_workdir(dir.path());
    assert!(runner.required_parameters().is_empty());

    let req = request("t1", &[("GREETING", "hi {there}")]);
    assert!(runner.run(&req, CancellationToken::new()).await.is_success());
    assert_eq!(fs::read_to_string(dir.path().join("out.txt"))?, "hi {there}|{x}");
    Ok(())
}

#[tokio::test]
async fn shell_braces_are_not_placeholders() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let runner =
        CommandJobRunner::new("printf '%s' \"${GREETING}\" > {FILE}").with_workdir(dir.path());
    assert_eq!(runner.required_parameters(), vec!["FILE".to_string()]);

    let req = request("t1", &[("FILE", "out.txt"), ("GREETING", "{not-a-placeholder}")]);
    assert!(runner.run(&req, CancellationToken::new()).await.is_success());
    assert_eq!(
        fs::read_to_string(dir.path().join("out.txt"))?,
        "{not-a-placeholder}"
    );
    Ok(())
}

#[tokio::test]
async fn request_metadata_is_exported() -> TestResult {
    init_tracing();
    let local = CommandJobRunner::new(
        "test \"$BATCHDAG_TASK_ID\" = t1 && test \"$BATCHDAG_CLUSTER_SIZE\" = 0",
    );
    assert!(local
        .run(&request("t1", &[]), CancellationToken::new())
        .await
        .is_success());

    let remote = CommandJobRunner::new(
        "test \"$BATCHDAG_CLUSTER_ID\" = main && test \"$BATCHDAG_CLUSTER_SIZE\" = 4",
    );
    let mut req = request("t1", &[]);
    req.cluster = Some(ClusterHint {
        cluster: "main".to_string(),
        size: 4,
    });
    assert!(remote.run(&req, CancellationToken::new()).await.is_success());
    Ok(())
}

#[tokio::test]
async fn unknown_placeholder_is_rejected_without_spawning() -> TestResult {
    let runner = CommandJobRunner::new("echo {MISSING}");
    match runner.run(&request("t", &[]), CancellationToken::new()).await {
        RunResult::Failure(JobFailure::Rejected(msg)) => assert!(msg.contains("MISSING")),
        other => panic!("expected rejection, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn extra_required_keys_are_reported() -> TestResult {
    let runner = CommandJobRunner::new("cp {SRC} {DST}").with_required(["TOKEN".to_string()]);
    assert_eq!(
        runner.required_parameters(),
        vec!["DST".to_string(), "SRC".to_string(), "TOKEN".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn slow_command_times_out() -> TestResult {
    init_tracing();
    let runner = CommandJobRunner::new("sleep 5").with_timeout(Some(Duration::from_millis(100)));
    let result = with_timeout(runner.run(&request("slow", &[]), CancellationToken::new())).await;
    assert_eq!(
        result,
        RunResult::Failure(JobFailure::TimedOut(Duration::from_millis(100)))
    );
    Ok(())
}

#[tokio::test]
async fn cancellation_abandons_the_job() -> TestResult {
    init_tracing();
    let runner = CommandJobRunner::new("sleep 5");
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let req = request("slow", &[]);
    let result = with_timeout(runner.run(&req, token)).await;
    assert_eq!(result, RunResult::Failure(JobFailure::Abandoned));
    Ok(())
}

#[test]
fn script_parameters_become_engine_arguments() {
    let runner = ScriptJobRunner::new("pigscripts/characterize.pig");
    let args = runner.engine_args(&request(
        "c",
        &[("OUTPUT_PATH", "s3://b/out"), ("INPUT_SRC", "s3://b/in")],
    ));
    assert_eq!(
        args,
        vec![
            "-param",
            "INPUT_SRC=s3://b/in",
            "-param",
            "OUTPUT_PATH=s3://b/out",
            "-f",
            "pigscripts/characterize.pig",
        ]
    );
    assert_eq!(runner.required_parameters(), vec!["OUTPUT_PATH".to_string()]);
    assert_eq!(runner.describe(), "pig script pigscripts/characterize.pig");
}

fn write_executable(path: &Path, body: &str) -> TestResult {
    fs::write(path, body)?;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[tokio::test]
async fn script_runs_through_configured_engine() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = dir.path().join("fake-engine");
    write_executable(&engine, "#!/bin/sh\necho \"$@\" > \"$OUTPUT_PATH\"\n")?;

    let runner = ScriptJobRunner::new("load.pig")
        .with_engine(engine.display().to_string())
        .with_workdir(dir.path());
    let req = request("load", &[("OUTPUT_PATH", "engine-args.txt")]);
    assert!(runner.run(&req, CancellationToken::new()).await.is_success());

    let seen = fs::read_to_string(dir.path().join("engine-args.txt"))?;
    assert_eq!(seen.trim(), "-param OUTPUT_PATH=engine-args.txt -f load.pig");
    Ok(())
}

#[tokio::test]
async fn missing_engine_is_rejected() -> TestResult {
    let runner = ScriptJobRunner::new("x.pig").with_engine("/definitely/not/an/engine");
    let result = runner
        .run(&request("x", &[("OUTPUT_PATH", "o")]), CancellationToken::new())
        .await;
    assert!(matches!(result, RunResult::Failure(JobFailure::Rejected(_))));
    Ok(())
}

const CHAIN: &str = r#"
[pipeline]
name = "chain"
root = "Publish"

[storage]
root = "store"
retry_attempts = 2
retry_backoff = "1ms"
max_backoff = "2ms"

[task.Extract]
cmd = "echo {task} >> runs.log"

[task.Transform]
cmd = "echo {task} >> runs.log && test \"$FAIL\" != yes"
after = ["Extract"]
parameters = { FAIL = "{fail}" }

[task.Publish]
kind = "barrier"
after = ["Transform"]
"#;

fn cli(config: &Path, extra: &[&str]) -> Result<CliArgs, clap::Error> {
    let config = config.display().to_string();
    let mut argv = vec!["batchdag", "--config", config.as_str(), "--output-base-path", "runs/one"];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv)
}

fn log_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("runs.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn pipeline_resumes_from_markers_on_disk() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("Batchdag.toml");
    fs::write(&config, CHAIN)?;

    // Transform fails: Extract keeps its marker.
    let code = batchdag::run(cli(&config, &["-p", "fail=yes"])?).await?;
    assert_eq!(code, EXIT_TASK_FAILURE);
    assert_eq!(log_lines(dir.path()), vec!["Extract", "Transform"]);
    assert!(dir.path().join("store/runs/one/Extract").is_file());
    assert!(!dir.path().join("store/runs/one/Transform").exists());

    // Fixed: only Transform runs again.
    let code = batchdag::run(cli(&config, &["-p", "fail=no"])?).await?;
    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(
        log_lines(dir.path()),
        vec!["Extract", "Transform", "Transform"]
    );
    assert!(dir.path().join("store/runs/one/Publish").is_file());

    // Complete: nothing runs.
    let code = batchdag::run(cli(&config, &["-p", "fail=no"])?).await?;
    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(log_lines(dir.path()).len(), 3);
    Ok(())
}

#[tokio::test]
async fn dry_run_executes_nothing() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("Batchdag.toml");
    fs::write(&config, CHAIN)?;

    let code = batchdag::run(cli(&config, &["-p", "fail=no", "--dry-run"])?).await?;
    assert_eq!(code, EXIT_SUCCESS);
    assert!(log_lines(dir.path()).is_empty());
    assert!(!dir.path().join("store").exists());
    Ok(())
}

#[tokio::test]
async fn configuration_problems_surface_as_errors() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("Batchdag.toml");
    fs::write(&config, CHAIN)?;

    // `fail` is never bound.
    let err = batchdag::run(cli(&config, &[])?)
        .await
        .expect_err("unbound variable");
    assert!(err.is_configuration());

    let err = batchdag::run(cli(&config, &["-p", "fail=no", "--task", "Nope"])?)
        .await
        .expect_err("unknown task");
    assert!(err.is_configuration());

    let missing = dir.path().join("Missing.toml");
    let err = batchdag::run(cli(&missing, &[])?)
        .await
        .expect_err("missing config");
    assert!(err.is_configuration());

    assert!(log_lines(dir.path()).is_empty());
    Ok(())
}
