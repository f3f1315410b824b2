// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use batchdag::build_variables;
use batchdag::cli::CliArgs;
use batchdag::config::{
    default_config_path, load_and_validate, load_from_path, load_from_str, validate_config,
    ConfigFile,
};
use batchdag::dag::{TaskAction, TaskRegistry};
use batchdag::errors::BatchdagError;
use batchdag::fs::mock::MockFileSystem;
use batchdag::marker::MarkerPath;
use batchdag::output::FsOutputGuard;
use batchdag::params::Parameters;
use batchdag::types::{ClusterKind, TaskKind};
use batchdag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn validate(toml: &str) -> Result<ConfigFile, BatchdagError> {
    let raw = load_from_str(toml)?;
    ConfigFile::try_from(raw)
}

fn expect_config_error(toml: &str, needle: &str) {
    match validate(toml) {
        Err(BatchdagError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}")
        }
        other => panic!("expected ConfigError containing {needle:?}, got {other:?}"),
    }
}

fn vars(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn mock_guard() -> Arc<FsOutputGuard> {
    Arc::new(FsOutputGuard::new(Arc::new(MockFileSystem::new()), "/store"))
}

#[test]
fn demos_are_valid() -> TestResult {
    let cfg = load_and_validate(demo("characterize.toml"))?;
    assert_eq!(cfg.root_task(), Some("ShutdownClusters"));
    assert_eq!(cfg.task["Characterize"].kind, TaskKind::Script);
    assert_eq!(cfg.task["ShutdownClusters"].kind, TaskKind::Barrier);
    assert_eq!(cfg.cluster["main"].kind, ClusterKind::Persistent);
    assert_eq!(cfg.default.parameters["INFER_TYPES"], "true");

    let chain = load_and_validate(demo("command_chain.toml"))?;
    assert!(chain.pipeline.parallel);
    assert_eq!(chain.task["Extract"].kind, TaskKind::Command);
    Ok(())
}

#[test]
fn defaults_apply_when_sections_are_missing() -> TestResult {
    let cfg = validate(
        r#"
        [task.A]
        cmd = "echo A"
        "#,
    )?;
    assert_eq!(cfg.pipeline.required, vec!["output_base_path".to_string()]);
    assert_eq!(cfg.default.marker, "{output_base_path}/{task}");
    assert_eq!(cfg.storage.retry_attempts, 3);
    let policy = cfg.storage.retry_policy()?;
    assert_eq!(policy.initial_backoff, std::time::Duration::from_millis(200));
    assert_eq!(policy.max_backoff, std::time::Duration::from_secs(5));
    Ok(())
}

#[test]
fn structural_errors_are_reported() {
    expect_config_error("", "at least one");
    expect_config_error(
        r#"
        [pipeline]
        root = "Nope"
        [task.A]
        cmd = "echo"
        "#,
        "unknown task 'Nope'",
    );
    expect_config_error(
        r#"
        [task.A]
        cmd = "echo"
        after = ["Ghost"]
        "#,
        "unknown dependency 'Ghost'",
    );
    expect_config_error(
        r#"
        [task.A]
        kind = "command"
        "#,
        "needs `cmd`",
    );
    expect_config_error(
        r#"
        [task.A]
        kind = "script"
        script = "a.pig"
        cmd = "echo"
        "#,
        "cannot set `cmd`",
    );
    expect_config_error(
        r#"
        [task.A]
        kind = "barrier"
        cmd = "echo"
        "#,
        "barrier task 'A'",
    );
    expect_config_error(
        r#"
        [task.A]
        cmd = "echo"
        cluster = "missing"
        "#,
        "unknown cluster 'missing'",
    );
    expect_config_error(
        r#"
        [task.A]
        cmd = "echo"
        timeout = "10 parsecs"
        "#,
        "timeout",
    );
    expect_config_error(
        r#"
        [storage]
        retry_attempts = 0
        [task.A]
        cmd = "echo"
        "#,
        "retry_attempts",
    );
    expect_config_error(
        r#"
        [task.A]
        cmd = "echo"
        copy_extension = ".csv"
        "#,
        "without `output`",
    );
}

#[test]
fn cycles_are_rejected() {
    let err = validate(
        r#"
        [task.A]
        cmd = "echo A"
        after = ["B"]
        [task.B]
        cmd = "echo B"
        after = ["A"]
        "#,
    )
    .expect_err("cycle");
    assert!(matches!(err, BatchdagError::DagCycle(_)), "got {err:?}");

    let err = validate(
        r#"
        [task.A]
        cmd = "echo A"
        after = ["A"]
        "#,
    )
    .expect_err("self loop");
    assert!(matches!(err, BatchdagError::DagCycle(_)), "got {err:?}");
}

#[test]
fn unknown_fields_are_toml_errors() {
    let err = validate(
        r#"
        [task.A]
        cmd = "echo"
        watch = ["src/**"]
        "#,
    )
    .expect_err("unknown field");
    assert!(matches!(err, BatchdagError::TomlError(_)), "got {err:?}");
    assert!(err.is_configuration());
}

#[test]
fn missing_config_file_is_io_error() {
    let err = load_from_path("/definitely/not/here/Batchdag.toml").expect_err("missing");
    assert!(matches!(err, BatchdagError::IoError(_)));
}

#[test]
fn registry_binds_parameters_markers_and_outputs() -> TestResult {
    let cfg = load_and_validate(demo("characterize.toml"))?;
    let bound = vars(&[
        ("output_base_path", "s3://bucket/run1"),
        ("input_path", "s3://bucket/input"),
    ]);
    let registry = TaskRegistry::from_config(&cfg, &bound, mock_guard(), Path::new("/proj"))?;

    let task = registry.get("Characterize").ok_or("task missing")?;
    assert_eq!(task.parameters()["INPUT_SRC"], "s3://bucket/input");
    assert_eq!(task.parameters()["OUTPUT_PATH"], "s3://bucket/run1/characterize");
    assert_eq!(task.parameters()["INFER_TYPES"], "true");
    assert_eq!(task.marker_path(), &MarkerPath::new("s3://bucket/run1/Characterize"));
    assert_eq!(task.cluster(), Some("main"));
    assert!(task.id().as_str().starts_with("Characterize-"));
    assert!(task.missing_parameters().is_empty());
    match task.action() {
        TaskAction::Job { output: Some(out), .. } => {
            assert_eq!(out.location, "s3://bucket/run1/characterize");
            assert_eq!(out.copy_extension.as_deref(), Some(".csv"));
        }
        other => panic!("expected guarded job, got {other:?}"),
    }

    let shutdown = registry.get("ShutdownClusters").ok_or("task missing")?;
    assert!(matches!(shutdown.action(), TaskAction::Barrier));
    assert_eq!(shutdown.prerequisites(), ["Characterize"]);
    assert_eq!(
        shutdown.marker_path(),
        &MarkerPath::new("s3://bucket/run1/ShutdownClusters")
    );
    Ok(())
}

#[test]
fn registry_reports_unbound_variables() -> TestResult {
    let cfg = load_and_validate(demo("characterize.toml"))?;
    let bound = vars(&[("output_base_path", "out")]);
    let err = TaskRegistry::from_config(&cfg, &bound, mock_guard(), Path::new("."))
        .expect_err("input_path is unbound");
    match err {
        BatchdagError::MissingParameter { task, parameter } => {
            assert_eq!(task, "Characterize");
            assert_eq!(parameter, "input_path");
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn task_ids_change_with_parameters() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "A",
            TaskConfigBuilder::command("echo {DAY}").param("DAY", "{day}").build(),
        )
        .build();

    let monday = TaskRegistry::from_config(
        &cfg,
        &vars(&[("output_base_path", "o"), ("day", "mon")]),
        mock_guard(),
        Path::new("."),
    )?;
    let tuesday = TaskRegistry::from_config(
        &cfg,
        &vars(&[("output_base_path", "o"), ("day", "tue")]),
        mock_guard(),
        Path::new("."),
    )?;
    let a1 = monday.get("A").ok_or("missing")?;
    let a2 = tuesday.get("A").ok_or("missing")?;
    assert_ne!(a1.id(), a2.id());
    assert_eq!(a1.describe(), "command `echo mon`");
    Ok(())
}

#[test]
fn shell_expansions_and_braced_values_survive_binding() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "A",
            TaskConfigBuilder::command("echo ${INPUT_PATH} ${HOME} {PATTERN}")
                .param("INPUT_PATH", "{input_path}")
                .param("PATTERN", "{pattern}")
                .build(),
        )
        .build();

    let registry = TaskRegistry::from_config(
        &cfg,
        &vars(&[
            ("output_base_path", "o"),
            ("input_path", "/data/in"),
            ("pattern", "part-{x}.csv"),
        ]),
        mock_guard(),
        Path::new("."),
    )?;
    let task = registry.get("A").ok_or("missing")?;
    assert_eq!(
        task.describe(),
        "command `echo ${INPUT_PATH} ${HOME} part-{x}.csv`"
    );
    assert_eq!(task.parameters()["INPUT_PATH"], "/data/in");
    assert_eq!(task.parameters()["PATTERN"], "part-{x}.csv");
    assert!(task.missing_parameters().is_empty());
    Ok(())
}

#[test]
fn variable_precedence_is_config_file_p_then_flags() -> TestResult {
    let mut param_file = tempfile::NamedTempFile::new()?;
    writeln!(param_file, "# comment")?;
    writeln!(param_file, "; also a comment")?;
    writeln!(param_file, "region=eu")?;
    writeln!(param_file, "input_path=s3://from-file")?;
    writeln!(param_file, "output_base_path=from-file")?;

    let cfg = ConfigFileBuilder::new()
        .with_variable("region", "us")
        .with_variable("team", "data")
        .with_task("A", TaskConfigBuilder::command("echo").build())
        .build();

    let path = param_file.path().to_string_lossy().to_string();
    let args = CliArgs::try_parse_from([
        "batchdag",
        "-f",
        path.as_str(),
        "-p",
        "input_path=s3://from-flag",
        "--parameter",
        "query=a=b",
        "--output-base-path",
        "from-flag",
        "--cluster-size",
        "0",
    ])?;

    let bound = build_variables(&cfg, &args)?;
    assert_eq!(bound["team"], "data");
    assert_eq!(bound["region"], "eu");
    assert_eq!(bound["input_path"], "s3://from-flag");
    assert_eq!(bound["query"], "a=b");
    assert_eq!(bound["output_base_path"], "from-flag");
    assert_eq!(bound["cluster_size"], "0");
    Ok(())
}

#[test]
fn required_variables_must_be_supplied() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::command("echo").build())
        .build();
    let args = CliArgs::try_parse_from(["batchdag"])?;

    let err = build_variables(&cfg, &args).expect_err("output_base_path is required");
    assert!(matches!(
        err,
        BatchdagError::MissingParameter { ref parameter, .. } if parameter == "output_base_path"
    ));
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn cli_defaults_to_config_in_working_directory() -> TestResult {
    let args = CliArgs::try_parse_from(["batchdag", "--dry-run"])?;
    assert_eq!(args.config, default_config_path());
    assert!(args.dry_run);
    assert!(args.task.is_none());
    Ok(())
}

#[test]
fn validation_can_run_on_raw_configs() -> TestResult {
    let raw = load_from_path(demo("command_chain.toml"))?;
    validate_config(&raw)?;

    let mut broken = raw.clone();
    broken.task.remove("Extract");
    let err = validate_config(&broken).expect_err("CountRows depends on Extract");
    assert!(matches!(err, BatchdagError::ConfigError(_)));
    Ok(())
}

#[test]
fn malformed_parameters_are_config_errors() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::command("echo").build())
        .build();
    let args = CliArgs::try_parse_from(["batchdag", "-p", "no-equals-sign"])?;
    let err = build_variables(&cfg, &args).expect_err("malformed -p");
    assert!(matches!(err, BatchdagError::ConfigError(_)));
    Ok(())
}
