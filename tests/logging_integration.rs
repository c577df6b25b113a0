use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const STARTUP_MESSAGE: &str = "loaded runtime configuration";

/// Scratch directory removed when the test finishes.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(label: &str) -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "hlpr-logging-{label}-{stamp}-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("failed to create temp directory");
        Self(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Runs a one-shot prompt without an API key, which logs start-up and then
/// fails before any network traffic.
fn run_failing_prompt(log_output: &str, log_format: &str, log_file: Option<&Path>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hlpr"));
    cmd.arg("hello")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "hlpr=info")
        .env("LOG_OUTPUT", log_output)
        .env("LOG_FORMAT", log_format);
    match log_file {
        Some(path) => cmd.env("LOG_FILE_PATH", path),
        None => cmd.env_remove("LOG_FILE_PATH"),
    };

    let output = cmd.output().expect("failed to run hlpr binary");
    assert!(
        !output.status.success(),
        "prompt without OPENAI_API_KEY should fail"
    );
    output
}

fn rotated_log_contents(dir: &Path) -> String {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .expect("failed to read log directory")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("hlpr.log."))
        })
        .collect();
    candidates.sort();
    let newest = candidates.pop().expect("expected a rotated log file");
    fs::read_to_string(newest).expect("failed to read rotated log file")
}

#[test]
fn json_format_writes_structured_lines_to_stderr() {
    let output = run_failing_prompt("stderr", "json", None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let startup_logged = stderr
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .map(|line| serde_json::from_str::<Value>(line).expect("log line should be valid JSON"))
        .any(|entry| entry["fields"]["message"].as_str() == Some(STARTUP_MESSAGE));
    assert!(
        startup_logged,
        "expected start-up JSON log line, got stderr:\n{stderr}"
    );
    assert!(
        stderr.contains("OPENAI_API_KEY is not set"),
        "expected the failure to be reported:\n{stderr}"
    );
}

#[test]
fn file_output_keeps_logs_off_stderr() {
    let dir = ScratchDir::new("file");
    let output = run_failing_prompt("file", "pretty", Some(&dir.path().join("hlpr.log")));

    assert!(rotated_log_contents(dir.path()).contains(STARTUP_MESSAGE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains(STARTUP_MESSAGE),
        "file-only mode should not log to stderr:\n{stderr}"
    );
    assert!(
        stderr.contains("OPENAI_API_KEY is not set"),
        "the command error still belongs on stderr:\n{stderr}"
    );
}

#[test]
fn both_output_writes_stderr_and_file() {
    let dir = ScratchDir::new("both");
    let output = run_failing_prompt("both", "pretty", Some(&dir.path().join("hlpr.log")));

    assert!(rotated_log_contents(dir.path()).contains(STARTUP_MESSAGE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(STARTUP_MESSAGE),
        "expected start-up log on stderr:\n{stderr}"
    );
}

#[test]
fn unusable_log_path_falls_back_to_stderr() {
    let dir = ScratchDir::new("fallback");
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, "block").expect("failed to create blocking file");

    let output = run_failing_prompt("file", "pretty", Some(&blocker.join("hlpr.log")));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        stderr.contains("failed to initialize LOG_OUTPUT=file"),
        "expected fallback warning:\n{stderr}"
    );
    assert!(stderr.contains("using stderr instead"), "{stderr}");
    assert!(
        stderr.contains(STARTUP_MESSAGE),
        "logging should continue on stderr:\n{stderr}"
    );
}
