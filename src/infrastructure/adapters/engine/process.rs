//! 子进程执行
//!
//! 逐行收集 stdout / stderr，同时保留两者按到达顺序合并的视图。
//! 子进程以 `kill_on_drop` 启动，调用方丢弃 future 即终止进程。

use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::application::ports::EngineError;

/// 进程启动参数
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// 进程输出
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// stdout 与 stderr 按到达顺序合并
    pub merged: Vec<String>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_description(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// 运行进程直至退出
pub async fn run_process(spec: &ProcessSpec) -> Result<CapturedOutput, EngineError> {
    tracing::debug!(program = %spec.program, args = ?spec.args, "Spawning process");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineError::SpawnFailed {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::IoError("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::IoError("stderr not captured".into()))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();

    let mut captured_stdout = Vec::new();
    let mut captured_stderr = Vec::new();
    let mut merged = Vec::new();
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => {
                match line.map_err(|e| EngineError::IoError(e.to_string()))? {
                    Some(line) => {
                        merged.push(line.clone());
                        captured_stdout.push(line);
                    }
                    None => out_done = true,
                }
            }
            line = err_lines.next_line(), if !err_done => {
                match line.map_err(|e| EngineError::IoError(e.to_string()))? {
                    Some(line) => {
                        merged.push(line.clone());
                        captured_stderr.push(line);
                    }
                    None => err_done = true,
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| EngineError::IoError(e.to_string()))?;

    tracing::debug!(
        program = %spec.program,
        status = %status,
        stdout_lines = captured_stdout.len(),
        stderr_lines = captured_stderr.len(),
        "Process exited"
    );

    Ok(CapturedOutput {
        status,
        stdout: captured_stdout,
        stderr: captured_stderr,
        merged,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = run_process(&sh("echo one; echo two >&2; echo three"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, vec!["one", "three"]);
        assert_eq!(output.stderr, vec!["two"]);
        assert_eq!(output.merged.len(), 3);
    }

    #[tokio::test]
    async fn test_reports_exit_code() {
        let output = run_process(&sh("exit 3")).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_description(), "exit code 3");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_process(&ProcessSpec::new("/nonexistent/program", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SpawnFailed { .. }));
    }
}
