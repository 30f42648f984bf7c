//! Engine Dispatcher - 四种调用方式的统一执行入口
//!
//! 实现 InferenceEnginePort trait

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::process::{run_process, ProcessSpec};
use super::remote::call_remote;
use super::virtualenv::resolve_env_interpreter;
use crate::application::ports::{
    EngineError, InferenceEnginePort, Invocation, InvocationPlan, RawOutput,
};

/// 命令模板中的入口文件占位符
const ENTRY_FILE_PLACEHOLDER: &str = "${entryFile}";

/// 引擎运行时配置
#[derive(Debug, Clone)]
pub struct EngineRuntimeConfig {
    /// 脚本解释器
    pub interpreter: String,
    /// 解释器参数，位于入口文件之前
    pub interpreter_args: Vec<String>,
    /// 列出虚拟环境的命令
    pub env_list_command: String,
    /// 未单独配置时的超时，None 表示不限
    pub default_timeout: Option<Duration>,
}

impl Default for EngineRuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string()],
            env_list_command: "conda env list --json".to_string(),
            default_timeout: None,
        }
    }
}

/// Engine Dispatcher
pub struct EngineDispatcher {
    config: EngineRuntimeConfig,
    client: Client,
}

impl EngineDispatcher {
    pub fn new(config: EngineRuntimeConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .build()
            .map_err(|e| EngineError::RequestFailed(e.to_string()))?;

        tracing::info!(
            interpreter = %config.interpreter,
            env_list_command = %config.env_list_command,
            default_timeout = ?config.default_timeout,
            "EngineDispatcher initialized"
        );

        Ok(Self { config, client })
    }

    async fn dispatch(&self, invocation: Invocation) -> Result<RawOutput, EngineError> {
        match invocation {
            Invocation::Native { entry_file, args } => {
                self.run_script(&self.config.interpreter, &entry_file, args)
                    .await
            }
            Invocation::Virtualenv {
                env_name,
                entry_file,
                args,
            } => {
                let python =
                    resolve_env_interpreter(&self.config.env_list_command, &env_name).await?;
                self.run_script(&python.to_string_lossy(), &entry_file, args)
                    .await
            }
            Invocation::CustomCommand {
                command,
                entry_file,
                args,
            } => {
                let spec = command_spec(&command, entry_file.as_deref(), args)?;
                let output = run_process(&spec).await?;
                if !output.success() {
                    return Err(EngineError::failed(
                        format!(
                            "Command {} failed ({})",
                            spec.program,
                            output.exit_description()
                        ),
                        output.merged.join("\n"),
                    ));
                }
                Ok(RawOutput::Lines(output.merged))
            }
            Invocation::RemoteApi {
                url,
                method,
                body,
                hook,
            } => call_remote(&self.client, &url, method, body.as_ref(), hook.as_deref()).await,
        }
    }

    /// `<interpreter> [interpreter_args] <entry_file> <args…>`，只收集 stdout
    async fn run_script(
        &self,
        interpreter: &str,
        entry_file: &Path,
        args: Vec<String>,
    ) -> Result<RawOutput, EngineError> {
        let mut argv = self.config.interpreter_args.clone();
        argv.push(entry_file.to_string_lossy().to_string());
        argv.extend(args);

        let output = run_process(&ProcessSpec::new(interpreter, argv)).await?;
        if !output.success() {
            return Err(EngineError::failed(
                format!(
                    "Script {} failed ({})",
                    entry_file.display(),
                    output.exit_description()
                ),
                output.stderr.join("\n"),
            ));
        }
        Ok(RawOutput::Lines(output.stdout))
    }
}

/// 按空白拆分命令并替换入口文件占位符
fn command_spec(
    command: &str,
    entry_file: Option<&Path>,
    args: Vec<String>,
) -> Result<ProcessSpec, EngineError> {
    let entry = entry_file
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut argv = command
        .split_whitespace()
        .map(|token| token.replace(ENTRY_FILE_PLACEHOLDER, &entry));
    let program = argv
        .next()
        .ok_or_else(|| EngineError::failed("Empty command", command.to_string()))?;
    let mut rest: Vec<String> = argv.collect();
    rest.extend(args);
    Ok(ProcessSpec::new(program, rest))
}

/// 在截止时间和取消信号下等待 future
///
/// 提前返回时 future 被丢弃，其持有的子进程随之终止
async fn with_deadline<T>(
    fut: impl Future<Output = Result<T, EngineError>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T, EngineError> {
    let deadline = async {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        _ = deadline => Err(EngineError::Timeout(
            timeout.map(|d| d.as_secs()).unwrap_or_default(),
        )),
    }
}

#[async_trait]
impl InferenceEnginePort for EngineDispatcher {
    async fn execute(
        &self,
        plan: InvocationPlan,
        cancel: CancellationToken,
    ) -> Result<RawOutput, EngineError> {
        let mode = plan.invocation.mode_name();
        let timeout = plan.timeout.or(self.config.default_timeout);
        let started = Instant::now();

        let result = with_deadline(self.dispatch(plan.invocation), timeout, &cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(mode, elapsed_ms, "Engine invocation completed"),
            Err(EngineError::ExecutionFailed {
                message,
                diagnostic,
            }) => tracing::error!(
                mode,
                elapsed_ms,
                error = %message,
                diagnostic = %diagnostic,
                "Engine invocation failed"
            ),
            Err(e) => tracing::error!(mode, elapsed_ms, error = %e, "Engine invocation failed"),
        }

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh_dispatcher() -> EngineDispatcher {
        EngineDispatcher::new(EngineRuntimeConfig {
            interpreter: "sh".into(),
            interpreter_args: vec![],
            ..Default::default()
        })
        .unwrap()
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("engine.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn plan(invocation: Invocation) -> InvocationPlan {
        InvocationPlan {
            invocation,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_native_collects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo \"got $1 $2\"\necho noise >&2\n");

        let output = sh_dispatcher()
            .execute(
                plan(Invocation::Native {
                    entry_file: script,
                    args: vec!["a".into(), "b".into()],
                }),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        match output {
            RawOutput::Lines(lines) => assert_eq!(lines, vec!["got a b"]),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_native_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo 'Traceback: boom' >&2\nexit 1\n");

        let err = sh_dispatcher()
            .execute(
                plan(Invocation::Native {
                    entry_file: script,
                    args: vec![],
                }),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            EngineError::ExecutionFailed { diagnostic, .. } => {
                assert!(diagnostic.contains("Traceback: boom"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_command_merges_streams() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo out\necho err >&2\n");

        let output = sh_dispatcher()
            .execute(
                plan(Invocation::CustomCommand {
                    command: "sh ${entryFile}".into(),
                    entry_file: Some(script),
                    args: vec![],
                }),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        match output {
            RawOutput::Lines(mut lines) => {
                lines.sort();
                assert_eq!(lines, vec!["err", "out"]);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleep 10\necho late\n");

        let started = Instant::now();
        let err = sh_dispatcher()
            .execute(
                InvocationPlan {
                    invocation: Invocation::Native {
                        entry_file: script,
                        args: vec![],
                    },
                    timeout: Some(Duration::from_millis(200)),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_returns_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleep 10\n");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = sh_dispatcher()
            .execute(
                plan(Invocation::Native {
                    entry_file: script,
                    args: vec![],
                }),
                cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_virtualenv_unknown_env() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.sh");
        std::fs::write(&list, "echo '{\"envs\": [\"/srv/envs/base\"]}'\n").unwrap();

        let dispatcher = EngineDispatcher::new(EngineRuntimeConfig {
            env_list_command: format!("sh {}", list.display()),
            ..Default::default()
        })
        .unwrap();

        let err = dispatcher
            .execute(
                plan(Invocation::Virtualenv {
                    env_name: "lung".into(),
                    entry_file: PathBuf::from("/srv/models/lung.py"),
                    args: vec![],
                }),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EnvironmentNotFound(_)));
    }

    #[test]
    fn test_command_spec_substitutes_entry_file() {
        let spec = command_spec(
            "docker run  --rm model ${entryFile}",
            Some(Path::new("/data/in.json")),
            vec!["--fast".into()],
        )
        .unwrap();
        assert_eq!(spec.program, "docker");
        assert_eq!(
            spec.args,
            vec!["run", "--rm", "model", "/data/in.json", "--fast"]
        );
        assert!(command_spec("   ", None, vec![]).is_err());
    }
}
