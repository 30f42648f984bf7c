//! 虚拟环境解释器定位
//!
//! 运行环境列表命令（默认 `conda env list --json`），输出形如
//! `{"envs": ["/opt/conda", "/opt/conda/envs/seg"]}`，按目录名匹配环境。

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::process::{run_process, ProcessSpec};
use crate::application::ports::EngineError;

#[derive(Debug, Deserialize)]
struct EnvList {
    envs: Vec<PathBuf>,
}

/// 在环境列表 JSON 中查找名为 `env_name` 的环境目录
pub fn find_env(list_json: &str, env_name: &str) -> Result<PathBuf, EngineError> {
    let list: EnvList = serde_json::from_str(list_json)
        .map_err(|e| EngineError::failed("Invalid environment list", e.to_string()))?;

    list.envs
        .into_iter()
        .find(|env| env.file_name().map_or(false, |name| name == env_name))
        .ok_or_else(|| EngineError::EnvironmentNotFound(env_name.to_string()))
}

/// 环境内的 python 解释器路径
pub fn python_in_env(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("python")
    } else {
        env_dir.join("bin").join("python")
    }
}

/// 运行列表命令并返回环境内解释器
pub async fn resolve_env_interpreter(
    env_list_command: &str,
    env_name: &str,
) -> Result<PathBuf, EngineError> {
    let mut argv = env_list_command.split_whitespace().map(str::to_string);
    let program = argv
        .next()
        .ok_or_else(|| EngineError::failed("Empty environment list command", ""))?;

    let output = run_process(&ProcessSpec::new(program, argv.collect())).await?;
    if !output.success() {
        return Err(EngineError::failed(
            format!("Environment list command failed ({})", output.exit_description()),
            output.stderr.join("\n"),
        ));
    }

    let env_dir = find_env(&output.stdout.join("\n"), env_name)?;
    let python = python_in_env(&env_dir);

    tracing::debug!(env = %env_name, python = %python.display(), "Resolved environment interpreter");
    Ok(python)
}
