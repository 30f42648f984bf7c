//! Engine Adapter - 推理引擎调用实现
//!
//! - native: 本机解释器运行脚本
//! - virtualenv: 按名称定位虚拟环境解释器后运行脚本
//! - custom_command: 任意命令
//! - remote_api: HTTP 接口

mod dispatcher;
mod process;
mod remote;
mod virtualenv;

pub use dispatcher::{EngineDispatcher, EngineRuntimeConfig};
pub use virtualenv::{find_env, python_in_env};
