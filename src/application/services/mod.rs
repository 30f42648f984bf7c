//! 应用服务 - 被命令处理器复用的流程步骤

mod retriever;
mod save_body_hook;

pub use retriever::{RetrievalError, Retriever};
pub use save_body_hook::SaveBodyHook;
