//! Command Handlers 实现

mod inference_handlers;

pub use inference_handlers::*;
