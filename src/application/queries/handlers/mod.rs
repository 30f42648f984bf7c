//! Query Handlers 实现

mod engine_handlers;

pub use engine_handlers::*;
