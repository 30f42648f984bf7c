//! HTTP Handlers

mod ai_service;
mod ping;

pub use ai_service::*;
pub use ping::*;
