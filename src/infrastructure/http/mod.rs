//! HTTP Layer - RESTful API

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod multipart_writer;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use multipart_writer::{content_type_for, MultipartWriter};
pub use routes::create_routes;
pub use server::{HttpServer, ServerConfig};
pub use state::AppState;
