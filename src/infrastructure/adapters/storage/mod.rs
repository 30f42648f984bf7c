//! Storage Adapter - 本地文件存储实现

mod file_storage;

pub use file_storage::{short_hash, FileObjectStore};
