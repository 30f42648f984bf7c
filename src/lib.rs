//! MedInfer - 影像归档 AI 推理服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - DICOM Context: UID 三元组、推理请求、检索结果、文件头解析
//! - Engine Context: 推理引擎配置与目录
//! - 参数模板解析
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Archive, ObjectStore, RetrievalCache, InferenceEngine）
//! - Services: 检索流程
//! - Commands: 推理命令处理器
//! - Queries: 引擎目录查询
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + multipart 流式响应
//! - Adapters: DICOMweb 客户端、本地文件存储、引擎调度
//! - Persistence: Sled 检索缓存
//! - Memory: 内存检索缓存

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
