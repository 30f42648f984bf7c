//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - DICOM Context: UID 三元组、推理请求、检索结果、文件头解析
//! - Engine Context: 推理引擎配置与目录
//!
//! 以及两者共用的参数模板解析

pub mod dicom;
pub mod engine;
pub mod template;
