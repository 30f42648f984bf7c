//! DICOM Context - 影像对象限界上下文
//!
//! 职责:
//! - UID 三元组与层级推断
//! - 推理请求及其规范化序列化
//! - DICOM 头的最小解析
//! - 检索结果的本地目录投影

mod errors;
mod header;
mod retrieval;
mod value_objects;

pub use errors::DicomError;
pub use header::{encode_part10, read_uids};
pub use retrieval::RetrievalResult;
pub use value_objects::{DicomLevel, DicomUidTriplet, InferenceRequest};

#[cfg(test)]
pub(crate) use header::test_support;
