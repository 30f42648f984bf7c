//! DICOM Context - Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DicomError {
    #[error("dicomUidsList 不能为空")]
    EmptyRequest,

    #[error("dicomUidsList[{index}] 缺少 {field}")]
    MissingUid { index: usize, field: &'static str },

    #[error("无效的 DICOM 头: {0}")]
    InvalidHeader(String),

    #[error("DICOM 头缺少标签 {0}")]
    MissingTag(&'static str),

    #[error("不支持的传输语法: {0}")]
    UnsupportedTransferSyntax(String),
}
