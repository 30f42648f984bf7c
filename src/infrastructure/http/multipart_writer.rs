//! multipart/related 响应写入器
//!
//! 格式：
//! ```text
//! --B\r\n
//! Content-Type: ...\r\nContent-Length: N\r\n\r\n<bytes>
//! \r\n--B\r\n
//! ...
//! \r\n--B--
//! ```

use std::io;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// 由两个 v4 UUID 拼成的分隔符
pub fn new_boundary() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// 按扩展名推断单个部分的 Content-Type
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("dcm") => "application/dicom",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// 逐部分写出 multipart/related 响应体
pub struct MultipartWriter<W> {
    writer: W,
    boundary: String,
    parts: usize,
}

impl<W: AsyncWrite + Unpin> MultipartWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_boundary(writer, new_boundary())
    }

    pub fn with_boundary(writer: W, boundary: impl Into<String>) -> Self {
        Self {
            writer,
            boundary: boundary.into(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// 响应头 Content-Type
    pub fn content_type(&self) -> String {
        format!(
            "multipart/related; type=\"application/dicom\"; boundary={}",
            self.boundary
        )
    }

    pub async fn begin(&mut self) -> io::Result<()> {
        let opening = format!("--{}\r\n", self.boundary);
        self.writer.write_all(opening.as_bytes()).await
    }

    pub async fn write_part(&mut self, content_type: &str, buffer: &[u8]) -> io::Result<()> {
        if self.parts > 0 {
            let delimiter = format!("\r\n--{}\r\n", self.boundary);
            self.writer.write_all(delimiter.as_bytes()).await?;
        }
        let headers = format!(
            "Content-Type: {}\r\nContent-Length: {}\r\n\r\n",
            content_type,
            buffer.len()
        );
        self.writer.write_all(headers.as_bytes()).await?;
        self.writer.write_all(buffer).await?;
        self.parts += 1;
        Ok(())
    }

    pub async fn end(&mut self) -> io::Result<()> {
        let closing = format!("\r\n--{}--", self.boundary);
        self.writer.write_all(closing.as_bytes()).await?;
        self.writer.flush().await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
