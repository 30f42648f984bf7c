//! DICOMweb Adapter - 影像归档客户端实现

mod client;
mod fake_archive;
mod multipart;
mod url;

pub use client::{DicomWebClient, DicomWebClientConfig, WadoMode};
pub use fake_archive::FakeArchive;
pub use multipart::{boundary_from_content_type, decode_multipart, encode_multipart_related};
pub use url::{build_wado_uri, url_join, WadoUriOptions};
