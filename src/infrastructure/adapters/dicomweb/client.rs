//! DICOMweb Client - 通过 WADO-RS / WADO-URI / STOW-RS 访问影像归档
//!
//! 实现 ArchivePort trait
//!
//! WADO-RS:
//! GET {wado}/studies/{study}[/series/{series}[/instances/{sop}]]
//! Accept: multipart/related; type="application/dicom"
//!
//! STOW-RS:
//! POST {stow}/studies
//! Content-Type: multipart/related; type="application/dicom"

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::multipart::{decode_multipart, encode_multipart_related};
use super::url::{
    build_wado_uri, instance_path, series_path, study_path, url_join, WadoUriOptions,
};
use crate::application::ports::{require_uid, ArchiveError, ArchivePort};

const MULTIPART_DICOM: &str = r#"multipart/related; type="application/dicom""#;
const APPLICATION_DICOM: &str = "application/dicom";

/// 实例检索的协议
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WadoMode {
    #[default]
    #[serde(alias = "wado-rs")]
    Rs,
    /// 旧式 WADO-URI，仅用于单实例检索
    #[serde(alias = "wado-uri")]
    Uri,
}

/// DICOMweb 客户端配置
#[derive(Debug, Clone)]
pub struct DicomWebClientConfig {
    /// 归档基础 URL
    pub base_url: String,
    /// WADO 路径前缀
    pub wado_prefix: String,
    /// STOW 路径前缀
    pub stow_prefix: String,
    pub wado_mode: WadoMode,
    pub wado_uri_options: WadoUriOptions,
    /// 每个请求附带的静态头（例如 Authorization）
    pub headers: HashMap<String, String>,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for DicomWebClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/dicom-web".to_string(),
            wado_prefix: String::new(),
            stow_prefix: String::new(),
            wado_mode: WadoMode::Rs,
            wado_uri_options: WadoUriOptions::default(),
            headers: HashMap::new(),
            timeout_secs: 300,
        }
    }
}

impl DicomWebClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// DICOMweb 客户端
///
/// 只持有连接配置，不做重试
pub struct DicomWebClient {
    client: Client,
    config: DicomWebClientConfig,
    wado_url: Url,
    stow_url: Url,
}

impl DicomWebClient {
    /// 创建新的 DICOMweb 客户端
    pub fn new(config: DicomWebClientConfig) -> Result<Self, ArchiveError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ArchiveError::InvalidRequest(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ArchiveError::InvalidRequest(format!("header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;

        let wado_url = url_join(&config.base_url, &config.wado_prefix)?;
        let stow_url = url_join(&config.base_url, &config.stow_prefix)?;

        tracing::info!(
            wado_url = %wado_url,
            stow_url = %stow_url,
            mode = ?config.wado_mode,
            "DicomWebClient initialized"
        );

        Ok(Self {
            client,
            config,
            wado_url,
            stow_url,
        })
    }

    fn wado_rs_url(&self, path: &str) -> Result<Url, ArchiveError> {
        url_join(self.wado_url.as_str(), path)
    }

    /// GET multipart/related 并解码
    async fn get_multipart(&self, url: Url) -> Result<Vec<Vec<u8>>, ArchiveError> {
        tracing::debug!(url = %url, "WADO-RS request");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, MULTIPART_DICOM)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::InvalidResponse(format!("Failed to read body: {}", e)))?;

        decode_multipart(&body, content_type.as_deref())
    }

    /// GET application/dicom
    async fn get_dicom(&self, url: Url) -> Result<Vec<u8>, ArchiveError> {
        tracing::debug!(url = %url, "WADO-URI request");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, APPLICATION_DICOM)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        Ok(response
            .bytes()
            .await
            .map_err(|e| ArchiveError::InvalidResponse(format!("Failed to read body: {}", e)))?
            .to_vec())
    }
}

fn transport_error(e: reqwest::Error) -> ArchiveError {
    if e.is_timeout() {
        ArchiveError::Unavailable(format!("Archive request timed out: {}", e))
    } else if e.is_connect() {
        ArchiveError::Unavailable(format!("Cannot connect to archive: {}", e))
    } else {
        ArchiveError::Unavailable(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, ArchiveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ArchiveError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ArchivePort for DicomWebClient {
    async fn retrieve_study(&self, study_uid: &str) -> Result<Vec<Vec<u8>>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        let url = self.wado_rs_url(&study_path(study_uid))?;
        self.get_multipart(url).await
    }

    async fn retrieve_series(
        &self,
        study_uid: &str,
        series_uid: &str,
    ) -> Result<Vec<Vec<u8>>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        require_uid(series_uid, "Series Instance UID")?;
        let url = self.wado_rs_url(&series_path(study_uid, series_uid))?;
        self.get_multipart(url).await
    }

    async fn retrieve_instance(
        &self,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> Result<Vec<u8>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        require_uid(series_uid, "Series Instance UID")?;
        require_uid(sop_uid, "SOP Instance UID")?;

        match self.config.wado_mode {
            WadoMode::Uri => {
                let url = build_wado_uri(
                    &self.wado_url,
                    study_uid,
                    series_uid,
                    sop_uid,
                    &self.config.wado_uri_options,
                );
                self.get_dicom(url).await
            }
            WadoMode::Rs => {
                let url = self.wado_rs_url(&instance_path(study_uid, series_uid, sop_uid))?;
                self.get_multipart(url)
                    .await?
                    .pop()
                    .ok_or_else(|| ArchiveError::Rejected {
                        status: 404,
                        message: format!("No object returned for instance {}", sop_uid),
                    })
            }
        }
    }

    async fn store_instance(&self, local_file: &Path) -> Result<(), ArchiveError> {
        let data = tokio::fs::read(local_file)
            .await
            .map_err(|e| ArchiveError::IoError(format!("{}: {}", local_file.display(), e)))?;

        let boundary = uuid::Uuid::new_v4().simple().to_string();
        let body = encode_multipart_related(&boundary, APPLICATION_DICOM, &[data.as_slice()]);
        let url = url_join(self.stow_url.as_str(), "studies")?;

        tracing::debug!(url = %url, file = %local_file.display(), "STOW-RS request");

        let response = self
            .client
            .post(url)
            .header(
                CONTENT_TYPE,
                format!("{}; boundary={}", MULTIPART_DICOM, boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;

        tracing::info!(file = %local_file.display(), "Stored instance to archive");
        Ok(())
    }
}
