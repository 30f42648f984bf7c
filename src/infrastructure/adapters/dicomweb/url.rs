//! DICOMweb URL 构造
//!
//! WADO-RS 路径、WADO-URI 查询串以及带路径前缀的 URL 拼接

use reqwest::Url;
use serde::Deserialize;

use crate::application::ports::ArchiveError;

/// WADO-URI 可选渲染参数
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WadoUriOptions {
    #[serde(default)]
    pub frame_number: Option<u32>,
    #[serde(default)]
    pub image_quality: Option<u8>,
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub columns: Option<u32>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub window_center: Option<String>,
    #[serde(default)]
    pub window_width: Option<String>,
    /// 期望的返回类型，例如 `application/dicom`
    #[serde(default)]
    pub content_type: Option<String>,
}

/// 在 base URL 已有路径之后追加子路径
///
/// `url_join("http://h/pacs/dicom-web", "studies/1")` => `http://h/pacs/dicom-web/studies/1`
pub fn url_join(base: &str, sub_path: &str) -> Result<Url, ArchiveError> {
    let mut url = Url::parse(base)
        .map_err(|e| ArchiveError::InvalidRequest(format!("invalid URL {}: {}", base, e)))?;

    let sub_path = sub_path.trim_matches('/');
    if !sub_path.is_empty() {
        let path = format!("{}/{}", url.path().trim_end_matches('/'), sub_path);
        url.set_path(&path);
    }
    Ok(url)
}

pub fn study_path(study: &str) -> String {
    format!("studies/{}", study)
}

pub fn series_path(study: &str, series: &str) -> String {
    format!("studies/{}/series/{}", study, series)
}

pub fn instance_path(study: &str, series: &str, sop: &str) -> String {
    format!("studies/{}/series/{}/instances/{}", study, series, sop)
}

/// 构造 WADO-URI 地址
pub fn build_wado_uri(
    wado_url: &Url,
    study: &str,
    series: &str,
    sop: &str,
    options: &WadoUriOptions,
) -> Url {
    let mut url = wado_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("requestType", "WADO")
            .append_pair("studyUID", study)
            .append_pair("seriesUID", series)
            .append_pair("objectUID", sop);

        if let Some(frame) = options.frame_number {
            query.append_pair("frameNumber", &frame.to_string());
        }
        if let Some(quality) = options.image_quality {
            query.append_pair("imageQuality", &quality.to_string());
        }
        if let Some(rows) = options.rows {
            query.append_pair("rows", &rows.to_string());
        }
        if let Some(columns) = options.columns {
            query.append_pair("columns", &columns.to_string());
        }
        if let Some(region) = &options.region {
            query.append_pair("region", region);
        }
        if let Some(center) = &options.window_center {
            query.append_pair("windowCenter", center);
        }
        if let Some(width) = &options.window_width {
            query.append_pair("windowWidth", width);
        }
        if let Some(content_type) = &options.content_type {
            query.append_pair("contentType", content_type);
        }
    }
    url
}
