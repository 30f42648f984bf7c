//! DICOM Context - Value Objects

use serde::{Deserialize, Serialize};

use super::DicomError;

/// DICOM 对象层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DicomLevel {
    Study,
    Series,
    Instance,
}

impl DicomLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "STUDY",
            Self::Series => "SERIES",
            Self::Instance => "INSTANCE",
        }
    }
}

impl std::fmt::Display for DicomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study / Series / SOP Instance UID 三元组
///
/// 根据可选字段推断层级：
/// - 有 `sopInstanceUID` => Instance
/// - 否则有 `seriesInstanceUID` => Series
/// - 否则 => Study
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomUidTriplet {
    #[serde(rename = "studyInstanceUID", default)]
    study_instance_uid: String,

    #[serde(
        rename = "seriesInstanceUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    series_instance_uid: Option<String>,

    #[serde(
        rename = "sopInstanceUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    sop_instance_uid: Option<String>,
}

impl DicomUidTriplet {
    /// Study 层级
    pub fn study(study_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_uid.into(),
            series_instance_uid: None,
            sop_instance_uid: None,
        }
    }

    /// Series 层级
    pub fn series(study_uid: impl Into<String>, series_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_uid.into(),
            series_instance_uid: Some(series_uid.into()),
            sop_instance_uid: None,
        }
    }

    /// Instance 层级
    pub fn instance(
        study_uid: impl Into<String>,
        series_uid: impl Into<String>,
        sop_uid: impl Into<String>,
    ) -> Self {
        Self {
            study_instance_uid: study_uid.into(),
            series_instance_uid: Some(series_uid.into()),
            sop_instance_uid: Some(sop_uid.into()),
        }
    }

    /// 从原始字段构造（供持久化层还原）
    pub fn from_parts(
        study_uid: String,
        series_uid: Option<String>,
        sop_uid: Option<String>,
    ) -> Self {
        Self {
            study_instance_uid: study_uid,
            series_instance_uid: series_uid,
            sop_instance_uid: sop_uid,
        }
    }

    pub fn study_instance_uid(&self) -> &str {
        &self.study_instance_uid
    }

    pub fn series_instance_uid(&self) -> Option<&str> {
        self.series_instance_uid.as_deref()
    }

    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.sop_instance_uid.as_deref()
    }

    /// 推断层级，仅取决于可选字段是否存在
    pub fn level(&self) -> DicomLevel {
        if self.sop_instance_uid.is_some() {
            DicomLevel::Instance
        } else if self.series_instance_uid.is_some() {
            DicomLevel::Series
        } else {
            DicomLevel::Study
        }
    }

    /// 校验 UID 非空；Instance 层级要求同时提供 Series UID
    pub fn validate(&self, index: usize) -> Result<(), DicomError> {
        if self.study_instance_uid.trim().is_empty() {
            return Err(DicomError::MissingUid {
                index,
                field: "studyInstanceUID",
            });
        }
        if matches!(&self.series_instance_uid, Some(uid) if uid.trim().is_empty()) {
            return Err(DicomError::MissingUid {
                index,
                field: "seriesInstanceUID",
            });
        }
        if let Some(sop) = &self.sop_instance_uid {
            if sop.trim().is_empty() {
                return Err(DicomError::MissingUid {
                    index,
                    field: "sopInstanceUID",
                });
            }
            if self.series_instance_uid.is_none() {
                return Err(DicomError::MissingUid {
                    index,
                    field: "seriesInstanceUID",
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for DicomUidTriplet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.study_instance_uid)?;
        if let Some(series) = &self.series_instance_uid {
            write!(f, "/{}", series)?;
        }
        if let Some(sop) = &self.sop_instance_uid {
            write!(f, "/{}", sop)?;
        }
        Ok(())
    }
}

/// 推理请求
///
/// `dicomUidsList` 的顺序有意义：模板中的 `seriesDirList[i]` 依赖它
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    #[serde(default)]
    pub dicom_uids_list: Vec<DicomUidTriplet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl InferenceRequest {
    pub fn new(dicom_uids_list: Vec<DicomUidTriplet>) -> Self {
        Self {
            dicom_uids_list,
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn validate(&self) -> Result<(), DicomError> {
        if self.dicom_uids_list.is_empty() {
            return Err(DicomError::EmptyRequest);
        }
        for (index, uids) in self.dicom_uids_list.iter().enumerate() {
            uids.validate(index)?;
        }
        Ok(())
    }

    /// 规范化序列化
    ///
    /// 结构体字段顺序固定，`params` 中的对象键按字典序输出，
    /// 因此只有 JSON 键顺序不同的两个请求得到相同结果
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
