//! 检索结果 - 下载文件在本地文件系统上的投影

use serde::Serialize;
use std::path::{Path, PathBuf};

/// 本地检索结果
///
/// 文件布局为 `<temp_root>/<study>/<series>/<instance>.dcm`，
/// 所以 series 目录是实例文件的父目录，study 目录是祖父目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResult {
    pub study_dir: PathBuf,
    pub series_dirs: Vec<PathBuf>,
    pub instance_files: Vec<PathBuf>,
    temp_root: PathBuf,
}

/// 模板变量上下文
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateVariables<'a> {
    study_dir: String,
    series_dir_list: Vec<String>,
    instances_filename_list: Vec<String>,
    study_relative_dir: String,
    series_relative_dir_list: Vec<String>,
    instances_relative_filename_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_file: Option<String>,
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

impl RetrievalResult {
    /// 按目录分组构造；文件列表为空时返回 None
    ///
    /// series 目录去重并保持首次出现的顺序
    pub fn from_instance_files(instance_files: Vec<PathBuf>, temp_root: &Path) -> Option<Self> {
        let first = instance_files.first()?;
        let study_dir = first
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| temp_root.to_path_buf());

        let mut series_dirs: Vec<PathBuf> = Vec::new();
        for file in &instance_files {
            if let Some(dir) = file.parent() {
                if !series_dirs.iter().any(|d| d == dir) {
                    series_dirs.push(dir.to_path_buf());
                }
            }
        }

        Some(Self {
            study_dir,
            series_dirs,
            instance_files,
            temp_root: temp_root.to_path_buf(),
        })
    }

    fn relative(&self, path: &Path) -> String {
        display(path.strip_prefix(&self.temp_root).unwrap_or(path))
    }

    /// 生成模板上下文（JSON）
    pub fn template_context(
        &self,
        params: Option<&serde_json::Value>,
        entry_file: Option<&Path>,
    ) -> serde_json::Value {
        let variables = TemplateVariables {
            study_dir: display(&self.study_dir),
            series_dir_list: self.series_dirs.iter().map(|p| display(p)).collect(),
            instances_filename_list: self.instance_files.iter().map(|p| display(p)).collect(),
            study_relative_dir: self.relative(&self.study_dir),
            series_relative_dir_list: self.series_dirs.iter().map(|p| self.relative(p)).collect(),
            instances_relative_filename_list: self
                .instance_files
                .iter()
                .map(|p| self.relative(p))
                .collect(),
            params,
            entry_file: entry_file.map(display),
        };
        serde_json::to_value(variables).unwrap_or(serde_json::Value::Null)
    }
}
