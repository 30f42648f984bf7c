//! 远程接口后置钩子：将响应体写入本地文件

use async_trait::async_trait;
use std::path::PathBuf;

use crate::application::ports::{EngineError, PostCallHook, RemoteResponse};

/// 将响应体原样保存到 `target`
#[derive(Debug, Clone)]
pub struct SaveBodyHook {
    target: PathBuf,
}

impl SaveBodyHook {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl PostCallHook for SaveBodyHook {
    async fn on_response(&self, response: &RemoteResponse) -> Result<(), EngineError> {
        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::IoError(e.to_string()))?;
        }
        tokio::fs::write(&self.target, &response.body)
            .await
            .map_err(|e| EngineError::IoError(format!("{}: {}", self.target.display(), e)))?;

        tracing::debug!(
            target = %self.target.display(),
            size = response.body.len(),
            "Saved remote response body"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_body_creating_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out/mask.dcm");
        let hook = SaveBodyHook::new(&target);

        hook.on_response(&RemoteResponse {
            status: 200,
            content_type: Some("application/dicom".into()),
            body: b"mask".to_vec(),
        })
        .await
        .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"mask");
    }
}
