//! Inference Command Handlers
//!
//! 一次推理的完整流程：
//! 检索 -> 参数模板 -> 引擎调用 -> 输出路径解析 -> 回传 / 缓存记录

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::application::commands::inference_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    generate_fingerprint, ArchivePort, InferenceEnginePort, Invocation, InvocationPlan,
    PostCallHook, RemoteBody, RetrievalCachePort,
};
use crate::application::services::{Retriever, SaveBodyHook};
use crate::domain::dicom::read_uids;
use crate::domain::engine::{EngineCatalog, EngineDefinition, EngineMode, OutputKind};
use crate::domain::template::{resolve, resolve_args, resolve_output_paths};

/// RunInference Handler - 推理流程编排
pub struct RunInferenceHandler {
    catalog: Arc<EngineCatalog>,
    retriever: Arc<Retriever>,
    engine: Arc<dyn InferenceEnginePort>,
    archive: Arc<dyn ArchivePort>,
    cache: Arc<dyn RetrievalCachePort>,
}

impl RunInferenceHandler {
    pub fn new(
        catalog: Arc<EngineCatalog>,
        retriever: Arc<Retriever>,
        engine: Arc<dyn InferenceEnginePort>,
        archive: Arc<dyn ArchivePort>,
        cache: Arc<dyn RetrievalCachePort>,
    ) -> Self {
        Self {
            catalog,
            retriever,
            engine,
            archive,
            cache,
        }
    }

    pub async fn handle(&self, cmd: RunInference) -> Result<RunInferenceResponse, ApplicationError> {
        let definition = self
            .catalog
            .get(&cmd.engine_name)
            .ok_or_else(|| ApplicationError::EngineNotFound(cmd.engine_name.clone()))?;

        cmd.request
            .validate()
            .map_err(|e| ApplicationError::invalid(e.to_string()))?;

        tracing::info!(
            engine = %definition.name,
            mode = definition.mode.as_str(),
            objects = cmd.request.dicom_uids_list.len(),
            use_cache = definition.use_cache,
            "Running inference"
        );

        let retrieval = self
            .retriever
            .retrieve(&cmd.request, definition.use_cache)
            .await
            .map_err(|e| {
                tracing::error!(engine = %definition.name, error = %e, "Retrieval failed");
                ApplicationError::from(e)
            })?;

        let context = retrieval.template_context(
            cmd.request.params.as_ref(),
            definition.entry_file.as_deref(),
        );
        let fingerprint = definition
            .use_cache
            .then(|| generate_fingerprint(&cmd.request));

        if let Some(outputs) = self
            .reusable_outputs(fingerprint.as_deref(), definition, &context)
            .await
        {
            tracing::info!(
                engine = %definition.name,
                outputs = outputs.len(),
                "Reusing previous inference outputs"
            );
            return Ok(RunInferenceResponse {
                outcome: InferenceOutcome::Files(outputs),
                cleanup: cleanup_paths(definition, &context),
                reused: true,
            });
        }

        let plan = build_plan(definition, &context)?;
        // 引擎错误已在调度处记录细节
        let raw = self.engine.execute(plan, cmd.cancel.clone()).await?;

        let outcome = match definition.output {
            OutputKind::Json => InferenceOutcome::Json(raw.to_json()),
            OutputKind::File => {
                let outputs = existing_outputs(definition, &context).await?;
                self.after_outputs(definition, fingerprint.as_deref(), &outputs)
                    .await;
                InferenceOutcome::Files(outputs)
            }
        };

        tracing::info!(engine = %definition.name, "Inference completed");

        // 通配符要匹配引擎运行期间产生的中间文件
        Ok(RunInferenceResponse {
            outcome,
            cleanup: cleanup_paths(definition, &context),
            reused: false,
        })
    }

    /// 本引擎已有推理结果且全部输出仍存在时返回这些输出
    async fn reusable_outputs(
        &self,
        fingerprint: Option<&str>,
        definition: &EngineDefinition,
        context: &Value,
    ) -> Option<Vec<PathBuf>> {
        if definition.output != OutputKind::File {
            return None;
        }
        let entry = match self.cache.lookup(fingerprint?).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed");
                return None;
            }
        };
        if !entry.has_result_from(&definition.name) {
            return None;
        }

        let outputs = resolve_output_paths(&definition.output_paths, context).ok()?;
        if outputs.is_empty() {
            return None;
        }
        for path in &outputs {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                tracing::debug!(missing = %path.display(), "Previous output missing, rerunning");
                return None;
            }
        }
        Some(outputs)
    }

    /// 回传 DICOM 输出并记录到缓存，失败只记日志
    async fn after_outputs(
        &self,
        definition: &EngineDefinition,
        fingerprint: Option<&str>,
        outputs: &[PathBuf],
    ) {
        let mut output_uids = Vec::new();

        for path in outputs.iter().filter(|p| is_dicom_file(p)) {
            match tokio::fs::read(path).await {
                Ok(data) => match read_uids(&data) {
                    Ok(uids) => output_uids.push(uids),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Output is not readable DICOM")
                    }
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to read output"),
            }

            if definition.store_outputs {
                if let Err(e) = self.archive.store_instance(path).await {
                    tracing::warn!(
                        engine = %definition.name,
                        path = %path.display(),
                        error = %e,
                        "Failed to store output to archive"
                    );
                }
            }
        }

        if let Some(fp) = fingerprint {
            match self
                .cache
                .record_outputs(fp, &definition.name, &output_uids)
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::debug!(fingerprint = %fp, "No cache entry for outputs"),
                Err(e) => {
                    tracing::warn!(fingerprint = %fp, error = %e, "Failed to record outputs")
                }
            }
        }
    }
}

fn is_dicom_file(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("dcm"))
}

/// 由引擎配置和模板上下文生成调用计划
pub fn build_plan(
    definition: &EngineDefinition,
    context: &Value,
) -> Result<InvocationPlan, ApplicationError> {
    let missing = |field: &str| {
        ApplicationError::internal(format!("engine {} has no {}", definition.name, field))
    };
    let args = resolve_args(&definition.args, context);

    let invocation = match definition.mode {
        EngineMode::Native => Invocation::Native {
            entry_file: definition
                .entry_file
                .clone()
                .ok_or_else(|| missing("entry_file"))?,
            args,
        },
        EngineMode::Virtualenv => Invocation::Virtualenv {
            env_name: definition
                .env_name
                .clone()
                .ok_or_else(|| missing("env_name"))?,
            entry_file: definition
                .entry_file
                .clone()
                .ok_or_else(|| missing("entry_file"))?,
            args,
        },
        EngineMode::CustomCommand => Invocation::CustomCommand {
            command: definition
                .command
                .clone()
                .ok_or_else(|| missing("command"))?,
            entry_file: definition.entry_file.clone(),
            args,
        },
        EngineMode::RemoteApi => {
            let url_template = definition
                .api_url
                .as_deref()
                .ok_or_else(|| missing("api_url"))?;
            // 字符串形式的请求体是待上传文件的路径模板
            let body = match &definition.api_body {
                Some(Value::String(template)) => {
                    Some(RemoteBody::File(PathBuf::from(resolve(template, context))))
                }
                Some(value) => Some(RemoteBody::Json(value.clone())),
                None => None,
            };
            let hook = definition.api_save_body_to.as_deref().map(|template| {
                Arc::new(SaveBodyHook::new(resolve(template, context))) as Arc<dyn PostCallHook>
            });
            Invocation::RemoteApi {
                url: resolve(url_template, context),
                method: definition.api_method,
                body,
                hook,
            }
        }
    };

    Ok(InvocationPlan {
        invocation,
        timeout: definition.timeout_secs.map(Duration::from_secs),
    })
}

/// 解析输出路径，只保留存在的文件；一个都没有时报错
async fn existing_outputs(
    definition: &EngineDefinition,
    context: &Value,
) -> Result<Vec<PathBuf>, ApplicationError> {
    let resolved = resolve_output_paths(&definition.output_paths, context)
        .map_err(|e| ApplicationError::internal(e.to_string()))?;

    let mut existing = Vec::with_capacity(resolved.len());
    for path in resolved {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            existing.push(path);
        } else {
            tracing::warn!(engine = %definition.name, path = %path.display(), "Expected output not found");
        }
    }

    if existing.is_empty() {
        tracing::error!(engine = %definition.name, "Engine produced no output files");
        return Err(ApplicationError::OutputMissing(definition.name.clone()));
    }
    Ok(existing)
}

fn cleanup_paths(definition: &EngineDefinition, context: &Value) -> Vec<PathBuf> {
    if definition.cleanup_patterns.is_empty() {
        return Vec::new();
    }
    resolve_output_paths(&definition.cleanup_patterns, context).unwrap_or_else(|e| {
        tracing::warn!(engine = %definition.name, error = %e, "Invalid cleanup pattern");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{EngineError, RawOutput};
    use crate::domain::dicom::{encode_part10, DicomUidTriplet, InferenceRequest};
    use crate::domain::engine::ApiMethod;
    use crate::infrastructure::adapters::{FakeArchive, FileObjectStore};
    use crate::infrastructure::memory::InMemoryRetrievalCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// 把每个参数当作输出路径写入一个分割结果对象
    #[derive(Default)]
    struct WritingEngine {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl InferenceEnginePort for WritingEngine {
        async fn execute(
            &self,
            plan: InvocationPlan,
            _cancel: CancellationToken,
        ) -> Result<RawOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(EngineError::failed("exit code 1", "Traceback: boom"));
            }
            let Invocation::Native { args, .. } = plan.invocation else {
                return Err(EngineError::failed("unexpected mode", ""));
            };
            for arg in args.iter().filter(|a| !a.is_empty()) {
                std::fs::write(arg, encode_part10("S1", "SEG", "SEG.1", b"mask"))
                    .map_err(|e| EngineError::IoError(e.to_string()))?;
            }
            Ok(RawOutput::Lines(vec![r#"{"volume": 12.5}"#.to_string()]))
        }
    }

    struct Fixture {
        archive: Arc<FakeArchive>,
        cache: Arc<InMemoryRetrievalCache>,
        engine: Arc<WritingEngine>,
        handler: RunInferenceHandler,
        _dir: TempDir,
    }

    fn segmentation_engine() -> EngineDefinition {
        let mut def = EngineDefinition::new("seg", EngineMode::Native);
        def.entry_file = Some(PathBuf::from("/models/seg.py"));
        def.args = vec!["${studyDir}/seg.dcm".into()];
        def.output_paths = vec!["${studyDir}/seg.dcm".into()];
        def.use_cache = true;
        def
    }

    async fn fixture(engines: Vec<EngineDefinition>, engine: WritingEngine) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::new());
        for sop in ["I1", "I2", "I3"] {
            archive.add_instance("S1", "SE1", sop, b"px");
        }
        let store = Arc::new(FileObjectStore::new(dir.path()).await.unwrap());
        let cache = Arc::new(InMemoryRetrievalCache::new());
        let engine = Arc::new(engine);
        let retriever = Arc::new(Retriever::new(archive.clone(), store, cache.clone()));
        let handler = RunInferenceHandler::new(
            Arc::new(EngineCatalog::new(engines).unwrap()),
            retriever,
            engine.clone(),
            archive.clone(),
            cache.clone(),
        );
        Fixture {
            archive,
            cache,
            engine,
            handler,
            _dir: dir,
        }
    }

    fn series_request() -> InferenceRequest {
        InferenceRequest::new(vec![DicomUidTriplet::series("S1", "SE1")])
    }

    #[tokio::test]
    async fn test_second_run_reuses_outputs() {
        let fx = fixture(vec![segmentation_engine()], WritingEngine::default()).await;

        let first = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        assert!(!first.reused);
        let InferenceOutcome::Files(files) = &first.outcome else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);

        let second = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        assert!(second.reused);
        assert_eq!(second.outcome, first.outcome);
        assert_eq!(fx.engine.calls.load(Ordering::Relaxed), 1);
        assert_eq!(fx.archive.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_outputs_recorded_and_stored() {
        let mut def = segmentation_engine();
        def.store_outputs = true;
        let fx = fixture(vec![def], WritingEngine::default()).await;

        let response = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        let InferenceOutcome::Files(files) = response.outcome else {
            panic!("expected files");
        };

        assert_eq!(fx.archive.stored_files(), files);
        let entry = fx
            .cache
            .lookup(&generate_fingerprint(&series_request()))
            .await
            .unwrap()
            .unwrap();
        assert!(entry.has_result_from("seg"));
        assert_eq!(
            entry.produced_outputs,
            vec![DicomUidTriplet::instance("S1", "SEG", "SEG.1")]
        );
    }

    #[tokio::test]
    async fn test_missing_output_is_error() {
        let mut def = segmentation_engine();
        def.args = vec![];
        let fx = fixture(vec![def], WritingEngine::default()).await;

        let err = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::OutputMissing(name) if name == "seg"));
    }

    #[tokio::test]
    async fn test_json_output() {
        let mut def = segmentation_engine();
        def.output = OutputKind::Json;
        def.output_paths = vec![];
        let fx = fixture(vec![def], WritingEngine::default()).await;

        let response = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        let InferenceOutcome::Json(value) = response.outcome else {
            panic!("expected json");
        };
        assert_eq!(value["volume"], 12.5);
    }

    #[tokio::test]
    async fn test_unknown_engine() {
        let fx = fixture(vec![segmentation_engine()], WritingEngine::default()).await;
        let err = fx
            .handler
            .handle(RunInference::new("lung", series_request()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::EngineNotFound(_)));
        assert_eq!(fx.archive.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_opaque() {
        let engine = WritingEngine {
            fail: true,
            ..Default::default()
        };
        let fx = fixture(vec![segmentation_engine()], engine).await;
        let err = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::EngineExecutionFailed));
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let fx = fixture(vec![segmentation_engine()], WritingEngine::default()).await;
        let err = fx
            .handler
            .handle(RunInference::new("seg", InferenceRequest::new(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_cleanup_paths_resolved() {
        let mut def = segmentation_engine();
        def.cleanup_patterns = vec!["${studyDir}/seg.dcm".into()];
        let fx = fixture(vec![def], WritingEngine::default()).await;

        let response = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        let InferenceOutcome::Files(files) = response.outcome else {
            panic!("expected files");
        };
        assert_eq!(response.cleanup, files);
    }

    #[tokio::test]
    async fn test_other_engine_does_not_reuse_outputs() {
        // 第二个引擎的输出模式恰好能匹配输入对象
        let mut other = segmentation_engine();
        other.name = "other".into();
        other.args = vec!["${studyDir}/other.dcm".into()];
        other.output_paths = vec!["${seriesDirList[0]}/*.dcm".into()];
        let fx = fixture(vec![segmentation_engine(), other], WritingEngine::default()).await;

        fx.handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        let response = fx
            .handler
            .handle(RunInference::new("other", series_request()))
            .await
            .unwrap();

        assert!(!response.reused);
        assert_eq!(fx.engine.calls.load(Ordering::Relaxed), 2);

        // 缓存条目归属最后一次运行的引擎
        let seg_again = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();
        assert!(!seg_again.reused);
        assert_eq!(fx.engine.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_cleanup_wildcard_matches_engine_files() {
        let mut def = segmentation_engine();
        def.args = vec![
            "${studyDir}/seg.dcm".into(),
            "${studyDir}/tmp_1.txt".into(),
            "${studyDir}/tmp_2.txt".into(),
        ];
        def.cleanup_patterns = vec!["${studyDir}/tmp_*.txt".into()];
        let fx = fixture(vec![def], WritingEngine::default()).await;

        let response = fx
            .handler
            .handle(RunInference::new("seg", series_request()))
            .await
            .unwrap();

        let names: Vec<_> = response
            .cleanup
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["tmp_1.txt", "tmp_2.txt"]);
    }

    #[test]
    fn test_build_plan_remote_with_file_body() {
        let mut def = EngineDefinition::new("remote", EngineMode::RemoteApi);
        def.api_url = Some("http://ai/predict?study=${params.study}".into());
        def.api_method = ApiMethod::Post;
        def.api_body = Some(Value::String("${instancesFilenameList[0]}".into()));
        def.api_save_body_to = Some("${studyDir}/result.dcm".into());
        def.timeout_secs = Some(30);

        let context = serde_json::json!({
            "studyDir": "/tmp/s",
            "instancesFilenameList": ["/tmp/s/a/1.dcm"],
            "params": {"study": "S1"}
        });
        let plan = build_plan(&def, &context).unwrap();

        assert_eq!(plan.timeout, Some(Duration::from_secs(30)));
        match plan.invocation {
            Invocation::RemoteApi {
                url,
                method,
                body,
                hook,
            } => {
                assert_eq!(url, "http://ai/predict?study=S1");
                assert_eq!(method, ApiMethod::Post);
                assert!(
                    matches!(body, Some(RemoteBody::File(path)) if path == PathBuf::from("/tmp/s/a/1.dcm"))
                );
                assert!(hook.is_some());
            }
            other => panic!("unexpected invocation: {other:?}"),
        }
    }
}
