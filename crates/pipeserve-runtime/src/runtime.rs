//! Async invocation surface over a tool registry.

use std::sync::Arc;

use pipeserve_core::{
    Frame, InvocationError, Record, RegistryError, ToolInfo, ToolRegistry, normalize_output,
};
use tokio::task::JoinError;
use tracing::{error, info, instrument};

/// Errors returned by [`LocalRuntime::call_tool`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CallError {
    #[error(transparent)]
    NotFound(#[from] RegistryError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The blocking invocation task panicked or was cancelled.
    #[error("tool execution failed: {0}")]
    Join(#[from] JoinError),
}

impl CallError {
    /// Returns `true` when the caller's arguments were at fault.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Invocation(e) if e.is_caller_error())
    }
}

/// Runtime that executes tools in-process.
///
/// Cheap to clone; all clones share one registry.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    registry: Arc<ToolRegistry>,
}

impl LocalRuntime {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the tool registry backing this runtime.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Lists every registered tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.registry.list()
    }

    /// Waits for any in-flight calls to complete.
    pub async fn drain(&self) {
        self.registry.drain().await;
    }

    /// Invokes the tool registered as `name` with keyword arguments.
    ///
    /// The adapter runs on the blocking pool; the call counts as in flight
    /// until the adapter returns, even if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// - [`CallError::NotFound`] if no tool has that name
    /// - [`CallError::Invocation`] if coercion, validation, the pipeline, or
    ///   output normalization fails
    /// - [`CallError::Join`] if the pipeline panics
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn call_tool(&self, name: &str, args: Record) -> Result<Vec<Record>, CallError> {
        let tool = self.registry.lookup(name)?;
        let adapter = Arc::clone(tool.adapter());

        info!(arguments = args.len(), "Invoking tool");
        let inflight = self.registry.start_owned_request_guard();

        let result = tokio::task::spawn_blocking(move || {
            let _inflight = inflight;
            adapter.call(args)
        })
        .await;
        finish(result)
    }

    /// Runs a pipeline directly on `frame`, skipping argument validation.
    ///
    /// `name` selects the tool whose pipeline runs; `None` picks the first
    /// registered tool.
    ///
    /// # Errors
    ///
    /// - [`CallError::NotFound`] if `name` is unknown or nothing is registered
    /// - [`CallError::Invocation`] if the pipeline or output normalization
    ///   fails
    /// - [`CallError::Join`] if the pipeline panics
    #[instrument(skip(self, frame), fields(rows = frame.len()))]
    pub async fn transform(
        &self,
        name: Option<&str>,
        frame: Frame,
    ) -> Result<Vec<Record>, CallError> {
        let tool = match name {
            Some(name) => self.registry.lookup(name)?,
            None => self.registry.first()?,
        };
        let pipeline = Arc::clone(tool.adapter().pipeline());

        info!(tool = %tool.name(), "Transforming frame");
        let inflight = self.registry.start_owned_request_guard();

        let result = tokio::task::spawn_blocking(move || {
            let _inflight = inflight;
            normalize_output(pipeline.transform(frame)?)
        })
        .await;
        finish(result)
    }
}

fn finish(
    result: Result<Result<Vec<Record>, InvocationError>, JoinError>,
) -> Result<Vec<Record>, CallError> {
    match result {
        Ok(Ok(records)) => {
            info!(records = records.len(), "Tool invocation succeeded");
            Ok(records)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Tool invocation failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Tool execution panicked");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipeserve_core::{BuilderTable, CatalogLoader, CatalogManifest, FnPipeline, compile};
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn runtime_from_toml(toml: &str) -> LocalRuntime {
        let manifest = CatalogManifest::from_toml(toml).expect("manifest should parse");
        let catalog = CatalogLoader::new(BuilderTable::with_builtins()).load_manifest(&manifest);
        LocalRuntime::new(Arc::new(ToolRegistry::from_catalog(catalog)))
    }

    #[tokio::test]
    async fn test_call_tool_returns_records() {
        let runtime = runtime_from_toml(
            r#"
[[pipelines]]
name = "scored"
pipeline = "pipeline = constant(column = 'score', value = 2.5)"
properties = { query = "string", k = "int" }
"#,
        );

        let records = runtime
            .call_tool("scored", record(json!({"query": "cats", "k": "3"})))
            .await
            .expect("call should succeed");

        assert_eq!(
            records,
            vec![record(json!({"query": "cats", "k": 3, "score": 2.5}))]
        );
        assert_eq!(runtime.registry().inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_transform_runs_pipeline_without_validation() {
        let runtime = runtime_from_toml(
            r#"
[[pipelines]]
name = "scored"
pipeline = "pipeline = constant(column = 'score', value = 1.0)"
properties = { query = "string" }

[[pipelines]]
name = "renamed"
pipeline = "pipeline = rename(from = 'query', to = 'q')"
"#,
        );
        let frame = Frame::from_records(&[
            record(json!({"qid": "1", "query": "a"})),
            record(json!({"qid": "2", "query": "b", "extra": true})),
        ]);

        let records = runtime
            .transform(None, frame.clone())
            .await
            .expect("default pipeline should run");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["extra"], json!(true));
        assert_eq!(records[1]["score"], json!(1.0));

        let records = runtime
            .transform(Some("renamed"), frame)
            .await
            .expect("named pipeline should run");
        assert_eq!(records[0]["q"], json!("a"));
        assert_eq!(runtime.registry().inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_transform_on_empty_registry_is_not_found() {
        let runtime = LocalRuntime::new(Arc::new(ToolRegistry::new()));
        let err = runtime
            .transform(None, Frame::default())
            .await
            .expect_err("nothing to run");
        assert!(matches!(err, CallError::NotFound(RegistryError::Empty)));
    }

    #[tokio::test]
    async fn test_call_tool_unknown_name() {
        let runtime = LocalRuntime::new(Arc::new(ToolRegistry::new()));
        let err = runtime
            .call_tool("missing", Record::new())
            .await
            .expect_err("unknown tool should fail");
        assert!(matches!(err, CallError::NotFound(RegistryError::NotFound(ref n)) if n == "missing"));
        assert!(!err.is_caller_error());
    }

    #[tokio::test]
    async fn test_call_tool_validation_is_caller_error() {
        let runtime = runtime_from_toml(
            r#"
[[pipelines]]
name = "search"
pipeline = "pipeline = echo()"
"#,
        );

        let err = runtime
            .call_tool("search", record(json!({"wrong": "field"})))
            .await
            .expect_err("unexpected argument should fail");
        assert!(err.is_caller_error());
    }

    #[tokio::test]
    async fn test_call_tool_panicking_pipeline_is_join_error() {
        let mut registry = ToolRegistry::new();
        let schema = compile(&json!({"query": "string"})).expect("schema");
        let pipeline = Arc::new(FnPipeline::new("boom", |_frame| panic!("pipeline exploded")));
        registry.register(
            "boom",
            pipeserve_core::synthesize(pipeline, schema.clone()),
            "Panics",
            schema,
        );
        let runtime = LocalRuntime::new(Arc::new(registry));

        let err = runtime
            .call_tool("boom", record(json!({"query": "x"})))
            .await
            .expect_err("panic should surface as an error");
        assert!(matches!(err, CallError::Join(_)));
        assert_eq!(runtime.registry().inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_inflight_calls() {
        let mut registry = ToolRegistry::new();
        let schema = compile(&json!({"query": "string"})).expect("schema");
        let pipeline = Arc::new(FnPipeline::new("slow", |frame| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(frame.into())
        }));
        registry.register(
            "slow",
            pipeserve_core::synthesize(pipeline, schema.clone()),
            "Sleeps",
            schema,
        );
        let runtime = LocalRuntime::new(Arc::new(registry));

        let caller = runtime.clone();
        let call = tokio::spawn(async move {
            caller
                .call_tool("slow", record(json!({"query": "x"})))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        runtime.drain().await;
        assert_eq!(runtime.registry().inflight_count(), 0);
        assert!(call.await.expect("task").is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_call_stays_inflight_until_pipeline_returns() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let mut registry = ToolRegistry::new();
        let schema = compile(&json!({"query": "string"})).expect("schema");
        let pipeline = Arc::new(FnPipeline::new("slow", move |frame| {
            std::thread::sleep(Duration::from_millis(100));
            done.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(frame.into())
        }));
        registry.register(
            "slow",
            pipeserve_core::synthesize(pipeline, schema.clone()),
            "Sleeps",
            schema,
        );
        let runtime = LocalRuntime::new(Arc::new(registry));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            runtime.call_tool("slow", record(json!({"query": "x"}))),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(runtime.registry().inflight_count(), 1);

        runtime.drain().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(runtime.registry().inflight_count(), 0);
    }
}
