use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::{ClickOutcome, Engine};
use crate::protocol::{
    ConfigureClient, DaemonRequest, DaemonResponse, ErrorCode, ErrorResponse, RequestBody,
    ResponseBody,
};

pub struct CommandServer {
    config: ServerConfig,
    engine: Engine,
}

impl CommandServer {
    pub fn new(config: ServerConfig, engine: Engine) -> Self {
        Self { config, engine }
    }

    pub async fn run(&self) -> Result<()> {
        self.prepare_socket_path().await?;
        if self.config.socket_path.exists() {
            fs::remove_file(&self.config.socket_path)
                .await
                .with_context(|| {
                    format!(
                        "failed to cleanup stale socket {}",
                        self.config.socket_path.display()
                    )
                })?;
        }

        let listener = UnixListener::bind(&self.config.socket_path).with_context(|| {
            format!(
                "failed to bind unix socket at {}",
                self.config.socket_path.display()
            )
        })?;
        info!(
            "lexilight daemon listening on {}",
            self.config.socket_path.display()
        );

        loop {
            let (stream, _) = listener.accept().await?;
            let engine = self.engine.clone();
            let timeout_ms = self.config.request_timeout_ms;
            tokio::spawn(async move {
                if let Err(error) = handle_connection(stream, engine, timeout_ms).await {
                    warn!("connection closed with error: {error:#}");
                }
            });
        }
    }

    async fn prepare_socket_path(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.config.socket_path).parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create socket directory {}", parent.display())
            })?;
        }
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, engine: Engine, timeout_ms: u64) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_line(&line, &engine, timeout_ms).await;
        let payload = serde_json::to_string(&response)?;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

async fn process_line(line: &str, engine: &Engine, timeout_ms: u64) -> DaemonResponse {
    match serde_json::from_str::<DaemonRequest>(line) {
        Ok(request) => handle_request(request, engine, timeout_ms).await,
        Err(error) => {
            error!("invalid request JSON: {error}");
            failure(
                String::new(),
                ErrorCode::InvalidRequest,
                format!("invalid JSON payload: {error}"),
            )
        }
    }
}

async fn handle_request(request: DaemonRequest, engine: &Engine, timeout_ms: u64) -> DaemonResponse {
    let id = request.id;
    let body = match request.body {
        RequestBody::Ping => ResponseBody::Pong,
        RequestBody::ConfigureClient(ConfigureClient {
            api_key,
            enable_highlighting,
            auto_highlight,
        }) => ResponseBody::ack(engine.configure(
            api_key.as_deref(),
            enable_highlighting,
            auto_highlight,
        )),
        RequestBody::StartHighlighting { auto_highlight } => {
            engine.start_highlighting(auto_highlight);
            ResponseBody::ack(true)
        }
        RequestBody::StopHighlighting => {
            engine.stop_highlighting();
            ResponseBody::ack(true)
        }
        RequestBody::SetAutoHighlight { auto_highlight } => {
            engine.set_auto_highlight(auto_highlight);
            ResponseBody::ack(true)
        }
        RequestBody::AnalyzeText { text } => {
            // The analysis outlives the reply; a late result still reaches the tooltip.
            let analysis = tokio::spawn({
                let engine = engine.clone();
                async move { engine.analyze_text(&text).await }
            });
            let budget = Duration::from_millis(timeout_ms.max(1));
            match timeout(budget, analysis).await {
                Ok(Ok(shown)) => ResponseBody::ack(shown),
                Ok(Err(join_error)) => {
                    return failure(
                        id,
                        ErrorCode::Internal,
                        format!("analysis task failed: {join_error}"),
                    )
                }
                Err(_) => {
                    return failure(
                        id,
                        ErrorCode::Timeout,
                        format!("analysis exceeded {timeout_ms}ms"),
                    )
                }
            }
        }
        RequestBody::LoadDocument { root, lang } => ResponseBody::Loaded {
            root: engine.load_document(&root, lang),
        },
        RequestBody::InsertNodes { parent, nodes } => match engine.insert_nodes(parent, &nodes) {
            Some(ids) => ResponseBody::Inserted { ids },
            None => {
                return failure(
                    id,
                    ErrorCode::InvalidRequest,
                    format!("node {} is not an element", parent.0),
                )
            }
        },
        RequestBody::PointerOver { node, at } => {
            engine.pointer_over(node, at);
            ResponseBody::ack(true)
        }
        RequestBody::PointerOut => {
            engine.pointer_out();
            ResponseBody::ack(true)
        }
        RequestBody::Click {
            node,
            on_tooltip,
            at,
        } => match engine.click(node, on_tooltip, at) {
            ClickOutcome::Handled => ResponseBody::ack(true),
            ClickOutcome::HighlightingStopped => ResponseBody::HighlightingStopped,
        },
        RequestBody::SelectionChange { text, rect } => {
            engine.selection_change(&text, rect);
            ResponseBody::ack(true)
        }
        RequestBody::Render => {
            let (markup, tooltip) = engine.render();
            ResponseBody::Rendered { markup, tooltip }
        }
    };
    debug!(id = %id, "request handled");
    DaemonResponse { id, body }
}

fn failure(id: String, code: ErrorCode, message: String) -> DaemonResponse {
    DaemonResponse {
        id,
        body: ResponseBody::Error(ErrorResponse { code, message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HighlightConfig, ModelConfig};
    use crate::generator::testing::ScriptedClient;

    fn engine() -> Engine {
        Engine::new(ModelConfig::default(), HighlightConfig::default())
    }

    async fn send(engine: &Engine, line: &str) -> DaemonResponse {
        process_line(line, engine, 100).await
    }

    #[tokio::test]
    async fn handles_ping() {
        let request = DaemonRequest {
            id: "1".to_string(),
            body: RequestBody::Ping,
        };

        let response = handle_request(request, &engine(), 100).await;
        assert!(matches!(response.body, ResponseBody::Pong));
        assert_eq!(response.id, "1");
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let response = send(&engine(), "{not json").await;
        match response.body {
            ResponseBody::Error(error) => assert_eq!(error.code, ErrorCode::InvalidRequest),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn loads_and_renders_document() {
        let engine = engine();
        let response = send(
            &engine,
            r#"{"id":"1","type":"load_document","root":{"tag":"body","children":[{"tag":"p","children":["Hello Prague"]}]}}"#,
        )
        .await;
        assert!(matches!(response.body, ResponseBody::Loaded { .. }));

        let response = send(&engine, r#"{"id":"2","type":"render"}"#).await;
        match response.body {
            ResponseBody::Rendered { markup, tooltip } => {
                assert!(markup.contains("Hello Prague"));
                assert!(!tooltip.visible);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_into_unknown_parent_is_invalid() {
        let response = send(
            &engine(),
            r#"{"id":"3","type":"insert_nodes","parent":4242,"nodes":["text"]}"#,
        )
        .await;
        assert_eq!(response.id, "3");
        match response.body {
            ResponseBody::Error(error) => assert_eq!(error.code, ErrorCode::InvalidRequest),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clearing_key_and_stop_both_ack() {
        let engine = engine();
        let response = send(&engine, r#"{"type":"configure_client","api_key":null}"#).await;
        assert!(matches!(response.body, ResponseBody::Ack { success: true }));

        let response = send(&engine, r#"{"type":"stop_highlighting"}"#).await;
        assert!(matches!(response.body, ResponseBody::Ack { success: true }));
        assert!(serde_json::to_string(&response)
            .unwrap()
            .contains(r#""success":true"#));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_analysis_lands_after_reply_times_out() {
        let client = ScriptedClient::new();
        client.push(Duration::from_secs(2), Ok("A castle complex.".to_string()));
        let engine = engine();
        engine.install(client.clone(), false, true);

        let response = send(&engine, r#"{"type":"analyze_text","text":"Prague castle"}"#).await;
        match response.body {
            ResponseBody::Error(error) => assert_eq!(error.code, ErrorCode::Timeout),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(engine.render().1.text, "Loading analysis...");

        tokio::time::sleep(Duration::from_secs(5)).await;
        let (_, tooltip) = engine.render();
        assert_eq!(client.calls(), 1);
        assert!(!tooltip.is_error);
        assert_eq!(tooltip.text, "A castle complex.");
    }

    #[tokio::test]
    async fn analyze_text_without_client_shows_error() {
        let engine = engine();
        let response = send(&engine, r#"{"type":"analyze_text","text":"Prague castle"}"#).await;
        assert!(matches!(response.body, ResponseBody::Ack { success: true }));
        let (_, tooltip) = engine.render();
        assert!(tooltip.is_error);
        assert!(tooltip.text.starts_with("API key not set"));
    }
}
