use lexilight_core::{NodeId, NodeSpec, Point, Rect, TooltipView};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    ConfigureClient(ConfigureClient),
    StartHighlighting {
        #[serde(default = "default_auto_highlight")]
        auto_highlight: bool,
    },
    StopHighlighting,
    SetAutoHighlight {
        auto_highlight: bool,
    },
    AnalyzeText {
        text: String,
    },
    LoadDocument {
        root: NodeSpec,
        #[serde(default)]
        lang: Option<String>,
    },
    InsertNodes {
        parent: NodeId,
        nodes: Vec<NodeSpec>,
    },
    PointerOver {
        node: NodeId,
        #[serde(flatten)]
        at: Point,
    },
    PointerOut,
    Click {
        #[serde(default)]
        node: Option<NodeId>,
        #[serde(default)]
        on_tooltip: bool,
        #[serde(flatten)]
        at: Point,
    },
    SelectionChange {
        #[serde(default)]
        text: String,
        #[serde(default)]
        rect: Option<Rect>,
    },
    Render,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureClient {
    pub api_key: Option<String>,
    #[serde(default)]
    pub enable_highlighting: bool,
    #[serde(default = "default_auto_highlight")]
    pub auto_highlight: bool,
}

fn default_auto_highlight() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    Ack { success: bool },
    Loaded { root: NodeId },
    Inserted { ids: Vec<NodeId> },
    HighlightingStopped,
    Rendered { markup: String, tooltip: TooltipView },
    Pong,
    Error(ErrorResponse),
}

impl ResponseBody {
    pub fn ack(success: bool) -> Self {
        ResponseBody::Ack { success }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Timeout,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_configure_client() {
        let raw = r#"{"id":"abc","type":"configure_client","api_key":"secret","enable_highlighting":true}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.id, "abc");
        match request.body {
            RequestBody::ConfigureClient(payload) => {
                assert_eq!(payload.api_key.as_deref(), Some("secret"));
                assert!(payload.enable_highlighting);
                assert!(payload.auto_highlight);
            }
            _ => panic!("expected configure_client request"),
        }
    }

    #[test]
    fn parse_cleared_key_and_unit_commands() {
        let raw = r#"{"type":"configure_client","api_key":null}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            request.body,
            RequestBody::ConfigureClient(ConfigureClient { api_key: None, .. })
        ));

        let raw = r#"{"id":"2","type":"stop_highlighting"}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.body, RequestBody::StopHighlighting));
    }

    #[test]
    fn parse_document_events() {
        let raw = r#"{"type":"load_document","lang":"cs","root":{"tag":"body","children":[{"tag":"p","children":["Ahoj Praho"]}]}}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.body, RequestBody::LoadDocument { lang: Some(_), .. }));

        let raw = r#"{"type":"pointer_over","node":7,"x":12.5,"y":40}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        match request.body {
            RequestBody::PointerOver { node, at } => {
                assert_eq!(node, NodeId(7));
                assert_eq!(at, Point { x: 12.5, y: 40.0 });
            }
            _ => panic!("expected pointer_over request"),
        }

        let raw = r#"{"type":"click","x":0,"y":0}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            request.body,
            RequestBody::Click {
                node: None,
                on_tooltip: false,
                ..
            }
        ));
    }

    #[test]
    fn ack_serializes_flat() {
        let response = DaemonResponse {
            id: "9".to_string(),
            body: ResponseBody::ack(true),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":"9","type":"ack","success":true}"#
        );
    }
}
