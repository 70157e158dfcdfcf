//! JSON Canvas 1.0 passthrough. `.canvas` files are not parsed into the
//! observation/relation model the way `.md` notes are — the engine reads
//! and writes them as opaque JSON, preserving whatever fields a canvas
//! editor wrote even if this crate doesn't model them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Text,
    Link,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Every other field (`file`, `text`, `url`, `label`, ...) is
    /// type-specific and passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub id: String,
    #[serde(rename = "fromNode")]
    pub from_node: String,
    #[serde(rename = "toNode")]
    pub to_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "fromSide")]
    pub from_side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "toSide")]
    pub to_side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Canvas {
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
}

pub fn parse(text: &str) -> Result<Canvas> {
    serde_json::from_str(text).map_err(|e| Error::ParseError {
        path: std::path::PathBuf::new(),
        message: format!("malformed canvas JSON: {e}"),
    })
}

pub fn render(canvas: &Canvas) -> Result<String> {
    serde_json::to_string_pretty(canvas).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_minimal_canvas() {
        let text = r#"{
            "nodes": [
                {"id": "n1", "type": "text", "x": 0, "y": 0, "width": 100, "height": 50, "text": "hello"},
                {"id": "n2", "type": "file", "x": 200, "y": 0, "width": 100, "height": 50, "file": "notes/x.md"}
            ],
            "edges": [
                {"id": "e1", "fromNode": "n1", "toNode": "n2", "label": "links to"}
            ]
        }"#;
        let canvas = parse(text).unwrap();
        assert_eq!(canvas.nodes.len(), 2);
        assert_eq!(canvas.edges.len(), 1);
        assert_eq!(canvas.nodes[0].node_type, NodeType::Text);
        assert_eq!(canvas.nodes[0].extra.get("text").and_then(|v| v.as_str()), Some("hello"));

        let rendered = render(&canvas).unwrap();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(reparsed.nodes.len(), 2);
        assert_eq!(reparsed.edges[0].label.as_deref(), Some("links to"));
    }

    #[test]
    fn unrecognized_node_fields_survive_a_round_trip() {
        let text = r#"{"nodes":[{"id":"n1","type":"group","x":0,"y":0,"width":10,"height":10,"label":"Section","future_field":42}],"edges":[]}"#;
        let canvas = parse(text).unwrap();
        let rendered = render(&canvas).unwrap();
        assert!(rendered.contains("future_field"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse("not json").is_err());
    }
}
