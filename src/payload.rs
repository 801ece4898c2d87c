//! Schema for the messages request body.
//!
//! Only the fields that can carry user content are typed. Everything else
//! rides along in flattened `extra` maps so a decode/encode round trip keeps
//! fields this schema does not know about. Field order and whitespace are
//! not preserved.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `content` is either a bare string or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Entries(Vec<SystemEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEntry {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One element of a message's content list, discriminated by its `type`.
/// Kinds this schema does not model are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Other(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Arbitrary JSON chosen by the model; scanned in serialized form.
    #[serde(default)]
    pub input: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ToolResultContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Only nested `text` blocks are scanned; images, documents and the like
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ContentBlock {
    pub fn kind(&self) -> &str {
        match self {
            ContentBlock::Text(_) => "text",
            ContentBlock::ToolUse(_) => "tool_use",
            ContentBlock::ToolResult(_) => "tool_result",
            ContentBlock::Other(map) => map.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}

impl TryFrom<Map<String, Value>> for ContentBlock {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let kind = map.get("type").and_then(Value::as_str).map(str::to_owned);
        let block = match kind.as_deref() {
            Some("text") => {
                map.remove("type");
                ContentBlock::Text(serde_json::from_value(Value::Object(map))?)
            }
            Some("tool_use") => {
                map.remove("type");
                ContentBlock::ToolUse(serde_json::from_value(Value::Object(map))?)
            }
            Some("tool_result") => {
                map.remove("type");
                ContentBlock::ToolResult(serde_json::from_value(Value::Object(map))?)
            }
            _ => ContentBlock::Other(map),
        };
        Ok(block)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::deserialize(deserializer)?;
        ContentBlock::try_from(map).map_err(D::Error::custom)
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    block: &'a T,
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentBlock::Text(block) => Tagged { kind: "text", block }.serialize(serializer),
            ContentBlock::ToolUse(block) => Tagged {
                kind: "tool_use",
                block,
            }
            .serialize(serializer),
            ContentBlock::ToolResult(block) => Tagged {
                kind: "tool_result",
                block,
            }
            .serialize(serializer),
            ContentBlock::Other(map) => map.serialize(serializer),
        }
    }
}
