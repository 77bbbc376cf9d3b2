//! Evidence record and the analysis response contract.
//!
//! The oracle owns the evidence: each analysis turn returns the complete record,
//! which replaces the previous one wholesale. Nothing here merges.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DeployError;

/// A network port as reported by the oracle: `5000`, `"5000"`, or an object
/// such as `{"port": 5000, "protocol": "tcp"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u64),
    Text(String),
    Detailed(Map<String, Value>),
}

const PORT_KEYS: [&str; 4] = ["port", "container_port", "target_port", "host_port"];

impl Port {
    /// Numeric value, parsing textual ports when possible.
    pub fn number(&self) -> Option<u64> {
        match self {
            Port::Number(n) => Some(*n),
            Port::Text(text) => text.trim().parse().ok(),
            Port::Detailed(fields) => PORT_KEYS
                .iter()
                .filter_map(|key| fields.get(*key))
                .find_map(|value| match value {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }),
        }
    }
}

/// Deployment-relevant facts gathered about a repository.
///
/// Known keys land in typed fields when their value has the expected shape;
/// a lone value where a list is expected becomes a one-element list. Every
/// other key, and any known key whose value does not fit, is kept verbatim in
/// `extra`, so a record written to disk carries everything the oracle said.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct EvidenceRecord {
    /// Deployment target (e.g. `aws`, `gcp`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
    /// Runtime platforms (e.g. `python`, `node.js`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platform: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build_commands: Vec<String>,
    /// Commands that rewrite hardcoded addresses before the build.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub update_commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deployment_commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for EvidenceRecord {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            target: take_text(&mut fields, "target"),
            region: take_text(&mut fields, "region"),
            instance_type: take_text(&mut fields, "instance_type"),
            frameworks: take_list(&mut fields, "frameworks"),
            platform: take_list(&mut fields, "platform"),
            config_files: take_list(&mut fields, "config_files"),
            ports: take_list(&mut fields, "ports"),
            build_commands: take_list(&mut fields, "build_commands"),
            update_commands: take_list(&mut fields, "update_commands"),
            deployment_commands: take_list(&mut fields, "deployment_commands"),
            notes: take_list(&mut fields, "notes"),
            extra: fields,
        }
    }
}

impl EvidenceRecord {
    /// True when any platform matches `name`, ignoring case.
    pub fn has_platform(&self, name: &str) -> bool {
        self.platform.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    /// True when any port resolves to `port`.
    pub fn has_port(&self, port: u64) -> bool {
        self.ports.iter().any(|p| p.number() == Some(port))
    }

    /// Deployment target, if set and non-blank.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Replace the target, dropping any untyped `target` value kept in `extra`.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.extra.remove("target");
        self.target = Some(target.into());
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(text) => Some(text),
        other => {
            fields.insert(key.to_string(), other);
            None
        }
    }
}

/// Typed list for `key`, or empty with the raw value left in `fields` when it
/// is null, an empty array, or has elements of the wrong shape.
fn take_list<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Vec<T> {
    let Some(raw) = fields.remove(key) else {
        return Vec::new();
    };
    let parsed = match &raw {
        Value::Null => None,
        Value::Array(items) => items
            .iter()
            .map(|item| T::deserialize(item).ok())
            .collect::<Option<Vec<T>>>(),
        single => T::deserialize(single).ok().map(|item| vec![item]),
    };
    match parsed {
        Some(items) if !items.is_empty() => items,
        _ => {
            fields.insert(key.to_string(), raw);
            Vec::new()
        }
    }
}

/// The oracle's declared next action during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NextTask {
    ReadDir {
        #[serde(default, deserialize_with = "text_or_empty")]
        target: String,
    },
    ReadFile {
        #[serde(deserialize_with = "text_or_empty")]
        target: String,
    },
    Ask {
        question: String,
    },
    Deploy,
    Halt {
        #[serde(default, deserialize_with = "text_or_empty")]
        error: String,
    },
}

/// One complete analysis turn from the oracle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisResponse {
    pub evidences: EvidenceRecord,
    pub next_task: NextTask,
    pub summary: String,
}

/// Parse an analysis completion.
///
/// A markdown fence around the object is tolerated and stripped. Anything else
/// that does not deserialize into [`AnalysisResponse`] is a protocol violation.
pub fn parse_analysis_response(raw: &str) -> Result<AnalysisResponse, DeployError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(DeployError::protocol("empty analysis response"));
    }
    serde_json::from_str(body)
        .map_err(|err| DeployError::protocol(format!("invalid analysis response: {err}")))
}

/// Remove a surrounding ```` ```json ```` (or bare ```` ``` ````) fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(de::Error::custom(format!("expected a string, got {other}"))),
    }
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.unwrap_or_default())
}
