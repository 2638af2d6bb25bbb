//! Raw endpoint config types matching the JSON file (camelCase keys).

use crate::case::to_kebab_case;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_PATH: &str = "/api";

/// Scope a route to the caller: copy claim `tokenKey` into record field `recordKey`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindWithTokenConfig {
    #[serde(default)]
    pub token_key: Option<String>,
    #[serde(default)]
    pub record_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub bind_with_token: Option<BindWithTokenConfig>,
    #[serde(default)]
    pub is_secure: bool,
}

/// Field in another collection that points at records of this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRefConfig {
    pub model_name: String,
    pub field: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConfig {
    #[serde(flatten)]
    pub operation: OperationConfig,
    #[serde(default)]
    pub remove_refs: Vec<RemoveRefConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub model_name: String,
    #[serde(default)]
    pub model_base_path: Option<String>,
    #[serde(default)]
    pub api_base_path: Option<String>,
    #[serde(default)]
    pub create: OperationConfig,
    #[serde(default)]
    pub delete: DeleteConfig,
    #[serde(default)]
    pub find: OperationConfig,
    #[serde(default)]
    pub update: OperationConfig,
}

/// Endpoint file: either a bare array or `{ "endpoints": [...] }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum EndpointsFile {
    List(Vec<EndpointConfig>),
    Wrapped { endpoints: Vec<EndpointConfig> },
}

impl EndpointsFile {
    pub fn into_endpoints(self) -> Vec<EndpointConfig> {
        match self {
            EndpointsFile::List(v) | EndpointsFile::Wrapped { endpoints: v } => v,
        }
    }
}

/// Leading slash added, trailing slashes dropped. "" stays "".
fn normalize_segment(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl EndpointConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_base_path: None,
            api_base_path: None,
            create: OperationConfig::default(),
            delete: DeleteConfig::default(),
            find: OperationConfig::default(),
            update: OperationConfig::default(),
        }
    }

    /// `{apiBasePath}{modelBasePath}`, e.g. `/api/test-1` for model `Test1`.
    pub fn base_path(&self) -> String {
        let api = normalize_segment(self.api_base_path.as_deref().unwrap_or(DEFAULT_API_BASE_PATH));
        let model = match self.model_base_path.as_deref() {
            Some(p) => normalize_segment(p),
            None => normalize_segment(&to_kebab_case(&self.model_name)),
        };
        format!("{}{}", api, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_defaults_to_api_and_kebab_model() {
        assert_eq!(EndpointConfig::new("Test1").base_path(), "/api/test-1");
    }

    #[test]
    fn base_path_adds_missing_slashes() {
        let mut c = EndpointConfig::new("Test1");
        c.api_base_path = Some("v2/".into());
        c.model_base_path = Some("things".into());
        assert_eq!(c.base_path(), "/v2/things");
        c.api_base_path = Some("".into());
        assert_eq!(c.base_path(), "/things");
    }

    #[test]
    fn operation_configs_default_when_absent() {
        let raw = r#"{
            "modelName": "Test1",
            "delete": {"max": 3, "removeRefs": [{"modelName": "Test2", "field": "test1Refs"}]},
            "find": {"bindWithToken": {"tokenKey": "userId", "recordKey": "owner"}, "isSecure": true}
        }"#;
        let c: EndpointConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(c.create, OperationConfig::default());
        assert_eq!(c.delete.operation.max, Some(3));
        assert_eq!(c.delete.remove_refs[0].field, "test1Refs");
        assert!(c.find.is_secure);
        assert_eq!(
            c.find.bind_with_token.as_ref().and_then(|b| b.record_key.as_deref()),
            Some("owner")
        );
    }

    #[test]
    fn file_accepts_array_or_wrapped() {
        let a: EndpointsFile = serde_json::from_str(r#"[{"modelName": "A"}]"#).unwrap();
        let b: EndpointsFile = serde_json::from_str(r#"{"endpoints": [{"modelName": "A"}]}"#).unwrap();
        assert_eq!(a.into_endpoints(), b.into_endpoints());
    }
}
