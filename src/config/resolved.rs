//! Resolved endpoints: config validated against the store and flattened for runtime use.

use crate::config::{validate, EndpointConfig, OperationConfig};
use crate::error::ConfigError;
use crate::store::Store;

/// Which claim scopes the caller and which record field it pins. Either half may be missing;
/// that is reported per request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindWithToken {
    pub token_key: Option<String>,
    pub record_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedOperation {
    pub max: Option<usize>,
    pub bind_with_token: BindWithToken,
    pub is_secure: bool,
}

impl From<&OperationConfig> for ResolvedOperation {
    fn from(c: &OperationConfig) -> Self {
        let bind = c.bind_with_token.clone().unwrap_or_default();
        ResolvedOperation {
            max: c.max,
            bind_with_token: BindWithToken {
                token_key: bind.token_key,
                record_key: bind.record_key,
            },
            is_secure: c.is_secure,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveRef {
    pub model_name: String,
    pub field: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedEndpoint {
    pub model_name: String,
    pub base_path: String,
    pub create: ResolvedOperation,
    pub delete: ResolvedOperation,
    pub remove_refs: Vec<RemoveRef>,
    pub find: ResolvedOperation,
    pub update: ResolvedOperation,
}

/// Validate configs and check every referenced collection exists in `store`.
pub fn resolve(configs: &[EndpointConfig], store: &dyn Store) -> Result<Vec<ResolvedEndpoint>, ConfigError> {
    validate(configs)?;
    let mut out = Vec::with_capacity(configs.len());
    for c in configs {
        if store.collection(&c.model_name).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "collection",
                name: c.model_name.clone(),
            });
        }
        let mut remove_refs = Vec::with_capacity(c.delete.remove_refs.len());
        for r in &c.delete.remove_refs {
            if store.collection(&r.model_name).is_none() {
                return Err(ConfigError::MissingReference {
                    kind: "collection",
                    name: r.model_name.clone(),
                });
            }
            remove_refs.push(RemoveRef {
                model_name: r.model_name.clone(),
                field: r.field.clone(),
            });
        }
        let endpoint = ResolvedEndpoint {
            model_name: c.model_name.clone(),
            base_path: c.base_path(),
            create: (&c.create).into(),
            delete: (&c.delete.operation).into(),
            remove_refs,
            find: (&c.find).into(),
            update: (&c.update).into(),
        };
        tracing::debug!(model = %endpoint.model_name, base_path = %endpoint.base_path, "endpoint resolved");
        out.push(endpoint);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoveRefConfig;
    use crate::store::{InMemoryCollection, InMemoryStore};

    fn store() -> InMemoryStore {
        let s = InMemoryStore::new();
        s.register(InMemoryCollection::new("Test1"));
        s.register(InMemoryCollection::new("Test2"));
        s
    }

    #[test]
    fn resolves_defaults() {
        let resolved = resolve(&[EndpointConfig::new("Test1")], &store()).unwrap();
        assert_eq!(resolved[0].base_path, "/api/test-1");
        assert_eq!(resolved[0].find, ResolvedOperation::default());
    }

    #[test]
    fn unknown_collections_are_rejected() {
        assert!(matches!(
            resolve(&[EndpointConfig::new("Nope")], &store()),
            Err(ConfigError::MissingReference { kind: "collection", .. })
        ));
        let mut c = EndpointConfig::new("Test1");
        c.delete.remove_refs.push(RemoveRefConfig {
            model_name: "Nope".into(),
            field: "x".into(),
        });
        assert!(resolve(&[c], &store()).is_err());
    }
}
