//! Config validation: required names, positive limits, unique base paths.

use crate::config::{EndpointConfig, OperationConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

fn validate_operation(model: &str, op: &str, config: &OperationConfig) -> Result<(), ConfigError> {
    if config.max == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{}.{}.max must be a positive integer",
            model, op
        )));
    }
    if let Some(bind) = &config.bind_with_token {
        if bind.token_key.is_some() != bind.record_key.is_some() {
            // Reported per request as IncompleteScopeConfig.
            tracing::warn!(model = %model, operation = %op, "bindWithToken needs both tokenKey and recordKey");
        }
    }
    Ok(())
}

pub fn validate(configs: &[EndpointConfig]) -> Result<(), ConfigError> {
    let mut base_paths = HashSet::new();
    for c in configs {
        if c.model_name.trim().is_empty() {
            return Err(ConfigError::Validation("modelName is required".into()));
        }
        validate_operation(&c.model_name, "create", &c.create)?;
        validate_operation(&c.model_name, "delete", &c.delete.operation)?;
        validate_operation(&c.model_name, "find", &c.find)?;
        validate_operation(&c.model_name, "update", &c.update)?;
        for r in &c.delete.remove_refs {
            if r.model_name.trim().is_empty() || r.field.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{}.delete.removeRefs entries need modelName and field",
                    c.model_name
                )));
            }
        }
        let path = c.base_path();
        if !base_paths.insert(path.clone()) {
            return Err(ConfigError::DuplicateBasePath(path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoveRefConfig;

    #[test]
    fn rejects_empty_model_and_zero_max() {
        assert!(validate(&[EndpointConfig::new(" ")]).is_err());
        let mut c = EndpointConfig::new("Test1");
        c.find.max = Some(0);
        assert!(matches!(validate(&[c]), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_shared_base_path() {
        let a = EndpointConfig::new("Test1");
        let mut b = EndpointConfig::new("Other");
        b.model_base_path = Some("/test-1".into());
        assert!(matches!(validate(&[a, b]), Err(ConfigError::DuplicateBasePath(p)) if p == "/api/test-1"));
    }

    #[test]
    fn rejects_blank_remove_ref() {
        let mut c = EndpointConfig::new("Test1");
        c.delete.remove_refs.push(RemoveRefConfig {
            model_name: "Test2".into(),
            field: "".into(),
        });
        assert!(validate(&[c]).is_err());
    }
}
