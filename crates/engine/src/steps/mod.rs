//! Built-in step implementations.

pub mod http;

pub use http::HttpRequestStep;

use nodeflow_types::ActionKind;

use crate::{
    error::{ConfigurationError, StepError},
    registry::StepRegistry,
};

/// Registry holding every built-in step.
pub fn builtin_registry() -> Result<StepRegistry, BuiltinRegistryError> {
    let registry = StepRegistry::new().with_step(ActionKind::HttpRequest, HttpRequestStep::new()?)?;
    Ok(registry)
}

#[derive(Debug, thiserror::Error)]
pub enum BuiltinRegistryError {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_serves_http_requests() {
        let registry = builtin_registry().expect("registry");
        assert!(registry.contains(&ActionKind::from_type_name("HTTP Request")));
        assert!(!registry.contains(&ActionKind::SendEmail));
    }
}
