//! Static capability descriptors reported by adapters.

use serde::{Deserialize, Serialize};

/// Capability descriptor consumed by routers outside the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model_deploy_type: String,
    pub backend: String,
    pub support_stream: bool,
    pub model_name: String,
}

impl ModelMeta {
    /// Descriptor for a hosted SaaS model.
    pub fn saas(model_name: impl Into<String>, support_stream: bool) -> Self {
        Self {
            model_deploy_type: "saas".to_string(),
            backend: "saas".to_string(),
            support_stream,
            model_name: model_name.into(),
        }
    }
}
