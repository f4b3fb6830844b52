use model_provisioner::ProvisioningError;
use thiserror::Error;

/// Failure to bring a model slot to Ready. The slot stays Uninitialized and
/// a later `init` starts over.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("model provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("failed to load {model} model: {source}")]
    Load {
        model: String,
        #[source]
        source: anyhow::Error,
    },
}

impl InitError {
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Provisioning(_))
    }
}
