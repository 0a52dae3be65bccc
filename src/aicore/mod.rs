pub mod aggregator;
pub mod attachments;
pub mod client;
pub mod configurations;
pub mod credentials;
pub mod deployments;
pub mod error;
pub mod inference;
pub mod sse;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use client::AiCorePlatform;
use credentials::CredentialResolver;

/// Tunables of the gateway that are not per-request.
#[derive(Debug, Clone, Copy)]
pub struct AiCoreSettings {
    /// Maximum number of teams queried at once when listing deployments.
    pub fanout_concurrency: usize,
    /// Ceiling on the combined size of one upload request.
    pub upload_max_bytes: usize,
}

impl Default for AiCoreSettings {
    fn default() -> Self {
        Self {
            fanout_concurrency: 4,
            upload_max_bytes: crate::config::DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

/// Collaborators shared by every AI platform operation. Cheap to clone.
#[derive(Clone)]
pub struct AiCore {
    pub resolver: CredentialResolver,
    pub platform: Arc<dyn AiCorePlatform>,
    pub settings: AiCoreSettings,
}

impl AiCore {
    pub fn new(
        resolver: CredentialResolver,
        platform: Arc<dyn AiCorePlatform>,
        settings: AiCoreSettings,
    ) -> Self {
        Self {
            resolver,
            platform,
            settings,
        }
    }
}
