//! Provider - Boundary with the provisioning collaborator
//!
//! A Provider materializes resource descriptors against real infrastructure.
//! The compiler never calls it; only the interpreter does, after a plan has
//! been validated and emitted.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};

/// Failure reported by the provisioning collaborator
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    /// Resource the failure is attributed to, when known
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(self, id: ResourceId) -> Self {
        Self {
            resource_id: Some(id),
            ..self
        }
    }

    pub fn with_cause(self, cause: impl Error + Send + Sync + 'static) -> Self {
        Self {
            cause: Some(Box::new(cause)),
            ..self
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) => write!(f, "[{}] {}", id, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Main Provider trait
///
/// All operations are async and involve side effects. Convergence, retries
/// and partial-failure recovery belong to the implementation.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "file")
    fn name(&self) -> &'static str;

    /// Look up a data source
    ///
    /// Returns `State::not_found()` if nothing matches.
    fn read(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource whose references have already been resolved
    ///
    /// Returns State with the identifier assigned by the collaborator
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource by its assigned identifier
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}
