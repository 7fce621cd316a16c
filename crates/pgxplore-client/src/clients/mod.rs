//! Specialized clients for the two upstream services.

use std::future::Future;
use std::pin::Pin;

pub mod clinvar;
pub mod ensembl;

pub use clinvar::ClinVarClient;
pub use ensembl::EnsemblClient;

/// Static description of one upstream client, for diagnostics endpoints.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub base_url: String,
    pub description: String,
    pub rate_limit: String,
    pub documentation: String,
}

/// Capability surface shared by every specialized client: identification and
/// a reachability probe. Implemented by composition over the shared executor,
/// not inheritance.
pub trait UpstreamClient: Send + Sync {
    fn info(&self) -> ClientInfo;

    /// Issues one lightweight request and reports reachability. All errors
    /// collapse into `false`.
    fn health_check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}
