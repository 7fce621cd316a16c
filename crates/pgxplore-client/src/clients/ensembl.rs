//! Ensembl REST client for gene and variant annotation.
//!
//! Upstream documentation: <https://rest.ensembl.org/documentation>

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::clients::{ClientInfo, UpstreamClient};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::executor::{ApiCall, RequestExecutor};
use crate::http_client::HttpClient;

pub const ENSEMBL_BASE_URL: &str = "https://rest.ensembl.org";

/// Upstream allows 15 requests/second; stay slightly under it.
const DEFAULT_RATE: f64 = 14.0;

const DEFAULT_SPECIES: &str = "human";

/// Client for the Ensembl genome-annotation REST API.
///
/// All operations return the generic tabular JSON value; Ensembl has no
/// hierarchical endpoints. Operations where "no data" is an expected outcome
/// map `NotFound` to an empty result instead of an error.
pub struct EnsemblClient {
    executor: RequestExecutor,
}

impl EnsemblClient {
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            executor: RequestExecutor::new(config),
        }
    }

    /// Injects a transport, for offline tests.
    pub fn with_transport(transport: Arc<dyn HttpClient>) -> Self {
        Self::with_parts(Self::default_config(), transport)
    }

    pub fn with_parts(config: ClientConfig, transport: Arc<dyn HttpClient>) -> Self {
        Self {
            executor: RequestExecutor::with_transport(config, transport),
        }
    }

    fn default_config() -> ClientConfig {
        ClientConfig::new(ENSEMBL_BASE_URL).with_requests_per_second(DEFAULT_RATE)
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Full gene record by Ensembl id. When the id is unknown, retries the
    /// lookup as a symbol; callers often pass symbols like `CYP2D6` here.
    pub async fn gene_info(&self, gene_id: &str) -> Result<Value, ApiError> {
        let call = ApiCall::get(format!("/lookup/id/{}", urlencoding::encode(gene_id)))
            .with_param("species", DEFAULT_SPECIES)
            .with_param("expand", "1");

        match self.executor.get_json(call).await {
            Err(error) if error.is_not_found() => self.gene_by_symbol(gene_id).await,
            other => other,
        }
    }

    /// Full gene record by symbol.
    pub async fn gene_by_symbol(&self, gene_symbol: &str) -> Result<Value, ApiError> {
        let call = ApiCall::get(format!(
            "/lookup/symbol/{DEFAULT_SPECIES}/{}",
            urlencoding::encode(gene_symbol)
        ))
        .with_param("expand", "1");

        self.executor.get_json(call).await
    }

    /// Variants overlapping a gene, optionally filtered by consequence type.
    /// A gene with no catalogued variants yields an empty list.
    pub async fn gene_variants(
        &self,
        gene_id: &str,
        consequence_types: Option<&[&str]>,
    ) -> Result<Vec<Value>, ApiError> {
        let mut call = ApiCall::get(format!("/overlap/id/{}", urlencoding::encode(gene_id)))
            .with_param("feature", "variation")
            .with_param("species", DEFAULT_SPECIES);
        if let Some(types) = consequence_types {
            call = call.with_param("consequence_type", types.join(","));
        }

        match self.executor.get_json(call).await {
            Ok(Value::Array(variants)) => Ok(variants),
            Ok(_) => Ok(Vec::new()),
            Err(error) if error.is_not_found() => {
                debug!(gene_id, "no variants catalogued for gene");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }

    /// Consequence annotations for a known variant id (for example an `rs`
    /// identifier).
    pub async fn variant_consequences(&self, variant_id: &str) -> Result<Value, ApiError> {
        let call = ApiCall::get(format!(
            "/variation/{DEFAULT_SPECIES}/{}",
            urlencoding::encode(variant_id)
        ))
        .with_param("consequence", "1");

        self.executor.get_json(call).await
    }

    /// Population frequency data for a known variant id.
    pub async fn population_frequencies(&self, variant_id: &str) -> Result<Value, ApiError> {
        let call = ApiCall::get(format!(
            "/variation/{DEFAULT_SPECIES}/{}",
            urlencoding::encode(variant_id)
        ))
        .with_param("pops", "1");

        self.executor.get_json(call).await
    }

    /// Variant-effect predictions for a genomic coordinate. The upstream
    /// identifies the variant as a `chromosome:position:alleles` string
    /// (alleles like `A/G`). An unknown region yields an empty list.
    pub async fn vep_consequences(
        &self,
        chromosome: &str,
        position: u64,
        alleles: &str,
    ) -> Result<Vec<Value>, ApiError> {
        let notation = format!("{chromosome}:{position}:{alleles}");
        let call = ApiCall::get(format!("/vep/{DEFAULT_SPECIES}/region/{notation}"));

        match self.executor.get_json(call).await {
            Ok(Value::Array(predictions)) => Ok(predictions),
            Ok(other) => Ok(vec![other]),
            Err(error) if error.is_not_found() => {
                debug!(%notation, "no effect predictions for region");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }

    /// Genes associated with a phenotype term. Unknown terms yield an empty
    /// list.
    pub async fn genes_by_phenotype(&self, phenotype: &str) -> Result<Vec<Value>, ApiError> {
        let call = ApiCall::get(format!(
            "/phenotype/term/{DEFAULT_SPECIES}/{}",
            urlencoding::encode(phenotype)
        ));

        match self.executor.get_json(call).await {
            Ok(Value::Array(genes)) => Ok(genes),
            Ok(_) => Ok(Vec::new()),
            Err(error) if error.is_not_found() => {
                debug!(phenotype, "no genes associated with phenotype");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }
}

impl Default for EnsemblClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient for EnsemblClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: String::from("Ensembl REST API"),
            base_url: self.executor.config().base_url.clone(),
            description: String::from(
                "Genomic data including genes, variants, and consequences",
            ),
            rate_limit: String::from("15 requests/second"),
            documentation: String::from("https://rest.ensembl.org/documentation"),
        }
    }

    fn health_check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self.executor.get_json(ApiCall::get("/info/ping")).await {
                Ok(value) => value.get("ping").and_then(Value::as_u64) == Some(1),
                Err(error) => {
                    debug!(error = %error, "ensembl health check failed");
                    false
                }
            }
        })
    }
}
