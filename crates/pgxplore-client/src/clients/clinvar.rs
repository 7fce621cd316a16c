//! ClinVar client over the NCBI E-utilities two-step protocol.
//!
//! Every lookup is a search (`esearch`, JSON) for ClinVar record identifiers
//! followed by a batched fetch (`efetch`, XML) of the full records, which are
//! then projected into flat records by the extraction plan below.
//!
//! Upstream documentation: <https://www.ncbi.nlm.nih.gov/books/NBK25499/>

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::{ClientInfo, UpstreamClient};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::executor::{ApiCall, RequestExecutor};
use crate::extract::{ExtractedRecord, ExtractionPlan, FieldRule, NodePath, PathStep};
use crate::http_client::HttpClient;
use crate::negotiate::FormatHint;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Identifier ceiling per efetch call; bounds the XML response size.
pub const FETCH_BATCH_LIMIT: usize = 20;

/// NCBI grants 10 requests/second with an access key, 3/second without.
/// Stay one under each tier.
const KEYED_RATE: f64 = 9.0;
const KEYLESS_RATE: f64 = 2.0;

const DEFAULT_GENE_SEARCH_LIMIT: usize = 20;
const PATHOGENIC_SEARCH_LIMIT: usize = 50;

/// Client for clinical variant significance data.
///
/// Operations where "no clinical records" is an expected, benign outcome map
/// `NotFound` to an empty list instead of propagating an error.
pub struct ClinVarClient {
    executor: RequestExecutor,
    plan: ExtractionPlan,
}

impl ClinVarClient {
    pub fn new(access_key: Option<String>) -> Self {
        Self::with_config(Self::default_config(access_key))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            executor: RequestExecutor::new(config),
            plan: clinvar_extraction_plan(),
        }
    }

    /// Injects a transport, for offline tests.
    pub fn with_transport(access_key: Option<String>, transport: Arc<dyn HttpClient>) -> Self {
        Self::with_parts(Self::default_config(access_key), transport)
    }

    pub fn with_parts(config: ClientConfig, transport: Arc<dyn HttpClient>) -> Self {
        Self {
            executor: RequestExecutor::with_transport(config, transport),
            plan: clinvar_extraction_plan(),
        }
    }

    /// An access key unlocks the higher upstream rate tier; this is a
    /// configuration-driven policy switch, not client logic.
    fn default_config(access_key: Option<String>) -> ClientConfig {
        let rate = if access_key.is_some() {
            KEYED_RATE
        } else {
            KEYLESS_RATE
        };
        let mut config = ClientConfig::new(EUTILS_BASE_URL).with_requests_per_second(rate);
        if let Some(key) = access_key {
            config = config.with_access_key(key);
        }
        config
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn keyed(&self, mut call: ApiCall) -> ApiCall {
        if let Some(key) = &self.executor.config().access_key {
            call = call.with_param("api_key", key);
        }
        call
    }

    /// Step one: search for ClinVar record identifiers matching a term.
    async fn search_ids(
        &self,
        term: &str,
        retmax: Option<usize>,
    ) -> Result<Vec<String>, ApiError> {
        let mut call = ApiCall::get("/esearch.fcgi")
            .with_param("db", "clinvar")
            .with_param("term", term)
            .with_param("retmode", "json");
        if let Some(retmax) = retmax {
            call = call.with_param("retmax", retmax.to_string());
        }

        let result = self.executor.get_json(self.keyed(call)).await?;
        let ids = result
            .get("esearchresult")
            .and_then(|r| r.get("idlist"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    /// Step two: fetch full records for up to [`FETCH_BATCH_LIMIT`]
    /// identifiers and project them through the extraction plan. Overflow
    /// identifiers are dropped with a warning, never an error.
    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<ExtractedRecord>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let batch = if ids.len() > FETCH_BATCH_LIMIT {
            warn!(
                requested = ids.len(),
                fetched = FETCH_BATCH_LIMIT,
                "truncating efetch identifier batch"
            );
            &ids[..FETCH_BATCH_LIMIT]
        } else {
            ids
        };

        // Efetch advertises an unreliable content type; pin the decoder.
        let call = ApiCall::get("/efetch.fcgi")
            .with_param("db", "clinvar")
            .with_param("id", batch.join(","))
            .with_param("rettype", "vcv")
            .with_param("retmode", "xml")
            .with_format(FormatHint::Xml);

        let document = self.executor.get_document(self.keyed(call)).await?;
        Ok(self.plan.extract(&document))
    }

    async fn search_then_fetch(
        &self,
        term: &str,
        retmax: Option<usize>,
    ) -> Result<Vec<ExtractedRecord>, ApiError> {
        let ids = self.search_ids(term, retmax).await?;
        if ids.is_empty() {
            debug!(term, "no clinvar records matched search term");
            return Ok(Vec::new());
        }
        self.fetch_records(&ids).await
    }

    /// Clinical annotations for a dbSNP identifier. Accepts `rs1065852` or
    /// the bare number. No records is a benign outcome.
    pub async fn variants_by_rs(&self, rs_id: &str) -> Result<Vec<ExtractedRecord>, ApiError> {
        let rs_number = rs_id.strip_prefix("rs").unwrap_or(rs_id);
        match self.search_then_fetch(&format!("{rs_number}[RS]"), None).await {
            Err(error) if error.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    /// Clinical annotations for variants in a gene.
    pub async fn variants_by_gene(
        &self,
        gene_symbol: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExtractedRecord>, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_GENE_SEARCH_LIMIT);
        match self
            .search_then_fetch(&format!("{gene_symbol}[gene]"), Some(limit))
            .await
        {
            Err(error) if error.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    /// Pathogenic and likely-pathogenic variants in a gene, filtered on the
    /// extracted significance after the fetch.
    pub async fn pathogenic_variants(
        &self,
        gene_symbol: &str,
    ) -> Result<Vec<ExtractedRecord>, ApiError> {
        let term = format!(
            "{gene_symbol}[gene] AND (pathogenic[clin] OR likely pathogenic[clin])"
        );
        let records = match self
            .search_then_fetch(&term, Some(PATHOGENIC_SEARCH_LIMIT))
            .await
        {
            Err(error) if error.is_not_found() => return Ok(Vec::new()),
            other => other?,
        };

        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .scalar("clinical_significance")
                    .is_some_and(|significance| {
                        significance.to_ascii_lowercase().contains("pathogenic")
                    })
            })
            .collect())
    }
}

impl UpstreamClient for ClinVarClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: String::from("ClinVar via NCBI E-utilities"),
            base_url: self.executor.config().base_url.clone(),
            description: String::from(
                "Clinical significance and disease associations for variants",
            ),
            rate_limit: String::from("10/sec with API key, 3/sec without"),
            documentation: String::from("https://www.ncbi.nlm.nih.gov/books/NBK25499/"),
        }
    }

    fn health_check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let call = self.keyed(ApiCall::get("/einfo.fcgi").with_param("db", "clinvar"));
            match self.executor.execute(call).await {
                Ok(_) => true,
                Err(error) => {
                    debug!(error = %error, "clinvar health check failed");
                    false
                }
            }
        })
    }
}

/// Extraction plan mirroring ClinVar's `vcv` document shape: one record per
/// `ClinVarSet`, fields resolved within its reference assertion only. Each
/// set also carries per-submitter `ClinVarAssertion` siblings whose trait
/// names and significances must not leak into the record.
pub fn clinvar_extraction_plan() -> ExtractionPlan {
    let reference = PathStep::named("ReferenceClinVarAssertion");
    ExtractionPlan::new(
        NodePath::names(["ClinVarSet"]),
        vec![
            FieldRule::attribute("clinvar_id", NodePath::here(), "ID"),
            FieldRule::text(
                "clinical_significance",
                NodePath::new([
                    reference.clone(),
                    PathStep::named("ClinicalSignificance"),
                    PathStep::named("Description"),
                ]),
            ),
            FieldRule::text(
                "review_status",
                NodePath::new([
                    reference.clone(),
                    PathStep::named("ClinicalSignificance"),
                    PathStep::named("ReviewStatus"),
                ]),
            ),
            FieldRule::text(
                "preferred_name",
                NodePath::new([
                    reference.clone(),
                    PathStep::named("MeasureSet"),
                    PathStep::named("Measure"),
                    PathStep::named("Name"),
                    PathStep::named("ElementValue").with_attr("Type", "Preferred"),
                ]),
            ),
            FieldRule::attribute(
                "dbsnp_id",
                NodePath::new([
                    reference.clone(),
                    PathStep::named("MeasureSet"),
                    PathStep::named("Measure"),
                    PathStep::named("XRef").with_attr("DB", "dbSNP"),
                ]),
                "ID",
            )
            .with_prefix("rs"),
            FieldRule::text(
                "conditions",
                NodePath::new([
                    reference,
                    PathStep::named("TraitSet"),
                    PathStep::named("Trait"),
                    PathStep::named("Name"),
                    PathStep::named("ElementValue").with_attr("Type", "Preferred"),
                ]),
            )
            .repeated(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::http_client::NoopHttpClient;

    #[test]
    fn access_key_selects_the_higher_rate_tier() {
        let keyed = ClinVarClient::new(Some(String::from("ncbi-key")));
        assert_eq!(keyed.executor.config().requests_per_second, KEYED_RATE);

        let keyless = ClinVarClient::new(None);
        assert_eq!(keyless.executor.config().requests_per_second, KEYLESS_RATE);
    }

    #[test]
    fn keyed_calls_carry_the_access_key_parameter() {
        let client =
            ClinVarClient::with_transport(Some(String::from("ncbi-key")), Arc::new(NoopHttpClient));
        let call = client.keyed(ApiCall::get("/esearch.fcgi").with_param("db", "clinvar"));
        assert!(call
            .params
            .iter()
            .any(|(name, value)| name == "api_key" && value == "ncbi-key"));
    }

    #[test]
    fn extraction_plan_reads_a_vcv_document() {
        let doc = Document::parse(
            r#"<ClinVarResult-Set>
              <ClinVarSet ID="92147">
                <ReferenceClinVarAssertion>
                  <ClinicalSignificance>
                    <ReviewStatus>criteria provided, multiple submitters</ReviewStatus>
                    <Description>Pathogenic</Description>
                  </ClinicalSignificance>
                  <MeasureSet>
                    <Measure>
                      <Name><ElementValue Type="Preferred">NM_000106.6(CYP2D6):c.506-1G&gt;A</ElementValue></Name>
                      <XRef DB="dbSNP" ID="3892097"/>
                    </Measure>
                  </MeasureSet>
                  <TraitSet>
                    <Trait><Name><ElementValue Type="Preferred">Debrisoquine, ultrarapid metabolism of</ElementValue></Name></Trait>
                  </TraitSet>
                </ReferenceClinVarAssertion>
              </ClinVarSet>
            </ClinVarResult-Set>"#,
        )
        .expect("fixture should parse");

        let records = clinvar_extraction_plan().extract(&doc);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.scalar("clinvar_id"), Some("92147"));
        assert_eq!(record.scalar("clinical_significance"), Some("Pathogenic"));
        assert_eq!(
            record.scalar("review_status"),
            Some("criteria provided, multiple submitters")
        );
        assert_eq!(
            record.scalar("preferred_name"),
            Some("NM_000106.6(CYP2D6):c.506-1G>A")
        );
        assert_eq!(record.scalar("dbsnp_id"), Some("rs3892097"));
        assert_eq!(
            record.list("conditions"),
            Some(&[String::from("Debrisoquine, ultrarapid metabolism of")][..])
        );
    }
}
