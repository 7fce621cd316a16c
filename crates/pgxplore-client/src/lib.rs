//! # pgxplore-client
//!
//! Resilient clients for the external APIs feeding the pgxplore
//! pharmacogenomics service: the Ensembl genome-annotation REST API and
//! ClinVar clinical-variant data via NCBI E-utilities.
//!
//! ## Overview
//!
//! The crate is a small client framework plus two specialized clients built
//! on it:
//!
//! - **Pacing gate**: per-destination fixed-interval throttle
//! - **Retry executor**: failure-class aware retries with exponential backoff
//! - **Format negotiation**: tabular (JSON) vs. hierarchical (XML) bodies
//! - **Record extraction**: declarative projection of XML documents into
//!   flat, typed records
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`clients`] | Specialized clients (Ensembl, ClinVar) |
//! | [`config`] | Per-destination client configuration |
//! | [`document`] | Owned XML element tree |
//! | [`error`] | Error taxonomy surfaced to callers |
//! | [`executor`] | Retry executor and call envelopes |
//! | [`extract`] | Extraction plans and flat records |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`negotiate`] | Response format negotiation |
//! | [`pacing`] | Fixed-interval pacing gate |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use pgxplore_client::{ClinVarClient, EnsemblClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ensembl = EnsemblClient::new();
//!     let gene = ensembl.gene_info("CYP2D6").await?;
//!     println!("{gene}");
//!
//!     let clinvar = ClinVarClient::new(std::env::var("NCBI_API_KEY").ok());
//!     for record in clinvar.variants_by_rs("rs1065852").await? {
//!         println!("{:?}", record.scalar("clinical_significance"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! A client instance may be shared across tasks; the pacing gate is the only
//! synchronization point and spaces dispatch starts at the configured rate.
//! Each client owns its own pacing state. Sharing a rate budget between
//! clients is a deliberate configuration choice (construct them from one
//! [`ClientConfig`]), never implicit.
//!
//! ## Errors
//!
//! Every operation returns [`ApiError`] on failure: not-found, rate-limit
//! and server errors (retried up to the configured budget), other HTTP
//! errors with the diagnostic payload, transport failures, parse failures,
//! and caller cancellation.

pub mod clients;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod extract;
pub mod http_client;
pub mod negotiate;
pub mod pacing;

// Re-export commonly used types at crate root for convenience

pub use clients::{ClientInfo, ClinVarClient, EnsemblClient, UpstreamClient};
pub use clients::clinvar::{clinvar_extraction_plan, EUTILS_BASE_URL, FETCH_BATCH_LIMIT};
pub use clients::ensembl::ENSEMBL_BASE_URL;
pub use config::ClientConfig;
pub use document::{Document, Element, XmlParseError};
pub use error::{ApiError, RetryReason};
pub use executor::{backoff_delay, ApiCall, AttemptOutcome, RequestExecutor};
pub use extract::{
    Cardinality, ExtractedRecord, ExtractionPlan, FieldRule, FieldValue, NodePath, PathStep,
    ValueSource,
};
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use negotiate::{FormatHint, Payload};
pub use pacing::PacingGate;

// Caller-supplied cancellation signal accepted by the executor.
pub use tokio_util::sync::CancellationToken;
