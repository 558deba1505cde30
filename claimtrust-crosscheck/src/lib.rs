//! claimtrust Cross-Cutting Checks
//!
//! Domain-agnostic verifiers that run alongside every domain adapter:
//! - **Citation**: CrossRef DOI resolution, OpenAlex / Semantic Scholar metadata
//! - **Statistical forensics**: GRIM, SPRITE, Benford's Law, p-curve
//! - **Data integrity**: schema, duplicates, outliers, checksums
//! - **Reproducibility**: GitHub repository, commit, manifests, entry points
//!
//! [`run_cross_cutting`] runs every applicable verifier concurrently under
//! one global deadline.

pub mod citation;
pub mod integrity;
pub mod reproducibility;
pub mod runner;
pub mod statistics;
pub mod traits;

pub use citation::CitationVerifier;
pub use integrity::DataIntegrityVerifier;
pub use reproducibility::ReproducibilityVerifier;
pub use runner::*;
pub use statistics::StatisticalForensicsVerifier;
pub use traits::*;
