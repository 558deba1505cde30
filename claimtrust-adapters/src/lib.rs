//! claimtrust Adapters
//!
//! One verifier per scientific domain. Each adapter resolves the claim type,
//! scores its weighted components against public data sources and returns a
//! `VerificationResult`:
//! - **Genomics**: GWAS Catalog, Ensembl, MyVariant, dbSNP, GEO
//! - **Bioinformatics**: Rfam, UniProt, NCBI, sequence and structure validation
//! - **Computational biology**: RCSB PDB, PubChem, UniProt
//! - **Epidemiology**: WHO GHO, survival and transmission plausibility
//! - **Immunoinformatics**: IEDB MHC-I predictions, UniProt antigens
//! - **Metabolomics**: HMDB, PubChem, MassBank, adduct mass accuracy
//! - **Systems biology**: STRING, KEGG, Reactome, flux balance checks
//! - **Physics**: units, CODATA constants, energy conservation
//! - **ML/AI**: HuggingFace Hub, GitHub

pub mod bioinformatics;
pub mod checks;
pub mod compbio;
pub mod epidemiology;
pub mod genomics;
pub mod immunoinformatics;
pub mod metabolomics;
pub mod ml_ai;
pub mod physics;
pub mod sources;
pub mod systems_biology;
pub mod traits;

pub use bioinformatics::*;
pub use compbio::*;
pub use epidemiology::*;
pub use genomics::*;
pub use immunoinformatics::*;
pub use metabolomics::*;
pub use ml_ai::*;
pub use physics::*;
pub use systems_biology::*;
pub use traits::*;
