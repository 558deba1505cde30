//! Domain registry tables
//!
//! `SUPPORTED_DOMAINS` and `DEFERRED_DOMAINS` are disjoint: a supported
//! domain has an adapter, a deferred domain needs native tooling that this
//! runtime does not ship.

/// Catch-all domain that has no adapter of its own
pub const GENERAL_DOMAIN: &str = "general";

/// Trust given to a domain adapter when `DOMAIN_WEIGHTS` has no entry
pub const DEFAULT_DOMAIN_WEIGHT: f64 = 0.70;

/// Domains with a registered adapter
pub const SUPPORTED_DOMAINS: &[&str] = &[
    "genomics",
    "bioinformatics",
    "computational_biology",
    "epidemiology",
    "immunoinformatics",
    "metabolomics",
    "systems_biology",
    "physics",
    "ml_ai",
];

/// A domain whose verifier needs a native dependency
#[derive(Debug, Clone, Copy)]
pub struct DeferredDomain {
    pub name: &'static str,
    pub dependency: &'static str,
}

pub static DEFERRED_DOMAINS: &[DeferredDomain] = &[
    DeferredDomain {
        name: "mathematics",
        dependency: "Lean4 (requires Docker)",
    },
    DeferredDomain {
        name: "materials_science",
        dependency: "pymatgen",
    },
    DeferredDomain {
        name: "chemistry",
        dependency: "rdkit",
    },
];

/// Trust in the domain adapter versus the cross-cutting checks
pub static DOMAIN_WEIGHTS: &[(&str, f64)] = &[
    ("mathematics", 0.85),
    ("ml_ai", 0.60),
    ("computational_biology", 0.70),
    ("materials_science", 0.75),
    ("bioinformatics", 0.70),
    ("genomics", 0.70),
    ("chemistry", 0.70),
    ("physics", 0.65),
    ("epidemiology", 0.60),
    ("immunoinformatics", 0.70),
    ("metabolomics", 0.70),
    ("systems_biology", 0.65),
];

/// Domains where literature older than five years counts as stale
pub const FAST_MOVING_DOMAINS: &[&str] = &[
    "ml_ai",
    "genomics",
    "bioinformatics",
    "computational_biology",
    "immunoinformatics",
];

pub fn is_supported(domain: &str) -> bool {
    SUPPORTED_DOMAINS.contains(&domain)
}

pub fn deferred_domain(domain: &str) -> Option<&'static DeferredDomain> {
    DEFERRED_DOMAINS.iter().find(|d| d.name == domain)
}

/// Adapter trust weight for a domain, defaulting to 0.70
pub fn domain_weight(domain: &str) -> f64 {
    DOMAIN_WEIGHTS
        .iter()
        .find(|(name, _)| *name == domain)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
}

/// Citation freshness threshold in years
pub fn freshness_years(domain: &str) -> i32 {
    if FAST_MOVING_DOMAINS.contains(&domain) {
        5
    } else {
        15
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_and_deferred_disjoint() {
        for deferred in DEFERRED_DOMAINS {
            assert!(!is_supported(deferred.name), "{} is both", deferred.name);
        }
        assert!(!is_supported(GENERAL_DOMAIN));
    }

    #[test]
    fn test_weights_in_open_unit_interval() {
        for (domain, w) in DOMAIN_WEIGHTS {
            assert!(*w > 0.0 && *w < 1.0, "{domain} weight {w}");
        }
        assert_eq!(domain_weight("astrology"), DEFAULT_DOMAIN_WEIGHT);
        assert_eq!(domain_weight("mathematics"), 0.85);
    }

    #[test]
    fn test_freshness() {
        assert_eq!(freshness_years("ml_ai"), 5);
        assert_eq!(freshness_years("epidemiology"), 15);
    }
}
