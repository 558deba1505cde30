//! Physics Adapter
//!
//! Dimensional analysis and numerical simulation claims. Everything here
//! is computed locally: units are parsed against an SI symbol table,
//! constants are compared with CODATA 2018 and simulation diagnostics are
//! recomputed from the reported energies, residuals and step sizes.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

use claimtrust_core::math::relative_difference;
use claimtrust_core::value::{as_number, as_string, bool_field, field, first_num, first_num_array, first_str, has_field};
use claimtrust_core::{BadgePolicy, ClaimMetadata, ClaimTypeSpec, Scorecard, VerificationResult, VerifyError};

use crate::checks::normalize_name;
use crate::traits::{resolve_claim_type, unhandled_claim_type, DomainAdapter};

const DOMAIN: &str = "physics";

/// Relative tolerance against CODATA values
const CONSTANT_TOLERANCE: f64 = 1e-4;
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

pub static PHYSICS_CLAIM_TYPES: &[ClaimTypeSpec] = &[
    ClaimTypeSpec {
        name: "dimensional_analysis",
        weights: &[
            ("units_recognized", 0.30),
            ("dimensional_consistency", 0.30),
            ("physical_constants", 0.25),
            ("magnitude", 0.15),
        ],
    },
    ClaimTypeSpec {
        name: "numerical_simulation",
        weights: &[
            ("energy_conservation", 0.25),
            ("convergence", 0.20),
            ("timestep", 0.15),
            ("method", 0.10),
            ("symbolic_check", 0.15),
            ("physical_parameters", 0.15),
        ],
    },
];

/// CODATA 2018 recommended values (SI), keyed by accepted spellings
pub static CODATA: &[(&[&str], f64)] = &[
    (&["c", "speed_of_light", "speed_of_light_in_vacuum"], SPEED_OF_LIGHT),
    (&["h", "planck", "planck_constant"], 6.626_070_15e-34),
    (&["hbar", "reduced_planck", "reduced_planck_constant", "dirac_constant"], 1.054_571_817e-34),
    (&["e", "elementary_charge"], 1.602_176_634e-19),
    (&["k_b", "kb", "boltzmann", "boltzmann_constant"], 1.380_649e-23),
    (&["n_a", "na", "avogadro", "avogadro_constant"], 6.022_140_76e23),
    (&["g_newton", "gravitational_constant", "newtonian_constant_of_gravitation", "big_g"], 6.674_30e-11),
    (&["m_e", "electron_mass"], 9.109_383_701_5e-31),
    (&["m_p", "proton_mass"], 1.672_621_923_69e-27),
    (&["m_n", "neutron_mass"], 1.674_927_498_04e-27),
    (&["alpha", "fine_structure", "fine_structure_constant"], 7.297_352_569_3e-3),
    (&["epsilon_0", "eps0", "vacuum_permittivity", "electric_constant"], 8.854_187_812_8e-12),
    (&["mu_0", "mu0", "vacuum_permeability", "magnetic_constant"], 1.256_637_062_12e-6),
    (&["r", "gas_constant", "molar_gas_constant"], 8.314_462_618),
    (&["sigma", "stefan_boltzmann", "stefan_boltzmann_constant"], 5.670_374_419e-8),
    (&["rydberg", "rydberg_constant", "r_inf"], 10_973_731.568_160),
    (&["a_0", "a0", "bohr_radius"], 5.291_772_109_03e-11),
    (&["g_n", "standard_gravity", "standard_acceleration_of_gravity"], 9.806_65),
    (&["f", "faraday", "faraday_constant"], 96_485.332_12),
    (&["u", "amu", "atomic_mass_unit", "atomic_mass_constant", "dalton"], 1.660_539_066_60e-27),
    (&["ev", "electron_volt"], 1.602_176_634e-19),
    (&["mu_b", "bohr_magneton"], 9.274_010_078_3e-24),
    (&["wien", "wien_displacement_constant"], 2.897_771_955e-3),
];

pub fn codata(name: &str) -> Option<f64> {
    let key = normalize_name(name);
    CODATA
        .iter()
        .find(|(names, _)| names.iter().any(|n| normalize_name(n) == key))
        .map(|(_, value)| *value)
}

const UNIT_SYMBOLS: &[&str] = &[
    "m", "g", "s", "A", "K", "mol", "cd", "Hz", "N", "Pa", "J", "W", "C", "V", "F", "Ω", "ohm",
    "S", "Wb", "T", "H", "lm", "lx", "Bq", "Gy", "Sv", "kat", "rad", "sr", "eV", "L", "l", "min",
    "h", "d", "yr", "au", "AU", "ly", "pc", "bar", "atm", "Torr", "mmHg", "cal", "erg", "dyn",
    "Da", "u", "M", "Å", "deg", "°", "°C", "degC", "G", "barn", "b", "Jy",
];

const SI_PREFIXES: &[&str] = &[
    "Y", "Z", "E", "P", "T", "G", "M", "k", "h", "da", "d", "c", "m", "µ", "μ", "u", "n", "p", "f", "a", "z", "y",
];

const DIMENSIONLESS: &[&str] = &["1", "dimensionless", "unitless", "none", "%", "ppm"];

static UNIT_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\d\^⁰¹²³⁴⁵⁶⁷⁸⁹⁻+\-]+)(?:\^|\*\*)?[-+⁻]?[\d⁰¹²³⁴⁵⁶⁷⁸⁹]*$").unwrap());

fn unit_symbol_known(symbol: &str) -> bool {
    if UNIT_SYMBOLS.contains(&symbol) {
        return true;
    }
    SI_PREFIXES.iter().any(|prefix| {
        symbol
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && UNIT_SYMBOLS.contains(&rest))
    })
}

/// Whether every factor of a unit expression (`kg·m²/s²`, `J mol^-1`) is
/// a known symbol
pub fn unit_recognized(expression: &str) -> bool {
    let expression = expression.trim();
    if DIMENSIONLESS.iter().any(|d| d.eq_ignore_ascii_case(expression)) {
        return true;
    }
    let tokens: Vec<&str> = expression
        .split(|c: char| c.is_whitespace() || matches!(c, '*' | '·' | '⋅' | '/' | '(' | ')' | '.'))
        .filter(|t| !t.is_empty() && *t != "1")
        .collect();
    // "**" splits to empty tokens and exponents; a bare exponent belongs to the previous factor
    !tokens.is_empty()
        && tokens.iter().all(|token| {
            if token.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '^') {
                return true;
            }
            UNIT_TOKEN_REGEX
                .captures(token)
                .and_then(|c| c.get(1))
                .is_some_and(|symbol| unit_symbol_known(symbol.as_str()))
        })
}

/// Unit expressions from a string, an array or a `{quantity: unit}` map
fn unit_expressions(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_string).collect(),
        Value::Object(map) => map.values().filter_map(as_string).collect(),
        other => as_string(other).into_iter().collect(),
    }
}

/// Named constants from a `{name: value}` map or `[{name, value}]` array
fn claimed_constants(value: &Value) -> Vec<(String, f64)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, v)| Some((name.clone(), as_number(v).or_else(|| v.get("value").and_then(as_number))?)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name").or_else(|| item.get("symbol")).and_then(as_string)?;
                Some((name, item.get("value").and_then(as_number)?))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Time integration and discretization schemes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    pub name: &'static str,
    pub order: Option<f64>,
    pub implicit: bool,
    pub symplectic: bool,
}

const fn scheme(name: &'static str, order: Option<f64>, implicit: bool, symplectic: bool) -> Integrator {
    Integrator { name, order, implicit, symplectic }
}

pub static INTEGRATORS: &[Integrator] = &[
    scheme("velocity_verlet", Some(2.0), false, true),
    scheme("verlet", Some(2.0), false, true),
    scheme("leapfrog", Some(2.0), false, true),
    scheme("symplectic_euler", Some(1.0), false, true),
    scheme("yoshida4", Some(4.0), false, true),
    scheme("forest_ruth", Some(4.0), false, true),
    scheme("backward_euler", Some(1.0), true, false),
    scheme("implicit_euler", Some(1.0), true, false),
    scheme("crank_nicolson", Some(2.0), true, false),
    scheme("bdf2", Some(2.0), true, false),
    scheme("bdf", None, true, false),
    scheme("radau", Some(5.0), true, false),
    scheme("lsoda", None, true, false),
    scheme("cvode", None, true, false),
    scheme("forward_euler", Some(1.0), false, false),
    scheme("euler", Some(1.0), false, false),
    scheme("midpoint", Some(2.0), false, false),
    scheme("heun", Some(2.0), false, false),
    scheme("rk2", Some(2.0), false, false),
    scheme("rk4", Some(4.0), false, false),
    scheme("runge_kutta", Some(4.0), false, false),
    scheme("rk45", Some(5.0), false, false),
    scheme("dopri5", Some(5.0), false, false),
    scheme("dop853", Some(8.0), false, false),
    scheme("adams_bashforth", None, false, false),
    scheme("finite_difference", None, false, false),
    scheme("finite_volume", None, false, false),
    scheme("finite_element", None, false, false),
    scheme("spectral", None, false, false),
    scheme("lattice_boltzmann", None, false, false),
    scheme("monte_carlo", None, false, false),
];

/// Most specific integrator named by `name` ("Velocity Verlet" is not
/// plain Verlet)
pub fn find_integrator(name: &str) -> Option<&'static Integrator> {
    let key = normalize_name(name);
    if key.is_empty() {
        return None;
    }
    INTEGRATORS
        .iter()
        .find(|i| normalize_name(i.name) == key)
        .or_else(|| {
            INTEGRATORS
                .iter()
                .filter(|i| key.contains(&normalize_name(i.name)))
                .max_by_key(|i| normalize_name(i.name).len())
        })
}

/// Observed order of accuracy from errors at successive resolutions
pub fn observed_order(steps: &[f64], errors: &[f64]) -> Option<f64> {
    if steps.len() < 2 || steps.len() != errors.len() {
        return None;
    }
    let n = steps.len();
    let (h1, h2) = (steps[n - 2], steps[n - 1]);
    let (e1, e2) = (errors[n - 2], errors[n - 1]);
    if h1 <= 0.0 || h2 <= 0.0 || e1 <= 0.0 || e2 <= 0.0 || h1 == h2 {
        return None;
    }
    Some((e1 / e2).ln() / (h1 / h2).ln())
}

/// Verifier for the physics domain; needs no network access
#[derive(Debug, Default)]
pub struct PhysicsAdapter;

impl PhysicsAdapter {
    pub fn new() -> Self {
        Self
    }

    fn dimensional_analysis(&self, claim: &Value, card: &mut Scorecard) {
        if let Some(raw) = field(claim, "units") {
            let expressions = unit_expressions(raw);
            if expressions.is_empty() {
                card.reject("units_recognized", "units must name at least one unit expression");
            } else {
                let unknown: Vec<&String> = expressions.iter().filter(|u| !unit_recognized(u)).collect();
                let share = 1.0 - unknown.len() as f64 / expressions.len() as f64;
                let detail = json!({ "units": expressions, "unrecognized": unknown });
                if unknown.is_empty() {
                    card.score("units_recognized", 1.0, detail);
                } else {
                    card.score_with_warning(
                        "units_recognized",
                        share,
                        detail,
                        format!("unrecognized units: {}", unknown.iter().map(|u| u.as_str()).collect::<Vec<_>>().join(", ")),
                    );
                }
            }
        }

        if has_field(claim, "equation") || has_field(claim, "dimensions") {
            card.neutral(
                "dimensional_consistency",
                "unit algebra library unavailable; dimensional_consistency scored neutral",
            );
        }

        if let Some(raw) = field(claim, "constants") {
            self.physical_constants(raw, card);
        }

        self.magnitude(claim, card);
    }

    fn physical_constants(&self, raw: &Value, card: &mut Scorecard) {
        let constants = claimed_constants(raw);
        let mut checked = Vec::new();
        let mut mismatched = Vec::new();
        for (name, value) in &constants {
            let Some(reference) = codata(name) else { continue };
            let diff = relative_difference(*value, reference).unwrap_or(f64::INFINITY);
            checked.push(json!({ "name": name, "claimed": value, "codata": reference, "relative_difference": diff }));
            if diff > CONSTANT_TOLERANCE {
                mismatched.push(name.clone());
            }
        }
        if checked.is_empty() {
            if !constants.is_empty() {
                card.neutral("physical_constants", "no claimed constant is in the CODATA table");
            }
            return;
        }
        let score = 1.0 - mismatched.len() as f64 / checked.len() as f64;
        card.score("physical_constants", score, json!({ "checked": checked }));
        if !mismatched.is_empty() {
            card.error(format!(
                "constants differ from CODATA by more than {}: {}",
                CONSTANT_TOLERANCE,
                mismatched.join(", ")
            ));
        }
    }

    fn magnitude(&self, claim: &Value, card: &mut Scorecard) {
        let Some(value) = first_num(claim, &["value", "result_value", "computed_value"]) else { return };
        if value == 0.0 {
            card.neutral("magnitude", "a zero result has no order of magnitude");
            return;
        }
        let order = value.abs().log10().floor();
        if let Some(claimed) = first_num(claim, &["order_of_magnitude"]) {
            if claimed != order {
                card.reject("magnitude", format!("{} is of order 10^{}, not 10^{}", value, order, claimed));
                return;
            }
        }
        match first_num(claim, &["expected_value", "reference_value"]) {
            Some(expected) if expected != 0.0 && expected.signum() == value.signum() => {
                let decades = (value / expected).abs().log10().abs();
                let detail = json!({ "value": value, "expected": expected, "decades": decades });
                if decades <= 1.0 {
                    card.score("magnitude", 1.0, detail);
                } else if decades <= 2.0 {
                    card.score_with_warning("magnitude", 0.5, detail, "result is 1-2 orders of magnitude from the expected value");
                } else {
                    card.reject("magnitude", format!("result {} is {:.1} orders of magnitude from {}", value, decades, expected));
                }
            }
            Some(expected) => card.reject("magnitude", format!("result {} has the wrong sign or scale for {}", value, expected)),
            None if order.abs() > 60.0 => card.reject("magnitude", format!("10^{} is outside any physical scale", order)),
            None => card.score("magnitude", 1.0, json!({ "value": value, "order": order })),
        }
    }

    fn numerical_simulation(&self, claim: &Value, card: &mut Scorecard) {
        let integrator = first_str(claim, &["integrator", "method", "scheme"]);
        let known = integrator.as_deref().and_then(find_integrator);
        if let Some(name) = &integrator {
            match known {
                Some(i) => card.score("method", 1.0, json!({ "claimed": name, "recognized_as": i.name, "order": i.order })),
                None => card.score_with_warning(
                    "method",
                    0.4,
                    json!({ "claimed": name, "recognized": false }),
                    format!("integrator '{}' is not a known scheme", name),
                ),
            }
        }

        self.energy_conservation(claim, known, card);
        self.convergence(claim, known, card);
        self.timestep(claim, known, card);

        if ["equation", "analytical_solution", "symbolic_expression"].iter().any(|f| has_field(claim, f)) {
            card.neutral("symbolic_check", "symbolic algebra unavailable; symbolic_check scored neutral");
        }

        if let Some(Value::Object(params)) = field(claim, "parameters").or_else(|| field(claim, "physical_parameters")) {
            let mut violations = Vec::new();
            for (name, value) in params {
                let Some(v) = as_number(value) else { continue };
                let key = name.to_ascii_lowercase();
                let positive = ["mass", "density", "length", "radius", "viscosity", "volume", "pressure"]
                    .iter()
                    .any(|p| key.contains(p));
                if positive && v <= 0.0 {
                    violations.push(format!("{} must be positive", name));
                } else if key.contains("temperature") && v < 0.0 {
                    violations.push(format!("{} is below absolute zero", name));
                } else if (key.contains("velocity") || key.contains("speed")) && v.abs() > SPEED_OF_LIGHT {
                    violations.push(format!("{} exceeds the speed of light", name));
                }
            }
            if violations.is_empty() {
                card.score("physical_parameters", 1.0, json!({ "checked": params.len() }));
            } else {
                card.reject("physical_parameters", violations.join("; "));
            }
        }
    }

    fn energy_conservation(&self, claim: &Value, integrator: Option<&Integrator>, card: &mut Scorecard) {
        let initial = first_num(claim, &["initial_energy", "energy_initial"]);
        let last = first_num(claim, &["final_energy", "energy_final"]);
        let claimed = first_num(claim, &["energy_drift", "relative_energy_drift"]);

        let computed = match (initial, last) {
            (Some(e0), Some(e1)) => relative_difference(e1, e0),
            _ => None,
        };
        if let (Some(claimed), Some(computed)) = (claimed, computed) {
            if (claimed.abs() - computed).abs() > 0.1 * computed.max(1e-12) {
                card.reject(
                    "energy_conservation",
                    format!("reported drift {:e} disagrees with (E_final - E_initial)/E_initial = {:e}", claimed, computed),
                );
                return;
            }
        }
        let Some(drift) = computed.or(claimed.map(f64::abs)) else { return };
        if bool_field(claim, "dissipative") == Some(true) {
            card.score("energy_conservation", 1.0, json!({ "drift": drift, "dissipative": true }));
            return;
        }
        let detail = json!({ "drift": drift, "recomputed": computed.is_some() });
        if drift <= 1e-6 {
            card.score("energy_conservation", 1.0, detail);
        } else if drift <= 1e-3 {
            card.score("energy_conservation", 0.8, detail);
        } else if drift <= 1e-2 {
            card.score_with_warning("energy_conservation", 0.5, detail, format!("relative energy drift {:.2e} exceeds 1e-3", drift));
        } else {
            let hint = if integrator.is_some_and(|i| i.symplectic) {
                "; a symplectic scheme should keep it bounded"
            } else {
                ""
            };
            card.score_with_warning(
                "energy_conservation",
                0.2,
                detail,
                format!("relative energy drift {:.2e} exceeds 1%{}", drift, hint),
            );
        }
    }

    fn convergence(&self, claim: &Value, integrator: Option<&Integrator>, card: &mut Scorecard) {
        let residuals = first_num_array(claim, &["residuals", "residual_history"]);
        let steps = first_num_array(claim, &["grid_steps", "step_sizes", "resolutions"]);
        let errors = first_num_array(claim, &["grid_errors", "errors"]);
        let claimed_order = first_num(claim, &["convergence_order", "order_of_accuracy"]);
        let mut scores = Vec::new();
        let mut detail = serde_json::Map::new();

        if !residuals.is_empty() {
            if residuals.iter().any(|r| *r < 0.0) {
                card.reject("convergence", "residuals cannot be negative");
                return;
            }
            let first = residuals[0];
            let last = residuals[residuals.len() - 1];
            let tolerance = first_num(claim, &["tolerance", "convergence_tolerance"]);
            detail.insert("final_residual".into(), json!(last));
            if residuals.len() > 1 && last >= first {
                card.reject("convergence", format!("residual grew from {:e} to {:e}", first, last));
                return;
            }
            match tolerance {
                Some(tol) if last > tol => {
                    scores.push(0.3);
                    card.warn(format!("final residual {:e} is above the tolerance {:e}", last, tol));
                }
                _ => scores.push(1.0),
            }
        }

        let observed = observed_order(&steps, &errors).or_else(|| first_num(claim, &["observed_order"]));
        let nominal = integrator.and_then(|i| i.order);
        if let Some(order) = claimed_order {
            if order <= 0.0 {
                card.reject("convergence", format!("convergence order {} must be positive", order));
                return;
            }
            detail.insert("claimed_order".into(), json!(order));
            let reference = observed.or(nominal);
            if let Some(reference) = reference {
                detail.insert("reference_order".into(), json!(reference));
                if (order - reference).abs() <= 0.5 {
                    scores.push(1.0);
                } else {
                    scores.push(0.3);
                    card.warn(format!("claimed order {} but the scheme gives {:.2}", order, reference));
                }
            } else {
                scores.push(0.7);
            }
        } else if let Some(observed) = observed {
            detail.insert("observed_order".into(), json!(observed));
            scores.push(if observed > 0.0 { 1.0 } else { 0.3 });
        }

        if !scores.is_empty() {
            let score = scores.iter().sum::<f64>() / scores.len() as f64;
            card.score("convergence", score, Value::Object(detail));
        }
    }

    fn timestep(&self, claim: &Value, integrator: Option<&Integrator>, card: &mut Scorecard) {
        let dt = first_num(claim, &["timestep", "dt", "time_step"]);
        if let Some(dt) = dt {
            if dt <= 0.0 {
                card.reject("timestep", format!("timestep {} must be positive", dt));
                return;
            }
        }
        let velocity = first_num(claim, &["max_velocity", "wave_speed"]);
        let dx = first_num(claim, &["dx", "grid_spacing"]);
        let computed = match (dt, velocity, dx) {
            (Some(dt), Some(u), Some(dx)) if dx > 0.0 => Some(u.abs() * dt / dx),
            _ => None,
        };
        let cfl = first_num(claim, &["cfl_number", "cfl"]).or(computed);
        if let (Some(claimed), Some(computed)) = (first_num(claim, &["cfl_number", "cfl"]), computed) {
            if relative_difference(claimed, computed).is_some_and(|d| d > 0.05) {
                card.reject("timestep", format!("CFL {} disagrees with u·dt/dx = {:.4}", claimed, computed));
                return;
            }
        }
        match cfl {
            Some(c) if c < 0.0 => card.reject("timestep", format!("CFL number {} cannot be negative", c)),
            Some(c) if c <= 1.0 => card.score("timestep", 1.0, json!({ "dt": dt, "cfl": c })),
            Some(c) if integrator.is_some_and(|i| i.implicit) => card.score_with_warning(
                "timestep",
                0.7,
                json!({ "dt": dt, "cfl": c }),
                format!("CFL {} > 1 relies on an implicit scheme", c),
            ),
            Some(c) => card.reject("timestep", format!("CFL {} > 1 is unstable for an explicit scheme", c)),
            None if dt.is_some() => card.score("timestep", 1.0, json!({ "dt": dt, "cfl": null })),
            None => {}
        }
    }
}

#[async_trait]
impl DomainAdapter for PhysicsAdapter {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn claim_types(&self) -> &'static [ClaimTypeSpec] {
        PHYSICS_CLAIM_TYPES
    }

    async fn verify(&self, claim: &Value, metadata: &ClaimMetadata) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        let (spec, inferred) = resolve_claim_type(DOMAIN, PHYSICS_CLAIM_TYPES, claim, metadata)?;
        info!("Verifying {} claim ({})", DOMAIN, spec.name);

        let mut card = Scorecard::new(spec);
        if let Some(warning) = inferred {
            card.warn(warning);
        }
        match spec.name {
            "dimensional_analysis" => self.dimensional_analysis(claim, &mut card),
            "numerical_simulation" => self.numerical_simulation(claim, &mut card),
            _ => return Err(unhandled_claim_type(DOMAIN, spec, PHYSICS_CLAIM_TYPES)),
        }

        debug!("{} {} total {}", DOMAIN, spec.name, card.total());
        Ok(card.finish(DOMAIN, &BadgePolicy::default(), started))
    }
}
