//! # Phenotype Simulator
//!
//! Derives phenotypes from a genotype matrix and a causal-effect model.
//!
//! The genetic component of individual `i` is
//!
//! ```text
//! g_i = Σ_j β_j x_ij + Σ_j γ_j x_ij x_ik(j) + Σ_j δ_j [dosage_ij == 1]
//! ```
//!
//! where `x` is the dosage (optionally standardized), `k(j)` the interaction
//! partner of `j` and `δ_j` its dominance deviation. Environmental noise is
//! calibrated to the empirical genetic variance: `Ve = Vg (1 - h2) / h2`.
//!
//! Simulation runs as two parallel phases around one reduction: genetic
//! components for every individual, then `Vg`, then noise draws from
//! per-individual rng substreams.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal, StudentT};
use rayon::prelude::*;
use statrs::statistics::Statistics;

use crate::error::{Result, SimError};
use crate::genotypes::GenotypeMatrix;
use crate::rng::{fork_seed, substream};

#[derive(Clone, Debug, PartialEq)]
pub struct Interaction {
    pub partner: String,
    pub coefficient: f64,
}

/// Effect of one causal variant
#[derive(Clone, Debug, PartialEq)]
pub struct CausalEffect {
    pub variant_id: String,
    pub beta: f64,
    pub interaction: Option<Interaction>,
    /// Added once when the individual is heterozygous
    pub dominance: Option<f64>,
}

impl CausalEffect {
    pub fn additive(variant_id: impl Into<String>, beta: f64) -> Self {
        Self {
            variant_id: variant_id.into(),
            beta,
            interaction: None,
            dominance: None,
        }
    }
}

/// Causal variants and their effects
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectSpec {
    effects: Vec<CausalEffect>,
}

/// A causal effect resolved to matrix rows
#[derive(Clone, Copy, Debug)]
struct ResolvedEffect {
    variant: usize,
    beta: f64,
    interaction: Option<(usize, f64)>,
    dominance: f64,
}

impl EffectSpec {
    pub fn new(effects: Vec<CausalEffect>) -> Result<Self> {
        for effect in &effects {
            let mut values = vec![effect.beta];
            values.extend(effect.interaction.as_ref().map(|i| i.coefficient));
            values.extend(effect.dominance);
            if values.iter().any(|v| !v.is_finite()) {
                return Err(SimError::invalid_parameter(format!(
                    "Effect for {} must be finite",
                    effect.variant_id
                )));
            }
        }
        Ok(Self { effects })
    }

    pub fn effects(&self) -> &[CausalEffect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Every causal variant and interaction partner must be in the matrix.
    pub fn validate(&self, matrix: &GenotypeMatrix) -> Result<()> {
        self.resolve(matrix).map(|_| ())
    }

    fn resolve(&self, matrix: &GenotypeMatrix) -> Result<Vec<ResolvedEffect>> {
        let lookup = |id: &str| {
            matrix
                .variants()
                .index_of(id)
                .ok_or_else(|| SimError::unknown_variant(id))
        };
        self.effects
            .iter()
            .map(|effect| -> Result<ResolvedEffect> {
                Ok(ResolvedEffect {
                    variant: lookup(&effect.variant_id)?,
                    beta: effect.beta,
                    interaction: match &effect.interaction {
                        Some(i) => Some((lookup(&i.partner)?, i.coefficient)),
                        None => None,
                    },
                    dominance: effect.dominance.unwrap_or(0.0),
                })
            })
            .collect()
    }
}

/// Distribution of the environmental component
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum NoiseModel {
    /// Zero-mean normal with variance `Ve`
    #[default]
    Normal,
    /// Student's t with `dof` degrees of freedom, rescaled to variance `Ve`
    StudentT { dof: f64 },
}

impl NoiseModel {
    fn validate(&self) -> Result<()> {
        match *self {
            Self::Normal => Ok(()),
            Self::StudentT { dof } if dof.is_finite() && dof > 2.0 => Ok(()),
            Self::StudentT { dof } => Err(SimError::invalid_parameter(format!(
                "Student's t noise needs more than 2 degrees of freedom, got {}",
                dof
            ))),
        }
    }

    fn sampler(&self, ve: f64) -> Result<NoiseSampler> {
        let sd = ve.sqrt();
        match *self {
            Self::Normal => Normal::new(0.0, sd)
                .map(NoiseSampler::Normal)
                .map_err(|e| SimError::invalid_parameter(format!("Normal noise: {}", e))),
            Self::StudentT { dof } => {
                let t = StudentT::new(dof)
                    .map_err(|e| SimError::invalid_parameter(format!("Student's t noise: {}", e)))?;
                Ok(NoiseSampler::StudentT(t, sd * ((dof - 2.0) / dof).sqrt()))
            }
        }
    }
}

impl FromStr for NoiseModel {
    type Err = SimError;

    /// `normal` or `t:<dof>`
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let model = match lower.split_once(':') {
            None if lower == "normal" => Self::Normal,
            Some(("t", dof)) => {
                let dof = dof.parse::<f64>().map_err(|_| {
                    SimError::invalid_parameter(format!(
                        "Invalid degrees of freedom in noise model '{}'",
                        s
                    ))
                })?;
                Self::StudentT { dof }
            }
            _ => {
                return Err(SimError::invalid_parameter(format!(
                    "Unknown noise model '{}' (expected normal or t:<dof>)",
                    s
                )))
            }
        };
        model.validate()?;
        Ok(model)
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::StudentT { dof } => write!(f, "t:{}", dof),
        }
    }
}

enum NoiseSampler {
    Normal(Normal<f64>),
    /// Distribution and scale
    StudentT(StudentT<f64>, f64),
}

impl NoiseSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Normal(d) => d.sample(rng),
            Self::StudentT(d, scale) => d.sample(rng) * scale,
        }
    }
}

/// Options for a phenotype run
#[derive(Clone, Debug, PartialEq)]
pub struct PhenotypeConfig {
    pub heritability: f64,
    pub noise: NoiseModel,
    /// Binary trait with this fraction of cases
    pub prevalence: Option<f64>,
    /// Standardize dosages before applying effects
    pub standardize_genotypes: bool,
    /// Z-score the observed values
    pub standardize: bool,
    pub replicates: usize,
}

impl PhenotypeConfig {
    pub fn new(heritability: f64) -> Self {
        Self {
            heritability,
            noise: NoiseModel::Normal,
            prevalence: None,
            standardize_genotypes: false,
            standardize: false,
            replicates: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_heritability(self.heritability)?;
        self.noise.validate()?;
        if let Some(prevalence) = self.prevalence {
            check_prevalence(prevalence)?;
        }
        if self.replicates == 0 {
            return Err(SimError::invalid_parameter("At least one replicate is required"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Phenotype {
    pub genetic: f64,
    pub environmental: f64,
    pub observed: f64,
    /// Set for binary traits
    pub case: Option<bool>,
}

/// Phenotypes keyed by individual id, in matrix order
#[derive(Clone, Debug, PartialEq)]
pub struct PhenotypeTable {
    ids: Vec<String>,
    phenotypes: Vec<Phenotype>,
}

impl PhenotypeTable {
    pub fn new(ids: Vec<String>, phenotypes: Vec<Phenotype>) -> Result<Self> {
        if ids.len() != phenotypes.len() {
            return Err(SimError::invalid_data(format!(
                "{} ids for {} phenotypes",
                ids.len(),
                phenotypes.len()
            )));
        }
        Ok(Self { ids, phenotypes })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn phenotypes(&self) -> &[Phenotype] {
        &self.phenotypes
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Phenotype> {
        self.ids.iter().position(|i| i == id).map(|idx| &self.phenotypes[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Phenotype)> {
        self.ids.iter().map(String::as_str).zip(self.phenotypes.iter())
    }

    pub fn to_map(&self) -> HashMap<String, Phenotype> {
        self.iter().map(|(id, p)| (id.to_string(), *p)).collect()
    }

    /// `Var(genetic) / Var(observed)` over the table
    pub fn realized_heritability(&self) -> f64 {
        let vg = self.phenotypes.iter().map(|p| p.genetic).population_variance();
        let vy = self.phenotypes.iter().map(|p| p.observed).population_variance();
        vg / vy
    }

    pub fn n_cases(&self) -> usize {
        self.phenotypes.iter().filter(|p| p.case == Some(true)).count()
    }
}

fn check_heritability(h2: f64) -> Result<()> {
    if !(h2 > 0.0 && h2 < 1.0) {
        return Err(SimError::degenerate_heritability(format!(
            "heritability must lie strictly between 0 and 1, got {}",
            h2
        )));
    }
    Ok(())
}

fn check_prevalence(prevalence: f64) -> Result<()> {
    if !(prevalence > 0.0 && prevalence < 1.0) {
        return Err(SimError::invalid_parameter(format!(
            "prevalence must lie strictly between 0 and 1, got {}",
            prevalence
        )));
    }
    Ok(())
}

/// Genetic component of every individual (phase one).
pub fn genetic_components(
    matrix: &GenotypeMatrix,
    spec: &EffectSpec,
    standardize_genotypes: bool,
) -> Result<Array1<f64>> {
    let effects = spec.resolve(matrix)?;

    // Per-variant values used by the effects, computed once
    let mut columns: HashMap<usize, Array1<f64>> = HashMap::new();
    for effect in &effects {
        for variant in std::iter::once(effect.variant).chain(effect.interaction.map(|(p, _)| p)) {
            columns.entry(variant).or_insert_with(|| {
                if standardize_genotypes {
                    matrix.standardized_dosages(variant)
                } else {
                    matrix.dosages(variant)
                }
            });
        }
    }

    let genetic: Vec<f64> = (0..matrix.n_individuals())
        .into_par_iter()
        .map(|i| {
            effects
                .iter()
                .map(|e| {
                    let x = columns[&e.variant][i];
                    let mut g = e.beta * x;
                    if let Some((partner, gamma)) = e.interaction {
                        g += gamma * x * columns[&partner][i];
                    }
                    if e.dominance != 0.0 && matrix.dosage(e.variant, i) == 1 {
                        g += e.dominance;
                    }
                    g
                })
                .sum()
        })
        .collect();
    Ok(Array1::from(genetic))
}

/// Simulate one phenotype per individual.
///
/// Fails with `DegenerateHeritability` when `heritability` is outside (0, 1)
/// or the genetic component has zero variance, and with `UnknownVariant` when
/// the effect model names a variant missing from the matrix.
pub fn simulate_phenotypes<R: Rng + ?Sized>(
    matrix: &GenotypeMatrix,
    spec: &EffectSpec,
    heritability: f64,
    noise: NoiseModel,
    rng: &mut R,
    prevalence: Option<f64>,
) -> Result<PhenotypeTable> {
    let config = PhenotypeConfig {
        noise,
        prevalence,
        ..PhenotypeConfig::new(heritability)
    };
    let mut tables = simulate_replicates(matrix, spec, &config, rng)?;
    tables
        .pop()
        .ok_or_else(|| SimError::invalid_parameter("no phenotype replicate produced"))
}

/// Simulate `config.replicates` phenotypes sharing one genetic component.
///
/// Each replicate draws its noise from its own substream forked off `rng`.
pub fn simulate_replicates<R: Rng + ?Sized>(
    matrix: &GenotypeMatrix,
    spec: &EffectSpec,
    config: &PhenotypeConfig,
    rng: &mut R,
) -> Result<Vec<PhenotypeTable>> {
    config.validate()?;
    spec.validate(matrix)?;
    if matrix.n_individuals() == 0 {
        return Err(SimError::invalid_data("Cannot simulate phenotypes for an empty cohort"));
    }

    let genetic = genetic_components(matrix, spec, config.standardize_genotypes)?;
    let vg = genetic.iter().population_variance();
    if !(vg > 0.0) {
        return Err(SimError::degenerate_heritability(format!(
            "genetic component has zero variance across {} individuals ({} causal variants)",
            genetic.len(),
            spec.len()
        )));
    }
    let h2 = config.heritability;
    let ve = vg * (1.0 - h2) / h2;
    info!("Genetic variance {:.6}, environmental variance {:.6} for h2 = {}", vg, ve, h2);

    let sampler = config.noise.sampler(ve)?;
    Ok((0..config.replicates)
        .map(|replicate| {
            let seed = fork_seed(rng);
            debug!("Replicate {} noise seed {}", replicate, seed);
            draw_phenotypes(matrix.individual_ids(), &genetic, &sampler, config, seed)
        })
        .collect())
}

/// Noise, observed values and case labels (phase two).
fn draw_phenotypes(
    ids: &[String],
    genetic: &Array1<f64>,
    sampler: &NoiseSampler,
    config: &PhenotypeConfig,
    seed: u64,
) -> PhenotypeTable {
    let environmental: Vec<f64> = (0..ids.len())
        .into_par_iter()
        .map(|i| sampler.sample(&mut substream(seed, i as u64)))
        .collect();

    let mut phenotypes: Vec<Phenotype> = genetic
        .iter()
        .zip(&environmental)
        .map(|(&g, &e)| Phenotype {
            genetic: g,
            environmental: e,
            observed: g + e,
            case: None,
        })
        .collect();

    if config.standardize {
        standardize(&mut phenotypes);
    }
    if let Some(prevalence) = config.prevalence {
        assign_cases(ids, &mut phenotypes, prevalence);
    }

    PhenotypeTable {
        ids: ids.to_vec(),
        phenotypes,
    }
}

/// Z-score the observed values, shifting and scaling both components to match
fn standardize(phenotypes: &mut [Phenotype]) {
    let mean_g = phenotypes.iter().map(|p| p.genetic).mean();
    let mean_e = phenotypes.iter().map(|p| p.environmental).mean();
    let sd = phenotypes.iter().map(|p| p.observed).population_std_dev();
    if !(sd > 0.0) {
        return;
    }
    for p in phenotypes.iter_mut() {
        p.genetic = (p.genetic - mean_g) / sd;
        p.environmental = (p.environmental - mean_e) / sd;
        p.observed = p.genetic + p.environmental;
    }
}

/// The `round(prevalence * N)` highest observed values are cases; ties go to
/// the smaller individual id.
fn assign_cases(ids: &[String], phenotypes: &mut [Phenotype], prevalence: f64) {
    let n_cases = (prevalence * phenotypes.len() as f64).round() as usize;
    let mut order: Vec<usize> = (0..phenotypes.len()).collect();
    order.sort_by(|&a, &b| {
        phenotypes[b]
            .observed
            .partial_cmp(&phenotypes[a].observed)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ids[a].cmp(&ids[b]))
    });
    for p in phenotypes.iter_mut() {
        p.case = Some(false);
    }
    for &idx in order.iter().take(n_cases) {
        phenotypes[idx].case = Some(true);
    }
    debug!("{} cases among {} individuals", n_cases, phenotypes.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{Variant, VariantSet};
    use ndarray::Array3;

    /// Individual `i` carries `dosages[v][i]` ALT alleles at variant `v`
    fn matrix_from_dosages(dosages: &[Vec<u8>]) -> GenotypeMatrix {
        let n_variants = dosages.len();
        let n_individuals = dosages[0].len();
        let variants = VariantSet::new(
            (0..n_variants)
                .map(|v| Variant::new(format!("v{}", v), "1", 100 * (v as u64 + 1)))
                .collect(),
        )
        .unwrap();
        let mut alleles = Array3::<u8>::zeros((n_variants, n_individuals, 2));
        for (v, row) in dosages.iter().enumerate() {
            for (i, &d) in row.iter().enumerate() {
                alleles[[v, i, 0]] = u8::from(d >= 1);
                alleles[[v, i, 1]] = u8::from(d == 2);
            }
        }
        let ids = (0..n_individuals).map(|i| format!("ind{:05}", i)).collect();
        GenotypeMatrix::new(variants, ids, alleles).unwrap()
    }

    fn cycling_matrix(n: usize) -> GenotypeMatrix {
        matrix_from_dosages(&[
            (0..n).map(|i| (i % 3) as u8).collect(),
            (0..n).map(|i| ((i / 3) % 3) as u8).collect(),
        ])
    }

    #[test]
    fn test_genetic_component_terms() {
        let m = matrix_from_dosages(&[vec![0, 1, 2], vec![2, 1, 0]]);
        let spec = EffectSpec::new(vec![
            CausalEffect {
                variant_id: "v0".into(),
                beta: 1.0,
                interaction: Some(Interaction {
                    partner: "v1".into(),
                    coefficient: 0.5,
                }),
                dominance: Some(10.0),
            },
            CausalEffect::additive("v1", -2.0),
        ])
        .unwrap();
        let g = genetic_components(&m, &spec, false).unwrap();
        // ind0: 0 + 0 + 0 - 4; ind1: 1 + 0.5 + 10 - 2; ind2: 2 + 0 + 0 - 0
        assert_eq!(g.to_vec(), vec![-4.0, 9.5, 2.0]);
    }

    fn normal_noise(
        m: &GenotypeMatrix,
        spec: &EffectSpec,
        h2: f64,
        seed: u64,
    ) -> Result<PhenotypeTable> {
        simulate_phenotypes(m, spec, h2, NoiseModel::Normal, &mut substream(seed, 0), None)
    }

    #[test]
    fn test_unknown_variant() {
        let m = cycling_matrix(9);
        let spec = EffectSpec::new(vec![CausalEffect::additive("rs404", 1.0)]).unwrap();
        let err = normal_noise(&m, &spec, 0.5, 0).unwrap_err();
        assert!(matches!(err, SimError::UnknownVariant { .. }));
    }

    #[test]
    fn test_degenerate_heritability() {
        let m = cycling_matrix(30);
        let spec = EffectSpec::new(vec![CausalEffect::additive("v0", 1.0)]).unwrap();
        for h2 in [0.0, 1.0, 1.5, -0.2, f64::NAN] {
            let err = normal_noise(&m, &spec, h2, 0).unwrap_err();
            assert!(matches!(err, SimError::DegenerateHeritability { .. }), "h2 = {}", h2);
        }
        let empty = EffectSpec::default();
        let err = normal_noise(&m, &empty, 0.5, 0).unwrap_err();
        assert!(matches!(err, SimError::DegenerateHeritability { .. }));
    }

    #[test]
    fn test_case_control_counts_and_ties() {
        let ids: Vec<String> = ["d", "a", "c", "b"].iter().map(|s| s.to_string()).collect();
        let mut phenotypes: Vec<Phenotype> = [1.0, 1.0, 5.0, 1.0]
            .iter()
            .map(|&y| Phenotype {
                genetic: y,
                environmental: 0.0,
                observed: y,
                case: None,
            })
            .collect();
        assign_cases(&ids, &mut phenotypes, 0.5);
        let cases: Vec<&str> = ids
            .iter()
            .zip(&phenotypes)
            .filter(|(_, p)| p.case == Some(true))
            .map(|(id, _)| id.as_str())
            .collect();
        // 5.0 first, then the tie at 1.0 goes to "a"
        assert_eq!(cases, vec!["a", "c"]);
    }

    #[test]
    fn test_binary_trait_prevalence() {
        let m = cycling_matrix(1_000);
        let spec = EffectSpec::new(vec![
            CausalEffect::additive("v0", 0.3),
            CausalEffect::additive("v1", -0.1),
        ])
        .unwrap();
        let noise = NoiseModel::Normal;
        let mut rng = substream(4, 0);
        let table = simulate_phenotypes(&m, &spec, 0.4, noise, &mut rng, Some(0.1)).unwrap();
        assert_eq!(table.n_cases(), 100);
        assert!(table.phenotypes().iter().all(|p| p.case.is_some()));

        let bad = simulate_phenotypes(&m, &spec, 0.4, noise, &mut substream(4, 0), Some(1.0));
        assert!(matches!(bad, Err(SimError::InvalidParameter { .. })));
    }

    #[test]
    fn test_same_seed_same_phenotypes() {
        let m = cycling_matrix(500);
        let spec = EffectSpec::new(vec![CausalEffect::additive("v0", 1.0)]).unwrap();
        let noise = NoiseModel::StudentT { dof: 5.0 };
        let a = simulate_phenotypes(&m, &spec, 0.3, noise, &mut substream(8, 0), None).unwrap();
        let b = simulate_phenotypes(&m, &spec, 0.3, noise, &mut substream(8, 0), None).unwrap();
        assert_eq!(a, b);
        let c = simulate_phenotypes(&m, &spec, 0.3, noise, &mut substream(9, 0), None).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_heritability_is_reached() {
        let m = cycling_matrix(10_000);
        let spec = EffectSpec::new(vec![
            CausalEffect::additive("v0", 0.5),
            CausalEffect::additive("v1", 0.25),
        ])
        .unwrap();
        for h2 in [0.2, 0.5, 0.8] {
            let table = normal_noise(&m, &spec, h2, 21).unwrap();
            let realized = table.realized_heritability();
            assert!((realized - h2).abs() < 0.02, "h2 {} realized {}", h2, realized);
        }
    }

    #[test]
    fn test_student_t_noise_is_rescaled() {
        let m = cycling_matrix(20_000);
        let spec = EffectSpec::new(vec![
            CausalEffect::additive("v0", 0.5),
            CausalEffect::additive("v1", 0.25),
        ])
        .unwrap();
        let noise = NoiseModel::StudentT { dof: 6.0 };
        for h2 in [0.2, 0.5, 0.8] {
            let mut rng = substream(31, 0);
            let table = simulate_phenotypes(&m, &spec, h2, noise, &mut rng, None).unwrap();
            let realized = table.realized_heritability();
            assert!((realized - h2).abs() < 0.03, "h2 {} realized {}", h2, realized);

            let genetic: Vec<f64> = table.phenotypes().iter().map(|p| p.genetic).collect();
            let environmental: Vec<f64> =
                table.phenotypes().iter().map(|p| p.environmental).collect();
            let ve = genetic.iter().population_variance() * (1.0 - h2) / h2;
            let var_e = environmental.iter().population_variance();
            assert!((var_e / ve - 1.0).abs() < 0.1, "Ve {} realized {}", ve, var_e);

            // Heavier tails than a normal of the same variance
            let sd = var_e.sqrt();
            let extreme = environmental.iter().filter(|e| e.abs() > 4.0 * sd).count();
            assert!(extreme > 10, "{} draws beyond 4 sd", extreme);
        }
    }

    #[test]
    fn test_replicates_and_standardize() {
        let m = cycling_matrix(2_000);
        let spec = EffectSpec::new(vec![CausalEffect::additive("v0", 1.0)]).unwrap();
        let config = PhenotypeConfig {
            replicates: 3,
            standardize: true,
            standardize_genotypes: true,
            ..PhenotypeConfig::new(0.5)
        };
        let tables = simulate_replicates(&m, &spec, &config, &mut substream(1, 0)).unwrap();
        assert_eq!(tables.len(), 3);
        // Same genetic ordering, different noise
        assert_ne!(
            tables[0].phenotypes()[0].environmental,
            tables[1].phenotypes()[0].environmental
        );
        for table in &tables {
            let observed: Vec<f64> = table.phenotypes().iter().map(|p| p.observed).collect();
            assert!(observed.iter().mean().abs() < 1e-9);
            assert!((observed.iter().population_variance() - 1.0).abs() < 1e-9);
            let p = table.phenotypes()[7];
            assert!((p.genetic + p.environmental - p.observed).abs() < 1e-12);
        }
    }

    #[test]
    fn test_noise_model_parsing() {
        assert_eq!("normal".parse::<NoiseModel>().unwrap(), NoiseModel::Normal);
        assert_eq!("t:4".parse::<NoiseModel>().unwrap(), NoiseModel::StudentT { dof: 4.0 });
        assert!("t:2".parse::<NoiseModel>().is_err());
        assert!("cauchy".parse::<NoiseModel>().is_err());
        assert_eq!(NoiseModel::StudentT { dof: 4.0 }.to_string(), "t:4");
    }

    #[test]
    fn test_table_lookup() {
        let m = cycling_matrix(12);
        let spec = EffectSpec::new(vec![CausalEffect::additive("v0", 1.0)]).unwrap();
        let table = normal_noise(&m, &spec, 0.5, 3).unwrap();
        assert_eq!(table.len(), 12);
        let p = table.get("ind00004").unwrap();
        assert_eq!(p.genetic, 1.0);
        assert!(table.get("nobody").is_none());
        assert_eq!(table.to_map().len(), 12);
    }
}
