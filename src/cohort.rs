//! # Cohort Driver
//!
//! Simulates a cohort in three phases:
//!
//! 1. one genealogy is sampled for the whole cohort, with ancestral
//!    generations of `pool_size` individuals,
//! 2. every chromosome is passed forward through it (see `breakpoints`),
//! 3. individuals are assembled in parallel, each straight into its column of
//!    the cohort's genotype array.
//!
//! Every phase draws from substreams of the run seed, so the cohort is the same
//! for any number of rayon threads.
//!
//! Everything that can be validated up front (model populations against the
//! panel, chromosomes against the genetic map) is checked before the first
//! individual is simulated.

use log::{debug, info, warn};
use ndarray::{Array3, Axis};
use rayon::prelude::*;

use crate::assemble::{assemble_into, SimulatedIndividual};
use crate::breakpoints::{BreakpointSimulator, DEFAULT_POOL_SIZE};
use crate::error::{Result, SimError};
use crate::genetic_map::{CoverageWarnings, GeneticMaps, MapProvider};
use crate::genotypes::GenotypeMatrix;
use crate::model::AdmixtureModel;
use crate::panel::ReferencePanel;
use crate::rng::{substream, task_seed};
use crate::variants::VariantSet;

pub const DEFAULT_ID_PREFIX: &str = "Sample_";

/// Substream of the run seed for sampling the genealogy; assembly of
/// individual `i` uses substream `i`
const LINEAGE_STREAM: u64 = u64::MAX;
const BREAKPOINT_STREAM: u64 = u64::MAX - 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CohortConfig {
    pub n_individuals: usize,
    pub seed: u64,
    /// Individuals in each ancestral generation
    pub pool_size: usize,
    /// Individual `i` is named `<prefix><i + 1>`
    pub id_prefix: String,
}

impl CohortConfig {
    pub fn new(n_individuals: usize, seed: u64) -> Self {
        Self {
            n_individuals,
            seed,
            pool_size: DEFAULT_POOL_SIZE,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn individual_id(&self, index: usize) -> String {
        format!("{}{}", self.id_prefix, index + 1)
    }
}

/// Simulated individuals plus run diagnostics
#[derive(Debug)]
pub struct Cohort {
    pub individuals: Vec<SimulatedIndividual>,
    /// Column `i` belongs to `individuals[i]`
    pub genotypes: GenotypeMatrix,
    /// Breakpoint map lookups that fell outside the map and were clamped
    pub clamped_lookups: usize,
}

/// Extend each chromosome to the end of its genetic map and count variants
/// outside the map's anchors.
///
/// Fails with `UnknownChromosome` for a chromosome the map does not cover.
pub fn fit_chromosomes_to_map(
    variants: &mut VariantSet,
    maps: &GeneticMaps,
    warnings: &CoverageWarnings,
) -> Result<()> {
    let names: Vec<String> = variants.chromosomes().iter().map(|c| c.name().to_string()).collect();
    for name in names {
        let map = maps
            .get(&name)
            .ok_or_else(|| SimError::unknown_chromosome(name.as_str()))?;
        let before = warnings.count();
        if let Some(chrom) = variants.chromosome(&name) {
            for &pos in chrom.positions() {
                warnings.note(map.genetic_position_clamped(pos));
            }
        }
        let outside = warnings.count() - before;
        if outside > 0 {
            warn!(
                "{} variant(s) on {} lie outside the genetic map [{}, {}] and were clamped",
                outside,
                name,
                map.first_position(),
                map.last_position()
            );
        }
        variants.extend_chromosome(&name, map.last_position() + 1)?;
    }
    Ok(())
}

/// Simulate `config.n_individuals` admixed individuals.
///
/// `on_individual` is called once per finished individual, from worker threads.
pub fn simulate_cohort<M, F>(
    model: &AdmixtureModel,
    panel: &ReferencePanel,
    map: &M,
    config: &CohortConfig,
    on_individual: F,
) -> Result<Cohort>
where
    M: MapProvider + ?Sized,
    F: Fn() + Sync,
{
    if config.n_individuals == 0 {
        return Err(SimError::invalid_parameter("Number of individuals to simulate must be > 0"));
    }
    if config.pool_size == 0 {
        return Err(SimError::invalid_parameter("Generation pool size must be > 0"));
    }
    model.check_populations(|label| panel.contains(label))?;
    let chromosomes = panel.variants().chromosomes();
    if chromosomes.is_empty() {
        return Err(SimError::invalid_data("Reference panel has no variants"));
    }
    for chrom in chromosomes {
        map.interpolate(chrom.name(), 0)?;
    }
    info!(
        "Simulating {} individuals over {} chromosome(s), {} generation(s) of {}, seed {}",
        config.n_individuals,
        chromosomes.len(),
        model.generations().len(),
        config.pool_size,
        config.seed
    );

    let lineage = model.sample_lineage(
        config.pool_size,
        config.n_individuals,
        &mut substream(config.seed, LINEAGE_STREAM),
    );
    debug!("Sampled genealogy: {} nodes", lineage.node_count());

    let warnings = CoverageWarnings::new();
    let simulator =
        BreakpointSimulator::new(model, map, &warnings).with_pool_size(config.pool_size);
    let breakpoints = simulator.simulate_genome(
        &lineage,
        chromosomes,
        task_seed(config.seed, BREAKPOINT_STREAM),
    )?;

    let mut alleles = Array3::<u8>::zeros((panel.variants().len(), config.n_individuals, 2));
    let individuals = alleles
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .zip(breakpoints.into_par_iter())
        .enumerate()
        .map(|(index, (column, breakpoints))| {
            let mut rng = substream(config.seed, index as u64);
            let id = config.individual_id(index);
            let individual = assemble_into(id, breakpoints, panel, &mut rng, column)?;
            on_individual();
            Ok(individual)
        })
        .collect::<Result<Vec<_>>>()?;
    let ids = individuals.iter().map(|ind| ind.id.clone()).collect();
    let genotypes = GenotypeMatrix::new(panel.variants().clone(), ids, alleles)?;

    let segments: usize = individuals
        .iter()
        .flat_map(|ind| ind.copies.iter())
        .map(|copy| copy.breakpoints.len())
        .sum();
    debug!(
        "Mean segments per haplotype: {:.2}",
        segments as f64 / (2 * individuals.len()) as f64
    );
    let clamped_lookups = warnings.count();
    if clamped_lookups > 0 {
        warn!(
            "{} crossover position(s) fell outside the genetic map and were clamped",
            clamped_lookups
        );
    }

    Ok(Cohort {
        individuals,
        genotypes,
        clamped_lookups,
    })
}
