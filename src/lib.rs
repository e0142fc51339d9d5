//! Simulate admixed diploid genomes and complex-trait phenotypes.
//!
//! A run samples one genealogy for the cohort from an admixture model, drops
//! crossovers along a genetic map to get local-ancestry breakpoints, copies
//! alleles from reference haplotypes of the matching population, and finally
//! derives phenotypes from the resulting genotypes.

pub mod assemble;
pub mod breakpoints;
pub mod cohort;
pub mod error;
pub mod genetic_map;
pub mod genotypes;
pub mod io;
pub mod model;
pub mod panel;
pub mod phenotype;
pub mod rng;
pub mod variants;

pub use assemble::{assemble, assemble_into, SimulatedIndividual};
pub use breakpoints::{
    simulate_breakpoints, Breakpoint, BreakpointSimulator, HaplotypeBreakpoints,
};
pub use cohort::{simulate_cohort, Cohort, CohortConfig};
pub use error::{Result, SimError};
pub use genetic_map::{GeneticMap, GeneticMaps, MapProvider, UniformRateMap};
pub use genotypes::GenotypeMatrix;
pub use model::{AdmixtureModel, Generation, PedigreeEdge};
pub use panel::{ReferenceHaplotype, ReferencePanel, SelfPairing};
pub use phenotype::{
    simulate_phenotypes, simulate_replicates, CausalEffect, EffectSpec, NoiseModel, PhenotypeConfig,
    PhenotypeTable,
};
pub use variants::{Chromosome, Variant, VariantSet};
