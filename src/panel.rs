//! # Reference Panel Index
//!
//! Phased reference haplotypes grouped by ancestral population. Loaded once per
//! run and read-only afterwards, so workers share it without locking.
//!
//! Draws are uniform with replacement over a population's haplotypes. Whether
//! both copies of one simulated individual may use the same donor over an
//! overlapping span is a panel setting (`SelfPairing`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use rand::Rng;

use crate::error::{Result, SimError};
use crate::variants::VariantSet;

/// One phased reference haplotype
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceHaplotype {
    pub population: String,
    pub sample: String,
    /// Haplotype copy within the sample (0 or 1)
    pub copy: u8,
    /// Allele (0 = REF, 1 = ALT) at every variant of the panel's `VariantSet`
    pub alleles: Vec<u8>,
}

impl ReferenceHaplotype {
    /// `<sample>_<copy>`
    pub fn name(&self) -> String {
        format!("{}_{}", self.sample, self.copy)
    }
}

/// Donor reuse between the two copies of one simulated individual
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelfPairing {
    /// Copies draw independently and may share a donor
    #[default]
    Allow,
    /// Copy 1 avoids every donor copy 0 uses over an overlapping span
    ForbidOverlapping,
}

impl FromStr for SelfPairing {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "forbid" | "forbid-overlapping" => Ok(Self::ForbidOverlapping),
            other => Err(SimError::invalid_parameter(format!(
                "Unknown self-pairing mode '{}' (expected allow or forbid)",
                other
            ))),
        }
    }
}

impl fmt::Display for SelfPairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::ForbidOverlapping => write!(f, "forbid-overlapping"),
        }
    }
}

/// Reference haplotypes indexed by population
#[derive(Debug)]
pub struct ReferencePanel {
    variants: VariantSet,
    haplotypes: Vec<ReferenceHaplotype>,
    /// Population labels in order of first appearance
    populations: Vec<String>,
    by_population: HashMap<String, Vec<usize>>,
    self_pairing: SelfPairing,
    fallback_warned: AtomicBool,
}

impl ReferencePanel {
    pub fn new(
        variants: VariantSet,
        haplotypes: Vec<ReferenceHaplotype>,
        self_pairing: SelfPairing,
    ) -> Result<Self> {
        if haplotypes.is_empty() {
            return Err(SimError::invalid_data("Reference panel has no haplotypes"));
        }

        let mut populations: Vec<String> = Vec::new();
        let mut by_population: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, hap) in haplotypes.iter().enumerate() {
            if hap.alleles.len() != variants.len() {
                return Err(SimError::invalid_data(format!(
                    "Haplotype {} has {} alleles but the panel has {} variants",
                    hap.name(),
                    hap.alleles.len(),
                    variants.len()
                )));
            }
            if let Some(v) = hap.alleles.iter().position(|&a| a > 1) {
                return Err(SimError::invalid_data(format!(
                    "Haplotype {} carries allele {} at variant {}; \
                     only biallelic sites are supported",
                    hap.name(),
                    hap.alleles[v],
                    v
                )));
            }
            if !by_population.contains_key(&hap.population) {
                populations.push(hap.population.clone());
            }
            by_population.entry(hap.population.clone()).or_default().push(idx);
        }

        for pop in &populations {
            debug!("Population {}: {} haplotypes", pop, by_population[pop].len());
        }

        Ok(Self {
            variants,
            haplotypes,
            populations,
            by_population,
            self_pairing,
            fallback_warned: AtomicBool::new(false),
        })
    }

    pub fn variants(&self) -> &VariantSet {
        &self.variants
    }

    /// Mutable access for load-time adjustments such as extending chromosomes
    /// to the genetic map.
    pub fn variants_mut(&mut self) -> &mut VariantSet {
        &mut self.variants
    }

    pub fn populations(&self) -> &[String] {
        &self.populations
    }

    pub fn contains(&self, label: &str) -> bool {
        self.by_population.contains_key(label)
    }

    pub fn self_pairing(&self) -> SelfPairing {
        self.self_pairing
    }

    pub fn len(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes.is_empty()
    }

    pub fn haplotype(&self, idx: usize) -> Option<&ReferenceHaplotype> {
        self.haplotypes.get(idx)
    }

    /// Haplotype indices of a population
    pub fn indices_for(&self, label: &str) -> Result<&[usize]> {
        self.by_population
            .get(label)
            .map(Vec::as_slice)
            .ok_or_else(|| SimError::unknown_population(label))
    }

    pub fn haplotypes_for(&self, label: &str) -> Result<Vec<&ReferenceHaplotype>> {
        Ok(self
            .indices_for(label)?
            .iter()
            .map(|&i| &self.haplotypes[i])
            .collect())
    }

    /// Uniform draw with replacement; returns the haplotype index
    pub fn draw_index<R: Rng + ?Sized>(&self, label: &str, rng: &mut R) -> Result<usize> {
        let candidates = self.indices_for(label)?;
        Ok(candidates[rng.random_range(0..candidates.len())])
    }

    pub fn draw_random<R: Rng + ?Sized>(
        &self,
        label: &str,
        rng: &mut R,
    ) -> Result<&ReferenceHaplotype> {
        let idx = self.draw_index(label, rng)?;
        Ok(&self.haplotypes[idx])
    }

    /// Uniform draw avoiding `exclude`.
    ///
    /// Falls back to the whole population, with a one-time warning, when every
    /// haplotype is excluded.
    pub fn draw_index_excluding<R: Rng + ?Sized>(
        &self,
        label: &str,
        exclude: &[usize],
        rng: &mut R,
    ) -> Result<usize> {
        let all = self.indices_for(label)?;
        if exclude.is_empty() {
            return Ok(all[rng.random_range(0..all.len())]);
        }
        let allowed: Vec<usize> = all.iter().copied().filter(|i| !exclude.contains(i)).collect();
        if allowed.is_empty() {
            if !self.fallback_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    "Population {} has no donor left after excluding self-pairing; \
                     drawing from all {} haplotypes",
                    label,
                    all.len()
                );
            }
            return Ok(all[rng.random_range(0..all.len())]);
        }
        Ok(allowed[rng.random_range(0..allowed.len())])
    }
}
