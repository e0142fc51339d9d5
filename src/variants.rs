//! # Variant Sites and Chromosomes
//!
//! The ordered set of genotyped sites shared by the reference panel, the
//! simulated individuals and the genotype matrix. Variants are grouped by
//! chromosome and ascending by position within a chromosome; a variant's index
//! in the set is its row in every allele vector.

use std::collections::HashMap;
use std::ops::Range;

use log::warn;

use crate::error::{Result, SimError};

/// A single biallelic site
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    pub id: String,
    pub chrom: String,
    /// 1-based genomic position
    pub position: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl Variant {
    pub fn new(id: impl Into<String>, chrom: impl Into<String>, position: u64) -> Self {
        Self {
            id: id.into(),
            chrom: chrom.into(),
            position,
            ref_allele: "N".to_string(),
            alt_allele: "N".to_string(),
        }
    }

    pub fn with_alleles(
        mut self,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        self.ref_allele = ref_allele.into();
        self.alt_allele = alt_allele.into();
        self
    }
}

/// One chromosome: identifier, physical length and its genotyped positions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chromosome {
    name: String,
    length: u64,
    positions: Vec<u64>,
    /// Index of this chromosome's first variant in the owning `VariantSet`
    offset: usize,
}

impl Chromosome {
    /// A chromosome with no genotyped sites, used when simulating breakpoints alone
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
            positions: Vec::new(),
            offset: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segments partition `[0, length)`
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    /// Rows of this chromosome's variants in the owning `VariantSet`
    pub fn variant_range(&self) -> Range<usize> {
        self.offset..self.offset + self.positions.len()
    }
}

/// Ordered variant sites, grouped by chromosome
#[derive(Clone, Debug, Default)]
pub struct VariantSet {
    variants: Vec<Variant>,
    chromosomes: Vec<Chromosome>,
    by_id: HashMap<String, usize>,
}

impl VariantSet {
    pub fn new(variants: Vec<Variant>) -> Result<Self> {
        let mut chromosomes: Vec<Chromosome> = Vec::new();
        let mut by_id = HashMap::with_capacity(variants.len());

        for (idx, variant) in variants.iter().enumerate() {
            match chromosomes.last_mut() {
                Some(chrom) if chrom.name == variant.chrom => {
                    if let Some(&previous) = chrom.positions.last() {
                        if variant.position < previous {
                            return Err(SimError::invalid_data(format!(
                                "Variant {} at {}:{} is out of order (previous position {})",
                                variant.id, variant.chrom, variant.position, previous
                            )));
                        }
                    }
                    chrom.positions.push(variant.position);
                    chrom.length = chrom.length.max(variant.position + 1);
                }
                _ => {
                    if chromosomes.iter().any(|c| c.name == variant.chrom) {
                        return Err(SimError::invalid_data(format!(
                            "Variants on chromosome {} are not contiguous",
                            variant.chrom
                        )));
                    }
                    chromosomes.push(Chromosome {
                        name: variant.chrom.clone(),
                        length: variant.position + 1,
                        positions: vec![variant.position],
                        offset: idx,
                    });
                }
            }

            if by_id.insert(variant.id.clone(), idx).is_some() {
                warn!(
                    "Duplicate variant ID {}; lookups resolve to the last occurrence",
                    variant.id
                );
            }
        }

        Ok(Self {
            variants,
            chromosomes,
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Variant> {
        self.variants.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn chromosome(&self, name: &str) -> Option<&Chromosome> {
        self.chromosomes.iter().find(|c| c.name == name)
    }

    /// Grow a chromosome so that it covers at least `[0, min_length)`.
    ///
    /// Used to extend chromosomes out to the end of the genetic map.
    pub fn extend_chromosome(&mut self, name: &str, min_length: u64) -> Result<()> {
        let chrom = self
            .chromosomes
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SimError::unknown_chromosome(name))?;
        chrom.length = chrom.length.max(min_length);
        Ok(())
    }

    /// Subset to the variants at `keep`, in the order given
    pub fn retain_indices(&self, keep: &[usize]) -> Result<Self> {
        let variants = keep
            .iter()
            .map(|&i| {
                self.variants
                    .get(i)
                    .cloned()
                    .ok_or_else(|| {
                        SimError::invalid_data(format!("Variant index {} out of range", i))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(variants)
    }
}
