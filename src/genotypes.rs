//! # Genotype Matrix
//!
//! Alleles of a cohort indexed by `(variant, individual, copy)`. The cohort
//! driver allocates the array up front and each individual's column is written
//! by exactly one assembly worker, so filling it needs no locking.

use log::{debug, warn};
use ndarray::{Array1, Array3, Axis};

use crate::error::{Result, SimError};
use crate::variants::VariantSet;

#[derive(Clone, Debug)]
pub struct GenotypeMatrix {
    variants: VariantSet,
    individuals: Vec<String>,
    /// Shape `(n_variants, n_individuals, 2)`, values 0 or 1
    alleles: Array3<u8>,
    minor_coded: bool,
}

impl GenotypeMatrix {
    pub fn new(
        variants: VariantSet,
        individuals: Vec<String>,
        alleles: Array3<u8>,
    ) -> Result<Self> {
        let expected = (variants.len(), individuals.len(), 2);
        if alleles.dim() != expected {
            return Err(SimError::invalid_data(format!(
                "Genotype array has shape {:?}, expected {:?}",
                alleles.dim(),
                expected
            )));
        }
        if alleles.iter().any(|&a| a > 1) {
            return Err(SimError::invalid_data("Genotype array holds alleles other than 0 and 1"));
        }
        debug!(
            "Genotype matrix: {} variants x {} individuals",
            expected.0, expected.1
        );
        Ok(Self {
            variants,
            individuals,
            alleles,
            minor_coded: false,
        })
    }

    pub fn variants(&self) -> &VariantSet {
        &self.variants
    }

    pub fn individual_ids(&self) -> &[String] {
        &self.individuals
    }

    pub fn n_variants(&self) -> usize {
        self.variants.len()
    }

    pub fn n_individuals(&self) -> usize {
        self.individuals.len()
    }

    pub fn allele(&self, variant: usize, individual: usize, copy: usize) -> u8 {
        self.alleles[[variant, individual, copy]]
    }

    /// Alternate-allele count (0, 1 or 2)
    pub fn dosage(&self, variant: usize, individual: usize) -> u8 {
        self.alleles[[variant, individual, 0]] + self.alleles[[variant, individual, 1]]
    }

    /// Dosages of every individual at one variant
    pub fn dosages(&self, variant: usize) -> Array1<f64> {
        self.alleles
            .index_axis(Axis(0), variant)
            .outer_iter()
            .map(|pair| f64::from(pair[0] + pair[1]))
            .collect()
    }

    /// Dosages centred on `2p` and scaled by `sqrt(2p(1 - p))`; monomorphic
    /// sites become all zeros.
    pub fn standardized_dosages(&self, variant: usize) -> Array1<f64> {
        let dosages = self.dosages(variant);
        let p = dosages.sum() / (2.0 * dosages.len().max(1) as f64);
        let sd = (2.0 * p * (1.0 - p)).sqrt();
        if sd == 0.0 {
            return Array1::zeros(dosages.len());
        }
        dosages.mapv(|d| (d - 2.0 * p) / sd)
    }

    /// Alternate-allele frequency per variant
    pub fn alt_allele_frequencies(&self) -> Array1<f64> {
        let denom = (2 * self.individuals.len()).max(1) as f64;
        self.alleles
            .outer_iter()
            .map(|site| site.iter().map(|&a| f64::from(a)).sum::<f64>() / denom)
            .collect()
    }

    pub fn is_minor_coded(&self) -> bool {
        self.minor_coded
    }

    /// Recode alleles so 1 is the minor allele, flipping sites with AAF > 0.5.
    ///
    /// Returns the minor-allele frequencies. Calling it again warns and only
    /// returns the frequencies.
    pub fn to_minor_allele_counts(&mut self) -> Array1<f64> {
        if self.minor_coded {
            warn!("Genotypes are already coded as minor-allele counts; leaving them unchanged");
            return self.alt_allele_frequencies();
        }
        let aaf = self.alt_allele_frequencies();
        let mut flipped = 0usize;
        for (mut site, &freq) in self.alleles.outer_iter_mut().zip(aaf.iter()) {
            if freq > 0.5 {
                site.mapv_inplace(|a| 1 - a);
                flipped += 1;
            }
        }
        self.minor_coded = true;
        debug!("Flipped {} of {} variants to minor-allele coding", flipped, aaf.len());
        aaf.mapv(|f| f.min(1.0 - f))
    }
}
