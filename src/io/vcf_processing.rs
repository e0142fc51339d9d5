//! VCF input via noodles-vcf.
//!
//! Reads phased reference panels and (simulated) cohorts. Every kept site must
//! be biallelic; reference panels must also be phased at heterozygous calls.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, warn};
use ndarray::Array3;
use noodles_vcf::{
    self as vcf,
    variant::record::{
        samples::series::value::genotype::Phasing, samples::series::Value,
        samples::Series as _, AlternateBases as _, Ids as _,
    },
    Header as VcfHeader,
};

use crate::error::{Result, SimError};
use crate::genotypes::GenotypeMatrix;
use crate::panel::{ReferenceHaplotype, ReferencePanel, SelfPairing};
use crate::variants::{Variant, VariantSet};

#[derive(Debug)]
pub struct SamplesHeaderInfo {
    pub sample_names: Vec<String>,
    pub sample_count: usize,
}

impl SamplesHeaderInfo {
    pub fn from_header(header: &VcfHeader, filepath: &Path) -> Result<Self> {
        let sample_names: Vec<String> = header.sample_names().iter().cloned().collect();
        let sample_count = sample_names.len();
        if sample_count == 0 {
            return Err(SimError::vcf(format!(
                "VCF header from {} contains no samples",
                filepath.display()
            )));
        }
        Ok(Self {
            sample_names,
            sample_count,
        })
    }
}

/// `chrom` or `chrom:start-end` (1-based, inclusive)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn contains(&self, chrom: &str, position: u64) -> bool {
        chrom == self.chrom && position >= self.start && position <= self.end
    }
}

impl FromStr for Region {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            SimError::invalid_parameter(format!(
                "Invalid region '{}' (expected chrom:start-end)",
                s
            ))
        };
        let (chrom, range) = match s.split_once(':') {
            Some((chrom, range)) => (chrom, Some(range)),
            None => (s, None),
        };
        if chrom.is_empty() {
            return Err(invalid());
        }
        let (start, end) = match range {
            None => (0, u64::MAX),
            Some(range) => {
                let (start, end) = range.split_once('-').ok_or_else(invalid)?;
                let parse = |v: &str| v.replace(',', "").parse::<u64>().map_err(|_| invalid());
                (parse(start)?, parse(end)?)
            }
        };
        if start > end {
            return Err(invalid());
        }
        Ok(Self {
            chrom: chrom.to_string(),
            start,
            end,
        })
    }
}

/// Options for reading a VCF
#[derive(Clone, Debug, Default)]
pub struct VcfReadOptions {
    pub region: Option<Region>,
    /// Keep only these samples, in this order
    pub samples: Option<Vec<String>>,
    /// Skip multi-allelic sites with a warning instead of failing
    pub discard_multiallelic: bool,
    /// Fail on unphased heterozygous calls
    pub require_phased: bool,
}

/// Diploid calls of the selected samples
#[derive(Clone, Debug, Default)]
pub struct PhasedGenotypes {
    pub samples: Vec<String>,
    pub variants: Vec<Variant>,
    /// Per variant, per sample: alleles of copy 0 and copy 1
    pub alleles: Vec<Vec<[u8; 2]>>,
}

/// Parse a `a|b` / `a/b` string genotype into alleles and phasing
fn parse_gt_string(gt: &str) -> Option<([Option<usize>; 2], bool)> {
    let (sep_idx, sep) = gt.char_indices().find(|&(_, c)| c == '|' || c == '/')?;
    let allele = |s: &str| match s {
        "." => Some(None),
        s => s.parse::<usize>().ok().map(Some),
    };
    let a = allele(&gt[..sep_idx])?;
    let b = allele(&gt[sep_idx + 1..])?;
    Some(([a, b], sep == '|'))
}

/// Extract `[copy0, copy1]` for every selected sample of one record.
fn record_alleles(
    record: &vcf::Record,
    header: &VcfHeader,
    slots: &[Option<usize>],
    n_selected: usize,
    require_phased: bool,
    label: &str,
) -> Result<Vec<[u8; 2]>> {
    let gt_key = vcf::variant::record::samples::keys::key::GENOTYPE;
    let samples = record.samples();
    let series = samples
        .select(gt_key)
        .ok_or_else(|| SimError::vcf(format!("Variant {} has no GT field", label)))?;

    let mut out = vec![[0u8; 2]; n_selected];
    let mut filled = 0usize;
    for (sample_idx, value) in series.iter(header).enumerate() {
        let Some(slot) = slots.get(sample_idx).copied().flatten() else {
            continue;
        };
        let (alleles, phased) = match value? {
            Some(Value::Genotype(genotype)) => {
                let mut alleles = Vec::with_capacity(2);
                let mut phased = false;
                for item in genotype.iter() {
                    let (allele, phasing) = item?;
                    phased |= phasing == Phasing::Phased;
                    alleles.push(allele);
                }
                match alleles.as_slice() {
                    [a, b] => ([*a, *b], phased),
                    _ => {
                        return Err(SimError::invalid_data(format!(
                            "Variant {}: sample {} is not diploid",
                            label, sample_idx
                        )))
                    }
                }
            }
            Some(Value::String(gt)) => parse_gt_string(&gt).ok_or_else(|| {
                SimError::invalid_data(format!(
                    "Variant {}: sample {} has an unparsable genotype '{}'",
                    label, sample_idx, gt
                ))
            })?,
            other => {
                return Err(SimError::invalid_data(format!(
                    "Variant {}: sample {} has no usable genotype ({:?})",
                    label, sample_idx, other
                )))
            }
        };

        let [a, b] = alleles;
        let (Some(a), Some(b)) = (a, b) else {
            return Err(SimError::invalid_data(format!(
                "Variant {}: sample {} has a missing genotype",
                label, sample_idx
            )));
        };
        if a > 1 || b > 1 {
            return Err(SimError::invalid_data(format!(
                "Variant {}: sample {} carries allele index {}; only biallelic sites are supported",
                label,
                sample_idx,
                a.max(b)
            )));
        }
        if require_phased && a != b && !phased {
            return Err(SimError::invalid_data(format!(
                "Variant {}: sample {} is an unphased heterozygote; \
                 reference haplotypes must be phased",
                label, sample_idx
            )));
        }
        out[slot] = [a as u8, b as u8];
        filled += 1;
    }

    if filled != n_selected {
        return Err(SimError::invalid_data(format!(
            "Variant {}: genotypes for {} of {} selected samples",
            label, filled, n_selected
        )));
    }
    Ok(out)
}

/// Read the biallelic sites and diploid calls of a VCF.
pub fn read_vcf(vcf_path: &Path, options: &VcfReadOptions) -> Result<PhasedGenotypes> {
    debug!("Processing VCF: {}", vcf_path.display());
    let mut reader = vcf::io::reader::Builder::default().build_from_path(vcf_path)?;
    let header = reader.read_header()?;
    let samples_info = SamplesHeaderInfo::from_header(&header, vcf_path)?;

    // Header index -> output slot
    let mut slots: Vec<Option<usize>> = vec![None; samples_info.sample_count];
    let selected: Vec<String> = match &options.samples {
        None => {
            for (i, slot) in slots.iter_mut().enumerate() {
                *slot = Some(i);
            }
            samples_info.sample_names.clone()
        }
        Some(wanted) => {
            let index: HashMap<&str, usize> = samples_info
                .sample_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect();
            let mut selected = Vec::with_capacity(wanted.len());
            for name in wanted {
                match index.get(name.as_str()) {
                    Some(&i) if slots[i].is_none() => {
                        slots[i] = Some(selected.len());
                        selected.push(name.clone());
                    }
                    Some(_) => debug!("Sample {} requested twice", name),
                    None => warn!("Sample {} not found in {}", name, vcf_path.display()),
                }
            }
            selected
        }
    };
    if selected.is_empty() {
        return Err(SimError::vcf(format!(
            "None of the requested samples are present in {}",
            vcf_path.display()
        )));
    }

    let mut genotypes = PhasedGenotypes {
        samples: selected,
        ..PhasedGenotypes::default()
    };
    let mut discarded = 0usize;
    let mut record = vcf::Record::default();

    while reader.read_record(&mut record)? != 0 {
        let chrom = record.reference_sequence_name().to_string();
        let position = match record.variant_start() {
            Some(Ok(p)) => p.get() as u64,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(SimError::vcf(format!("Record on {} has no position", chrom)));
            }
        };
        if let Some(region) = &options.region {
            if !region.contains(&chrom, position) {
                continue;
            }
        }

        let ref_allele = record.reference_bases().to_string();
        let alternate_bases = record.alternate_bases();
        let alts = alternate_bases.iter().collect::<std::io::Result<Vec<&str>>>()?;
        let alt_allele = match alts.as_slice() {
            [] => ".".to_string(),
            [alt] => alt.to_string(),
            many if options.discard_multiallelic => {
                debug!(
                    "Variant at {}:{} has {} alternate alleles, skipping",
                    chrom,
                    position,
                    many.len()
                );
                discarded += 1;
                continue;
            }
            many => {
                return Err(SimError::invalid_data(format!(
                    "Variant at {}:{} has {} alternate alleles; only biallelic sites are supported",
                    chrom,
                    position,
                    many.len()
                )));
            }
        };

        let id = record
            .ids()
            .iter()
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}:{}:{}:{}", chrom, position, ref_allele, alt_allele));

        let calls = record_alleles(
            &record,
            &header,
            &slots,
            genotypes.samples.len(),
            options.require_phased,
            &id,
        )?;
        genotypes
            .variants
            .push(Variant::new(id, chrom, position).with_alleles(ref_allele, alt_allele));
        genotypes.alleles.push(calls);
    }

    if discarded > 0 {
        warn!(
            "Discarded {} multi-allelic site(s) from {}",
            discarded,
            vcf_path.display()
        );
    }
    info!(
        "Read {} variants x {} samples from {}",
        genotypes.variants.len(),
        genotypes.samples.len(),
        vcf_path.display()
    );
    Ok(genotypes)
}

/// Load a phased reference panel; `sample_info` maps samples to populations.
///
/// Samples of the VCF absent from `sample_info` are ignored. When
/// `options.samples` is set it further restricts the panel.
pub fn load_reference_panel(
    vcf_path: &Path,
    sample_info: &[(String, String)],
    options: &VcfReadOptions,
    self_pairing: SelfPairing,
) -> Result<ReferencePanel> {
    let population_of: HashMap<&str, &str> = sample_info
        .iter()
        .map(|(sample, pop)| (sample.as_str(), pop.as_str()))
        .collect();
    let wanted: Vec<String> = match &options.samples {
        Some(subset) => subset
            .iter()
            .filter(|s| population_of.contains_key(s.as_str()))
            .cloned()
            .collect(),
        None => sample_info.iter().map(|(sample, _)| sample.clone()).collect(),
    };
    let read_options = VcfReadOptions {
        samples: Some(wanted),
        require_phased: true,
        ..options.clone()
    };
    let genotypes = read_vcf(vcf_path, &read_options)?;
    if genotypes.variants.is_empty() {
        return Err(SimError::vcf(format!(
            "No variants read from {}",
            vcf_path.display()
        )));
    }

    let mut haplotypes = Vec::with_capacity(2 * genotypes.samples.len());
    for (j, sample) in genotypes.samples.iter().enumerate() {
        let population = population_of
            .get(sample.as_str())
            .ok_or_else(|| SimError::invalid_data(format!("Sample {} has no population", sample)))?;
        for copy in 0..2u8 {
            haplotypes.push(ReferenceHaplotype {
                population: population.to_string(),
                sample: sample.clone(),
                copy,
                alleles: genotypes
                    .alleles
                    .iter()
                    .map(|calls| calls[j][copy as usize])
                    .collect(),
            });
        }
    }

    let variants = VariantSet::new(genotypes.variants)?;
    let panel = ReferencePanel::new(variants, haplotypes, self_pairing)?;
    info!(
        "Reference panel: {} haplotypes from populations {:?}",
        panel.len(),
        panel.populations()
    );
    Ok(panel)
}

/// Read a cohort's genotypes; phasing is not required.
pub fn read_genotype_matrix(vcf_path: &Path, options: &VcfReadOptions) -> Result<GenotypeMatrix> {
    let genotypes = read_vcf(vcf_path, options)?;
    let shape = (genotypes.variants.len(), genotypes.samples.len(), 2);
    let alleles = Array3::from_shape_fn(shape, |(v, i, c)| genotypes.alleles[v][i][c]);
    GenotypeMatrix::new(VariantSet::new(genotypes.variants)?, genotypes.samples, alleles)
}
