//! # Haplotype Assembler
//!
//! Materializes a simulated individual from its ancestry breakpoints. Every
//! segment of every copy draws a fresh donor haplotype from the segment's
//! population and copies the donor's alleles at the variants inside the
//! segment.
//!
//! A variant at position `p` belongs to the segment with `start <= p < end`;
//! the last segment of a chromosome is closed, so a variant sitting exactly on
//! the chromosome's final end is still assigned.
//!
//! Alleles are written into a caller-supplied `(variant, copy)` view, normally
//! the individual's column of the cohort's genotype array.

use ndarray::{Array2, ArrayViewMut1, ArrayViewMut2};
use rand::Rng;

use crate::breakpoints::{segments, Breakpoint, HaplotypeBreakpoints};
use crate::error::{Result, SimError};
use crate::panel::{ReferencePanel, SelfPairing};
use crate::variants::Chromosome;

/// A segment together with the reference haplotype it was copied from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DonorSegment {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub population: String,
    /// Index into the reference panel
    pub donor: usize,
}

/// Ancestry and donors of one assembled haplotype copy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaplotypeCopy {
    pub breakpoints: Vec<Breakpoint>,
    pub donors: Vec<DonorSegment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatedIndividual {
    pub id: String,
    pub copies: [HaplotypeCopy; 2],
}

/// Assemble one individual into a fresh `(variant, copy)` allele array.
pub fn assemble<R: Rng + ?Sized>(
    individual_id: impl Into<String>,
    breakpoints: HaplotypeBreakpoints,
    panel: &ReferencePanel,
    rng: &mut R,
) -> Result<(SimulatedIndividual, Array2<u8>)> {
    let mut alleles = Array2::zeros((panel.variants().len(), 2));
    let individual = assemble_into(individual_id, breakpoints, panel, rng, alleles.view_mut())?;
    Ok((individual, alleles))
}

/// Assemble one individual from per-copy breakpoints, writing its alleles
/// into `alleles` (shape `(n_variants, 2)`).
///
/// Breakpoints must list the panel's chromosomes in panel order. Fails with
/// `UnknownPopulation` when a segment's label is not in the panel.
pub fn assemble_into<R: Rng + ?Sized>(
    individual_id: impl Into<String>,
    breakpoints: HaplotypeBreakpoints,
    panel: &ReferencePanel,
    rng: &mut R,
    mut alleles: ArrayViewMut2<'_, u8>,
) -> Result<SimulatedIndividual> {
    let expected = (panel.variants().len(), 2);
    if alleles.dim() != expected {
        return Err(SimError::invalid_data(format!(
            "Allele buffer has shape {:?}, expected {:?}",
            alleles.dim(),
            expected
        )));
    }
    let [bp0, bp1] = breakpoints;
    let copy0 = assemble_copy(bp0, panel, None, rng, alleles.column_mut(0))?;
    let avoid = match panel.self_pairing() {
        SelfPairing::Allow => None,
        SelfPairing::ForbidOverlapping => Some(copy0.donors.as_slice()),
    };
    let copy1 = assemble_copy(bp1, panel, avoid, rng, alleles.column_mut(1))?;
    Ok(SimulatedIndividual {
        id: individual_id.into(),
        copies: [copy0, copy1],
    })
}

fn assemble_copy<R: Rng + ?Sized>(
    breakpoints: Vec<Breakpoint>,
    panel: &ReferencePanel,
    avoid: Option<&[DonorSegment]>,
    rng: &mut R,
    mut alleles: ArrayViewMut1<'_, u8>,
) -> Result<HaplotypeCopy> {
    let variants = panel.variants();
    let mut donors = Vec::with_capacity(breakpoints.len());
    let mut exclude = Vec::new();

    let mut chromosomes = variants.chromosomes().iter();
    let mut current: Option<(&Chromosome, usize)> = None;
    let all_segments: Vec<_> = segments(&breakpoints).collect();

    for (seg_idx, seg) in all_segments.iter().enumerate() {
        // Advance to the segment's chromosome; chromosomes may not be skipped
        let (chrom, cursor) = match current {
            Some((chrom, cursor)) if chrom.name() == seg.chrom => (chrom, cursor),
            previous => {
                if let Some((chrom, cursor)) = previous {
                    finish_chromosome(chrom, cursor)?;
                }
                let next = chromosomes
                    .next()
                    .ok_or_else(|| SimError::unknown_chromosome(seg.chrom))?;
                if next.name() != seg.chrom {
                    return Err(SimError::invalid_data(format!(
                        "Breakpoints reach chromosome {} while {} is expected next",
                        seg.chrom,
                        next.name()
                    )));
                }
                (next, 0)
            }
        };
        if seg.end <= seg.start {
            return Err(SimError::invalid_data(format!(
                "Empty segment [{}, {}) on {}",
                seg.start, seg.end, seg.chrom
            )));
        }

        let donor = match avoid {
            Some(other) => {
                exclude.clear();
                exclude.extend(
                    other
                        .iter()
                        .filter(|d| d.chrom == seg.chrom && d.start < seg.end && seg.start < d.end)
                        .map(|d| d.donor),
                );
                panel.draw_index_excluding(seg.population, &exclude, rng)?
            }
            None => panel.draw_index(seg.population, rng)?,
        };
        let source = panel
            .haplotype(donor)
            .ok_or_else(|| SimError::invalid_data(format!("Donor index {} out of range", donor)))?;

        let last_on_chrom = all_segments
            .get(seg_idx + 1)
            .map_or(true, |next| next.chrom != seg.chrom);
        let positions = chrom.positions();
        let offset = chrom.variant_range().start;
        let mut cursor = cursor;
        while cursor < positions.len() {
            let pos = positions[cursor];
            let inside = pos < seg.end || (last_on_chrom && pos == seg.end);
            if !inside {
                break;
            }
            alleles[offset + cursor] = source.alleles[offset + cursor];
            cursor += 1;
        }

        donors.push(DonorSegment {
            chrom: seg.chrom.to_string(),
            start: seg.start,
            end: seg.end,
            population: seg.population.to_string(),
            donor,
        });
        current = Some((chrom, cursor));
    }

    match current {
        Some((chrom, cursor)) => finish_chromosome(chrom, cursor)?,
        None if variants.chromosomes().is_empty() => {}
        None => {
            return Err(SimError::invalid_data(
                "No breakpoints supplied for this haplotype copy",
            ))
        }
    }
    if let Some(missing) = chromosomes.next() {
        return Err(SimError::invalid_data(format!(
            "No breakpoints supplied for chromosome {}",
            missing.name()
        )));
    }

    Ok(HaplotypeCopy { breakpoints, donors })
}

/// Every variant of `chrom` must have been covered by a segment
fn finish_chromosome(chrom: &Chromosome, cursor: usize) -> Result<()> {
    match chrom.positions().get(cursor) {
        None => Ok(()),
        Some(pos) => Err(SimError::invalid_data(format!(
            "Variant at {}:{} lies beyond the last segment",
            chrom.name(),
            pos
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::simulate_breakpoints;
    use crate::genetic_map::UniformRateMap;
    use crate::model::{AdmixtureModel, Generation};
    use crate::panel::ReferenceHaplotype;
    use crate::rng::substream;
    use crate::variants::{Variant, VariantSet};

    fn bp(chrom: &str, end: u64, pop: &str, copy: u8) -> Breakpoint {
        Breakpoint {
            chrom: chrom.to_string(),
            end,
            population: pop.to_string(),
            copy,
        }
    }

    /// Variants on chr1 at 10, 20, 30, 40; AFR carries all-REF, EUR all-ALT
    fn panel(self_pairing: SelfPairing, afr_haplotypes: usize) -> ReferencePanel {
        let variants = VariantSet::new(
            [10, 20, 30, 40]
                .iter()
                .enumerate()
                .map(|(i, &p)| Variant::new(format!("v{}", i), "1", p))
                .collect(),
        )
        .unwrap();
        let mut haplotypes: Vec<ReferenceHaplotype> = (0..afr_haplotypes)
            .map(|i| ReferenceHaplotype {
                population: "AFR".to_string(),
                sample: format!("afr{}", i),
                copy: 0,
                alleles: vec![0; 4],
            })
            .collect();
        haplotypes.push(ReferenceHaplotype {
            population: "EUR".to_string(),
            sample: "eur".to_string(),
            copy: 0,
            alleles: vec![1; 4],
        });
        ReferencePanel::new(variants, haplotypes, self_pairing).unwrap()
    }

    #[test]
    fn test_boundary_variant_goes_right() {
        let panel = panel(SelfPairing::Allow, 1);
        // [0, 20) AFR, [20, 41) EUR: the variant at 20 is EUR
        let copy = vec![bp("1", 20, "AFR", 0), bp("1", 41, "EUR", 0)];
        let mut rng = substream(0, 0);
        let (_, alleles) = assemble("s0", [copy.clone(), copy], &panel, &mut rng).unwrap();
        assert_eq!(alleles.column(0).to_vec(), vec![0, 1, 1, 1]);
        assert_eq!(alleles.row(0).sum(), 0);
        assert_eq!(alleles.row(3).sum(), 2);
    }

    #[test]
    fn test_last_segment_is_closed() {
        let panel = panel(SelfPairing::Allow, 1);
        // Final segment ends exactly on the last variant
        let copy = vec![bp("1", 30, "AFR", 0), bp("1", 40, "EUR", 0)];
        let mut rng = substream(0, 0);
        let (_, alleles) = assemble("s0", [copy.clone(), copy], &panel, &mut rng).unwrap();
        assert_eq!(alleles.column(1).to_vec(), vec![0, 0, 1, 1]);

        let short = vec![bp("1", 35, "AFR", 0)];
        assert!(assemble("s1", [short.clone(), short], &panel, &mut substream(0, 0)).is_err());
    }

    #[test]
    fn test_unknown_population_and_chromosome() {
        let panel = panel(SelfPairing::Allow, 1);
        let eas = vec![bp("1", 41, "EAS", 0)];
        let err = assemble("s0", [eas.clone(), eas], &panel, &mut substream(0, 0)).unwrap_err();
        assert!(matches!(err, SimError::UnknownPopulation { .. }));

        let wrong = vec![bp("2", 41, "AFR", 0)];
        assert!(assemble("s0", [wrong.clone(), wrong], &panel, &mut substream(0, 0)).is_err());
    }

    #[test]
    fn test_alleles_match_donors() {
        let panel = panel(SelfPairing::Allow, 3);
        let model = AdmixtureModel::new(vec![
            Generation::Proportions {
                admixed: 0.0,
                populations: vec![("AFR".to_string(), 0.5), ("EUR".to_string(), 0.5)],
            },
            Generation::Proportions {
                admixed: 1.0,
                populations: vec![],
            },
        ])
        .unwrap();
        // Steep enough for crossovers inside 41 bp
        let map = UniformRateMap::new(5e7).unwrap();
        let chrom = panel.variants().chromosomes()[0].clone();
        for seed in 0..40 {
            let mut rng = substream(seed, 0);
            let bps = simulate_breakpoints(&chrom, &model, &map, &mut rng).unwrap();
            let (ind, alleles) = assemble(format!("s{}", seed), bps, &panel, &mut rng).unwrap();
            for (c, copy) in ind.copies.iter().enumerate() {
                for donor in &copy.donors {
                    let source = panel.haplotype(donor.donor).unwrap();
                    assert_eq!(source.population, donor.population);
                    for (i, &pos) in chrom.positions().iter().enumerate() {
                        if pos >= donor.start && pos < donor.end {
                            assert_eq!(alleles[[i, c]], source.alleles[i]);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_assembles_into_cohort_column() {
        let panel = panel(SelfPairing::Allow, 1);
        let copy = vec![bp("1", 25, "EUR", 0), bp("1", 41, "AFR", 0)];
        let mut cohort = ndarray::Array3::<u8>::zeros((4, 3, 2));
        let column = cohort.index_axis_mut(ndarray::Axis(1), 1);
        let mut rng = substream(0, 0);
        assemble_into("s1", [copy.clone(), copy.clone()], &panel, &mut rng, column).unwrap();
        let filled = cohort.index_axis(ndarray::Axis(1), 1);
        assert_eq!(filled.column(0).to_vec(), vec![1, 1, 0, 0]);
        // Neighbouring columns are untouched
        assert_eq!(cohort.index_axis(ndarray::Axis(1), 0).sum(), 0);
        assert_eq!(cohort.index_axis(ndarray::Axis(1), 2).sum(), 0);

        let mut wrong = ndarray::Array2::<u8>::zeros((3, 2));
        let err = assemble_into("s1", [copy.clone(), copy], &panel, &mut rng, wrong.view_mut());
        assert!(matches!(err, Err(SimError::InvalidData { .. })));
    }

    #[test]
    fn test_forbid_self_pairing() {
        let panel = panel(SelfPairing::ForbidOverlapping, 2);
        let copy = vec![bp("1", 41, "AFR", 0)];
        for seed in 0..50 {
            let mut rng = substream(seed, 0);
            let (ind, _) = assemble("s", [copy.clone(), copy.clone()], &panel, &mut rng).unwrap();
            assert_ne!(ind.copies[0].donors[0].donor, ind.copies[1].donors[0].donor);
        }
    }
}
