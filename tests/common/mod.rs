#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use admixsim::genetic_map::{GeneticMap, GeneticMaps};
use admixsim::model::{AdmixtureModel, Generation};
use admixsim::panel::ReferencePanel;
use admixsim::{GenotypeMatrix, SimulatedIndividual};

pub const N_VARIANTS: usize = 50;
pub const SAMPLES: [(&str, &str); 4] = [
    ("AFR1", "AFR"),
    ("AFR2", "AFR"),
    ("EUR1", "EUR"),
    ("EUR2", "EUR"),
];

/// Allele of reference haplotype `h` (sample `h / 2`, copy `h % 2`) at variant `v`
pub fn reference_allele(v: usize, h: usize) -> u8 {
    u8::from((v * 7 + h * 3) % 5 < 2)
}

pub fn variant_position(v: usize) -> u64 {
    1_000_000 + 2_000_000 * v as u64
}

/// Phased reference VCF: 50 variants over 100 Mb of chromosome 1
pub fn write_reference_vcf(name: &str) -> PathBuf {
    let file_name = format!("admixsim_it_{}_{}.vcf", name, std::process::id());
    let path = std::env::temp_dir().join(file_name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "##fileformat=VCFv4.2").unwrap();
    writeln!(f, "##contig=<ID=1,length=100000001>").unwrap();
    writeln!(f, "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">").unwrap();
    write!(f, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT").unwrap();
    for (sample, _) in SAMPLES {
        write!(f, "\t{}", sample).unwrap();
    }
    writeln!(f).unwrap();
    for v in 0..N_VARIANTS {
        write!(f, "1\t{}\trs{}\tA\tG\t.\tPASS\t.\tGT", variant_position(v), v).unwrap();
        for s in 0..SAMPLES.len() {
            let (a, b) = (reference_allele(v, 2 * s), reference_allele(v, 2 * s + 1));
            write!(f, "\t{}|{}", a, b).unwrap();
        }
        writeln!(f).unwrap();
    }
    path
}

pub fn sample_info() -> Vec<(String, String)> {
    SAMPLES
        .iter()
        .map(|(s, p)| (s.to_string(), p.to_string()))
        .collect()
}

/// 1 cM/Mb over 100 Mb
pub fn genetic_maps() -> GeneticMaps {
    let mut maps = GeneticMaps::new();
    maps.insert(GeneticMap::new("1", vec![(0, 0.0), (100_000_000, 100.0)]).unwrap());
    maps
}

/// 50/50 AFR/EUR founders followed by one admixed generation
pub fn two_way_model() -> AdmixtureModel {
    AdmixtureModel::new(vec![
        Generation::Proportions {
            admixed: 0.0,
            populations: vec![("AFR".to_string(), 0.5), ("EUR".to_string(), 0.5)],
        },
        Generation::Proportions {
            admixed: 1.0,
            populations: vec![],
        },
    ])
    .unwrap()
}

/// Every variant of column `index` carries the allele of the donor of the
/// segment covering it, and every donor belongs to the segment's population.
pub fn assert_alleles_match_donors(
    panel: &ReferencePanel,
    genotypes: &GenotypeMatrix,
    index: usize,
    individual: &SimulatedIndividual,
) {
    assert_eq!(genotypes.individual_ids()[index], individual.id);
    let variants = panel.variants();
    for (c, copy) in individual.copies.iter().enumerate() {
        for (d, donor) in copy.donors.iter().enumerate() {
            let source = panel.haplotype(donor.donor).unwrap();
            assert_eq!(source.population, donor.population);
            let last_on_chrom = copy
                .donors
                .get(d + 1)
                .map_or(true, |next| next.chrom != donor.chrom);
            for (v, variant) in variants.iter().enumerate() {
                let inside = variant.chrom == donor.chrom
                    && variant.position >= donor.start
                    && (variant.position < donor.end
                        || (last_on_chrom && variant.position == donor.end));
                if inside {
                    assert_eq!(
                        genotypes.allele(v, index, c),
                        source.alleles[v],
                        "{} variant {} segment [{}, {})",
                        individual.id,
                        variant.id,
                        donor.start,
                        donor.end
                    );
                }
            }
        }
    }
}
