//! Output files.
//!
//! - `<prefix>.bp`: per haplotype a line `<sample>_<copy>` (copy 1 or 2)
//!   followed by `POP CHROM END_BP END_CM` segment lines
//! - `<prefix>.vcf`: phased genotypes of the simulated individuals
//! - `<prefix>.pheno`: `#IID` plus one column per phenotype replicate

use std::fs::File;
use std::io::{BufWriter, Write};

use log::info;

use crate::assemble::SimulatedIndividual;
use crate::error::{Result, SimError};
use crate::genetic_map::MapProvider;
use crate::genotypes::GenotypeMatrix;
use crate::phenotype::PhenotypeTable;

fn create_output_file(prefix: &str, suffix: &str) -> Result<BufWriter<File>> {
    let filename = format!("{}.{}", prefix, suffix);
    File::create(&filename).map(BufWriter::new).map_err(|e| {
        SimError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create output file {}: {}", filename, e),
        ))
    })
}

/// Karyogram of every individual
pub fn write_breakpoints_to<W: Write, M: MapProvider + ?Sized>(
    writer: &mut W,
    individuals: &[SimulatedIndividual],
    map: &M,
) -> Result<()> {
    for ind in individuals {
        for (copy_idx, copy) in ind.copies.iter().enumerate() {
            writeln!(writer, "{}_{}", ind.id, copy_idx + 1)?;
            for bp in &copy.breakpoints {
                let cm = map.interpolate(&bp.chrom, bp.end)?.value;
                writeln!(writer, "{}\t{}\t{}\t{:.4}", bp.population, bp.chrom, bp.end, cm)?;
            }
        }
    }
    Ok(())
}

pub fn write_breakpoints<M: MapProvider + ?Sized>(
    output_prefix: &str,
    individuals: &[SimulatedIndividual],
    map: &M,
) -> Result<()> {
    let mut writer = create_output_file(output_prefix, "bp")?;
    info!("Writing breakpoints to {}.bp", output_prefix);
    write_breakpoints_to(&mut writer, individuals, map)?;
    writer.flush()?;
    Ok(())
}

/// Phased VCF of every individual in `genotypes`
pub fn write_vcf_to<W: Write>(writer: &mut W, genotypes: &GenotypeMatrix) -> Result<()> {
    let variants = genotypes.variants();
    writeln!(writer, "##fileformat=VCFv4.2")?;
    writeln!(writer, "##source=admixsim {}", env!("CARGO_PKG_VERSION"))?;
    for chrom in variants.chromosomes() {
        writeln!(writer, "##contig=<ID={},length={}>", chrom.name(), chrom.length())?;
    }
    writeln!(
        writer,
        "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
    )?;
    write!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for id in genotypes.individual_ids() {
        write!(writer, "\t{}", id)?;
    }
    writeln!(writer)?;

    for (v, variant) in variants.iter().enumerate() {
        write!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t.\tPASS\t.\tGT",
            variant.chrom, variant.position, variant.id, variant.ref_allele, variant.alt_allele
        )?;
        for i in 0..genotypes.n_individuals() {
            write!(
                writer,
                "\t{}|{}",
                genotypes.allele(v, i, 0),
                genotypes.allele(v, i, 1)
            )?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn write_vcf(output_prefix: &str, genotypes: &GenotypeMatrix) -> Result<()> {
    let mut writer = create_output_file(output_prefix, "vcf")?;
    info!(
        "Writing {} variants x {} individuals to {}.vcf",
        genotypes.n_variants(),
        genotypes.n_individuals(),
        output_prefix
    );
    write_vcf_to(&mut writer, genotypes)?;
    writer.flush()?;
    Ok(())
}

/// Phenotype table; binary traits are written as 1 (case) / 0 (control)
pub fn write_phenotypes_to<W: Write>(writer: &mut W, replicates: &[PhenotypeTable]) -> Result<()> {
    let Some(first) = replicates.first() else {
        return Ok(());
    };
    if replicates.iter().any(|t| t.ids() != first.ids()) {
        return Err(SimError::invalid_data("Phenotype replicates cover different individuals"));
    }

    write!(writer, "#IID")?;
    for r in 1..=replicates.len() {
        write!(writer, "\tpheno_{}", r)?;
    }
    writeln!(writer)?;

    for (i, id) in first.ids().iter().enumerate() {
        write!(writer, "{}", id)?;
        for table in replicates {
            let p = &table.phenotypes()[i];
            match p.case {
                Some(case) => write!(writer, "\t{}", u8::from(case))?,
                None => write!(writer, "\t{:.6}", p.observed)?,
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn write_phenotypes(output_prefix: &str, replicates: &[PhenotypeTable]) -> Result<()> {
    let mut writer = create_output_file(output_prefix, "pheno")?;
    info!(
        "Writing {} phenotype replicate(s) to {}.pheno",
        replicates.len(),
        output_prefix
    );
    write_phenotypes_to(&mut writer, replicates)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::HaplotypeCopy;
    use crate::breakpoints::Breakpoint;
    use crate::genetic_map::UniformRateMap;
    use crate::phenotype::Phenotype;
    use crate::variants::{Variant, VariantSet};
    use ndarray::Array3;

    fn individual() -> SimulatedIndividual {
        let copy = |pop: &str| HaplotypeCopy {
            breakpoints: vec![Breakpoint {
                chrom: "1".to_string(),
                end: 2_000_001,
                population: pop.to_string(),
                copy: 0,
            }],
            donors: vec![],
        };
        SimulatedIndividual {
            id: "Sample_1".to_string(),
            copies: [copy("AFR"), copy("EUR")],
        }
    }

    fn table(values: &[(f64, Option<bool>)]) -> PhenotypeTable {
        let ids = (1..=values.len()).map(|i| format!("Sample_{}", i)).collect();
        let phenotypes = values
            .iter()
            .map(|&(observed, case)| Phenotype {
                genetic: 0.0,
                environmental: observed,
                observed,
                case,
            })
            .collect();
        PhenotypeTable::new(ids, phenotypes).unwrap()
    }

    #[test]
    fn test_breakpoint_file_layout() {
        let mut out = Vec::new();
        write_breakpoints_to(&mut out, &[individual()], &UniformRateMap::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Sample_1_1\nAFR\t1\t2000001\t2.0000\nSample_1_2\nEUR\t1\t2000001\t2.0000\n"
        );
    }

    #[test]
    fn test_vcf_layout() {
        let variants = VariantSet::new(vec![
            Variant::new("rs1", "1", 100).with_alleles("A", "G"),
            Variant::new("rs2", "1", 2_000_000).with_alleles("C", "T"),
        ])
        .unwrap();
        // Copy 0 carries 0,1 and copy 1 carries 1,1
        let alleles = Array3::from_shape_fn((2, 1, 2), |(v, _, c)| u8::from(c == 1 || v == 1));
        let ids = vec!["Sample_1".to_string()];
        let genotypes = GenotypeMatrix::new(variants, ids, alleles).unwrap();
        let mut out = Vec::new();
        write_vcf_to(&mut out, &genotypes).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.contains(&"##contig=<ID=1,length=2000001>"));
        assert!(lines.iter().any(|l| l.starts_with("#CHROM") && l.ends_with("FORMAT\tSample_1")));
        assert_eq!(lines[lines.len() - 2], "1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1");
        assert_eq!(lines[lines.len() - 1], "1\t2000000\trs2\tC\tT\t.\tPASS\t.\tGT\t1|1");
    }

    #[test]
    fn test_phenotype_columns() {
        let quantitative = table(&[(0.25, None), (-1.5, None)]);
        let binary = table(&[(0.25, Some(true)), (-1.5, Some(false))]);
        let mut out = Vec::new();
        write_phenotypes_to(&mut out, &[quantitative, binary]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#IID\tpheno_1\tpheno_2\nSample_1\t0.250000\t1\nSample_2\t-1.500000\t0\n"
        );

        let mut empty: Vec<u8> = Vec::new();
        write_phenotypes_to(&mut empty, &[]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_phenotype_replicates_must_share_ids() {
        let two = table(&[(1.0, None), (2.0, None)]);
        let three = table(&[(1.0, None), (2.0, None), (3.0, None)]);
        let err = write_phenotypes_to(&mut Vec::<u8>::new(), &[two, three]).unwrap_err();
        assert!(matches!(err, SimError::InvalidData { .. }));
        assert!(PhenotypeTable::new(vec!["a".to_string()], vec![]).is_err());
    }
}
