//! AFR/EUR two-way admixture over a 100 cM chromosome, seed 42.
//!
//! The karyogram is compared byte for byte against the committed
//! `tests/golden/afr_eur_seed42.bp`. A missing file is a failure; run with
//! `ADMIXSIM_BLESS=1` to record it again after an intended change to the
//! random streams.

mod common;

use std::path::PathBuf;

use admixsim::cohort::{fit_chromosomes_to_map, simulate_cohort, CohortConfig};
use admixsim::genetic_map::CoverageWarnings;
use admixsim::io::{output_writer, vcf_processing};
use admixsim::panel::SelfPairing;

use common::*;

const N_INDIVIDUALS: usize = 4;
const SEED: u64 = 42;
/// Segment lines in the recorded karyogram
const RECORDED_SEGMENTS: usize = 9;

fn golden_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("golden")
        .join("afr_eur_seed42.bp")
}

#[test]
fn test_afr_eur_seed42_karyogram() {
    let vcf = write_reference_vcf("golden");
    let mut panel = vcf_processing::load_reference_panel(
        &vcf,
        &sample_info(),
        &vcf_processing::VcfReadOptions::default(),
        SelfPairing::Allow,
    )
    .unwrap();
    std::fs::remove_file(&vcf).ok();
    let maps = genetic_maps();
    let warnings = CoverageWarnings::new();
    fit_chromosomes_to_map(panel.variants_mut(), &maps, &warnings).unwrap();
    assert_eq!(warnings.count(), 0);

    let cohort = simulate_cohort(
        &two_way_model(),
        &panel,
        &maps,
        &CohortConfig::new(N_INDIVIDUALS, SEED),
        || {},
    )
    .unwrap();
    assert_eq!(cohort.clamped_lookups, 0);
    for (index, individual) in cohort.individuals.iter().enumerate() {
        assert_alleles_match_donors(&panel, &cohort.genotypes, index, individual);
    }

    let mut karyogram: Vec<u8> = Vec::new();
    output_writer::write_breakpoints_to(&mut karyogram, &cohort.individuals, &maps).unwrap();
    let karyogram = String::from_utf8(karyogram).unwrap();
    let headers = karyogram.lines().filter(|l| l.starts_with("Sample_")).count();
    assert_eq!(headers, 2 * N_INDIVIDUALS);

    let path = golden_path();
    if std::env::var("ADMIXSIM_BLESS").map_or(false, |v| v == "1") {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, &karyogram).unwrap();
        eprintln!("Recorded {}", path.display());
        return;
    }
    let expected = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "cannot read {}: {} (run with ADMIXSIM_BLESS=1 to record it)",
            path.display(),
            e
        )
    });
    let segments = karyogram.lines().count() - headers;
    assert_eq!(segments, RECORDED_SEGMENTS);
    assert_eq!(karyogram, expected, "karyogram differs from {}", path.display());
}
