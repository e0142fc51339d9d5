// main.rs

// --- External Crate Imports ---
use admixsim::{
    cohort::{fit_chromosomes_to_map, simulate_cohort, CohortConfig},
    genetic_map::{CoverageWarnings, GeneticMaps},
    io::{output_writer, text, vcf_processing},
    model::{AdmixtureModel, Generation},
    panel::SelfPairing,
    phenotype::{simulate_replicates, PhenotypeConfig},
    rng::substream,
};
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::{path::PathBuf, time::Instant};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting admixsim with args: {:?}", cli_args);

    // Configure Rayon thread pool
    let num_threads = cli_args.threads.unwrap_or_else(num_cpus::get);
    info!("Using {} threads for parallel operations.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    match &cli_args.command {
        cli::Command::Simgenotype(args) => run_simgenotype(args)?,
        cli::Command::Simphenotype(args) => run_simphenotype(args)?,
    }

    info!(
        "admixsim finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

fn run_simgenotype(args: &cli::SimGenotypeArgs) -> Result<()> {
    // --- 1. Admixture model ---
    info!("Reading admixture model from {}", args.model.display());
    let model_file = text::read_model_file(&args.model)?;
    let mut generations = model_file.generations;
    if let Some(pedigree_path) = &args.pedigree {
        info!("Appending pedigree generation from {}", pedigree_path.display());
        generations.push(text::read_pedigree_file(pedigree_path)?);
    }
    let model = AdmixtureModel::new(generations).context("Admixture model is invalid")?;
    let n_individuals = args.samples.unwrap_or(model_file.n_samples);
    info!(
        "Model validated: {} generation(s), populations {:?}",
        model.generations().len(),
        model.populations()
    );

    // --- 2. Reference panel ---
    let sample_info = text::read_sample_info(&args.sample_info)?;
    info!(
        "Loading reference panel from {} ({} samples listed in {})",
        args.ref_vcf.display(),
        sample_info.len(),
        args.sample_info.display()
    );
    let read_options = vcf_processing::VcfReadOptions {
        region: args.region.clone(),
        discard_multiallelic: args.discard_multiallelic,
        ..Default::default()
    };
    let self_pairing = if args.forbid_self_pairing {
        SelfPairing::ForbidOverlapping
    } else {
        SelfPairing::Allow
    };
    let mut panel = vcf_processing::load_reference_panel(
        &args.ref_vcf,
        &sample_info,
        &read_options,
        self_pairing,
    )?;
    model
        .check_populations(|label| panel.contains(label))
        .context("Model populations must all be present in the sample info")?;

    // --- 3. Genetic map ---
    info!("Reading genetic map(s) from {}", args.map.display());
    let maps = GeneticMaps::from_path(&args.map)?;
    debug!("Genetic map covers {} chromosome(s)", maps.len());
    let variant_warnings = CoverageWarnings::new();
    fit_chromosomes_to_map(panel.variants_mut(), &maps, &variant_warnings)?;

    // --- 4. Simulate ---
    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Simulating {} individuals with seed {}", n_individuals, seed);
    let pb_style = ProgressStyle::default_bar()
        .template(concat!(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ",
            "{pos}/{len} individuals ({percent}%) ETA: {eta}",
        ))
        .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?
        .progress_chars("=> ");
    let pb = ProgressBar::new(n_individuals as u64).with_style(pb_style);
    let config = CohortConfig::new(n_individuals, seed).with_pool_size(args.pool_size);
    let cohort = simulate_cohort(&model, &panel, &maps, &config, || pb.inc(1))?;
    pb.finish_with_message("Simulation complete.");

    let clamped = variant_warnings.count() + cohort.clamped_lookups;
    if clamped > 0 {
        warn!(
            "{} genetic map lookup(s) fell outside map coverage and were clamped to the \
             nearest anchor.",
            clamped
        );
    }

    // --- 5. Write Outputs ---
    ensure_output_dir(&args.output_prefix)?;
    info!(
        "Writing results to files with prefix '{}'...",
        args.output_prefix
    );
    output_writer::write_vcf(&args.output_prefix, &cohort.genotypes)?;
    output_writer::write_breakpoints(&args.output_prefix, &cohort.individuals, &maps)?;
    Ok(())
}

fn run_simphenotype(args: &cli::SimPhenotypeArgs) -> Result<()> {
    // --- 1. Genotypes and effects ---
    info!("Reading genotypes from {}", args.vcf.display());
    let matrix = vcf_processing::read_genotype_matrix(&args.vcf, &Default::default())?;
    info!(
        "Genotype matrix: {} variants x {} individuals",
        matrix.n_variants(),
        matrix.n_individuals()
    );
    let effects = text::read_effects_file(&args.effects)?;

    // --- 2. Simulate ---
    let config = PhenotypeConfig {
        heritability: args.heritability,
        noise: args.noise,
        prevalence: args.prevalence,
        standardize_genotypes: args.standardize_genotypes,
        standardize: args.standardize,
        replicates: args.replicates,
    };
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(
        "Simulating {} replicate(s) with h2 = {}, noise {}, seed {}",
        config.replicates, config.heritability, config.noise, seed
    );
    let mut rng = substream(seed, 0);
    let tables = simulate_replicates(&matrix, &effects, &config, &mut rng)?;
    for (r, table) in tables.iter().enumerate() {
        match config.prevalence {
            Some(_) => info!(
                "Replicate {}: {} cases, realized h2 {:.4}",
                r + 1,
                table.n_cases(),
                table.realized_heritability()
            ),
            None => info!("Replicate {}: realized h2 {:.4}", r + 1, table.realized_heritability()),
        }
    }

    // --- 3. Write Outputs ---
    ensure_output_dir(&args.output_prefix)?;
    output_writer::write_phenotypes(&args.output_prefix, &tables)?;
    Ok(())
}

fn ensure_output_dir(output_prefix: &str) -> Result<()> {
    let output_prefix_path = PathBuf::from(output_prefix);
    if let Some(parent) = output_prefix_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow!("Failed to create output directory {}: {}", parent.display(), e)
            })?;
            info!("Created output directory: {}", parent.display());
        }
    }
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use admixsim::io::vcf_processing::Region;
    use admixsim::phenotype::NoiseModel;
    use clap::{Args, Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(
        author,
        version,
        about = "Simulate admixed genomes and phenotypes from reference haplotypes.",
        long_about = None,
        propagate_version = true
    )]
    pub(crate) struct CliArgs {
        #[command(subcommand)]
        pub(crate) command: Command,

        #[arg(short = 't', long, global = true)]
        pub(crate) threads: Option<usize>,

        #[arg(long, default_value = "Info", global = true)]
        pub(crate) log_level: String,
    }

    #[derive(Subcommand, Debug)]
    pub(crate) enum Command {
        /// Simulate admixed individuals; writes <out>.vcf and <out>.bp
        Simgenotype(SimGenotypeArgs),
        /// Simulate phenotypes from a genotype VCF; writes <out>.pheno
        Simphenotype(SimPhenotypeArgs),
    }

    #[derive(Args, Debug)]
    pub(crate) struct SimGenotypeArgs {
        /// Phased reference panel
        #[arg(long = "ref-vcf", required = true)]
        pub(crate) ref_vcf: PathBuf,

        /// `<sample> <population>` per line
        #[arg(long = "sample-info", required = true)]
        pub(crate) sample_info: PathBuf,

        /// PLINK .map file, or a directory of them
        #[arg(long, required = true)]
        pub(crate) map: PathBuf,

        #[arg(long, required = true)]
        pub(crate) model: PathBuf,

        /// Pedigree appended as the final generation
        #[arg(long)]
        pub(crate) pedigree: Option<PathBuf>,

        #[arg(short, long = "out", required = true)]
        pub(crate) output_prefix: String,

        /// Number of individuals; defaults to the model file header
        #[arg(short = 'n', long)]
        pub(crate) samples: Option<usize>,

        #[arg(long)]
        pub(crate) seed: Option<u64>,

        /// Individuals in each ancestral generation
        #[arg(long = "pool-size", default_value_t = admixsim::breakpoints::DEFAULT_POOL_SIZE)]
        pub(crate) pool_size: usize,

        /// chrom or chrom:start-end
        #[arg(long)]
        pub(crate) region: Option<Region>,

        #[arg(long)]
        pub(crate) forbid_self_pairing: bool,

        #[arg(long)]
        pub(crate) discard_multiallelic: bool,
    }

    #[derive(Args, Debug)]
    pub(crate) struct SimPhenotypeArgs {
        #[arg(long, required = true)]
        pub(crate) vcf: PathBuf,

        /// `<variant> <beta> [<dominance> [<partner> <coefficient>]]` per line
        #[arg(long, required = true)]
        pub(crate) effects: PathBuf,

        #[arg(long = "heritability", required = true)]
        pub(crate) heritability: f64,

        /// Simulate a case/control trait with this case fraction
        #[arg(long)]
        pub(crate) prevalence: Option<f64>,

        /// normal or t:<dof>
        #[arg(long, default_value = "normal")]
        pub(crate) noise: NoiseModel,

        #[arg(long, default_value_t = 1)]
        pub(crate) replicates: usize,

        #[arg(long)]
        pub(crate) standardize_genotypes: bool,

        #[arg(long)]
        pub(crate) standardize: bool,

        #[arg(short, long = "out", required = true)]
        pub(crate) output_prefix: String,

        #[arg(long)]
        pub(crate) seed: Option<u64>,
    }
}
