//! # Centralized Error Handling
//!
//! Unified error type for the simulator using `thiserror`.
//!
//! Errors are fatal for the operation that raised them. `MapCoverage` is the one
//! recoverable kind: the simulator clamps to the nearest map anchor and counts
//! the event instead of returning it (see `genetic_map::CoverageWarnings`).

use thiserror::Error;

/// Main error type for admixsim operations
#[derive(Error, Debug)]
pub enum SimError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A population label is absent from the loaded reference panel
    #[error("Unknown population '{label}': not present in the reference panel")]
    UnknownPopulation { label: String },

    /// A variant identifier is absent from the genotype matrix
    #[error("Unknown variant '{id}': not present in the genotype matrix")]
    UnknownVariant { id: String },

    /// A chromosome is absent from the genetic map or the variant set
    #[error("Unknown chromosome '{chrom}'")]
    UnknownChromosome { chrom: String },

    /// Proportions do not sum to 1, pedigree has a cycle or a missing founder
    #[error("Invalid admixture model: {message}")]
    InvalidAdmixtureModel { message: String },

    /// Heritability outside (0, 1) or no genetic variance to scale against
    #[error("Degenerate heritability: {message}")]
    DegenerateHeritability { message: String },

    /// A lookup fell outside the genetic map's anchors
    #[error("Position {position} on {chrom} outside genetic map coverage [{first}, {last}]")]
    MapCoverage {
        chrom: String,
        position: u64,
        first: u64,
        last: u64,
    },

    /// Invalid caller-supplied parameter (prevalence, noise model, sample count)
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Invalid data (shape mismatch, unphased or multi-allelic genotypes)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Parse errors in the plain-text input formats
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// VCF reading errors
    #[error("VCF error: {message}")]
    Vcf { message: String },
}

/// Type alias for Results using SimError
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub fn unknown_population(label: impl Into<String>) -> Self {
        Self::UnknownPopulation {
            label: label.into(),
        }
    }

    pub fn unknown_variant(id: impl Into<String>) -> Self {
        Self::UnknownVariant { id: id.into() }
    }

    pub fn unknown_chromosome(chrom: impl Into<String>) -> Self {
        Self::UnknownChromosome {
            chrom: chrom.into(),
        }
    }

    /// Create an invalid admixture model error
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidAdmixtureModel {
            message: message.into(),
        }
    }

    pub fn degenerate_heritability(message: impl Into<String>) -> Self {
        Self::DegenerateHeritability {
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create a VCF error with a message
    pub fn vcf(message: impl Into<String>) -> Self {
        Self::Vcf {
            message: message.into(),
        }
    }
}
