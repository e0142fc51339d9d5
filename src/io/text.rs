//! Plain-text input formats.
//!
//! All formats are whitespace separated; blank lines and lines starting with
//! `#` are skipped.
//!
//! - Model file: a header `<n_samples> Admixed <POP>...` followed by one row per
//!   generation, `<generation> <admixed share> <share per POP>...`. The first
//!   row is the founder generation.
//! - Pedigree file: founder lines `<id> <POP>` and edge lines
//!   `<child> <parent1> <parent2>`; `Admixed` as a parent draws an individual
//!   of the previous generation.
//! - Sample info: `<sample> <POP>`.
//! - Effects: `<variant_id> <beta> [<dominance> [<partner> <coefficient>]]`,
//!   with `.` for an absent term.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Result, SimError};
use crate::model::{Generation, PedigreeEdge, ADMIXED_LABEL};
use crate::phenotype::{CausalEffect, EffectSpec, Interaction};

/// Parsed model file
#[derive(Clone, Debug, PartialEq)]
pub struct ModelFile {
    /// Number of individuals to simulate, from the header
    pub n_samples: usize,
    pub generations: Vec<Generation>,
}

/// Non-empty, non-comment lines with their 1-based line numbers
fn data_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(Ok((idx + 1, trimmed.to_string())))
                }
            }
            Err(e) => Some(Err(SimError::from(e))),
        })
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

fn parse_f64(line: usize, field: &str, what: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|_| SimError::parse(line, format!("Invalid {} '{}'", what, field)))
}

pub fn read_model_file(path: &Path) -> Result<ModelFile> {
    let model = parse_model(open(path)?)?;
    debug!(
        "Model {}: {} generation(s), {} samples",
        path.display(),
        model.generations.len(),
        model.n_samples
    );
    Ok(model)
}

pub fn parse_model<R: BufRead>(reader: R) -> Result<ModelFile> {
    let mut lines = data_lines(reader);
    let (header_line, header) = lines
        .next()
        .ok_or_else(|| SimError::parse(0, "Model file is empty"))??;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 3 || fields[1] != ADMIXED_LABEL {
        return Err(SimError::parse(
            header_line,
            format!("Expected header '<n_samples> {} <POP>...'", ADMIXED_LABEL),
        ));
    }
    let n_samples = fields[0].parse::<usize>().map_err(|_| {
        SimError::parse(header_line, format!("Invalid sample count '{}'", fields[0]))
    })?;
    let populations: Vec<String> = fields[2..].iter().map(|s| s.to_string()).collect();

    let mut generations = Vec::new();
    let mut previous_gen: Option<u64> = None;
    for entry in lines {
        let (line_num, line) = entry?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != populations.len() + 2 {
            return Err(SimError::parse(
                line_num,
                format!("Expected {} columns, got {}", populations.len() + 2, fields.len()),
            ));
        }
        let gen = fields[0]
            .parse::<u64>()
            .map_err(|_| SimError::parse(line_num, format!("Invalid generation '{}'", fields[0])))?;
        if let Some(prev) = previous_gen {
            if gen != prev + 1 {
                return Err(SimError::parse(
                    line_num,
                    format!("Generation {} follows {}; generations must be consecutive", gen, prev),
                ));
            }
        }
        previous_gen = Some(gen);

        let admixed = parse_f64(line_num, fields[1], "admixed share")?;
        let shares = populations
            .iter()
            .zip(&fields[2..])
            .map(|(pop, field)| Ok((pop.clone(), parse_f64(line_num, field, "population share")?)))
            .collect::<Result<Vec<_>>>()?;
        generations.push(Generation::Proportions {
            admixed,
            populations: shares,
        });
    }

    if generations.is_empty() {
        return Err(SimError::parse(header_line, "Model file has no generation rows"));
    }
    Ok(ModelFile {
        n_samples,
        generations,
    })
}

pub fn read_pedigree_file(path: &Path) -> Result<Generation> {
    parse_pedigree(open(path)?)
}

pub fn parse_pedigree<R: BufRead>(reader: R) -> Result<Generation> {
    let mut founders = Vec::new();
    let mut edges = Vec::new();
    for entry in data_lines(reader) {
        let (line_num, line) = entry?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [id, pop] => founders.push((id.to_string(), pop.to_string())),
            [child, p1, p2] => edges.push(PedigreeEdge::new(*child, *p1, *p2)),
            _ => {
                return Err(SimError::parse(
                    line_num,
                    format!(
                        "Expected '<id> <POP>' or '<child> <parent1> <parent2>', got {} columns",
                        fields.len()
                    ),
                ))
            }
        }
    }
    debug!("Pedigree: {} founders, {} edges", founders.len(), edges.len());
    Ok(Generation::Pedigree { founders, edges })
}

pub fn read_sample_info(path: &Path) -> Result<Vec<(String, String)>> {
    parse_sample_info(open(path)?)
}

/// `(sample, population)` pairs in file order
pub fn parse_sample_info<R: BufRead>(reader: R) -> Result<Vec<(String, String)>> {
    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for entry in data_lines(reader) {
        let (line_num, line) = entry?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(SimError::parse(line_num, "Expected '<sample> <population>'"));
        }
        if !seen.insert(fields[0].to_string()) {
            warn!("Sample {} listed more than once in sample info; keeping the first", fields[0]);
            continue;
        }
        samples.push((fields[0].to_string(), fields[1].to_string()));
    }
    Ok(samples)
}

pub fn read_effects_file(path: &Path) -> Result<EffectSpec> {
    let spec = parse_effects(open(path)?)?;
    debug!("{} causal variant(s) from {}", spec.len(), path.display());
    Ok(spec)
}

pub fn parse_effects<R: BufRead>(reader: R) -> Result<EffectSpec> {
    fn optional<'a>(field: Option<&&'a str>) -> Option<&'a str> {
        field.copied().filter(|f| *f != ".")
    }

    let mut effects = Vec::new();
    for entry in data_lines(reader) {
        let (line_num, line) = entry?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields.len() == 4 || fields.len() > 5 {
            return Err(SimError::parse(
                line_num,
                "Expected '<variant> <beta> [<dominance> [<partner> <coefficient>]]'",
            ));
        }
        let beta = parse_f64(line_num, fields[1], "effect size")?;
        let dominance = optional(fields.get(2))
            .map(|f| parse_f64(line_num, f, "dominance deviation"))
            .transpose()?;
        let interaction = match (optional(fields.get(3)), optional(fields.get(4))) {
            (Some(partner), Some(coef)) => Some(Interaction {
                partner: partner.to_string(),
                coefficient: parse_f64(line_num, coef, "interaction coefficient")?,
            }),
            (None, None) => None,
            _ => {
                return Err(SimError::parse(
                    line_num,
                    "Interaction needs both a partner and a coefficient",
                ))
            }
        };
        effects.push(CausalEffect {
            variant_id: fields[0].to_string(),
            beta,
            interaction,
            dominance,
        });
    }
    EffectSpec::new(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_model() {
        let text = "\
# two-way admixture
40 Admixed AFR EUR
1 0 0.5 0.5
2 1.0 0 0
";
        let model = parse_model(Cursor::new(text)).unwrap();
        assert_eq!(model.n_samples, 40);
        assert_eq!(model.generations.len(), 2);
        assert_eq!(
            model.generations[0],
            Generation::Proportions {
                admixed: 0.0,
                populations: vec![("AFR".to_string(), 0.5), ("EUR".to_string(), 0.5)],
            }
        );
    }

    #[test]
    fn test_parse_model_errors() {
        assert!(matches!(
            parse_model(Cursor::new("40 AFR EUR\n1 0 0.5 0.5\n")),
            Err(SimError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_model(Cursor::new("40 Admixed AFR EUR\n1 0 0.5\n")),
            Err(SimError::Parse { line: 2, .. })
        ));
        assert!(parse_model(Cursor::new("40 Admixed AFR\n1 0 1\n3 1 0\n")).is_err());
        assert!(parse_model(Cursor::new("40 Admixed AFR\n")).is_err());
        assert!(parse_model(Cursor::new("")).is_err());
    }

    #[test]
    fn test_parse_pedigree() {
        let text = "f1 AFR\nf2 EUR\nmid f1 f2\nkid mid Admixed\n";
        match parse_pedigree(Cursor::new(text)).unwrap() {
            Generation::Pedigree { founders, edges } => {
                assert_eq!(founders.len(), 2);
                assert_eq!(edges[1], PedigreeEdge::new("kid", "mid", ADMIXED_LABEL));
            }
            other => panic!("expected pedigree, got {:?}", other),
        }
        assert!(parse_pedigree(Cursor::new("a b c d\n")).is_err());
    }

    #[test]
    fn test_parse_sample_info() {
        let text = "HG00096\tEUR\nNA18486\tAFR\nHG00096\tEUR\n";
        let samples = parse_sample_info(Cursor::new(text)).unwrap();
        assert_eq!(
            samples,
            vec![
                ("HG00096".to_string(), "EUR".to_string()),
                ("NA18486".to_string(), "AFR".to_string())
            ]
        );
        assert!(parse_sample_info(Cursor::new("lonely\n")).is_err());
    }

    #[test]
    fn test_parse_effects() {
        let text = "\
#variant beta dominance partner coefficient
rs1 0.5
rs2 -0.25 0.1
rs3 1 . rs1 0.3
";
        let spec = parse_effects(Cursor::new(text)).unwrap();
        let effects = spec.effects();
        assert_eq!(effects.len(), 3);
        assert_eq!(effects[0], CausalEffect::additive("rs1", 0.5));
        assert_eq!(effects[1].dominance, Some(0.1));
        assert_eq!(effects[2].dominance, None);
        assert_eq!(
            effects[2].interaction,
            Some(Interaction {
                partner: "rs1".to_string(),
                coefficient: 0.3
            })
        );

        assert!(parse_effects(Cursor::new("rs1 abc\n")).is_err());
        assert!(parse_effects(Cursor::new("rs1 1 . rs2\n")).is_err());
        assert!(parse_effects(Cursor::new("rs1 1 . rs2 .\n")).is_err());
    }
}
