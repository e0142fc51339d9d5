//! # Breakpoint Simulator
//!
//! Produces ancestry-labelled segments for both haplotype copies of each
//! individual of a cohort. The cohort's genealogy is sampled once from the
//! `AdmixtureModel`; every chromosome is then passed forward through it one
//! generation at a time by simulated meioses:
//!
//! 1. the transmitted haplotype starts on a uniformly chosen parental copy,
//! 2. the number of crossovers is `Poisson(L / 100)` for a chromosome of `L` cM,
//! 3. crossover genetic positions are uniform over the chromosome's map span and
//!    converted back to base pairs with the map's inverse interpolation,
//! 4. each crossover switches to the homologous copy.
//!
//! Adjacent segments with the same label are merged, so an unadmixed lineage
//! always yields one segment per chromosome copy.
//!
//! Only the tracks of the previous generation are kept. Member `m` of
//! generation `g` on chromosome `c` draws from its own substream, so results
//! do not depend on the number of threads.

use log::{trace, warn};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;

use crate::error::{Result, SimError};
use crate::genetic_map::{CoverageWarnings, MapProvider};
use crate::model::{AdmixtureModel, Lineage, LineageNode, Member, Parent, PopIdx};
use crate::rng::{fork_seed, substream, task_seed};
use crate::variants::Chromosome;

/// Individuals per ancestral generation unless configured otherwise
pub const DEFAULT_POOL_SIZE: usize = 10_000;

/// End of an ancestry segment.
///
/// A chromosome copy's breakpoints partition `[0, length)`: the first segment
/// starts at 0, each later one starts at the previous `end`, the last ends at
/// the chromosome length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub chrom: String,
    /// Exclusive end position (bp)
    pub end: u64,
    pub population: String,
    /// Haplotype copy (0 or 1)
    pub copy: u8,
}

/// Breakpoints of both haplotype copies, chromosomes in order
pub type HaplotypeBreakpoints = [Vec<Breakpoint>; 2];

/// A segment with its start made explicit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    pub chrom: &'a str,
    pub start: u64,
    pub end: u64,
    pub population: &'a str,
}

/// Walk breakpoints as `[start, end)` segments; starts reset on a new chromosome.
pub fn segments(breakpoints: &[Breakpoint]) -> impl Iterator<Item = Segment<'_>> {
    let mut prev: Option<(&str, u64)> = None;
    breakpoints.iter().map(move |bp| {
        let start = match prev {
            Some((chrom, end)) if chrom == bp.chrom => end,
            _ => 0,
        };
        prev = Some((bp.chrom.as_str(), bp.end));
        Segment {
            chrom: &bp.chrom,
            start,
            end: bp.end,
            population: &bp.population,
        }
    })
}

/// Check that `breakpoints` for one chromosome partition `[0, length)`.
pub fn check_partition(breakpoints: &[Breakpoint], chromosome: &Chromosome) -> Result<()> {
    let mut previous_end = 0u64;
    for bp in breakpoints {
        if bp.chrom != chromosome.name() {
            return Err(SimError::invalid_data(format!(
                "Breakpoint on {} found among breakpoints for {}",
                bp.chrom,
                chromosome.name()
            )));
        }
        if bp.end <= previous_end {
            return Err(SimError::invalid_data(format!(
                "Empty or overlapping segment ending at {} on {}",
                bp.end, bp.chrom
            )));
        }
        previous_end = bp.end;
    }
    if previous_end != chromosome.length() {
        return Err(SimError::invalid_data(format!(
            "Segments on {} end at {} but the chromosome length is {}",
            chromosome.name(),
            previous_end,
            chromosome.length()
        )));
    }
    Ok(())
}

/// `(exclusive end, label)` runs covering a chromosome
type Track = Vec<(u64, PopIdx)>;

/// Genetic positions of a chromosome's ends
#[derive(Clone, Copy, Debug)]
struct CmSpan {
    start: f64,
    end: f64,
}

/// Simulates breakpoints under one admixture model and genetic map.
pub struct BreakpointSimulator<'a, M: MapProvider + ?Sized> {
    model: &'a AdmixtureModel,
    map: &'a M,
    warnings: &'a CoverageWarnings,
    pool_size: usize,
}

impl<'a, M: MapProvider + ?Sized> BreakpointSimulator<'a, M> {
    pub fn new(model: &'a AdmixtureModel, map: &'a M, warnings: &'a CoverageWarnings) -> Self {
        Self {
            model,
            map,
            warnings,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Size of every ancestral generation for freshly sampled genealogies
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Breakpoints for one chromosome of a freshly sampled individual
    pub fn simulate_breakpoints<R: Rng + ?Sized>(
        &self,
        chromosome: &Chromosome,
        rng: &mut R,
    ) -> Result<HaplotypeBreakpoints> {
        let lineage = self.model.sample_lineage(self.pool_size, 1, rng);
        let seed = fork_seed(rng);
        self.simulate_chromosome(&lineage, chromosome, seed)?
            .pop()
            .ok_or_else(|| SimError::invalid_model("sampled genealogy has no individuals"))
    }

    /// Breakpoints for every chromosome of every individual of `lineage`.
    ///
    /// Chromosome `c` is simulated from `task_seed(seed, c)`.
    pub fn simulate_genome(
        &self,
        lineage: &Lineage,
        chromosomes: &[Chromosome],
        seed: u64,
    ) -> Result<Vec<HaplotypeBreakpoints>> {
        let mut genomes: Vec<HaplotypeBreakpoints> = (0..lineage.individuals())
            .map(|_| [Vec::new(), Vec::new()])
            .collect();
        for (c, chromosome) in chromosomes.iter().enumerate() {
            let chrom_seed = task_seed(seed, c as u64);
            let per_individual = self.simulate_chromosome(lineage, chromosome, chrom_seed)?;
            for (genome, [c0, c1]) in genomes.iter_mut().zip(per_individual) {
                genome[0].extend(c0);
                genome[1].extend(c1);
            }
        }
        Ok(genomes)
    }

    /// Pass one chromosome forward through a sampled genealogy.
    ///
    /// Returns the breakpoints of every member of the last generation.
    pub fn simulate_chromosome(
        &self,
        lineage: &Lineage,
        chromosome: &Chromosome,
        seed: u64,
    ) -> Result<Vec<HaplotypeBreakpoints>> {
        let len = chromosome.length();
        if len == 0 {
            return Err(SimError::invalid_data(format!(
                "Chromosome {} has zero length",
                chromosome.name()
            )));
        }

        // The chromosome ends are not breakpoints; clamping there is not counted
        let span = CmSpan {
            start: self.map.interpolate(chromosome.name(), 0)?.value,
            end: self.map.interpolate(chromosome.name(), len)?.value,
        };

        let mut previous: Vec<[Track; 2]> = Vec::new();
        for (gen, members) in lineage.generations().iter().enumerate() {
            let gen_seed = task_seed(seed, gen as u64);
            previous = members
                .par_iter()
                .enumerate()
                .map(|(m, member)| {
                    let mut rng = substream(gen_seed, m as u64);
                    self.simulate_member(member, &previous, chromosome, span, &mut rng)
                })
                .collect::<Result<Vec<_>>>()?;
            trace!(
                "{}: generation {} carried by {} member(s)",
                chromosome.name(),
                gen,
                previous.len()
            );
        }

        Ok(previous
            .into_iter()
            .map(|[t0, t1]| {
                [
                    self.to_breakpoints(t0, chromosome, 0),
                    self.to_breakpoints(t1, chromosome, 1),
                ]
            })
            .collect())
    }

    /// Tracks of one generation member, given the previous generation's tracks
    fn simulate_member<R: Rng + ?Sized>(
        &self,
        member: &Member,
        previous: &[[Track; 2]],
        chromosome: &Chromosome,
        span: CmSpan,
        rng: &mut R,
    ) -> Result<[Track; 2]> {
        let len = chromosome.length();
        let mut local: Vec<[Track; 2]> = Vec::with_capacity(member.nodes().len());
        for node in member.nodes() {
            let pair = match *node {
                LineageNode::Founder { labels } => [vec![(len, labels[0])], vec![(len, labels[1])]],
                LineageNode::Offspring { parents } => [
                    self.transmit(parents[0], previous, &local, chromosome, span, rng)?,
                    self.transmit(parents[1], previous, &local, chromosome, span, rng)?,
                ],
            };
            local.push(pair);
        }
        local
            .pop()
            .ok_or_else(|| SimError::invalid_model("sampled genealogy has an empty member"))
    }

    /// Haplotype handed down by `parent`
    fn transmit<R: Rng + ?Sized>(
        &self,
        parent: Parent,
        previous: &[[Track; 2]],
        local: &[[Track; 2]],
        chromosome: &Chromosome,
        span: CmSpan,
        rng: &mut R,
    ) -> Result<Track> {
        let tracks = match parent {
            // Both copies of an unadmixed founder carry the same label
            Parent::Founder(pop) => return Ok(vec![(chromosome.length(), pop)]),
            Parent::Previous(j) => previous.get(j),
            Parent::Node(j) => local.get(j),
        };
        let tracks = tracks.ok_or_else(|| {
            SimError::invalid_model(format!("genealogy refers to a missing parent {:?}", parent))
        })?;
        self.meiosis(tracks, chromosome, span, rng)
    }

    /// One meiosis in a parent carrying `parent`
    fn meiosis<R: Rng + ?Sized>(
        &self,
        parent: &[Track; 2],
        chromosome: &Chromosome,
        span: CmSpan,
        rng: &mut R,
    ) -> Result<Track> {
        let len = chromosome.length();
        let mut copy = rng.random_range(0..2usize);
        let crossovers = self.crossovers(chromosome, span, rng)?;

        let mut out = Track::new();
        let mut from = 0u64;
        for x in crossovers {
            append_span(&mut out, &parent[copy], from, x);
            copy = 1 - copy;
            from = x;
        }
        append_span(&mut out, &parent[copy], from, len);
        Ok(out)
    }

    /// Sorted crossover positions strictly inside `(0, length)`
    fn crossovers<R: Rng + ?Sized>(
        &self,
        chromosome: &Chromosome,
        span: CmSpan,
        rng: &mut R,
    ) -> Result<Vec<u64>> {
        let length_cm = span.end - span.start;
        if !(length_cm > 0.0) {
            return Ok(Vec::new());
        }
        let expected = length_cm / 100.0;
        let poisson = Poisson::new(expected).map_err(|e| {
            SimError::invalid_parameter(format!(
                "Crossover rate {} on {}: {}",
                expected,
                chromosome.name(),
                e
            ))
        })?;
        let count = poisson.sample(rng) as usize;

        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let cm = rng.random_range(span.start..span.end);
            let pos = self
                .warnings
                .note(self.map.invert(chromosome.name(), cm)?);
            if pos > 0 && pos < chromosome.length() {
                positions.push(pos);
            }
        }
        positions.sort_unstable();
        Ok(positions)
    }

    fn to_breakpoints(&self, track: Track, chromosome: &Chromosome, copy: u8) -> Vec<Breakpoint> {
        track
            .into_iter()
            .map(|(end, pop)| Breakpoint {
                chrom: chromosome.name().to_string(),
                end,
                population: self.model.label(pop).to_string(),
                copy,
            })
            .collect()
    }
}

/// Breakpoints for one chromosome of one individual.
///
/// Convenience over `BreakpointSimulator` for callers without a shared
/// warning counter. Crossovers clamped to the map's ends are logged.
pub fn simulate_breakpoints<M: MapProvider + ?Sized, R: Rng + ?Sized>(
    chromosome: &Chromosome,
    model: &AdmixtureModel,
    map: &M,
    rng: &mut R,
) -> Result<HaplotypeBreakpoints> {
    let warnings = CoverageWarnings::new();
    let breakpoints =
        BreakpointSimulator::new(model, map, &warnings).simulate_breakpoints(chromosome, rng)?;
    let clamped = warnings.count();
    if clamped > 0 {
        warn!(
            "{}: {} crossover position(s) fell outside the genetic map and were clamped",
            chromosome.name(),
            clamped
        );
    }
    Ok(breakpoints)
}

/// Copy the part of `track` inside `[from, to)` onto the end of `out`, merging
/// equal labels.
fn append_span(out: &mut Track, track: &[(u64, PopIdx)], from: u64, to: u64) {
    if from >= to {
        return;
    }
    let mut seg_start = 0u64;
    for &(end, label) in track {
        if end <= from {
            seg_start = end;
            continue;
        }
        if seg_start >= to {
            break;
        }
        let piece_end = end.min(to);
        match out.last_mut() {
            Some(last) if last.1 == label => last.0 = piece_end,
            _ => out.push((piece_end, label)),
        }
        seg_start = end;
    }
}
