//! # Genetic Map
//!
//! Physical-to-genetic distance interpolation and its inverse.
//!
//! - `GeneticMap`: anchors for one chromosome, piecewise-linear between anchors
//!   and clamped at both ends
//! - `GeneticMaps`: a collection keyed by chromosome name, loaded from PLINK
//!   `.map` files (`chrom id cM bp`)
//! - `UniformRateMap`: constant rate fallback (default 1 cM per Mb)
//! - `MapProvider`: the interface the breakpoint simulator consumes
//!
//! Lookups outside the anchors clamp. The strict lookup reports
//! `SimError::MapCoverage`; the lenient one flags the result so callers can
//! count the event in a `CoverageWarnings`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::error::{Result, SimError};

/// Default scale factor: 1 cM per Mb (1e-6 cM per bp)
pub const DEFAULT_SCALE_FACTOR: f64 = 1e-6;

/// Result of a lenient map lookup
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapLookup<T> {
    pub value: T,
    /// True when the query fell outside the anchors and was clamped
    pub clamped: bool,
}

impl<T> MapLookup<T> {
    fn exact(value: T) -> Self {
        Self {
            value,
            clamped: false,
        }
    }

    fn clamped(value: T) -> Self {
        Self {
            value,
            clamped: true,
        }
    }
}

/// Interpolated recombination distances for the breakpoint simulator.
///
/// Implementations are shared read-only across workers.
pub trait MapProvider: Sync {
    /// Genetic position (cM) of a physical position, clamped to the map's range.
    fn interpolate(&self, chrom: &str, position: u64) -> Result<MapLookup<f64>>;

    /// Physical position at a genetic position, clamped to the map's range.
    fn invert(&self, chrom: &str, cm: f64) -> Result<MapLookup<u64>>;
}

/// Counts clamped lookups across all workers of a run.
#[derive(Debug, Default)]
pub struct CoverageWarnings {
    clamped: AtomicUsize,
}

impl CoverageWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwrap a lookup, counting it if it was clamped
    pub fn note<T>(&self, lookup: MapLookup<T>) -> T {
        if lookup.clamped {
            self.clamped.fetch_add(1, Ordering::Relaxed);
        }
        lookup.value
    }

    pub fn count(&self) -> usize {
        self.clamped.load(Ordering::Relaxed)
    }
}

/// A genetic map for one chromosome
#[derive(Clone, Debug)]
pub struct GeneticMap {
    chrom: String,

    /// Physical positions (bp), non-decreasing
    positions: Vec<u64>,

    /// Cumulative genetic positions (cM), non-decreasing
    gen_positions: Vec<f64>,
}

impl GeneticMap {
    /// Build from `(bp, cM)` anchors in ascending order.
    pub fn new(chrom: impl Into<String>, anchors: Vec<(u64, f64)>) -> Result<Self> {
        let chrom = chrom.into();
        if anchors.is_empty() {
            return Err(SimError::invalid_data(format!(
                "Genetic map for {} has no anchors",
                chrom
            )));
        }

        let (positions, gen_positions): (Vec<u64>, Vec<f64>) = anchors.into_iter().unzip();

        if let Some(bad) = gen_positions.iter().find(|g| !g.is_finite()) {
            return Err(SimError::invalid_data(format!(
                "Genetic map for {} has a non-finite genetic position ({})",
                chrom, bad
            )));
        }
        for i in 1..positions.len() {
            if positions[i] < positions[i - 1] || gen_positions[i] < gen_positions[i - 1] {
                return Err(SimError::invalid_data(format!(
                    "Genetic map for {} is not monotonically non-decreasing at position {}",
                    chrom, positions[i]
                )));
            }
        }

        Ok(Self {
            chrom,
            positions,
            gen_positions,
        })
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn first_position(&self) -> u64 {
        self.positions[0]
    }

    pub fn last_position(&self) -> u64 {
        self.positions[self.positions.len() - 1]
    }

    /// Total map length in cM
    pub fn length_cm(&self) -> f64 {
        self.gen_positions[self.gen_positions.len() - 1] - self.gen_positions[0]
    }

    /// Interpolate genetic position (cM), failing outside the anchors
    pub fn genetic_position(&self, phys_pos: u64) -> Result<f64> {
        if phys_pos < self.first_position() || phys_pos > self.last_position() {
            return Err(SimError::MapCoverage {
                chrom: self.chrom.clone(),
                position: phys_pos,
                first: self.first_position(),
                last: self.last_position(),
            });
        }

        // First anchor strictly past the query
        let idx = self.positions.partition_point(|&p| p <= phys_pos);
        if idx == self.positions.len() {
            return Ok(self.gen_positions[idx - 1]);
        }
        let p0 = self.positions[idx - 1] as f64;
        let p1 = self.positions[idx] as f64;
        let g0 = self.gen_positions[idx - 1];
        let g1 = self.gen_positions[idx];
        let t = (phys_pos as f64 - p0) / (p1 - p0);
        Ok(g0 + t * (g1 - g0))
    }

    /// Interpolate genetic position (cM), clamping outside the anchors
    pub fn genetic_position_clamped(&self, phys_pos: u64) -> MapLookup<f64> {
        match self.genetic_position(phys_pos) {
            Ok(cm) => MapLookup::exact(cm),
            Err(_) if phys_pos < self.first_position() => {
                MapLookup::clamped(self.gen_positions[0])
            }
            Err(_) => MapLookup::clamped(self.gen_positions[self.gen_positions.len() - 1]),
        }
    }

    /// Physical position at genetic position `cm`.
    ///
    /// On a flat stretch this is the first anchor that reaches `cm`.
    pub fn physical_position(&self, cm: f64) -> MapLookup<u64> {
        let last = self.positions.len() - 1;
        if cm < self.gen_positions[0] {
            return MapLookup::clamped(self.positions[0]);
        }
        if cm > self.gen_positions[last] {
            return MapLookup::clamped(self.positions[last]);
        }

        let idx = self.gen_positions.partition_point(|&g| g < cm);
        if self.gen_positions[idx] == cm || idx == 0 {
            return MapLookup::exact(self.positions[idx]);
        }
        let p0 = self.positions[idx - 1] as f64;
        let p1 = self.positions[idx] as f64;
        let g0 = self.gen_positions[idx - 1];
        let g1 = self.gen_positions[idx];
        let t = (cm - g0) / (g1 - g0);
        MapLookup::exact((p0 + t * (p1 - p0)).floor() as u64)
    }
}

/// A collection of genetic maps for multiple chromosomes
#[derive(Clone, Debug, Default)]
pub struct GeneticMaps {
    maps: HashMap<String, GeneticMap>,
}

impl GeneticMaps {
    /// Create empty collection
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, map: GeneticMap) {
        self.maps.insert(map.chrom.clone(), map);
    }

    /// Load every chromosome from a PLINK map file.
    ///
    /// Format: `chrom variant_id position_cM position_bp`, whitespace separated.
    pub fn from_plink_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut anchors: Vec<(String, Vec<(u64, f64)>)> = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return Err(SimError::parse(
                    line_num + 1,
                    format!("Expected 4 columns, got {}", parts.len()),
                ));
            }

            let gen_pos: f64 = parts[2]
                .parse()
                .map_err(|_| SimError::parse(line_num + 1, "Invalid genetic position"))?;
            let pos: u64 = parts[3]
                .parse()
                .map_err(|_| SimError::parse(line_num + 1, "Invalid physical position"))?;

            match anchors.last_mut() {
                Some((chrom, list)) if chrom == parts[0] => list.push((pos, gen_pos)),
                _ => anchors.push((parts[0].to_string(), vec![(pos, gen_pos)])),
            }
        }

        let mut maps = Self::new();
        for (chrom, list) in anchors {
            if maps.maps.contains_key(&chrom) {
                return Err(SimError::invalid_data(format!(
                    "Chromosome {} appears in more than one block of {}",
                    chrom,
                    path.display()
                )));
            }
            debug!("Genetic map {}: {} anchors", chrom, list.len());
            maps.insert(GeneticMap::new(chrom, list)?);
        }
        Ok(maps)
    }

    /// Load a single PLINK map file, or every `*.map` file in a directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Self::from_plink_file(path);
        }
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "map"))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(SimError::invalid_data(format!(
                "No .map files found in {}",
                path.display()
            )));
        }

        let mut maps = Self::new();
        for file in &files {
            for (chrom, map) in Self::from_plink_file(file)?.maps {
                if maps.maps.contains_key(&chrom) {
                    return Err(SimError::invalid_data(format!(
                        "Chromosome {} appears in more than one map file under {}",
                        chrom,
                        path.display()
                    )));
                }
                maps.maps.insert(chrom, map);
            }
        }
        Ok(maps)
    }

    /// Map for a chromosome, tolerating a `chr` prefix mismatch
    pub fn get(&self, chrom: &str) -> Option<&GeneticMap> {
        self.maps.get(chrom).or_else(|| match chrom.strip_prefix("chr") {
            Some(bare) => self.maps.get(bare),
            None => self.maps.get(&format!("chr{}", chrom)),
        })
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    fn require(&self, chrom: &str) -> Result<&GeneticMap> {
        self.get(chrom)
            .ok_or_else(|| SimError::unknown_chromosome(chrom))
    }
}

impl MapProvider for GeneticMaps {
    fn interpolate(&self, chrom: &str, position: u64) -> Result<MapLookup<f64>> {
        Ok(self.require(chrom)?.genetic_position_clamped(position))
    }

    fn invert(&self, chrom: &str, cm: f64) -> Result<MapLookup<u64>> {
        Ok(self.require(chrom)?.physical_position(cm))
    }
}

/// Constant-rate map used when no recombination map is supplied
#[derive(Clone, Debug)]
pub struct UniformRateMap {
    scale_factor: f64,
}

impl UniformRateMap {
    /// `cm_per_mb` centimorgans per megabase
    pub fn new(cm_per_mb: f64) -> Result<Self> {
        if !(cm_per_mb.is_finite() && cm_per_mb > 0.0) {
            return Err(SimError::invalid_parameter(format!(
                "Recombination rate must be positive, got {}",
                cm_per_mb
            )));
        }
        Ok(Self {
            scale_factor: cm_per_mb * DEFAULT_SCALE_FACTOR,
        })
    }
}

impl Default for UniformRateMap {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
        }
    }
}

impl MapProvider for UniformRateMap {
    fn interpolate(&self, _chrom: &str, position: u64) -> Result<MapLookup<f64>> {
        Ok(MapLookup::exact(position as f64 * self.scale_factor))
    }

    fn invert(&self, _chrom: &str, cm: f64) -> Result<MapLookup<u64>> {
        if cm < 0.0 {
            return Ok(MapLookup::clamped(0));
        }
        Ok(MapLookup::exact((cm / self.scale_factor).floor() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn three_anchor_map() -> GeneticMap {
        GeneticMap::new(
            "1",
            vec![(1_000_000, 0.0), (2_000_000, 1.0), (3_000_000, 2.5)],
        )
        .unwrap()
    }

    #[test]
    fn test_interpolation() {
        let map = three_anchor_map();

        assert!((map.genetic_position(1_000_000).unwrap() - 0.0).abs() < 1e-9);
        assert!((map.genetic_position(2_000_000).unwrap() - 1.0).abs() < 1e-9);
        assert!((map.genetic_position(3_000_000).unwrap() - 2.5).abs() < 1e-9);
        assert!((map.genetic_position(1_500_000).unwrap() - 0.5).abs() < 1e-9);
        assert!((map.genetic_position(2_500_000).unwrap() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_outside_coverage_is_error_or_clamp() {
        let map = three_anchor_map();

        match map.genetic_position(500_000) {
            Err(SimError::MapCoverage { first, last, .. }) => {
                assert_eq!(first, 1_000_000);
                assert_eq!(last, 3_000_000);
            }
            other => panic!("expected MapCoverage, got {:?}", other),
        }

        let before = map.genetic_position_clamped(500_000);
        assert!(before.clamped);
        assert_eq!(before.value, 0.0);

        let after = map.genetic_position_clamped(9_000_000);
        assert!(after.clamped);
        assert_eq!(after.value, 2.5);
    }

    #[test]
    fn test_inverse_round_trips_inside_anchors() {
        let map = three_anchor_map();
        for &pos in &[1_000_000u64, 1_250_000, 2_000_000, 2_900_000] {
            let cm = map.genetic_position(pos).unwrap();
            let back = map.physical_position(cm);
            assert!(!back.clamped);
            assert!((back.value as i64 - pos as i64).abs() <= 1, "{} -> {}", pos, back.value);
        }
        assert!(map.physical_position(-1.0).clamped);
        assert_eq!(map.physical_position(10.0).value, 3_000_000);
    }

    #[test]
    fn test_flat_stretch_inverse_takes_first_anchor() {
        let map = GeneticMap::new("2", vec![(0, 0.0), (100, 1.0), (500, 1.0), (600, 2.0)]).unwrap();
        assert_eq!(map.physical_position(1.0).value, 100);
        assert!((map.genetic_position(300).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_decreasing_anchors() {
        assert!(GeneticMap::new("1", vec![(0, 1.0), (10, 0.5)]).is_err());
        assert!(GeneticMap::new("1", vec![(10, 0.0), (5, 0.5)]).is_err());
        assert!(GeneticMap::new("1", vec![]).is_err());
    }

    #[test]
    fn test_plink_file_and_provider() {
        let path = std::env::temp_dir().join(format!("admixsim_map_{}.map", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "# chrom id cM bp").unwrap();
            writeln!(f, "chr1 rs1 0.0 0").unwrap();
            writeln!(f, "chr1 rs2 50.0 50000000").unwrap();
            writeln!(f, "chr1 rs3 100.0 100000000").unwrap();
            writeln!(f, "chr2 rs4 0.0 0").unwrap();
            writeln!(f, "chr2 rs5 10.0 1000000").unwrap();
        }
        let maps = GeneticMaps::from_plink_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(maps.len(), 2);
        assert!((maps.get("1").unwrap().length_cm() - 100.0).abs() < 1e-9);

        let lookup = maps.interpolate("chr1", 25_000_000).unwrap();
        assert!(!lookup.clamped);
        assert!((lookup.value - 25.0).abs() < 1e-9);

        let warnings = CoverageWarnings::new();
        let cm = warnings.note(maps.interpolate("chr2", 5_000_000).unwrap());
        assert_eq!(cm, 10.0);
        assert_eq!(warnings.count(), 1);

        assert!(matches!(
            maps.interpolate("chr9", 1),
            Err(SimError::UnknownChromosome { .. })
        ));
    }

    #[test]
    fn test_uniform_rate_map() {
        let map = UniformRateMap::default();
        assert!((map.interpolate("x", 2_000_000).unwrap().value - 2.0).abs() < 1e-9);
        assert_eq!(map.invert("x", 2.0).unwrap().value, 2_000_000);
        assert!(UniformRateMap::new(0.0).is_err());
    }
}
