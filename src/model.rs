//! # Admixture Model
//!
//! Generations of admixture, from the founder generation (0) to the generation
//! of the simulated individuals (last). A generation is either a set of
//! population proportions or an explicit pedigree.
//!
//! ## Proportions
//! Each parent of a generation-`t` individual (`t >= 1`) is a fresh unadmixed
//! founder of population `k` with probability `p_k`, or with probability
//! `admixed` a uniformly drawn member of generation `t - 1`, a population of
//! fixed size shared by the whole cohort. A generation-0 individual has
//! two unrecombined haplotypes whose labels are drawn independently from the
//! generation-0 proportions, which may not contain an admixed share.
//!
//! ## Pedigree
//! Edges `(child, parent1, parent2)`. A parent is another edge's child, a
//! declared founder (`id -> population`) or `Admixed`, an individual of the
//! previous generation. Exactly one child is nobody's parent; that proband is
//! the individual this generation contributes.
//!
//! The model is validated once, eagerly, in `AdmixtureModel::new`. Sampling a
//! genealogy (`sample_lineage`) never fails afterwards.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

use crate::error::{Result, SimError};

/// Reserved label for "an individual of the previous generation"
pub const ADMIXED_LABEL: &str = "Admixed";

/// Tolerance on proportions summing to one
const PROPORTION_TOLERANCE: f64 = 1e-6;

/// Population index into `AdmixtureModel::populations`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopIdx(pub u16);

impl PopIdx {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PedigreeEdge {
    pub child: String,
    pub parent1: String,
    pub parent2: String,
}

impl PedigreeEdge {
    pub fn new(
        child: impl Into<String>,
        parent1: impl Into<String>,
        parent2: impl Into<String>,
    ) -> Self {
        Self {
            child: child.into(),
            parent1: parent1.into(),
            parent2: parent2.into(),
        }
    }
}

/// One generation of the admixture model
#[derive(Clone, Debug, PartialEq)]
pub enum Generation {
    Proportions {
        /// Share of parents drawn from the previous generation
        admixed: f64,
        /// `(population label, share of unadmixed founder parents)`
        populations: Vec<(String, f64)>,
    },
    Pedigree {
        /// `(founder id, population label)`
        founders: Vec<(String, String)>,
        edges: Vec<PedigreeEdge>,
    },
}

/// Outcome of a proportions draw for one parent slot
#[derive(Clone, Copy, Debug, PartialEq)]
enum Draw {
    Founder(PopIdx),
    Admixed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ParentRef {
    /// Index into the pedigree's founder list
    Founder(usize),
    Admixed,
    /// Index into the pedigree's topologically sorted nodes
    Node(usize),
}

#[derive(Clone, Debug)]
enum CompiledGeneration {
    /// Generation 0 given as proportions: per-haplotype labels
    Founders {
        weights: WeightedIndex<f64>,
        pops: Vec<PopIdx>,
    },
    Mixture {
        weights: WeightedIndex<f64>,
        outcomes: Vec<Draw>,
    },
    Pedigree {
        founder_pops: Vec<PopIdx>,
        /// Parents come before children; the proband is last
        nodes: Vec<[ParentRef; 2]>,
    },
}

/// Where a transmitted haplotype comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    /// A fresh unadmixed founder of this population
    Founder(PopIdx),
    /// Member of the previous generation, indexing `Lineage::generation(t - 1)`
    Previous(usize),
    /// Earlier node of the same member (pedigree generations)
    Node(usize),
}

/// One node of a sampled genealogy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineageNode {
    /// Unrecombined haplotypes with these ancestry labels
    Founder { labels: [PopIdx; 2] },
    /// Each haplotype is a meiotic product of the corresponding parent
    Offspring { parents: [Parent; 2] },
}

/// One individual of a generation, with the pedigree nodes it needs.
///
/// Nodes are ordered parents-first; the last node is the member itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Member {
    nodes: Vec<LineageNode>,
}

impl Member {
    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }
}

/// Sampled genealogy of a cohort.
///
/// Every generation but the last is a population of `pool_size` individuals;
/// an admixed parent is a uniformly drawn member of that population. Only the
/// members with descendants in the cohort are kept, so the genealogy grows
/// linearly with the number of generations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lineage {
    generations: Vec<Vec<Member>>,
}

impl Lineage {
    pub fn generations(&self) -> &[Vec<Member>] {
        &self.generations
    }

    pub fn generation(&self, gen: usize) -> &[Member] {
        self.generations.get(gen).map_or(&[], Vec::as_slice)
    }

    /// Number of individuals in the last generation
    pub fn individuals(&self) -> usize {
        self.generations.last().map_or(0, Vec::len)
    }

    pub fn node_count(&self) -> usize {
        self.generations
            .iter()
            .flatten()
            .map(|member| member.nodes.len())
            .sum()
    }
}

/// Draws admixed parents from a finite previous generation.
///
/// Pool indices are renumbered in order of first use, so `Parent::Previous`
/// indexes the members kept for the previous generation.
struct PoolDraw {
    pool_size: usize,
    kept: HashMap<usize, usize>,
}

impl PoolDraw {
    fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            kept: HashMap::new(),
        }
    }

    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Parent {
        let member = rng.random_range(0..self.pool_size);
        let next = self.kept.len();
        Parent::Previous(*self.kept.entry(member).or_insert(next))
    }
}

/// Validated admixture model
#[derive(Clone, Debug)]
pub struct AdmixtureModel {
    populations: Vec<String>,
    generations: Vec<Generation>,
    compiled: Vec<CompiledGeneration>,
}

impl AdmixtureModel {
    /// Validate and compile. Fails with `InvalidAdmixtureModel`.
    pub fn new(generations: Vec<Generation>) -> Result<Self> {
        if generations.is_empty() {
            return Err(SimError::invalid_model("model has no generations"));
        }

        let mut populations: Vec<String> = Vec::new();
        let mut compiled = Vec::with_capacity(generations.len());
        for (gen, generation) in generations.iter().enumerate() {
            let c = match generation {
                Generation::Proportions {
                    admixed,
                    populations: shares,
                } => compile_proportions(gen, *admixed, shares, &mut populations)?,
                Generation::Pedigree { founders, edges } => {
                    compile_pedigree(gen, founders, edges, &mut populations)?
                }
            };
            compiled.push(c);
        }

        debug!(
            "Admixture model: {} generation(s), populations {:?}",
            generations.len(),
            populations
        );
        Ok(Self {
            populations,
            generations,
            compiled,
        })
    }

    /// Single-generation model: founders drawn from `shares`
    pub fn founders(shares: Vec<(String, f64)>) -> Result<Self> {
        Self::new(vec![Generation::Proportions {
            admixed: 0.0,
            populations: shares,
        }])
    }

    /// Population labels in order of first appearance
    pub fn populations(&self) -> &[String] {
        &self.populations
    }

    pub fn label(&self, pop: PopIdx) -> &str {
        &self.populations[pop.as_usize()]
    }

    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Every population must be known to the reference panel
    pub fn check_populations(&self, is_known: impl Fn(&str) -> bool) -> Result<()> {
        match self.populations.iter().find(|p| !is_known(p)) {
            Some(missing) => Err(SimError::unknown_population(missing.as_str())),
            None => Ok(()),
        }
    }

    /// Sample the genealogy of `individuals` members of the last generation.
    ///
    /// Earlier generations hold `pool_size` individuals each (at least one).
    /// The genealogy is sampled backwards from the cohort, so only ancestors
    /// of the cohort are drawn.
    pub fn sample_lineage<R: Rng + ?Sized>(
        &self,
        pool_size: usize,
        individuals: usize,
        rng: &mut R,
    ) -> Lineage {
        let pool_size = pool_size.max(1);
        let mut generations = Vec::with_capacity(self.compiled.len());
        let mut wanted = individuals;
        for gen in (0..self.compiled.len()).rev() {
            let mut pool = PoolDraw::new(pool_size);
            let members = (0..wanted)
                .map(|_| self.sample_member(gen, &mut pool, rng))
                .collect();
            generations.push(members);
            wanted = pool.kept.len();
        }
        generations.reverse();
        Lineage { generations }
    }

    fn sample_member<R: Rng + ?Sized>(
        &self,
        gen: usize,
        pool: &mut PoolDraw,
        rng: &mut R,
    ) -> Member {
        let nodes = match &self.compiled[gen] {
            CompiledGeneration::Founders { weights, pops } => {
                let labels = [pops[weights.sample(rng)], pops[weights.sample(rng)]];
                vec![LineageNode::Founder { labels }]
            }
            CompiledGeneration::Mixture { weights, outcomes } => {
                let mut parents = [Parent::Node(0); 2];
                for slot in parents.iter_mut() {
                    *slot = match outcomes[weights.sample(rng)] {
                        Draw::Founder(pop) => Parent::Founder(pop),
                        Draw::Admixed => pool.draw(rng),
                    };
                }
                vec![LineageNode::Offspring { parents }]
            }
            CompiledGeneration::Pedigree { founder_pops, nodes } => nodes
                .iter()
                .map(|refs| {
                    let mut parents = [Parent::Node(0); 2];
                    for (slot, parent) in parents.iter_mut().zip(refs.iter()) {
                        *slot = match *parent {
                            ParentRef::Founder(f) => Parent::Founder(founder_pops[f]),
                            ParentRef::Admixed => pool.draw(rng),
                            ParentRef::Node(j) => Parent::Node(j),
                        };
                    }
                    LineageNode::Offspring { parents }
                })
                .collect(),
        };
        Member { nodes }
    }
}

fn intern(label: &str, populations: &mut Vec<String>) -> Result<PopIdx> {
    if label == ADMIXED_LABEL {
        return Err(SimError::invalid_model(format!(
            "'{}' is reserved and cannot name a population",
            ADMIXED_LABEL
        )));
    }
    let idx = match populations.iter().position(|p| p == label) {
        Some(idx) => idx,
        None => {
            populations.push(label.to_string());
            populations.len() - 1
        }
    };
    u16::try_from(idx)
        .map(PopIdx)
        .map_err(|_| SimError::invalid_model("too many populations"))
}

fn check_share(gen: usize, name: &str, share: f64) -> Result<()> {
    if !share.is_finite() || share < 0.0 {
        return Err(SimError::invalid_model(format!(
            "generation {}: proportion for {} must be a finite non-negative number, got {}",
            gen, name, share
        )));
    }
    Ok(())
}

fn compile_proportions(
    gen: usize,
    admixed: f64,
    shares: &[(String, f64)],
    populations: &mut Vec<String>,
) -> Result<CompiledGeneration> {
    check_share(gen, ADMIXED_LABEL, admixed)?;
    let mut seen = HashSet::new();
    for (label, share) in shares {
        check_share(gen, label, *share)?;
        if !seen.insert(label.as_str()) {
            return Err(SimError::invalid_model(format!(
                "generation {}: population {} listed twice",
                gen, label
            )));
        }
    }

    let total: f64 = admixed + shares.iter().map(|(_, s)| s).sum::<f64>();
    if (total - 1.0).abs() > PROPORTION_TOLERANCE {
        return Err(SimError::invalid_model(format!(
            "generation {}: proportions sum to {} instead of 1",
            gen, total
        )));
    }

    if gen == 0 {
        if admixed > 0.0 {
            return Err(SimError::invalid_model(
                "generation 0 is the founder generation and cannot draw admixed parents",
            ));
        }
        let pops = shares
            .iter()
            .map(|(label, _)| intern(label, populations))
            .collect::<Result<Vec<_>>>()?;
        let weights = WeightedIndex::new(shares.iter().map(|(_, s)| *s))
            .map_err(|e| SimError::invalid_model(format!("generation 0: {}", e)))?;
        return Ok(CompiledGeneration::Founders { weights, pops });
    }

    let mut outcomes = Vec::with_capacity(shares.len() + 1);
    let mut raw = Vec::with_capacity(shares.len() + 1);
    for (label, share) in shares {
        outcomes.push(Draw::Founder(intern(label, populations)?));
        raw.push(*share);
    }
    if admixed > 0.0 {
        outcomes.push(Draw::Admixed);
        raw.push(admixed);
    }
    let weights = WeightedIndex::new(raw)
        .map_err(|e| SimError::invalid_model(format!("generation {}: {}", gen, e)))?;
    Ok(CompiledGeneration::Mixture { weights, outcomes })
}

fn compile_pedigree(
    gen: usize,
    founders: &[(String, String)],
    edges: &[PedigreeEdge],
    populations: &mut Vec<String>,
) -> Result<CompiledGeneration> {
    if edges.is_empty() {
        return Err(SimError::invalid_model(format!("generation {}: pedigree has no edges", gen)));
    }

    let mut founder_ids: HashMap<&str, usize> = HashMap::new();
    let mut founder_pops = Vec::with_capacity(founders.len());
    for (id, label) in founders {
        if id == ADMIXED_LABEL || founder_ids.insert(id.as_str(), founder_pops.len()).is_some() {
            return Err(SimError::invalid_model(format!(
                "generation {}: founder id {} is reserved or declared twice",
                gen, id
            )));
        }
        founder_pops.push(intern(label, populations)?);
    }

    let mut child_ids: HashMap<&str, usize> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        if founder_ids.contains_key(edge.child.as_str()) || edge.child == ADMIXED_LABEL {
            return Err(SimError::invalid_model(format!(
                "generation {}: child {} is also a founder",
                gen, edge.child
            )));
        }
        if child_ids.insert(edge.child.as_str(), i).is_some() {
            return Err(SimError::invalid_model(format!(
                "generation {}: child {} has more than one pair of parents",
                gen, edge.child
            )));
        }
    }

    // Resolve parents against the original edge order
    let mut raw: Vec<[ParentRef; 2]> = Vec::with_capacity(edges.len());
    let mut is_parent = vec![false; edges.len()];
    let mut founder_used = vec![false; founder_pops.len()];
    for edge in edges {
        let mut refs = [ParentRef::Admixed; 2];
        for (slot, parent) in refs.iter_mut().zip([&edge.parent1, &edge.parent2]) {
            *slot = if let Some(&j) = child_ids.get(parent.as_str()) {
                is_parent[j] = true;
                ParentRef::Node(j)
            } else if let Some(&f) = founder_ids.get(parent.as_str()) {
                founder_used[f] = true;
                ParentRef::Founder(f)
            } else if parent == ADMIXED_LABEL {
                if gen == 0 {
                    return Err(SimError::invalid_model(
                        "generation 0 pedigree cannot draw admixed parents",
                    ));
                }
                ParentRef::Admixed
            } else {
                return Err(SimError::invalid_model(format!(
                    "generation {}: parent {} of {} is neither a founder nor a pedigree child",
                    gen, parent, edge.child
                )));
            };
        }
        raw.push(refs);
    }

    for (f, used) in founder_used.iter().enumerate() {
        if !used {
            warn!("generation {}: founder {} is never used as a parent", gen, founders[f].0);
        }
    }

    let probands: Vec<usize> = (0..edges.len()).filter(|&i| !is_parent[i]).collect();
    let proband = match probands.as_slice() {
        [single] => *single,
        [] => {
            return Err(SimError::invalid_model(format!(
                "generation {}: pedigree has a cycle (every child is also a parent)",
                gen
            )))
        }
        many => {
            return Err(SimError::invalid_model(format!(
                "generation {}: pedigree has {} probands ({}); expected exactly one",
                gen,
                many.len(),
                many.iter().map(|&i| edges[i].child.as_str()).collect::<Vec<_>>().join(", ")
            )))
        }
    };

    // Depth-first topological sort; a back edge is a cycle
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }
    fn visit(
        node: usize,
        raw: &[[ParentRef; 2]],
        marks: &mut [Mark],
        order: &mut Vec<usize>,
        edges: &[PedigreeEdge],
    ) -> Result<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                return Err(SimError::invalid_model(format!(
                    "pedigree has a cycle through {}",
                    edges[node].child
                )))
            }
            Mark::Unvisited => {}
        }
        marks[node] = Mark::Active;
        for parent in raw[node] {
            if let ParentRef::Node(j) = parent {
                visit(j, raw, marks, order, edges)?;
            }
        }
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    // Every other child is an ancestor of the single proband, so without a
    // cycle the proband comes out last
    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut order = Vec::with_capacity(edges.len());
    for node in 0..edges.len() {
        visit(node, &raw, &mut marks, &mut order, edges)?;
    }
    if order.last() != Some(&proband) {
        return Err(SimError::invalid_model(format!(
            "generation {}: child {} does not descend to proband {}",
            gen,
            order.last().map_or("?", |&i| edges[i].child.as_str()),
            edges[proband].child
        )));
    }

    let mut new_index = vec![0usize; edges.len()];
    for (new, &old) in order.iter().enumerate() {
        new_index[old] = new;
    }
    let nodes = order
        .iter()
        .map(|&old| {
            raw[old].map(|r| match r {
                ParentRef::Node(j) => ParentRef::Node(new_index[j]),
                other => other,
            })
        })
        .collect();

    Ok(CompiledGeneration::Pedigree { founder_pops, nodes })
}
