// Multi-section piece planning and assembly.
//
// A piece is a sequence of sections: reference-line statements and
// counterpoint sections above or below the current reference. Section
// schemes come from planner agents walking a four-node pheromone graph
// until Finish; cost asymmetries make leaving a counterpoint chain
// back to a fresh reference expensive and finishing the most expensive
// of all, so developed trails favor a few substantial chains. A scheme
// qualifies when its length and reference coverage fall in the piece
// band and every reference-delimited chain uses both voices.
//
// Assembly consumes ranked reference lines progressively (early
// references take lower-rated lines, later ones higher), then composes
// each counterpoint section with a composing-task colony plus
// evolutionary refinement against the current reference.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, info};
use rand::Rng;
use thiserror::Error;

use crate::colony::{ColonyError, CounterpointColony, Task};
use crate::evolve::Refiner;
use crate::graph::{Edge, PheromoneGraph};
use crate::locus::{LocusError, LocusGraph};
use crate::melody::{CantusFirmus, Melody};
use crate::params::EvolveParams;
use crate::pitch::Pitch;

const COST_STANDARD: f64 = 1.0;
const COST_RETURN_TO_REFERENCE: f64 = 3.0;
const COST_FINISH: f64 = 5.0;

const SECTION_DEPOSIT: f64 = 0.1;
const SECTION_EXPLORE: f64 = 0.1;
const SECTION_EVAPORATE: f64 = 0.05;

pub const MIN_SECTIONS: usize = 6;
pub const MAX_SECTIONS: usize = 9;
pub const MIN_REFERENCES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionNode {
    Reference,
    Treble,
    Bass,
    Finish,
}

impl SectionNode {
    pub fn abbr(self) -> &'static str {
        match self {
            SectionNode::Reference => "*CF",
            SectionNode::Treble => "Tre",
            SectionNode::Bass => "Bas",
            SectionNode::Finish => "Fin",
        }
    }
}

impl fmt::Display for SectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionNode::Reference => "Reference",
            SectionNode::Treble => "Treble",
            SectionNode::Bass => "Bass",
            SectionNode::Finish => "Finish",
        };
        f.write_str(name)
    }
}

/// The planning graph: chains of counterpoint sections between
/// reference statements, with an expensive exit.
pub fn section_graph() -> PheromoneGraph<SectionNode> {
    use SectionNode::*;
    let mut graph = PheromoneGraph::new(1.0, 1.0);
    graph.set_start(Reference);
    let outward = [
        Edge::new(Reference, Bass, COST_STANDARD),
        Edge::new(Reference, Treble, COST_STANDARD),
    ];
    let returns: Vec<Edge<SectionNode>> = outward
        .iter()
        .filter_map(|e| e.reversed_with_cost(COST_RETURN_TO_REFERENCE))
        .collect();
    graph.add_edges(outward);
    graph.add_edges(returns);
    graph.add_edges([
        Edge::new(Treble, Bass, COST_STANDARD),
        Edge::new(Bass, Treble, COST_STANDARD),
        Edge::new(Treble, Treble, COST_STANDARD),
        Edge::new(Bass, Bass, COST_STANDARD),
        Edge::new(Treble, Finish, COST_FINISH),
        Edge::new(Bass, Finish, COST_FINISH),
    ]);
    graph
}

/// A planner agent: walks the section graph from Reference to Finish,
/// accumulating the scheme (Finish itself is not a section).
#[derive(Debug, Clone)]
pub struct SectionPlanner {
    sections: Vec<SectionNode>,
    current: SectionNode,
    completed: bool,
}

impl Default for SectionPlanner {
    fn default() -> Self {
        SectionPlanner::new()
    }
}

impl SectionPlanner {
    pub fn new() -> Self {
        SectionPlanner {
            sections: Vec::new(),
            current: SectionNode::Reference,
            completed: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn sections(&self) -> &[SectionNode] {
        &self.sections
    }

    fn step(
        &mut self,
        graph: &mut PheromoneGraph<SectionNode>,
        deposit: f64,
        rng: &mut impl Rng,
    ) -> Result<(), ColonyError> {
        let mv = graph.select_from(self.current, SECTION_EXPLORE, deposit, rng)?;
        self.sections.push(self.current);
        self.current = mv.selected.to;
        if self.current == SectionNode::Finish {
            self.completed = true;
        }
        Ok(())
    }
}

/// Planning phase: development lays trails with a large population,
/// planning reads them one agent at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Develop,
    Plan,
}

/// Colony of section planners over one planning graph.
#[derive(Debug)]
pub struct SectionColony {
    graph: PheromoneGraph<SectionNode>,
    planners: Vec<SectionPlanner>,
    phase: Phase,
    population: usize,
}

impl SectionColony {
    pub fn new(population: usize) -> Self {
        SectionColony {
            graph: section_graph(),
            planners: Vec::new(),
            phase: Phase::Develop,
            population,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn deposit(&self) -> f64 {
        match self.phase {
            Phase::Develop => SECTION_DEPOSIT,
            Phase::Plan => 0.0,
        }
    }

    pub fn graph(&self) -> &PheromoneGraph<SectionNode> {
        &self.graph
    }

    pub fn init_population(&mut self) {
        self.planners = (0..self.population).map(|_| SectionPlanner::new()).collect();
    }

    /// One synchronized round; evaporation only while developing.
    pub fn navigate_round(&mut self, rng: &mut impl Rng) -> Result<(), ColonyError> {
        let deposit = self.deposit();
        let mut planners = std::mem::take(&mut self.planners);
        let mut outcome = Ok(());
        for planner in planners.iter_mut() {
            if planner.is_completed() {
                continue;
            }
            if let Err(error) = planner.step(&mut self.graph, deposit, rng) {
                outcome = Err(error);
                break;
            }
        }
        self.planners = planners;
        outcome?;
        if self.phase == Phase::Develop {
            self.graph.evaporate(SECTION_EVAPORATE);
        }
        Ok(())
    }

    pub fn all_completed(&self) -> bool {
        self.planners.iter().all(SectionPlanner::is_completed)
    }

    pub fn run(&mut self, max_rounds: usize, rng: &mut impl Rng) -> Result<(), ColonyError> {
        for _ in 0..max_rounds {
            if self.all_completed() {
                break;
            }
            self.navigate_round(rng)?;
        }
        Ok(())
    }

    /// A single planner walked to completion (or the cap).
    pub fn single_walk(
        &mut self,
        max_steps: usize,
        rng: &mut impl Rng,
    ) -> Result<Option<SectionPlanner>, ColonyError> {
        let deposit = self.deposit();
        let mut planner = SectionPlanner::new();
        for _ in 0..max_steps {
            if planner.is_completed() {
                break;
            }
            planner.step(&mut self.graph, deposit, rng)?;
        }
        Ok(planner.is_completed().then_some(planner))
    }
}

/// Scheme qualification: section count in band, enough reference
/// statements, and every reference-delimited chain sings both voices.
pub fn qualified_plan(sections: &[SectionNode]) -> bool {
    let length = sections.len();
    if !(MIN_SECTIONS..=MAX_SECTIONS).contains(&length) {
        return false;
    }
    let references = sections
        .iter()
        .filter(|&&s| s == SectionNode::Reference)
        .count();
    if references < MIN_REFERENCES {
        return false;
    }
    let mut segments: Vec<Vec<SectionNode>> = Vec::new();
    let mut current: Vec<SectionNode> = Vec::new();
    for &section in sections {
        if section == SectionNode::Reference {
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(section);
        }
    }
    segments.push(current);
    segments.into_iter().filter(|s| !s.is_empty()).all(|s| {
        s.contains(&SectionNode::Treble) && s.contains(&SectionNode::Bass)
    })
}

/// Develop the planning graph, then draw distinct qualified schemes,
/// shortest first.
pub fn plan_schemes(
    count: usize,
    max_attempts: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Vec<SectionNode>>, ColonyError> {
    let mut colony = SectionColony::new(1000);
    colony.init_population();
    colony.run(64, rng)?;
    colony.set_phase(Phase::Plan);

    let mut schemes: Vec<Vec<SectionNode>> = Vec::new();
    for _ in 0..max_attempts {
        if schemes.len() == count {
            break;
        }
        let Some(planner) = colony.single_walk(64, rng)? else {
            continue;
        };
        let sections = planner.sections().to_vec();
        if qualified_plan(&sections) && !schemes.contains(&sections) {
            schemes.push(sections);
        }
    }
    schemes.sort_by_key(Vec::len);
    Ok(schemes)
}

/// One realized section of a piece.
#[derive(Debug, Clone)]
pub struct Section {
    pub kind: SectionNode,
    pub line: Melody,
}

/// A finished multi-section piece.
#[derive(Debug, Clone)]
pub struct Piece {
    pub scheme: Vec<SectionNode>,
    pub sections: Vec<Section>,
}

impl Piece {
    pub fn scheme_string(&self) -> String {
        self.scheme
            .iter()
            .map(|s| s.abbr())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Colony(#[from] ColonyError),
    #[error(transparent)]
    Locus(#[from] LocusError),
    #[error("the scheme asks for a counterpoint section before any reference")]
    NoReference,
    #[error("no reference lines were supplied")]
    EmptyReferencePool,
}

/// Assembly knobs: composing population, how deep into the ranked
/// population the final pick may reach, and the refinement setup.
#[derive(Debug, Clone)]
pub struct AssembleParams {
    pub develop_population: usize,
    pub cpt_population: usize,
    pub pick_pool: usize,
    pub refine: EvolveParams,
}

impl Default for AssembleParams {
    fn default() -> Self {
        AssembleParams {
            develop_population: 200,
            cpt_population: 100,
            pick_pool: 20,
            refine: EvolveParams::default(),
        }
    }
}

/// Spread the reference picks progressively across the ranked pool:
/// one stratum per reference section, a uniform pick inside each.
fn select_references(
    scheme: &[SectionNode],
    pool: &[CantusFirmus],
    rng: &mut impl Rng,
) -> Result<VecDeque<CantusFirmus>, AssembleError> {
    if pool.is_empty() {
        return Err(AssembleError::EmptyReferencePool);
    }
    let wanted = scheme
        .iter()
        .filter(|&&s| s == SectionNode::Reference)
        .count();
    let stride = pool.len() / wanted.max(1);
    let mut picks = VecDeque::with_capacity(wanted);
    for i in 0..wanted {
        let offset = if stride > 0 {
            rng.random_range(0..stride)
        } else {
            0
        };
        let index = (i * stride + offset).min(pool.len() - 1);
        picks.push_back(pool[index].clone());
    }
    Ok(picks)
}

/// Realize a qualified scheme against a ranked pool of reference
/// lines.
pub fn assemble(
    scheme: &[SectionNode],
    reference_pool: &[CantusFirmus],
    free: &PheromoneGraph<Pitch>,
    params: &AssembleParams,
    rng: &mut impl Rng,
) -> Result<Piece, AssembleError> {
    let mut references = select_references(scheme, reference_pool, rng)?;
    let mut sections: Vec<Section> = Vec::new();
    let mut treble: Option<CounterpointColony> = None;
    let mut bass: Option<CounterpointColony> = None;

    for &kind in scheme {
        match kind {
            SectionNode::Reference => {
                let cf = references.pop_front().ok_or(AssembleError::NoReference)?;
                info!("reference section: {} notes in {:?}", cf.len(), cf.mode());
                sections.push(Section {
                    kind,
                    line: cf.melody().clone(),
                });
                let upper = LocusGraph::build(cf.clone(), true, 1.0, 1.0, free)?;
                let lower = LocusGraph::build(cf.clone(), false, 1.0, 1.0, free)?;
                let mut upper_colony = CounterpointColony::new(upper);
                let mut lower_colony = CounterpointColony::new(lower);
                // Lay trails before anything composes over this line.
                for colony in [&mut upper_colony, &mut lower_colony] {
                    colony.set_task(Task::DevelopPrimary);
                    colony.set_population(params.develop_population);
                    colony.init_population(rng).map_err(ColonyError::from)?;
                    colony.run(rng)?;
                }
                treble = Some(upper_colony);
                bass = Some(lower_colony);
            }
            SectionNode::Treble | SectionNode::Bass => {
                let colony = if kind == SectionNode::Treble {
                    treble.as_mut()
                } else {
                    bass.as_mut()
                };
                let colony = colony.ok_or(AssembleError::NoReference)?;
                let line = compose_section(colony, params, rng)?;
                debug!("{kind} section composed: {} notes", line.len());
                sections.push(Section { kind, line });
            }
            SectionNode::Finish => {}
        }
    }
    Ok(Piece {
        scheme: scheme.to_vec(),
        sections,
    })
}

/// Composing run for one counterpoint section: frozen-trail colony,
/// refinement, then a pick from the top of the ranked population.
fn compose_section(
    colony: &mut CounterpointColony,
    params: &AssembleParams,
    rng: &mut impl Rng,
) -> Result<Melody, ColonyError> {
    colony.set_task(Task::Compose);
    colony.set_population(params.cpt_population);
    colony.init_population(rng)?;
    colony.run(rng)?;
    let outcome = Refiner::new(colony, params.refine).run(rng)?;
    debug!(
        "refined for {} generations to average {:.6}",
        outcome.generations, outcome.final_average
    );
    let pool = params.pick_pool.min(colony.threads().len()).max(1);
    let pick = rng.random_range(0..pool);
    Ok(colony.threads()[pick].melody().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use SectionNode::*;

    #[test]
    fn qualification_rules() {
        // Two balanced chains qualify.
        assert!(qualified_plan(&[
            Reference, Treble, Bass, Reference, Bass, Treble
        ]));
        // A chain missing a voice does not.
        assert!(!qualified_plan(&[
            Reference, Treble, Treble, Reference, Bass, Treble
        ]));
        // Too short.
        assert!(!qualified_plan(&[Reference, Treble, Bass]));
        // Only one reference.
        assert!(!qualified_plan(&[
            Reference, Treble, Bass, Treble, Bass, Treble
        ]));
        // Too long.
        assert!(!qualified_plan(&[
            Reference, Treble, Bass, Reference, Treble, Bass, Reference, Treble, Bass, Treble
        ]));
    }

    #[test]
    fn planner_walks_end_at_finish() {
        let mut colony = SectionColony::new(4);
        colony.init_population();
        let mut rng = StdRng::seed_from_u64(8);
        colony.run(200, &mut rng).unwrap();
        for planner in &colony.planners {
            if planner.is_completed() {
                assert_eq!(planner.sections().first(), Some(&Reference));
                assert!(!planner.sections().contains(&Finish));
            }
        }
    }

    #[test]
    fn development_lays_trails() {
        let mut colony = SectionColony::new(16);
        colony.init_population();
        let mut rng = StdRng::seed_from_u64(5);
        colony.navigate_round(&mut rng).unwrap();
        assert!(!colony.graph().is_blank());
    }

    #[test]
    fn planning_reads_without_writing() {
        let mut colony = SectionColony::new(1);
        colony.set_phase(Phase::Plan);
        let mut rng = StdRng::seed_from_u64(6);
        let _ = colony.single_walk(64, &mut rng).unwrap();
        assert!(colony.graph().is_blank());
    }

    #[test]
    fn schemes_are_distinct_and_qualified() {
        let mut rng = StdRng::seed_from_u64(12);
        let schemes = plan_schemes(3, 400, &mut rng).unwrap();
        for scheme in &schemes {
            assert!(qualified_plan(scheme));
        }
        for (i, a) in schemes.iter().enumerate() {
            for b in schemes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        // Shortest first.
        for pair in schemes.windows(2) {
            assert!(pair[0].len() <= pair[1].len());
        }
    }

    #[test]
    fn assembly_realizes_a_scheme() {
        use crate::melody::CantusFirmus;
        use crate::mode::Mode;
        use crate::pitch::{Pitch::*, pitch_space};
        let cf = CantusFirmus::new(
            Mode::Dorian,
            vec![D4, F4, E4, D4, G4, F4, A4, G4, F4, E4, D4],
        );
        let pool = vec![cf.clone(), cf];
        let free = pitch_space(1.0, 1.0);
        let scheme = [Reference, Treble, Bass, Reference, Bass, Treble];
        let params = AssembleParams {
            develop_population: 6,
            cpt_population: 6,
            pick_pool: 3,
            refine: EvolveParams {
                generations: 3,
                ..EvolveParams::default()
            },
        };
        let mut rng = StdRng::seed_from_u64(2);
        let piece = assemble(&scheme, &pool, &free, &params, &mut rng).unwrap();
        assert_eq!(piece.scheme, scheme.to_vec());
        assert_eq!(piece.sections.len(), 6);
        for section in &piece.sections {
            assert_eq!(section.line.len(), 11);
        }
        assert_eq!(piece.scheme_string(), "*CF, Tre, Bas, *CF, Bas, Tre");
    }

    #[test]
    fn reference_selection_is_progressive() {
        use crate::melody::CantusFirmus;
        use crate::mode::Mode;
        use crate::pitch::Pitch::*;
        let pool: Vec<CantusFirmus> = (0..8)
            .map(|_| CantusFirmus::new(Mode::Dorian, vec![D4, E4, F4, E4, D4]))
            .collect();
        let scheme = [Reference, Treble, Bass, Reference, Bass, Treble];
        let mut rng = StdRng::seed_from_u64(4);
        let picks = select_references(&scheme, &pool, &mut rng).unwrap();
        assert_eq!(picks.len(), 2);
    }
}
