// Colonies: synchronized rounds of agents over the walk graphs.
//
// A round advances every unfinished thread by exactly one step, then
// runs one evaporation pass; evaporation never interleaves with an
// individual step, so scoring stays consistent across the population
// within a round.
//
// CantusColony grows free reference lines on the thought and pitch
// spaces, completing each line when the cadence short-circuit fires.
// CounterpointColony walks a locus graph against a fixed reference;
// its task presets mirror the search stages: primary development with
// full pheromone feedback, secondary development with the categorical
// dimension frozen, and composing with all feedback off so finished
// trails only get read, not written.

use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::eval::{self, EvalKind};
use crate::graph::{FractionMode, GraphError, Move, PheromoneGraph};
use crate::locus::LocusGraph;
use crate::melody::CantusFirmus;
use crate::mode::Mode;
use crate::params::{CantusParams, DimensionParams};
use crate::pitch::{Pitch, PitchPath};
use crate::thought::{MusicThought, ThoughtError, ThoughtNode, thought_space};
use crate::thread::{CantusThread, CounterpointThread, Trace};

pub const DEVELOPING_POPULATION: usize = 10_000;
pub const COMPOSING_POPULATION: usize = 100;

#[derive(Debug, Error)]
pub enum ColonyError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Thought(#[from] ThoughtError),
}

/// Search stage of a counterpoint colony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Full pheromone feedback on both dimensions.
    DevelopPrimary,
    /// Categorical dimension frozen; pitch feedback continues.
    DevelopSecondary,
    /// All feedback off: trails are read-only while composing.
    Compose,
}

/// Colony of counterpoint threads over one locus graph.
#[derive(Debug)]
pub struct CounterpointColony {
    locus_graph: LocusGraph,
    thought_graph: PheromoneGraph<ThoughtNode>,
    threads: Vec<CounterpointThread>,
    task: Task,
    population: usize,
    x: DimensionParams,
    y: DimensionParams,
    eval_kind: EvalKind,
}

impl CounterpointColony {
    pub fn new(locus_graph: LocusGraph) -> Self {
        let x = DimensionParams::thought();
        let thought_graph = thought_space(x.alpha, x.beta);
        let mut colony = CounterpointColony {
            locus_graph,
            thought_graph,
            threads: Vec::new(),
            task: Task::DevelopPrimary,
            population: DEVELOPING_POPULATION,
            x,
            y: DimensionParams::pitch(),
            eval_kind: EvalKind::Traditional,
        };
        colony.set_task(Task::DevelopPrimary);
        colony
    }

    /// Switch stage; populations and feedback follow the preset.
    pub fn set_task(&mut self, task: Task) {
        self.task = task;
        let x = DimensionParams::thought();
        let y = DimensionParams::pitch();
        match task {
            Task::DevelopPrimary => {
                self.population = DEVELOPING_POPULATION;
                self.x = x;
                self.y = y;
            }
            Task::DevelopSecondary => {
                self.population = DEVELOPING_POPULATION;
                self.x = x.frozen();
                self.y = y;
            }
            Task::Compose => {
                self.population = COMPOSING_POPULATION;
                self.x = x.frozen();
                self.y = y.frozen();
            }
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn set_population(&mut self, population: usize) {
        self.population = population;
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn set_chromatic(&mut self, chromatic: bool) {
        self.eval_kind = if chromatic {
            EvalKind::Chromatic
        } else {
            EvalKind::Traditional
        };
    }

    /// Switch the fraction mode on both dimensions.
    pub fn set_fraction_mode(&mut self, mode: FractionMode) {
        self.thought_graph.set_fraction_mode(mode);
        self.locus_graph.set_fraction_mode(mode);
    }

    pub fn eval_kind(&self) -> EvalKind {
        self.eval_kind
    }

    pub fn cf(&self) -> &CantusFirmus {
        self.locus_graph.cf()
    }

    pub fn locus_graph(&self) -> &LocusGraph {
        &self.locus_graph
    }

    pub fn thought_graph(&self) -> &PheromoneGraph<ThoughtNode> {
        &self.thought_graph
    }

    pub fn threads(&self) -> &[CounterpointThread] {
        &self.threads
    }

    pub fn take_threads(&mut self) -> Vec<CounterpointThread> {
        std::mem::take(&mut self.threads)
    }

    pub fn set_threads(&mut self, threads: Vec<CounterpointThread>) {
        self.threads = threads;
    }

    /// Seed a fresh population of entry-note threads.
    pub fn init_population(&mut self, rng: &mut impl Rng) -> Result<(), GraphError> {
        let mut threads = Vec::with_capacity(self.population);
        for _ in 0..self.population {
            threads.push(CounterpointThread::new(self.locus_graph.start(rng)?));
        }
        self.threads = threads;
        Ok(())
    }

    /// Resolve the categorical dimension for the next step. The
    /// leading tone (B or F) forces conjunct resolution, and a prior
    /// leap beyond the fourth forces a short-term complement; anything
    /// else takes two selections on the thought graph.
    fn resolve_thought(
        &mut self,
        length: usize,
        current: Pitch,
        last_path: Option<PitchPath>,
        rng: &mut impl Rng,
    ) -> Result<(MusicThought, Vec<Move<ThoughtNode>>), ColonyError> {
        if length >= 2 && matches!(current.letter(), 'B' | 'F') {
            return Ok((MusicThought::DirectionalConjunct, Vec::new()));
        }
        if length >= 2 && last_path.is_some_and(|p| p.abs_diff() > 5) {
            return Ok((MusicThought::ComplementalShortTerm, Vec::new()));
        }
        let m0 = self.thought_graph.select_from(
            ThoughtNode::Start,
            self.x.explore_chance,
            self.x.deposit,
            rng,
        )?;
        let m1 = self.thought_graph.select_from(
            m0.selected.to,
            self.x.explore_chance,
            self.x.deposit,
            rng,
        )?;
        let thought = MusicThought::classify(m0.selected.to, m1.selected.to)?;
        Ok((thought, vec![m0, m1]))
    }

    /// Advance one thread by one locus.
    fn step(
        &mut self,
        thread: &mut CounterpointThread,
        rng: &mut impl Rng,
    ) -> Result<(), ColonyError> {
        let Some(current) = thread.current() else {
            return Ok(());
        };
        let locus = thread.len();
        let ctx = thread.context();
        let (thought, thought_moves) =
            self.resolve_thought(thread.len(), current, thread.last_pitch_path(), rng)?;

        let candidates = self.locus_graph.candidates(locus, current);
        let filtered: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| {
                let edge = &self.locus_graph.layer(locus)[i];
                thought.admits(&ctx, PitchPath::of(current, edge.to))
            })
            .collect();
        // A category that admits nothing falls through to the full
        // candidate set rather than failing the step.
        let pool = if filtered.is_empty() {
            &candidates
        } else {
            &filtered
        };
        let pitch_move = self.locus_graph.select_among(
            locus,
            pool,
            self.y.explore_chance,
            self.y.deposit,
            rng,
        )?;
        thread.record(Trace {
            thought: Some(thought),
            thought_moves,
            pitch_move,
        });
        if thread.len() == self.locus_graph.cf().len() {
            thread.set_completed(true);
        }
        Ok(())
    }

    /// One synchronized round: every unfinished thread steps once,
    /// then both graphs evaporate.
    pub fn navigate_round(&mut self, rng: &mut impl Rng) -> Result<(), ColonyError> {
        let mut threads = self.take_threads();
        let mut outcome = Ok(());
        for thread in threads.iter_mut() {
            if thread.is_completed() {
                continue;
            }
            if let Err(error) = self.step(thread, rng) {
                outcome = Err(error);
                break;
            }
        }
        self.threads = threads;
        outcome?;
        self.evaporate();
        Ok(())
    }

    pub fn evaporate(&mut self) {
        self.thought_graph.evaporate(self.x.evaporate_rate);
        self.locus_graph.evaporate(self.y.evaporate_rate);
    }

    /// Walk the whole population to completion: one round per locus.
    pub fn run(&mut self, rng: &mut impl Rng) -> Result<(), ColonyError> {
        for round in 1..self.locus_graph.cf().len() {
            self.navigate_round(rng)?;
            debug!("counterpoint round {round} done");
        }
        Ok(())
    }

    pub fn all_completed(&self) -> bool {
        self.threads.iter().all(CounterpointThread::is_completed)
    }

    /// A single full walk, outside the round loop. Used to produce
    /// fresh parents for the evolutionary layer; evaporation stays
    /// with the round loop.
    pub fn develop_thread(&mut self, rng: &mut impl Rng) -> Result<CounterpointThread, ColonyError> {
        let mut thread = CounterpointThread::new(self.locus_graph.start(rng)?);
        while !thread.is_completed() {
            self.step(&mut thread, rng)?;
        }
        Ok(thread)
    }

    pub fn average_eval(&self) -> f64 {
        if self.threads.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .threads
            .iter()
            .map(|t| eval::evaluate(t.melody(), self.cf(), self.eval_kind))
            .sum();
        total / self.threads.len() as f64
    }

    /// Rank the population best-first by fitness.
    pub fn sort_by_eval(&mut self) {
        let cf = self.locus_graph.cf().clone();
        let kind = self.eval_kind;
        let mut keyed: Vec<(f64, CounterpointThread)> = self
            .take_threads()
            .into_iter()
            .map(|t| (eval::evaluate(t.melody(), &cf, kind), t))
            .collect();
        keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        self.threads = keyed.into_iter().map(|(_, t)| t).collect();
    }

    /// Merge offspring into the population: distinct melodies only,
    /// ranked, truncated to the population size.
    pub fn insert(&mut self, offspring: Vec<CounterpointThread>) {
        let mut merged = offspring;
        merged.extend(self.take_threads());
        let mut distinct: Vec<CounterpointThread> = Vec::with_capacity(merged.len());
        for thread in merged {
            if !distinct.iter().any(|t| t.melody() == thread.melody()) {
                distinct.push(thread);
            }
        }
        self.threads = distinct;
        self.sort_by_eval();
        self.threads.truncate(self.population);
    }
}

/// Colony of free-walking reference-line threads.
#[derive(Debug)]
pub struct CantusColony {
    thought_graph: PheromoneGraph<ThoughtNode>,
    pitch_graph: PheromoneGraph<Pitch>,
    threads: Vec<CantusThread>,
    mode: Mode,
    x: DimensionParams,
    y: DimensionParams,
    params: CantusParams,
    round: usize,
}

impl CantusColony {
    pub fn new(
        mode: Mode,
        params: CantusParams,
        pitch_graph: PheromoneGraph<Pitch>,
        rng: &mut impl Rng,
    ) -> Self {
        let x = DimensionParams::cantus_thought();
        let y = DimensionParams::cantus_pitch();
        let thought_graph = thought_space(x.alpha, x.beta);
        let finals = mode.terminals(false);
        let threads = (0..params.population)
            .map(|_| CantusThread::new(mode, finals[rng.random_range(0..finals.len())]))
            .collect();
        CantusColony {
            thought_graph,
            pitch_graph,
            threads,
            mode,
            x,
            y,
            params,
            round: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch the fraction mode on both dimensions.
    pub fn set_fraction_mode(&mut self, mode: FractionMode) {
        self.thought_graph.set_fraction_mode(mode);
        self.pitch_graph.set_fraction_mode(mode);
    }

    pub fn threads(&self) -> &[CantusThread] {
        &self.threads
    }

    pub fn pitch_graph(&self) -> &PheromoneGraph<Pitch> {
        &self.pitch_graph
    }

    pub fn thought_graph(&self) -> &PheromoneGraph<ThoughtNode> {
        &self.thought_graph
    }

    pub fn all_completed(&self) -> bool {
        self.threads.iter().all(CantusThread::is_completed)
    }

    fn resolve_thought(
        &mut self,
        length: usize,
        current: Pitch,
        last_path: Option<PitchPath>,
        rng: &mut impl Rng,
    ) -> Result<(MusicThought, Vec<Move<ThoughtNode>>), ColonyError> {
        if length >= 2 && matches!(current.letter(), 'B' | 'F') {
            return Ok((MusicThought::DirectionalConjunct, Vec::new()));
        }
        if length >= 2 && last_path.is_some_and(|p| p.diatonic_diff().abs() > 2) {
            return Ok((MusicThought::ComplementalShortTerm, Vec::new()));
        }
        let m0 = self.thought_graph.select_from(
            ThoughtNode::Start,
            self.x.explore_chance,
            self.x.deposit,
            rng,
        )?;
        let m1 = self.thought_graph.select_from(
            m0.selected.to,
            self.x.explore_chance,
            self.x.deposit,
            rng,
        )?;
        let thought = MusicThought::classify(m0.selected.to, m1.selected.to)?;
        // Return to Start, so the next step's pair begins at the root.
        let m2 = self.thought_graph.select_from(
            m1.selected.to,
            self.x.explore_chance,
            self.x.deposit,
            rng,
        )?;
        Ok((thought, vec![m0, m1, m2]))
    }

    /// The cadence short-circuit: past the length threshold, a
    /// reachable formula may close the line, with probability biased
    /// toward exploitation.
    fn try_cadence(&self, thread: &mut CantusThread, rng: &mut impl Rng) -> bool {
        let Some(current) = thread.current() else {
            return false;
        };
        let reachable = self.mode.cadences().into_iter().find(|c| {
            c.path_to_cadence(current)
                .is_some_and(|conn| conn.from == current)
        });
        match reachable {
            Some(cadence) if rng.random::<f64>() > self.y.explore_chance => {
                thread.append_cadence(&cadence)
            }
            _ => false,
        }
    }

    /// One pitch step under the resolved category. Returns false when
    /// the category admits no step (the caller re-draws the category).
    fn pitch_step(
        &mut self,
        thread: &mut CantusThread,
        thought: MusicThought,
        thought_moves: Vec<Move<ThoughtNode>>,
        rng: &mut impl Rng,
    ) -> Result<bool, ColonyError> {
        let Some(current) = thread.current() else {
            return Ok(true);
        };
        let ctx = thread.context();
        let candidates: Vec<usize> = self
            .pitch_graph
            .edges_from(current)
            .into_iter()
            .filter(|&i| {
                let edge = self.pitch_graph.edge(i);
                thought.admits(&ctx, PitchPath::of(current, edge.to))
            })
            .collect();
        if candidates.is_empty() {
            return Ok(false);
        }
        let pitch_move = self.pitch_graph.select(
            &candidates,
            self.y.explore_chance,
            self.y.deposit,
            rng,
        )?;
        thread.record(Trace {
            thought: Some(thought),
            thought_moves,
            pitch_move,
        });
        Ok(true)
    }

    /// One synchronized round over all unfinished threads, then one
    /// evaporation pass on both graphs.
    pub fn navigate_round(&mut self, rng: &mut impl Rng) -> Result<(), ColonyError> {
        self.round += 1;
        let to_cadence = self.round > self.params.cadence_threshold;
        let mut threads = std::mem::take(&mut self.threads);
        let mut outcome = Ok(());
        'threads: for thread in threads.iter_mut() {
            if thread.is_completed() {
                continue;
            }
            let Some(current) = thread.current() else {
                continue;
            };
            loop {
                let (thought, moves) = match self.resolve_thought(
                    thread.len(),
                    current,
                    thread.last_pitch_path(),
                    rng,
                ) {
                    Ok(resolved) => resolved,
                    Err(error) => {
                        outcome = Err(error);
                        break 'threads;
                    }
                };
                if to_cadence && self.try_cadence(thread, rng) {
                    break;
                }
                match self.pitch_step(thread, thought, moves, rng) {
                    Ok(true) => break,
                    Ok(false) => continue,
                    Err(error) => {
                        outcome = Err(error);
                        break 'threads;
                    }
                }
            }
        }
        self.threads = threads;
        outcome?;
        self.thought_graph.evaporate(self.x.evaporate_rate);
        self.pitch_graph.evaporate(self.y.evaporate_rate);
        Ok(())
    }

    /// Run rounds until every line has cadenced or the cap is hit.
    pub fn run(&mut self, max_rounds: usize, rng: &mut impl Rng) -> Result<(), ColonyError> {
        for _ in 0..max_rounds {
            if self.all_completed() {
                break;
            }
            self.navigate_round(rng)?;
        }
        debug!(
            "cantus colony: {} of {} lines completed after {} rounds",
            self.threads.iter().filter(|t| t.is_completed()).count(),
            self.threads.len(),
            self.round
        );
        Ok(())
    }

    /// The completed reference lines, frozen.
    pub fn completed_lines(&self) -> Vec<CantusFirmus> {
        self.threads
            .iter()
            .filter(|t| t.is_completed())
            .map(CantusThread::to_cantus)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locus::LocusGraph;
    use crate::pitch::{Pitch::*, pitch_space};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fux_dorian() -> CantusFirmus {
        CantusFirmus::new(
            Mode::Dorian,
            vec![D4, F4, E4, D4, G4, F4, A4, G4, F4, E4, D4],
        )
    }

    fn small_colony(seed: u64) -> (CounterpointColony, StdRng) {
        let free = pitch_space(1.0, 1.0);
        let graph = LocusGraph::build(fux_dorian(), true, 1.0, 1.0, &free).unwrap();
        let mut colony = CounterpointColony::new(graph);
        colony.set_population(8);
        let mut rng = StdRng::seed_from_u64(seed);
        colony.init_population(&mut rng).unwrap();
        (colony, rng)
    }

    #[test]
    fn rounds_complete_every_thread() {
        let (mut colony, mut rng) = small_colony(42);
        colony.run(&mut rng).unwrap();
        assert!(colony.all_completed());
        for thread in colony.threads() {
            assert_eq!(thread.len(), colony.cf().len());
        }
    }

    #[test]
    fn generated_lines_are_consonant_throughout() {
        let (mut colony, mut rng) = small_colony(7);
        colony.run(&mut rng).unwrap();
        for thread in colony.threads() {
            for (locus, &note) in thread.melody().notes().iter().enumerate() {
                let cf_note = colony.cf().note(locus).unwrap();
                assert!(
                    crate::motion::consonant(note, cf_note),
                    "dissonance {note} against {cf_note} at locus {locus}"
                );
            }
        }
    }

    #[test]
    fn colony_walks_are_deterministic_per_seed() {
        let walk = |seed: u64| {
            let (mut colony, mut rng) = small_colony(seed);
            colony.run(&mut rng).unwrap();
            colony
                .threads()
                .iter()
                .map(|t| t.melody().labels())
                .collect::<Vec<_>>()
        };
        assert_eq!(walk(5), walk(5));
        assert_ne!(walk(5), walk(6));
    }

    #[test]
    fn compose_task_freezes_trails() {
        let (mut colony, mut rng) = small_colony(13);
        colony.set_task(Task::Compose);
        colony.set_population(4);
        colony.init_population(&mut rng).unwrap();
        colony.run(&mut rng).unwrap();
        assert!(colony.locus_graph().is_blank());
        assert!(colony.thought_graph().is_blank());
    }

    #[test]
    fn insert_keeps_population_bounded_and_distinct() {
        let (mut colony, mut rng) = small_colony(3);
        colony.run(&mut rng).unwrap();
        let extra = colony.develop_thread(&mut rng).unwrap();
        let duplicate = CounterpointThread::from_melody(extra.melody().clone());
        colony.insert(vec![extra, duplicate]);
        assert!(colony.threads().len() <= colony.population());
        for (i, a) in colony.threads().iter().enumerate() {
            for b in colony.threads().iter().skip(i + 1) {
                assert_ne!(a.melody(), b.melody());
            }
        }
    }

    #[test]
    fn cantus_colony_produces_cadenced_lines() {
        let mut rng = StdRng::seed_from_u64(17);
        let params = CantusParams {
            population: 12,
            ..CantusParams::default()
        };
        let mut colony = CantusColony::new(Mode::Dorian, params, pitch_space(1.0, 1.0), &mut rng);
        colony.run(60, &mut rng).unwrap();
        let lines = colony.completed_lines();
        assert!(!lines.is_empty(), "no line cadenced within the cap");
        for line in &lines {
            assert_eq!(line.mode(), Mode::Dorian);
            // Every completed line closes on the final.
            assert_eq!(line.melody().last().map(|p| p.letter()), Some('D'));
            assert!(line.len() > CantusParams::default().cadence_threshold);
        }
    }
}
