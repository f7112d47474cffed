// The locus-indexed constrained pitch graph.
//
// Given a fixed reference line (cantus firmus) and a voice role (above
// or below it), this graph holds, per sequence position ("locus"),
// exactly the pitch steps a counterpoint voice may legally take there.
// Construction is incremental: locus 0 is seeded from the mode's
// terminals, each middle locus extends the previous layer through the
// free pitch space filtered by the full legality conjunction, and the
// last two loci are merged into the mode's cadence formulas. A
// backward sweep then removes every step whose destination has no
// continuation; without it a walk could reach a trap at a late locus
// with no escape. If the layer list does not reach the reference
// length, the reference line is infeasible for this role and
// construction fails; callers must discard the line, not retry.
//
// The layer list is structurally frozen after pruning; only pheromone
// values mutate during search. Path counting encodes the layers as a
// 0/1 transition matrix over (locus, pitch) pairs and raises it to
// (layers - 1); the sum of the result is the exact number of legal
// completions, used to rank reference lines by the room they leave.

use rand::Rng;
use thiserror::Error;

use crate::graph::{
    Edge, FractionMode, GraphError, Move, PathState, PheromoneGraph, TieBreak, roulette_pick,
};
use crate::melody::CantusFirmus;
use crate::mode::{Cadence, Mode};
use crate::motion;
use crate::pitch::{Pitch, PitchPath};

#[derive(Debug, Error)]
pub enum LocusError {
    /// The constrained graph cannot reach the reference length: the
    /// reference line leaves this role no legal completion.
    #[error("immature constrained graph (above={above}): {got} of {expected} loci reachable")]
    Immature {
        expected: usize,
        got: usize,
        above: bool,
    },
}

/// Position-indexed constrained graph for one voice role against one
/// reference line.
#[derive(Debug, Clone)]
pub struct LocusGraph {
    cf: CantusFirmus,
    above: bool,
    layers: Vec<Vec<Edge<Pitch>>>,
    pub alpha: f64,
    pub beta: f64,
    pub fraction_mode: FractionMode,
    pub tie_break: TieBreak,
}

impl LocusGraph {
    /// Construct the full layer list for `cf`, prune dead ends, and
    /// verify completeness.
    pub fn build(
        cf: CantusFirmus,
        above: bool,
        alpha: f64,
        beta: f64,
        free: &PheromoneGraph<Pitch>,
    ) -> Result<Self, LocusError> {
        let length = cf.len();
        if length < 5 {
            return Err(LocusError::Immature {
                expected: length,
                got: 0,
                above,
            });
        }

        let mut graph = LocusGraph {
            cf,
            above,
            layers: Vec::with_capacity(length),
            alpha,
            beta,
            fraction_mode: FractionMode::Coefficient,
            tie_break: FractionMode::Coefficient.default_tie_break(),
        };

        // Cadences whose final would overlap the reference final are
        // unusable for this role.
        let cadences: Vec<Cadence> = graph
            .mode()
            .cadences()
            .into_iter()
            .filter(|c| !graph.overlapping(c.last(), length - 1))
            .collect();

        // Locus 0: the mode's terminals (dominants included for the
        // upper voice), minus overlaps against the reference opening.
        let starts: Vec<Edge<Pitch>> = graph
            .mode()
            .terminals(above)
            .into_iter()
            .filter(|&p| !graph.overlapping(p, 0))
            .map(|p| Edge {
                from: None,
                to: p,
                cost: 1.0,
                pheromone: 0.0,
            })
            .collect();
        graph.layers.push(starts);

        // Middle loci: extend every reachable pitch through the free
        // space, keeping only legal steps.
        for locus in 1..=length - 3 {
            let mut layer: Vec<Edge<Pitch>> = Vec::new();
            let froms: Vec<Pitch> = graph.layers[locus - 1].iter().map(|e| e.to).collect();
            for from in froms {
                for index in free.edges_from(from) {
                    let step = free.edge(index);
                    let path = PitchPath::of(from, step.to);
                    if graph.stylistic_departures(path, locus) {
                        continue;
                    }
                    if !layer.iter().any(|e| e.from == Some(from) && e.to == step.to) {
                        layer.push(Edge::new(from, step.to, step.cost));
                    }
                }
            }
            graph.layers.push(layer);
        }

        // Final two loci: merge into compatible cadence formulas. The
        // approach path is re-derived from the layer edge because the
        // Aeolian connection substitutes the raised degree.
        let mut penultimate: Vec<Edge<Pitch>> = Vec::new();
        let mut last: Vec<Edge<Pitch>> = Vec::new();
        let closing_layer = length - 3;
        for index in 0..graph.layers[closing_layer].len() {
            let (from, to) = {
                let edge = &graph.layers[closing_layer][index];
                (edge.from, edge.to)
            };
            let Some(from) = from else { continue };
            for cadence in &cadences {
                let Some(connection) = cadence.path_to_cadence(to) else {
                    continue;
                };
                let approach = PitchPath::of(from, connection.from);
                if !motion::melodic_feasible(approach)
                    || graph.stylistic_departures(approach, closing_layer)
                    || graph.stylistic_departures(connection, length - 2)
                {
                    continue;
                }
                push_unique(&mut penultimate, connection);
                push_unique(&mut last, cadence.pitch_path());
                if graph.mode() == Mode::Aeolian {
                    graph.layers[closing_layer][index].to = connection.from;
                }
            }
        }
        if !penultimate.is_empty() && !last.is_empty() {
            graph.layers.push(penultimate);
            graph.layers.push(last);
        }

        if graph.layers.len() != length {
            return Err(LocusError::Immature {
                expected: length,
                got: graph.layers.len(),
                above,
            });
        }

        graph.prune_dead_ends();

        if let Some(got) = graph.layers.iter().position(|layer| layer.is_empty()) {
            return Err(LocusError::Immature {
                expected: length,
                got,
                above,
            });
        }
        Ok(graph)
    }

    /// Backward sweep removing every step whose destination has no
    /// continuation in the next layer.
    fn prune_dead_ends(&mut self) {
        for locus in (0..self.layers.len() - 1).rev() {
            let (head, tail) = self.layers.split_at_mut(locus + 1);
            let next = &tail[0];
            head[locus].retain(|edge| next.iter().any(|n| n.from == Some(edge.to)));
        }
    }

    /// Switch the fraction mode, keeping the tie-break policy in step.
    pub fn set_fraction_mode(&mut self, mode: FractionMode) {
        self.fraction_mode = mode;
        self.tie_break = mode.default_tie_break();
    }

    pub fn cf(&self) -> &CantusFirmus {
        &self.cf
    }

    pub fn mode(&self) -> Mode {
        self.cf.mode()
    }

    pub fn is_above(&self) -> bool {
        self.above
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|layer| layer.is_empty())
    }

    pub fn layer(&self, locus: usize) -> &[Edge<Pitch>] {
        &self.layers[locus]
    }

    /// Indices of the steps at `locus` leaving `from`.
    pub fn candidates(&self, locus: usize, from: Pitch) -> Vec<usize> {
        self.layers[locus]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.from == Some(from))
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the steps at `locus` arriving at `to`.
    pub fn arrivals(&self, locus: usize, to: Pitch) -> Vec<usize> {
        self.layers[locus]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.to == to)
            .map(|(i, _)| i)
            .collect()
    }

    /// A uniformly drawn starting pitch from locus 0.
    pub fn start(&self, rng: &mut impl Rng) -> Result<Pitch, GraphError> {
        let starts: Vec<Pitch> = self.layers[0].iter().map(|e| e.to).collect();
        if starts.is_empty() {
            return Err(GraphError::EmptyCandidates);
        }
        Ok(starts[rng.random_range(0..starts.len())])
    }

    fn fraction(&self, edge: &Edge<Pitch>) -> f64 {
        self.fraction_mode
            .fraction(edge.pheromone, edge.cost, self.alpha, self.beta)
    }

    /// Roulette selection among the given step indices of `locus`,
    /// depositing on the winner before the move is returned.
    pub fn select_among(
        &mut self,
        locus: usize,
        indices: &[usize],
        explore_chance: f64,
        deposit: f64,
        rng: &mut impl Rng,
    ) -> Result<Move<Pitch>, GraphError> {
        if indices.is_empty() {
            return Err(GraphError::EmptyCandidates);
        }
        let fractions: Vec<f64> = indices
            .iter()
            .map(|&i| self.fraction(&self.layers[locus][i]))
            .collect();
        let (pick, exploring) = roulette_pick(&fractions, explore_chance, self.tie_break, rng);
        let winner = indices[pick];
        self.layers[locus][winner].deposit(deposit);
        let snapshot = indices
            .iter()
            .map(|&i| {
                let edge = &self.layers[locus][i];
                (edge.key(), edge.pheromone)
            })
            .collect();
        Ok(Move {
            selected: self.layers[locus][winner].key(),
            exploring,
            snapshot,
        })
    }

    /// Selection over every step at `locus` leaving `from`.
    pub fn select(
        &mut self,
        locus: usize,
        from: Pitch,
        explore_chance: f64,
        deposit: f64,
        rng: &mut impl Rng,
    ) -> Result<Move<Pitch>, GraphError> {
        let indices = self.candidates(locus, from);
        self.select_among(locus, &indices, explore_chance, deposit, rng)
    }

    /// One evaporation sweep over every layer.
    pub fn evaporate(&mut self, rate: f64) {
        for layer in &mut self.layers {
            for edge in layer {
                edge.evaporate(rate);
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.layers
            .iter()
            .all(|layer| layer.iter().all(|e| e.pheromone == 0.0))
    }

    /// Exact number of legal completions, by transition-matrix power.
    pub fn path_count(&self) -> u128 {
        count_paths(&self.layers)
    }

    /// Per-locus pheromone state, for persistence by collaborators.
    pub fn export_state(&self) -> Vec<Vec<PathState>> {
        self.layers
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .map(|e| PathState {
                        from: e.from.map(|p| p.to_string()),
                        to: e.to.to_string(),
                        cost: e.cost,
                        pheromone: e.pheromone,
                    })
                    .collect()
            })
            .collect()
    }

    pub fn import_state(&mut self, states: &[Vec<PathState>]) -> Result<(), GraphError> {
        for (layer, layer_states) in self.layers.iter_mut().zip(states) {
            for state in layer_states {
                let found = layer.iter_mut().find(|e| {
                    e.from.map(|p| p.to_string()) == state.from && e.to.to_string() == state.to
                });
                match found {
                    Some(edge) => {
                        edge.cost = state.cost;
                        edge.pheromone = state.pheromone;
                    }
                    None => {
                        return Err(GraphError::UnknownPath {
                            from: state.from.clone(),
                            to: state.to.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // ── Legality rules ──

    /// Vertical consonance against the reference note at `locus`.
    pub fn consonance_at(&self, pitch: Pitch, locus: usize) -> bool {
        self.cf
            .note(locus)
            .is_some_and(|cf_note| motion::consonant(pitch, cf_note))
    }

    /// Forbidden motion against the reference step into `locus`.
    pub fn forbidden_motion(&self, step: PitchPath, locus: usize) -> bool {
        let Some(cf_step) = motion::reference_step(&self.cf, locus) else {
            return true;
        };
        motion::forbidden_hidden_parallel(step, cf_step)
            || motion::forbidden_parallel(step, cf_step)
            || motion::forbidden_leap(step, cf_step)
            || motion::devil_across_voices(step, cf_step)
    }

    /// The counterpoint voice may not cross to the wrong side of the
    /// reference note at `locus`.
    fn overlapping(&self, pitch: Pitch, locus: usize) -> bool {
        let Some(cf_note) = self.cf.note(locus) else {
            return true;
        };
        let diff = cf_note.diff(pitch);
        diff != 0 && (self.above != (diff > 0))
    }

    /// Crossing: the step's origin against the current reference note,
    /// or its destination against the previous one.
    fn voice_crossing(&self, step: PitchPath, locus: usize) -> bool {
        locus == 0
            || self.overlapping(step.from, locus)
            || self.overlapping(step.to, locus - 1)
    }

    fn unison_at(&self, pitch: Pitch, locus: usize) -> bool {
        self.cf.note(locus) == Some(pitch)
    }

    /// The full legality conjunction for a step landing on `locus`.
    fn stylistic_departures(&self, step: PitchPath, locus: usize) -> bool {
        !self.consonance_at(step.to, locus)
            || self.forbidden_motion(step, locus)
            || self.overlapping(step.to, locus)
            || self.voice_crossing(step, locus)
            || self.unison_at(step.to, locus)
    }
}

fn push_unique(layer: &mut Vec<Edge<Pitch>>, path: PitchPath) {
    if !layer
        .iter()
        .any(|e| e.from == Some(path.from) && e.to == path.to)
    {
        layer.push(Edge::new(path.from, path.to, 1.0));
    }
}

/// Encode the layers as a square 0/1 transition matrix over
/// (locus, pitch) pairs, raise it to (layers - 1), and sum the
/// surviving entries: the exact count of complete legal paths.
pub(crate) fn count_paths(layers: &[Vec<Edge<Pitch>>]) -> u128 {
    if layers.len() < 2 {
        return layers.first().map_or(0, |l| l.len() as u128);
    }
    let mut states: Vec<(usize, Pitch)> = Vec::new();
    for (locus, layer) in layers.iter().enumerate() {
        for edge in layer {
            if !states.contains(&(locus, edge.to)) {
                states.push((locus, edge.to));
            }
        }
    }
    let size = states.len();
    let mut matrix = vec![vec![0u128; size]; size];
    for (r, &(from_locus, from_pitch)) in states.iter().enumerate() {
        for (c, &(to_locus, to_pitch)) in states.iter().enumerate() {
            let connected = to_locus == from_locus + 1
                && layers[to_locus]
                    .iter()
                    .any(|e| e.from == Some(from_pitch) && e.to == to_pitch);
            if connected {
                matrix[r][c] = 1;
            }
        }
    }
    let product = matrix_power(&matrix, layers.len() - 1);
    product.iter().flatten().sum()
}

fn matrix_power(matrix: &[Vec<u128>], power: usize) -> Vec<Vec<u128>> {
    let size = matrix.len();
    let mut result = matrix.to_vec();
    for _ in 1..power {
        let left = result;
        result = vec![vec![0u128; size]; size];
        for r in 0..size {
            for c in 0..size {
                let mut sum = 0u128;
                for (n, row) in matrix.iter().enumerate() {
                    sum += left[r][n] * row[c];
                }
                result[r][c] = sum;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::{Pitch::*, pitch_space};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// The classic Dorian teaching cantus firmus.
    fn fux_dorian() -> CantusFirmus {
        CantusFirmus::new(
            Mode::Dorian,
            vec![D4, F4, E4, D4, G4, F4, A4, G4, F4, E4, D4],
        )
    }

    fn upper_graph() -> LocusGraph {
        let free = pitch_space(1.0, 1.0);
        LocusGraph::build(fux_dorian(), true, 1.0, 1.0, &free).unwrap()
    }

    #[test]
    fn builds_to_full_length() {
        let graph = upper_graph();
        assert_eq!(graph.len(), 11);
        for locus in 0..graph.len() {
            assert!(!graph.layer(locus).is_empty(), "empty layer {locus}");
        }
    }

    #[test]
    fn reachability_after_pruning() {
        let graph = upper_graph();
        for locus in 1..graph.len() {
            for edge in graph.layer(locus) {
                let from = edge.from.unwrap();
                assert!(
                    graph.layer(locus - 1).iter().any(|prev| prev.to == from),
                    "unreachable step {from} -> {} at locus {locus}",
                    edge.to
                );
            }
        }
    }

    #[test]
    fn every_layer_is_consonant() {
        let graph = upper_graph();
        for locus in 0..graph.len() {
            for edge in graph.layer(locus) {
                assert!(
                    graph.consonance_at(edge.to, locus),
                    "dissonant arrival {} at locus {locus}",
                    edge.to
                );
            }
        }
    }

    #[test]
    fn upper_voice_stays_above() {
        let graph = upper_graph();
        let cf = fux_dorian();
        for locus in 0..graph.len() {
            let cf_note = cf.note(locus).unwrap();
            for edge in graph.layer(locus) {
                assert!(
                    edge.to.chromatic_number() >= cf_note.chromatic_number(),
                    "{} sits below the reference at locus {locus}",
                    edge.to
                );
            }
        }
    }

    #[test]
    fn closes_on_a_dorian_cadence() {
        let graph = upper_graph();
        let last = graph.layer(graph.len() - 1);
        for edge in last {
            assert_eq!(edge.from.map(|p| p.letter()), Some('C'));
            assert_eq!(edge.to.letter(), 'D');
        }
    }

    #[test]
    fn short_reference_is_immature() {
        let free = pitch_space(1.0, 1.0);
        let cf = CantusFirmus::new(Mode::Dorian, vec![D4, E4, D4]);
        assert!(matches!(
            LocusGraph::build(cf, true, 1.0, 1.0, &free),
            Err(LocusError::Immature { .. })
        ));
    }

    #[test]
    fn counting_matches_hand_enumeration() {
        // Two starts, fully connected into two middles, merging into
        // one final: 2 * 2 * 1 = 4 complete paths.
        let layers = vec![
            vec![
                Edge {
                    from: None,
                    to: A3,
                    cost: 1.0,
                    pheromone: 0.0,
                },
                Edge {
                    from: None,
                    to: C4,
                    cost: 1.0,
                    pheromone: 0.0,
                },
            ],
            vec![
                Edge::new(A3, B3, 1.0),
                Edge::new(A3, D4, 1.0),
                Edge::new(C4, B3, 1.0),
                Edge::new(C4, D4, 1.0),
            ],
            vec![Edge::new(B3, C4, 1.0), Edge::new(D4, C4, 1.0)],
        ];
        assert_eq!(count_paths(&layers), 4);
    }

    #[test]
    fn full_graph_counts_positive() {
        let graph = upper_graph();
        assert!(graph.path_count() > 0);
    }

    #[test]
    fn selection_walks_stay_inside_layers() {
        let mut graph = upper_graph();
        let mut rng = StdRng::seed_from_u64(11);
        let mut current = graph.start(&mut rng).unwrap();
        for locus in 1..graph.len() {
            let mv = graph.select(locus, current, 0.2, 1.0, &mut rng).unwrap();
            assert_eq!(mv.selected.from, Some(current));
            current = mv.selected.to;
        }
        assert_eq!(current.letter(), 'D');
    }

    #[test]
    fn evaporation_keeps_pheromone_nonnegative() {
        let mut graph = upper_graph();
        let mut rng = StdRng::seed_from_u64(3);
        let start = graph.start(&mut rng).unwrap();
        graph.select(1, start, 0.0, 1.0, &mut rng).unwrap();
        for _ in 0..100 {
            graph.evaporate(0.5);
        }
        for locus in 0..graph.len() {
            for edge in graph.layer(locus) {
                assert!(edge.pheromone >= 0.0);
            }
        }
    }

    #[test]
    fn state_roundtrip_per_locus() {
        let mut graph = upper_graph();
        let mut rng = StdRng::seed_from_u64(21);
        let start = graph.start(&mut rng).unwrap();
        graph.select(1, start, 0.0, 0.7, &mut rng).unwrap();
        let exported = graph.export_state();
        let mut fresh = upper_graph();
        fresh.import_state(&exported).unwrap();
        assert_eq!(fresh.export_state(), exported);
    }
}
