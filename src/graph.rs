// Colony engine: pheromone-weighted directed graph with stochastic
// edge selection and evaporation.
//
// A graph is a flat arena of edges. Each edge carries a static cost
// (from the music-theoretic interval tables) and a mutable pheromone
// trail that selection deposits onto and evaporation decays. Selection
// combines the two into a "fraction" under one of three modes, then
// either explores (uniform pick) or exploits (roulette wheel over the
// fractions).
//
// The roulette boundary comparison differs between modes: PowerMultiply
// must keep a zero-pheromone edge selectable (the whole product
// collapses to zero), so it compares inclusively; the additive modes
// compare exclusively. Both policies are kept as an explicit switch.
//
// Consumed by thought.rs / pitch.rs for the flat walk spaces and by
// locus.rs, which reuses the fraction and roulette primitives over its
// per-locus layers.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How pheromone and cost combine into a selection fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FractionMode {
    /// `pheromone * alpha + (1/cost) * beta`
    Coefficient,
    /// `pheromone^alpha + (1/cost)^beta`
    Power,
    /// `pheromone^alpha * (1/cost)^beta`
    PowerMultiply,
}

/// Roulette boundary comparison policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Threshold must be strictly below the slice (`<`).
    Exclusive,
    /// Threshold may sit on the slice boundary (`<=`). Required for
    /// PowerMultiply, where an all-zero fraction vector must still
    /// select its first candidate.
    Inclusive,
}

impl FractionMode {
    pub fn fraction(self, pheromone: f64, cost: f64, alpha: f64, beta: f64) -> f64 {
        match self {
            FractionMode::Coefficient => pheromone * alpha + 1.0 / cost * beta,
            FractionMode::Power => pheromone.powf(alpha) + (1.0 / cost).powf(beta),
            FractionMode::PowerMultiply => pheromone.powf(alpha) * (1.0 / cost).powf(beta),
        }
    }

    pub fn default_tie_break(self) -> TieBreak {
        match self {
            FractionMode::PowerMultiply => TieBreak::Inclusive,
            _ => TieBreak::Exclusive,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// An upstream legality filter produced zero options and should
    /// have pruned earlier. Not recoverable.
    #[error("selection over an empty candidate list")]
    EmptyCandidates,
    #[error("no edge {from:?} -> {to} in this graph")]
    UnknownPath { from: Option<String>, to: String },
}

/// Identity of an edge: its endpoint labels. `from` is `None` only for
/// a synthetic entry edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeKey<N> {
    pub from: Option<N>,
    pub to: N,
}

/// A directed connection. Created once at graph construction; only
/// `pheromone` mutates afterwards, and it never drops below zero.
#[derive(Debug, Clone)]
pub struct Edge<N> {
    pub from: Option<N>,
    pub to: N,
    pub cost: f64,
    pub pheromone: f64,
}

impl<N: Copy + Eq> Edge<N> {
    pub fn new(from: N, to: N, cost: f64) -> Self {
        Edge {
            from: Some(from),
            to,
            cost,
            pheromone: 0.0,
        }
    }

    /// Synthetic entry edge into a starting node.
    pub fn entry(to: N) -> Self {
        Edge {
            from: None,
            to,
            cost: 0.0,
            pheromone: 0.0,
        }
    }

    pub fn key(&self) -> EdgeKey<N> {
        EdgeKey {
            from: self.from,
            to: self.to,
        }
    }

    pub fn deposit(&mut self, amount: f64) {
        self.pheromone += amount;
    }

    pub fn evaporate(&mut self, rate: f64) {
        self.pheromone *= 1.0 - rate;
    }

    /// Explicit reverse construction at the same cost. Entry edges
    /// have no reverse.
    pub fn reversed(&self) -> Option<Edge<N>> {
        self.reversed_with_cost(self.cost)
    }

    pub fn reversed_with_cost(&self, cost: f64) -> Option<Edge<N>> {
        self.from.map(|from| Edge::new(self.to, from, cost))
    }
}

/// A selection event. `snapshot` holds the pheromone value of every
/// candidate at selection time (the winner's value includes its fresh
/// deposit); it is audit data and is never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Move<N> {
    pub selected: EdgeKey<N>,
    pub exploring: bool,
    pub snapshot: Vec<(EdgeKey<N>, f64)>,
}

impl<N: Copy + Eq> Move<N> {
    /// Record for a forced step that bypassed selection (entry notes,
    /// forced category continuations).
    pub fn forced(key: EdgeKey<N>) -> Self {
        Move {
            selected: key,
            exploring: false,
            snapshot: Vec::new(),
        }
    }
}

/// Shared roulette primitive: exploration coin first, then either a
/// uniform pick or a cumulative walk over the fractions under the
/// given boundary policy. Returns (index, exploring).
///
/// Callers guarantee `fractions` is non-empty.
pub(crate) fn roulette_pick(
    fractions: &[f64],
    explore_chance: f64,
    tie_break: TieBreak,
    rng: &mut impl Rng,
) -> (usize, bool) {
    let exploring = rng.random::<f64>() < explore_chance;
    if exploring || fractions.len() == 1 {
        return (rng.random_range(0..fractions.len()), exploring);
    }
    let sum: f64 = fractions.iter().sum();
    let mut threshold = rng.random::<f64>() * sum;
    for (i, &fraction) in fractions.iter().enumerate() {
        let hit = match tie_break {
            TieBreak::Exclusive => threshold < fraction,
            TieBreak::Inclusive => threshold <= fraction,
        };
        if hit {
            return (i, false);
        }
        threshold -= fraction;
    }
    // Accumulated rounding can leave the threshold a hair past the last
    // slice; the last candidate owns the remainder.
    (fractions.len() - 1, false)
}

/// Serializable pheromone state of one edge, keyed by its labels.
/// The export/import pair is the persistence contract for collaborators
/// that store search state without understanding the algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathState {
    pub from: Option<String>,
    pub to: String,
    pub cost: f64,
    pub pheromone: f64,
}

/// Directed graph of labeled nodes and pheromone-bearing edges.
#[derive(Debug, Clone)]
pub struct PheromoneGraph<N> {
    edges: Vec<Edge<N>>,
    start: Option<N>,
    pub alpha: f64,
    pub beta: f64,
    pub fraction_mode: FractionMode,
    pub tie_break: TieBreak,
}

impl<N: Copy + Eq + fmt::Display> PheromoneGraph<N> {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self::with_mode(alpha, beta, FractionMode::Coefficient)
    }

    pub fn with_mode(alpha: f64, beta: f64, fraction_mode: FractionMode) -> Self {
        PheromoneGraph {
            edges: Vec::new(),
            start: None,
            alpha,
            beta,
            fraction_mode,
            tie_break: fraction_mode.default_tie_break(),
        }
    }

    /// Switch the fraction mode, keeping the tie-break policy in step.
    pub fn set_fraction_mode(&mut self, mode: FractionMode) {
        self.fraction_mode = mode;
        self.tie_break = mode.default_tie_break();
    }

    pub fn add_edge(&mut self, edge: Edge<N>) {
        self.edges.push(edge);
    }

    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = Edge<N>>) {
        self.edges.extend(edges);
    }

    pub fn set_start(&mut self, node: N) {
        self.start = Some(node);
    }

    pub fn start(&self) -> Option<N> {
        self.start
    }

    pub fn edges(&self) -> &[Edge<N>] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> &Edge<N> {
        &self.edges[index]
    }

    /// Indices of all outgoing edges of `node`.
    pub fn edges_from(&self, node: N) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.from == Some(node))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn fraction(&self, edge: &Edge<N>) -> f64 {
        self.fraction_mode
            .fraction(edge.pheromone, edge.cost, self.alpha, self.beta)
    }

    /// Stochastic selection over the given candidate edge indices.
    /// The winner receives `deposit` before the move is returned.
    pub fn select(
        &mut self,
        candidates: &[usize],
        explore_chance: f64,
        deposit: f64,
        rng: &mut impl Rng,
    ) -> Result<Move<N>, GraphError> {
        if candidates.is_empty() {
            return Err(GraphError::EmptyCandidates);
        }
        let fractions: Vec<f64> = candidates
            .iter()
            .map(|&i| self.fraction(&self.edges[i]))
            .collect();
        let (pick, exploring) = roulette_pick(&fractions, explore_chance, self.tie_break, rng);
        let winner = candidates[pick];
        self.edges[winner].deposit(deposit);
        let snapshot = candidates
            .iter()
            .map(|&i| (self.edges[i].key(), self.edges[i].pheromone))
            .collect();
        Ok(Move {
            selected: self.edges[winner].key(),
            exploring,
            snapshot,
        })
    }

    /// Selection over every outgoing edge of `node`.
    pub fn select_from(
        &mut self,
        node: N,
        explore_chance: f64,
        deposit: f64,
        rng: &mut impl Rng,
    ) -> Result<Move<N>, GraphError> {
        let candidates = self.edges_from(node);
        self.select(&candidates, explore_chance, deposit, rng)
    }

    /// One evaporation sweep over every edge. Called once per colony
    /// round, after all agents have stepped.
    pub fn evaporate(&mut self, rate: f64) {
        for edge in &mut self.edges {
            edge.evaporate(rate);
        }
    }

    /// True until any selection has deposited pheromone.
    pub fn is_blank(&self) -> bool {
        self.edges.iter().all(|e| e.pheromone == 0.0)
    }

    pub fn export_state(&self) -> Vec<PathState> {
        self.edges
            .iter()
            .map(|e| PathState {
                from: e.from.map(|n| n.to_string()),
                to: e.to.to_string(),
                cost: e.cost,
                pheromone: e.pheromone,
            })
            .collect()
    }

    /// Restore costs and pheromone trails from an exported state.
    /// Fails fast on a label pair this graph does not contain.
    pub fn import_state(&mut self, states: &[PathState]) -> Result<(), GraphError> {
        for state in states {
            let found = self.edges.iter_mut().find(|e| {
                e.from.map(|n| n.to_string()) == state.from && e.to.to_string() == state.to
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_edge_graph() -> PheromoneGraph<u8> {
        let mut g = PheromoneGraph::new(1.0, 1.0);
        g.add_edge(Edge::new(0, 1, 1.0));
        g.add_edge(Edge::new(0, 2, 4.0));
        g
    }

    #[test]
    fn fraction_modes() {
        let coefficient = FractionMode::Coefficient.fraction(2.0, 4.0, 1.0, 1.0);
        assert!((coefficient - 2.25).abs() < 1e-12);
        let power = FractionMode::Power.fraction(2.0, 4.0, 2.0, 1.0);
        assert!((power - 4.25).abs() < 1e-12);
        let multiply = FractionMode::PowerMultiply.fraction(2.0, 4.0, 2.0, 1.0);
        assert!((multiply - 1.0).abs() < 1e-12);
    }

    #[test]
    fn select_deposits_exactly_once() {
        let mut g = two_edge_graph();
        let mut rng = StdRng::seed_from_u64(7);
        let mv = g.select_from(0, 0.0, 0.1, &mut rng).unwrap();
        let total: f64 = g.edges().iter().map(|e| e.pheromone).sum();
        assert!((total - 0.1).abs() < 1e-12);
        let winner = g
            .edges()
            .iter()
            .find(|e| e.key() == mv.selected)
            .unwrap();
        assert!((winner.pheromone - 0.1).abs() < 1e-12);
    }

    #[test]
    fn snapshot_shows_post_deposit_winner() {
        let mut g = two_edge_graph();
        let mut rng = StdRng::seed_from_u64(7);
        let mv = g.select_from(0, 0.0, 0.5, &mut rng).unwrap();
        let (_, recorded) = mv
            .snapshot
            .iter()
            .find(|(key, _)| *key == mv.selected)
            .unwrap();
        assert!((recorded - 0.5).abs() < 1e-12);
    }

    #[test]
    fn evaporation_is_monotonic_and_nonnegative() {
        let mut g = two_edge_graph();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            g.select_from(0, 0.1, 1.0, &mut rng).unwrap();
        }
        let before: Vec<f64> = g.edges().iter().map(|e| e.pheromone).collect();
        g.evaporate(0.1);
        for (edge, &prev) in g.edges().iter().zip(&before) {
            assert!(edge.pheromone >= 0.0);
            if prev > 0.0 {
                assert!(edge.pheromone < prev);
            } else {
                assert_eq!(edge.pheromone, 0.0);
            }
        }
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let mut g = two_edge_graph();
        let mut rng = StdRng::seed_from_u64(1);
        let result = g.select_from(9, 0.0, 0.1, &mut rng);
        assert!(matches!(result, Err(GraphError::EmptyCandidates)));
    }

    #[test]
    fn power_multiply_selects_with_zero_pheromone() {
        let mut g = PheromoneGraph::with_mode(1.0, 1.0, FractionMode::PowerMultiply);
        g.add_edge(Edge::new(0u8, 1, 1.0));
        g.add_edge(Edge::new(0, 2, 2.0));
        assert_eq!(g.tie_break, TieBreak::Inclusive);
        let mut rng = StdRng::seed_from_u64(99);
        // All pheromones are zero, every fraction is zero; selection
        // must still succeed (cost-only boundary case).
        for _ in 0..20 {
            g.select_from(0, 0.0, 0.0, &mut rng).unwrap();
        }
    }

    #[test]
    fn selection_is_deterministic_for_a_fixed_seed() {
        let run = |seed: u64| -> Vec<u8> {
            let mut g = two_edge_graph();
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| g.select_from(0, 0.2, 0.3, &mut rng).unwrap().selected.to)
                .collect()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn state_roundtrip() {
        let mut g = two_edge_graph();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..5 {
            g.select_from(0, 0.1, 0.7, &mut rng).unwrap();
        }
        let exported = g.export_state();
        let json = serde_json::to_string(&exported).unwrap();
        let restored: Vec<PathState> = serde_json::from_str(&json).unwrap();

        let mut fresh = two_edge_graph();
        fresh.import_state(&restored).unwrap();
        assert_eq!(fresh.export_state(), exported);
    }

    #[test]
    fn import_rejects_unknown_labels() {
        let mut g = two_edge_graph();
        let state = PathState {
            from: Some("8".into()),
            to: "9".into(),
            cost: 1.0,
            pheromone: 0.0,
        };
        assert!(matches!(
            g.import_state(&[state]),
            Err(GraphError::UnknownPath { .. })
        ));
    }

    #[test]
    fn reversed_swaps_endpoints() {
        let edge = Edge::new(3u8, 5, 2.0);
        let rev = edge.reversed().unwrap();
        assert_eq!(rev.from, Some(5));
        assert_eq!(rev.to, 3);
        assert!(Edge::entry(1u8).reversed().is_none());
    }
}
