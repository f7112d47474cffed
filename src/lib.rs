// Cantus Colony
//
// An ant-colony composer for modal melody: reference lines (cantus
// firmi), first-species counterpoint against them, and multi-section
// pieces assembled from both. The search machinery is shared by every
// stage: a pheromone-weighted graph with stochastic edge selection and
// evaporation drives populations of walking agents in synchronized
// rounds, and a generational evolutionary layer refines populations of
// finished lines against a multi-criterion fitness score.
//
// Architecture:
// - graph.rs: colony engine (edges, fraction scoring, roulette
//   selection, evaporation, pheromone state export/import)
// - pitch.rs: the pitch gamut, interval arithmetic, free pitch space
// - mode.rs: ecclesiastical modes, terminals, cadence formulas
// - melody.rs: melodic line containers
// - motion.rs: two-voice motion rules and forbidden-motion predicates
// - thought.rs: the categorical walk dimension and its graph
// - locus.rs: the position-indexed constrained graph (construction,
//   dead-end pruning, matrix-power path counting)
// - thread.rs: walking agents and completed-sequence reports
// - colony.rs: round-based colonies for reference and counterpoint
// - eval.rs: fitness criteria and reference-line rating
// - evolve.rs: tournament/crossover/mutation generational refinement
// - section.rs: multi-section piece planning and assembly
// - params.rs: tunable parameters with stock defaults
//
// Every stochastic choice draws from one explicitly seeded generator
// threaded through the calls, so a fixed seed reproduces a run
// bit-for-bit.

pub mod colony;
pub mod eval;
pub mod evolve;
pub mod graph;
pub mod locus;
pub mod melody;
pub mod mode;
pub mod motion;
pub mod params;
pub mod pitch;
pub mod section;
pub mod thought;
pub mod thread;
