// The categorical ("music thought") dimension of a walk.
//
// Before choosing a pitch, an agent resolves what kind of step it
// wants: directional motion (conjunct or disjunct) or complemental
// motion balancing what came before (short-term against the last step,
// long-term against the ambitus middle). The categories live on a
// small two-level pheromone graph rooted at Start; resolving one takes
// two selections, and the chosen pair maps to a tagged category whose
// predicate then filters the pitch candidates.
//
// An undefined node pairing (e.g. landing back on Start mid-pair) has
// no category semantics and aborts the walk rather than guessing.

use std::fmt;

use thiserror::Error;

use crate::graph::{Edge, PheromoneGraph};
use crate::pitch::PitchPath;

const DEFAULT_COST: f64 = 1.0;
const DOMINANT_ATTRACTION_FACTOR: f64 = 10.0;

/// Nodes of the categorical graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThoughtNode {
    Start,
    Directional,
    Complemental,
    Conjunct,
    Disjunct,
    ShortTerm,
    LongTerm,
}

impl fmt::Display for ThoughtNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThoughtNode::Start => "Start",
            ThoughtNode::Directional => "Directional",
            ThoughtNode::Complemental => "Complemental",
            ThoughtNode::Conjunct => "Conjunct",
            ThoughtNode::Disjunct => "Disjunct",
            ThoughtNode::ShortTerm => "ShortTerm",
            ThoughtNode::LongTerm => "LongTerm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ThoughtError {
    #[error("no category is defined for the node pair {level1} -> {level2}")]
    Unclassifiable {
        level1: ThoughtNode,
        level2: ThoughtNode,
    },
}

/// The two-level categorical graph. Directional motion is cheaper than
/// complemental, and the conjunct branch is strongly attracted.
pub fn thought_space(alpha: f64, beta: f64) -> PheromoneGraph<ThoughtNode> {
    use ThoughtNode::*;
    let mut graph = PheromoneGraph::new(alpha, beta);
    graph.set_start(Start);
    graph.add_edges([
        Edge::new(Start, Directional, DEFAULT_COST / 2.0),
        Edge::new(Start, Complemental, DEFAULT_COST),
        Edge::new(Directional, Conjunct, DEFAULT_COST / DOMINANT_ATTRACTION_FACTOR),
        Edge::new(Directional, Disjunct, DEFAULT_COST),
        Edge::new(Conjunct, Start, DEFAULT_COST),
        Edge::new(Disjunct, Start, DEFAULT_COST),
        Edge::new(Complemental, ShortTerm, DEFAULT_COST),
        Edge::new(Complemental, LongTerm, DEFAULT_COST),
        Edge::new(ShortTerm, Start, DEFAULT_COST),
        Edge::new(LongTerm, Start, DEFAULT_COST),
    ]);
    graph
}

/// What the walk already knows when a category's predicate runs.
#[derive(Debug, Clone, Copy)]
pub struct WalkContext {
    /// No step has been taken yet (only the entry note exists).
    pub first_step: bool,
    /// Semitone direction of the previous step.
    pub last_direction: i32,
    /// Semitone distance of the current note above the ambitus middle.
    pub last_level: i32,
}

/// A resolved category: the branch/leaf pair with its pitch predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicThought {
    DirectionalConjunct,
    DirectionalDisjunct,
    ComplementalShortTerm,
    ComplementalLongTerm,
}

impl MusicThought {
    /// Map a level-1/level-2 node pair onto its category.
    pub fn classify(level1: ThoughtNode, level2: ThoughtNode) -> Result<Self, ThoughtError> {
        use ThoughtNode::*;
        match (level1, level2) {
            (Directional, Conjunct) => Ok(MusicThought::DirectionalConjunct),
            (Directional, Disjunct) => Ok(MusicThought::DirectionalDisjunct),
            (Complemental, ShortTerm) => Ok(MusicThought::ComplementalShortTerm),
            (Complemental, LongTerm) => Ok(MusicThought::ComplementalLongTerm),
            _ => Err(ThoughtError::Unclassifiable { level1, level2 }),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MusicThought::DirectionalConjunct => "Directional_Conjunct",
            MusicThought::DirectionalDisjunct => "Directional_Disjunct",
            MusicThought::ComplementalShortTerm => "Complemental_ShortTerm",
            MusicThought::ComplementalLongTerm => "Complemental_LongTerm",
        }
    }

    /// Whether a candidate pitch step realizes this category given the
    /// walk so far. Conjunct continues the current direction by step,
    /// disjunct by skip; short-term complement turns against the last
    /// step, long-term against the side of the ambitus the line sits
    /// on.
    pub fn admits(self, ctx: &WalkContext, step: PitchPath) -> bool {
        if ctx.first_step {
            return match self {
                MusicThought::DirectionalConjunct => step.abs_diff() <= 2,
                MusicThought::DirectionalDisjunct => step.abs_diff() > 2,
                _ => true,
            };
        }
        match self {
            MusicThought::DirectionalConjunct => {
                (ctx.last_direction >= 0 && step.diff() <= 2)
                    || (ctx.last_direction <= 0 && step.diff() >= -2)
            }
            MusicThought::DirectionalDisjunct => {
                (ctx.last_direction >= 0 && step.diff() > 2)
                    || (ctx.last_direction <= 0 && step.diff() < -2)
            }
            MusicThought::ComplementalLongTerm => {
                if ctx.last_level == 0 {
                    (ctx.last_direction >= 0 && step.diff() < 0)
                        || (ctx.last_direction <= 0 && step.diff() > 0)
                } else {
                    (ctx.last_level > 0 && step.diff() < 0)
                        || (ctx.last_level < 0 && step.diff() > 0)
                }
            }
            MusicThought::ComplementalShortTerm => {
                (ctx.last_direction >= 0 && step.diff() < 0)
                    || (ctx.last_direction <= 0 && step.diff() > 0)
            }
        }
    }
}
