// Walking agents ("threads").
//
// A thread owns a melody in progress, the route of traces that built
// it, and a completed flag. Each trace couples the two dimensions of a
// step in lock-step: the categorical move pair that chose what kind of
// step to take, and the pitch move that took it. Threads come in two
// kinds: CantusThread walks the free pitch space to grow a reference
// line and ends by cadence; CounterpointThread walks a locus graph
// against a fixed reference and ends at the reference length.
//
// A completed thread freezes; the evolutionary layer builds threads
// directly from finished melodies (no route) and never walks them.

use serde::{Deserialize, Serialize};

use crate::graph::{EdgeKey, Move};
use crate::melody::{CantusFirmus, Melody};
use crate::mode::{Cadence, Mode};
use crate::pitch::{Pitch, PitchPath};
use crate::thought::{MusicThought, ThoughtNode, WalkContext};

/// One step of a dual-dimension walk. `thought_moves` holds the two
/// categorical selections, or nothing when the category was forced.
#[derive(Debug, Clone)]
pub struct Trace {
    pub thought: Option<MusicThought>,
    pub thought_moves: Vec<Move<ThoughtNode>>,
    pub pitch_move: Move<Pitch>,
}

impl Trace {
    pub fn forced_pitch(pitch_move: Move<Pitch>) -> Self {
        Trace {
            thought: None,
            thought_moves: Vec::new(),
            pitch_move,
        }
    }
}

/// What the walk so far tells a category predicate.
fn context_of(melody: &Melody) -> WalkContext {
    let last_direction = if melody.len() >= 2 {
        melody.diff_at(melody.len() - 2).unwrap_or(0)
    } else {
        0
    };
    let last_level = match (melody.middle(), melody.last()) {
        (Some(middle), Some(last)) => middle.diff(last),
        _ => 0,
    };
    WalkContext {
        first_step: melody.len() <= 1,
        last_direction,
        last_level,
    }
}

fn last_pitch_path(melody: &Melody) -> Option<PitchPath> {
    let len = melody.len();
    Some(PitchPath::of(melody.note(len.checked_sub(2)?)?, melody.last()?))
}

/// Per-step metadata of a completed sequence, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub locus: usize,
    pub thought: Option<String>,
    pub exploring: bool,
    pub pheromone: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub from: Option<String>,
    pub to: String,
    pub pheromone: f64,
}

/// A completed sequence with its walk metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadReport {
    pub pitches: Vec<String>,
    pub steps: Vec<StepReport>,
}

fn report(melody: &Melody, route: &[Trace]) -> ThreadReport {
    let steps = route
        .iter()
        .enumerate()
        .map(|(i, trace)| StepReport {
            locus: i + 1,
            thought: trace.thought.map(|t| t.label().to_string()),
            exploring: trace.pitch_move.exploring,
            pheromone: trace
                .pitch_move
                .snapshot
                .iter()
                .map(|(key, pheromone)| SnapshotEntry {
                    from: key.from.map(|p| p.to_string()),
                    to: key.to.to_string(),
                    pheromone: *pheromone,
                })
                .collect(),
        })
        .collect();
    ThreadReport {
        pitches: melody.labels(),
        steps,
    }
}

/// A walker building a counterpoint line against a fixed reference.
#[derive(Debug, Clone)]
pub struct CounterpointThread {
    melody: Melody,
    route: Vec<Trace>,
    completed: bool,
}

impl CounterpointThread {
    pub fn new(entry: Pitch) -> Self {
        CounterpointThread {
            melody: Melody::new(vec![entry]),
            route: Vec::new(),
            completed: false,
        }
    }

    /// Wrap an already-complete melody (evolutionary offspring).
    pub fn from_melody(melody: Melody) -> Self {
        CounterpointThread {
            melody,
            route: Vec::new(),
            completed: true,
        }
    }

    pub fn melody(&self) -> &Melody {
        &self.melody
    }

    pub fn len(&self) -> usize {
        self.melody.len()
    }

    pub fn is_empty(&self) -> bool {
        self.melody.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    pub fn current(&self) -> Option<Pitch> {
        self.melody.last()
    }

    pub fn context(&self) -> WalkContext {
        context_of(&self.melody)
    }

    pub fn last_pitch_path(&self) -> Option<PitchPath> {
        last_pitch_path(&self.melody)
    }

    /// Append a step: the melody and the route grow together.
    pub fn record(&mut self, trace: Trace) {
        self.melody.push(trace.pitch_move.selected.to);
        self.route.push(trace);
    }

    pub fn route(&self) -> &[Trace] {
        &self.route
    }

    pub fn report(&self) -> ThreadReport {
        report(&self.melody, &self.route)
    }
}

/// A walker growing a free reference line, terminated by cadence.
#[derive(Debug, Clone)]
pub struct CantusThread {
    melody: Melody,
    route: Vec<Trace>,
    mode: Mode,
    completed: bool,
}

impl CantusThread {
    pub fn new(mode: Mode, entry: Pitch) -> Self {
        CantusThread {
            melody: Melody::new(vec![entry]),
            route: Vec::new(),
            mode,
            completed: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn melody(&self) -> &Melody {
        &self.melody
    }

    pub fn len(&self) -> usize {
        self.melody.len()
    }

    pub fn is_empty(&self) -> bool {
        self.melody.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn current(&self) -> Option<Pitch> {
        self.melody.last()
    }

    pub fn context(&self) -> WalkContext {
        context_of(&self.melody)
    }

    pub fn last_pitch_path(&self) -> Option<PitchPath> {
        last_pitch_path(&self.melody)
    }

    pub fn record(&mut self, trace: Trace) {
        self.melody.push(trace.pitch_move.selected.to);
        self.route.push(trace);
    }

    /// Force-append a cadence formula and complete the walk. Only
    /// direct connections are taken on the free walk (no raised-degree
    /// substitution, which would rewrite an already-sung note).
    pub fn append_cadence(&mut self, cadence: &Cadence) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        match cadence.path_to_cadence(current) {
            Some(connection) if connection.from == current => {
                let head = Move::forced(EdgeKey {
                    from: Some(current),
                    to: cadence.head(),
                });
                self.record(Trace::forced_pitch(head));
                let close = Move::forced(EdgeKey {
                    from: Some(cadence.head()),
                    to: cadence.last(),
                });
                self.record(Trace::forced_pitch(close));
                self.completed = true;
                true
            }
            _ => false,
        }
    }

    /// Freeze into a reference line.
    pub fn to_cantus(&self) -> CantusFirmus {
        CantusFirmus::new(self.mode, self.melody.notes().to_vec())
    }

    pub fn report(&self) -> ThreadReport {
        report(&self.melody, &self.route)
    }
}
