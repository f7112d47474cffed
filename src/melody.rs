// Melodic line containers.
//
// A Melody is an ordered list of pitches; it grows monotonically while
// an agent walks and is frozen once the walk completes. A CantusFirmus
// is a melody fixed in a mode, used as the reference line that
// counterpoint lines are built against; counterpoint lines themselves
// are plain melodies paired with their reference at the use site.

use crate::mode::Mode;
use crate::pitch::Pitch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Melody {
    notes: Vec<Pitch>,
}

impl Melody {
    pub fn new(notes: Vec<Pitch>) -> Self {
        Melody { notes }
    }

    pub fn push(&mut self, pitch: Pitch) {
        self.notes.push(pitch);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn note(&self, locus: usize) -> Option<Pitch> {
        self.notes.get(locus).copied()
    }

    pub fn notes(&self) -> &[Pitch] {
        &self.notes
    }

    pub fn first(&self) -> Option<Pitch> {
        self.notes.first().copied()
    }

    pub fn last(&self) -> Option<Pitch> {
        self.notes.last().copied()
    }

    /// Semitone step from `locus` to the next position.
    pub fn diff_at(&self, locus: usize) -> Option<i32> {
        Some(self.note(locus)?.diff(self.note(locus + 1)?))
    }

    /// Diatonic step from `locus` to the next position.
    pub fn diatonic_diff_at(&self, locus: usize) -> Option<i32> {
        Some(self.note(locus)?.diatonic_diff(self.note(locus + 1)?))
    }

    /// Chromatic span between the lowest and highest note.
    pub fn pitch_range(&self) -> i32 {
        let numbers = self.notes.iter().map(|p| p.chromatic_number());
        match (numbers.clone().min(), numbers.max()) {
            (Some(low), Some(high)) => high - low,
            _ => 0,
        }
    }

    /// The diatonic midpoint of the melody's ambitus.
    pub fn middle(&self) -> Option<Pitch> {
        let indices = self.notes.iter().map(|p| p.diatonic_index());
        let (low, high) = (indices.clone().min()?, indices.max()?);
        let index = usize::try_from(low + (high - low) / 2).ok()?;
        Pitch::DIATONIC.get(index).copied()
    }

    pub fn labels(&self) -> Vec<String> {
        self.notes.iter().map(|p| p.to_string()).collect()
    }
}

impl FromIterator<Pitch> for Melody {
    fn from_iter<T: IntoIterator<Item = Pitch>>(iter: T) -> Self {
        Melody::new(iter.into_iter().collect())
    }
}

/// The fixed reference line a counterpoint is written against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CantusFirmus {
    melody: Melody,
    mode: Mode,
}

impl CantusFirmus {
    pub fn new(mode: Mode, notes: Vec<Pitch>) -> Self {
        CantusFirmus {
            melody: Melody::new(notes),
            mode,
        }
    }

    /// Infer the mode from the final (the closing note).
    pub fn from_notes(notes: Vec<Pitch>) -> Option<Self> {
        let mode = Mode::of_final(*notes.last()?)?;
        Some(CantusFirmus::new(mode, notes))
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

    pub fn note(&self, locus: usize) -> Option<Pitch> {
        self.melody.note(locus)
    }
}
