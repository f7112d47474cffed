// The pitch gamut and its interval arithmetic.
//
// Counterpoint here lives on the F2..G5 gamut: the 23 diatonic
// naturals form the step lattice that walks move on, and the chromatic
// degrees (sharps plus the two flats) exist for cadence leading tones.
// Chromatic numbers count semitones above F2; diatonic indices count
// positions in the natural gamut. Interval quality is a lookup over
// (diatonic degree class, semitone class).
//
// Also builds the free pitch space: the pheromone graph of melodic
// steps a voice may take with no reference line in play. Admitted
// steps are the repeated note, seconds, thirds, fourths, fifths,
// octaves in both directions and the ascending minor sixth; B against
// F (the tritone) is never connected. Costs follow the interval table:
// the smoother the step, the cheaper.

use std::fmt;

use crate::graph::{Edge, PheromoneGraph};

/// A pitch of the gamut. Ordering follows chromatic order; `As`/`Bf`
/// spellings are distinct pitches sharing a chromatic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[rustfmt::skip]
pub enum Pitch {
    F2, Fs2, G2, Gs2, A2, As2, Bf2, B2,
    C3, Cs3, D3, Ds3, E3, F3, Fs3, G3, Gs3, A3, As3, Bf3, B3,
    C4, Cs4, D4, Ds4, E4, F4, Fs4, G4, Gs4, A4, As4, Bf4, B4,
    C5, Cs5, D5, Ds5, E5, F5, Fs5, G5,
}

use Pitch::*;

impl Pitch {
    pub const ALL: [Pitch; 42] = [
        F2, Fs2, G2, Gs2, A2, As2, Bf2, B2,
        C3, Cs3, D3, Ds3, E3, F3, Fs3, G3, Gs3, A3, As3, Bf3, B3,
        C4, Cs4, D4, Ds4, E4, F4, Fs4, G4, Gs4, A4, As4, Bf4, B4,
        C5, Cs5, D5, Ds5, E5, F5, Fs5, G5,
    ];

    /// The natural gamut, low to high. Diatonic indices point here.
    pub const DIATONIC: [Pitch; 23] = [
        F2, G2, A2, B2, C3, D3, E3, F3, G3, A3, B3,
        C4, D4, E4, F4, G4, A4, B4, C5, D5, E5, F5, G5,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            F2 => "F2", Fs2 => "Fs2", G2 => "G2", Gs2 => "Gs2", A2 => "A2",
            As2 => "As2", Bf2 => "Bf2", B2 => "B2", C3 => "C3", Cs3 => "Cs3",
            D3 => "D3", Ds3 => "Ds3", E3 => "E3", F3 => "F3", Fs3 => "Fs3",
            G3 => "G3", Gs3 => "Gs3", A3 => "A3", As3 => "As3", Bf3 => "Bf3",
            B3 => "B3", C4 => "C4", Cs4 => "Cs4", D4 => "D4", Ds4 => "Ds4",
            E4 => "E4", F4 => "F4", Fs4 => "Fs4", G4 => "G4", Gs4 => "Gs4",
            A4 => "A4", As4 => "As4", Bf4 => "Bf4", B4 => "B4", C5 => "C5",
            Cs5 => "Cs5", D5 => "D5", Ds5 => "Ds5", E5 => "E5", F5 => "F5",
            Fs5 => "Fs5", G5 => "G5",
        }
    }

    /// Semitones above F2. Enharmonic spellings share a number.
    pub const fn chromatic_number(self) -> i32 {
        match self {
            F2 => 0, Fs2 => 1, G2 => 2, Gs2 => 3, A2 => 4, As2 => 5, Bf2 => 5,
            B2 => 6, C3 => 7, Cs3 => 8, D3 => 9, Ds3 => 10, E3 => 11, F3 => 12,
            Fs3 => 13, G3 => 14, Gs3 => 15, A3 => 16, As3 => 17, Bf3 => 17,
            B3 => 18, C4 => 19, Cs4 => 20, D4 => 21, Ds4 => 22, E4 => 23,
            F4 => 24, Fs4 => 25, G4 => 26, Gs4 => 27, A4 => 28, As4 => 29,
            Bf4 => 29, B4 => 30, C5 => 31, Cs5 => 32, D5 => 33, Ds5 => 34,
            E5 => 35, F5 => 36, Fs5 => 37, G5 => 38,
        }
    }

    pub fn letter(self) -> char {
        self.name().as_bytes()[0] as char
    }

    pub fn octave(self) -> u8 {
        let bytes = self.name().as_bytes();
        bytes[bytes.len() - 1] - b'0'
    }

    /// `'s'` or `'f'` for chromatic degrees, `None` for naturals.
    pub fn accidental(self) -> Option<char> {
        let bytes = self.name().as_bytes();
        (bytes.len() == 3).then(|| bytes[1] as char)
    }

    pub fn is_diatonic(self) -> bool {
        self.accidental().is_none()
    }

    /// The natural of the same letter and octave.
    pub fn natural(self) -> Pitch {
        if self.is_diatonic() {
            return self;
        }
        Pitch::DIATONIC
            .into_iter()
            .find(|p| p.letter() == self.letter() && p.octave() == self.octave())
            .unwrap_or(self)
    }

    /// Position of this pitch's natural in the diatonic gamut.
    pub fn diatonic_index(self) -> i32 {
        let natural = self.natural();
        Pitch::DIATONIC
            .iter()
            .position(|&p| p == natural)
            .unwrap_or(0) as i32
    }

    /// The next pitch up in chromatic order (the sharpened degree when
    /// one exists). Used by the Aeolian cadence connection.
    pub fn raised(self) -> Option<Pitch> {
        let ordinal = Pitch::ALL.iter().position(|&p| p == self)?;
        Pitch::ALL.get(ordinal + 1).copied()
    }

    /// Semitone distance from `self` up to `to` (negative downward).
    pub fn diff(self, to: Pitch) -> i32 {
        to.chromatic_number() - self.chromatic_number()
    }

    /// Diatonic-gamut distance from `self` up to `to`.
    pub fn diatonic_diff(self, to: Pitch) -> i32 {
        to.diatonic_index() - self.diatonic_index()
    }

    /// B and F sound the tritone against each other in any octave
    /// pairing this gamut admits.
    pub fn tritone(self, other: Pitch) -> bool {
        let letters = (self.letter(), other.letter());
        letters == ('B', 'F') || letters == ('F', 'B')
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quality of the interval between two pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalQuality {
    Diminished,
    Minor,
    Perfect,
    Major,
    Augmented,
    Other,
}

/// Interval quality from the (degree class, semitone class) table.
pub fn quality(from: Pitch, to: Pitch) -> IntervalQuality {
    use IntervalQuality::*;
    let degrees = from.diatonic_diff(to).unsigned_abs() % 7;
    let steps = from.diff(to).unsigned_abs() % 12;
    match (degrees, steps) {
        (0, 11) => Diminished,
        (0, 0) => Perfect,
        (0, 1) => Augmented,
        (1, 0) => Diminished,
        (1, 1) => Minor,
        (1, 2) => Major,
        (1, 3) => Augmented,
        (2, 2) => Diminished,
        (2, 3) => Minor,
        (2, 4) => Major,
        (2, 5) => Augmented,
        (3, 4) => Diminished,
        (3, 5) => Perfect,
        (3, 6) => Augmented,
        (4, 6) => Diminished,
        (4, 7) => Perfect,
        (4, 8) => Augmented,
        (5, 7) => Diminished,
        (5, 8) => Minor,
        (5, 9) => Major,
        (5, 10) => Augmented,
        (6, 9) => Diminished,
        (6, 10) => Minor,
        (6, 11) => Major,
        (6, 0) => Augmented,
        _ => Other,
    }
}

/// A melodic step between two pitches, as a plain value. Graph edges
/// use this for their endpoint pair; legality rules compare them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchPath {
    pub from: Pitch,
    pub to: Pitch,
}

impl PitchPath {
    pub fn of(from: Pitch, to: Pitch) -> Self {
        PitchPath { from, to }
    }

    pub fn diff(self) -> i32 {
        self.from.diff(self.to)
    }

    pub fn diatonic_diff(self) -> i32 {
        self.from.diatonic_diff(self.to)
    }

    pub fn abs_diff(self) -> i32 {
        self.diff().abs()
    }

    pub fn quality(self) -> IntervalQuality {
        quality(self.from, self.to)
    }
}

/// Cost of a melodic step by its diatonic interval number (1 = the
/// repeated note). `None` for intervals the style never takes.
pub fn interval_cost(interval: i32) -> Option<f64> {
    match interval.abs() {
        2 | 3 => Some(1.0),
        1 | 5 | 8 => Some(4.0),
        4 => Some(8.0),
        6 => Some(16.0),
        _ => None,
    }
}

/// The melodic step `interval` away from `pitch`, when the style
/// admits it: in range, not a tritone, and the sixth only ascending
/// and minor.
pub fn pitch_step(pitch: Pitch, interval: i32) -> Option<Edge<Pitch>> {
    if interval == 6 && matches!(pitch.letter(), 'C' | 'D' | 'F' | 'G') {
        return None;
    }
    let target_index = pitch.diatonic_index() + if interval > 0 { interval - 1 } else { interval + 1 };
    let target = *Pitch::DIATONIC.get(usize::try_from(target_index).ok()?)?;
    if pitch.tritone(target) {
        return None;
    }
    let cost = interval_cost(interval)?;
    Some(Edge::new(pitch, target, cost))
}

/// The free pitch space: every admitted melodic step from every
/// diatonic pitch.
pub fn pitch_space(alpha: f64, beta: f64) -> PheromoneGraph<Pitch> {
    const INTERVALS: [i32; 12] = [1, 2, 3, 4, 5, 6, 8, -2, -3, -4, -5, -8];
    let mut graph = PheromoneGraph::new(alpha, beta);
    for pitch in Pitch::DIATONIC {
        graph.add_edges(INTERVALS.iter().filter_map(|&i| pitch_step(pitch, i)));
    }
    graph
}
