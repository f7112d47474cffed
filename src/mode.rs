// The five ecclesiastical modes and their cadence apparatus.
//
// A mode contributes two things to a walk: its terminal pitches (the
// finals, optionally widened with the dominants) that seed the first
// locus, and its cadence formulas, the fixed two-note closures a line
// must end on. Cadence formulas are octave-spaced copies of the same
// leading-tone-to-final step; a pitch connects to a formula when its
// distance to the formula head lies in the mode's admitted set.
// Aeolian alone admits an extra connection through the raised degree a
// minor third below its head.

use serde::{Deserialize, Serialize};

use crate::pitch::{Pitch, PitchPath};

/// Mode of a reference line, named by its final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Dorian,
    Phrygian,
    Mixolydian,
    Aeolian,
    Ionian,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Dorian,
        Mode::Phrygian,
        Mode::Mixolydian,
        Mode::Aeolian,
        Mode::Ionian,
    ];

    pub fn final_letter(self) -> char {
        match self {
            Mode::Dorian => 'D',
            Mode::Phrygian => 'E',
            Mode::Mixolydian => 'G',
            Mode::Aeolian => 'A',
            Mode::Ionian => 'C',
        }
    }

    pub fn dominant_letter(self) -> char {
        match self {
            Mode::Dorian => 'A',
            Mode::Phrygian => 'B',
            Mode::Mixolydian => 'D',
            Mode::Aeolian => 'E',
            Mode::Ionian => 'G',
        }
    }

    /// The mode a line in this gamut belongs to, read off its final.
    pub fn of_final(pitch: Pitch) -> Option<Mode> {
        if !pitch.is_diatonic() {
            return None;
        }
        match pitch.letter() {
            'C' => Some(Mode::Ionian),
            'D' => Some(Mode::Dorian),
            'E' => Some(Mode::Phrygian),
            'G' => Some(Mode::Mixolydian),
            'A' => Some(Mode::Aeolian),
            _ => None,
        }
    }

    /// Diatonic pitches a line in this mode may start or end on.
    pub fn terminals(self, including_dominants: bool) -> Vec<Pitch> {
        Pitch::DIATONIC
            .into_iter()
            .filter(|p| {
                p.letter() == self.final_letter()
                    || (including_dominants && p.letter() == self.dominant_letter())
            })
            .collect()
    }

    /// The octave-spaced cadence formulas of this mode.
    pub fn cadences(self) -> Vec<Cadence> {
        use crate::pitch::Pitch::*;
        let formulas: [[Pitch; 2]; 3] = match self {
            Mode::Dorian => [[Cs3, D3], [Cs4, D4], [Cs5, D5]],
            Mode::Phrygian => [[D3, E3], [D4, E4], [D5, E5]],
            Mode::Mixolydian => [[Fs3, G3], [Fs4, G4], [Fs5, G5]],
            Mode::Aeolian => [[Gs2, A2], [Gs3, A3], [Gs4, A4]],
            Mode::Ionian => [[B2, C3], [B3, C4], [B4, C5]],
        };
        formulas
            .into_iter()
            .map(|formula| Cadence {
                formula,
                mode: self,
            })
            .collect()
    }
}

/// A fixed terminal formula: leading tone, then final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    formula: [Pitch; 2],
    mode: Mode,
}

impl Cadence {
    pub fn head(&self) -> Pitch {
        self.formula[0]
    }

    pub fn last(&self) -> Pitch {
        self.formula[1]
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The closing step of the formula itself.
    pub fn pitch_path(&self) -> PitchPath {
        PitchPath::of(self.head(), self.last())
    }

    /// The connecting step from `pitch` into this formula's head, when
    /// the mode admits one. Aeolian substitutes the raised degree for
    /// the connection from a minor third below.
    pub fn path_to_cadence(&self, pitch: Pitch) -> Option<PitchPath> {
        let diff = pitch.diff(self.head());
        match self.mode {
            Mode::Dorian | Mode::Mixolydian | Mode::Ionian => match diff {
                -3 | -1 | 2 => Some(PitchPath::of(pitch, self.head())),
                _ => None,
            },
            Mode::Phrygian => match diff {
                -3 | -2 | 2 => Some(PitchPath::of(pitch, self.head())),
                _ => None,
            },
            Mode::Aeolian => match diff {
                -3 | -1 => Some(PitchPath::of(pitch, self.head())),
                3 => pitch.raised().map(|raised| PitchPath::of(raised, self.head())),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::{IntervalQuality, quality};

    #[test]
    fn dorian_terminals() {
        assert_eq!(
            Mode::Dorian.terminals(false),
            vec![Pitch::D3, Pitch::D4, Pitch::D5]
        );
        let with_dominants = Mode::Dorian.terminals(true);
        assert!(with_dominants.contains(&Pitch::A3));
        assert!(with_dominants.contains(&Pitch::D4));
        assert_eq!(with_dominants.len(), 6);
    }

    #[test]
    fn cadence_heads_are_leading_tones() {
        for mode in Mode::ALL {
            for cadence in mode.cadences() {
                let step = cadence.pitch_path();
                assert!(step.diff() == 1 || step.diff() == 2, "{cadence:?}");
                assert_eq!(cadence.last().letter(), mode.final_letter());
            }
        }
        // Dorian closes through the raised leading tone.
        let dorian = &Mode::Dorian.cadences()[1];
        assert_eq!(
            quality(dorian.head(), dorian.last()),
            IntervalQuality::Minor
        );
    }

    #[test]
    fn dorian_connections() {
        let cadence = Mode::Dorian.cadences()[1]; // [Cs4, D4]
        // A minor third above the head connects.
        assert_eq!(
            cadence.path_to_cadence(Pitch::E4),
            Some(PitchPath::of(Pitch::E4, Pitch::Cs4))
        );
        // So do the final (a step above) and B3 (a step below).
        assert!(cadence.path_to_cadence(Pitch::D4).is_some());
        assert!(cadence.path_to_cadence(Pitch::B3).is_some());
        // A fourth below does not.
        assert_eq!(cadence.path_to_cadence(Pitch::A3), None);
    }

    #[test]
    fn aeolian_raised_connection() {
        let cadence = Mode::Aeolian.cadences()[1]; // [Gs3, A3]
        // F3 sits a minor third below Gs3; the connection runs through Fs3.
        let path = cadence.path_to_cadence(Pitch::F3).unwrap();
        assert_eq!(path.from, Pitch::Fs3);
        assert_eq!(path.to, Pitch::Gs3);
    }

    #[test]
    fn mode_of_final() {
        assert_eq!(Mode::of_final(Pitch::D4), Some(Mode::Dorian));
        assert_eq!(Mode::of_final(Pitch::A3), Some(Mode::Aeolian));
        assert_eq!(Mode::of_final(Pitch::F3), None);
        assert_eq!(Mode::of_final(Pitch::Cs4), None);
    }
}
