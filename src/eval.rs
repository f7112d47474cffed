// Fitness criteria for finished lines.
//
// A counterpoint line is scored as a weighted sum of independent
// criteria, normalized by the weight total and rounded half-up to
// eight decimals so cached and recomputed values compare exactly.
// The traditional criterion set limits retained notes; the chromatic
// variant swaps that for a chromaticism bonus. Hard validity (right
// length, every vertical interval consonant) gates the whole score to
// zero when violated.
//
// Reference lines are rated differently: by how much compositional
// room they leave, i.e. the exact path counts of the constrained
// graphs on both sides of the line, combined and tempered by length.

use std::collections::HashMap;

use crate::graph::PheromoneGraph;
use crate::locus::LocusGraph;
use crate::melody::{CantusFirmus, Melody};
use crate::motion::{self, Motion, contrapuntal_motion};
use crate::pitch::{Pitch, PitchPath};

/// Which criterion set scores the retained/chromatic slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalKind {
    Traditional,
    Chromatic,
}

/// Contrary motion against the reference, scored around the ideal of
/// half the line moving contrary.
pub fn contrapuntal(cpt: &Melody, cf: &CantusFirmus) -> f64 {
    let length = cpt.len();
    if length < 3 {
        return 0.0;
    }
    let ideal = length as f64 / 2.0;
    let actual = (0..length - 2)
        .filter(|&locus| {
            let a = cpt.diff_at(locus).unwrap_or(0);
            let b = cf.melody().diff_at(locus).unwrap_or(0);
            a * b < 0
        })
        .count() as f64;
    let score = actual / ideal;
    if actual > ideal { 2.0 - score } else { score }
}

/// Repetition bookkeeping: every fresh attack of a degree (chromatic
/// inflections collapse to their natural) charges it, and the charge
/// decays one per step. A degree charged past four kills the score;
/// two degrees charged at once halve it.
pub fn proper_repetition(melody: &Melody) -> f64 {
    let mut score = 1.0;
    let mut charges: HashMap<Pitch, i32> = HashMap::new();
    for (i, &note) in melody.notes().iter().enumerate() {
        let natural = note.natural();
        let fresh_attack =
            i == 0 || melody.note(i - 1).map(|p| p.natural()) != Some(natural);
        if fresh_attack {
            let charge = charges.get(&natural).copied().unwrap_or(0);
            charges.insert(natural, charge + 3);
            if charges.values().any(|&v| v > 4) {
                return 0.0;
            }
            if charges.values().filter(|&&v| v >= 3).count() > 1 {
                score /= 2.0;
            }
        }
        for value in charges.values_mut() {
            if *value > 0 {
                *value -= 1;
            }
        }
    }
    score
}

/// Ambitus compactness: the octave band scores full marks.
pub fn range(melody: &Melody) -> f64 {
    match melody.pitch_range() {
        7..=9 | 12 => 1.0,
        5 | 14 => 0.5,
        15 | 16 => 0.25,
        _ => 0.0,
    }
}

/// Retained (tied) notes: one is idiomatic, many are static.
pub fn retained_notes(melody: &Melody) -> f64 {
    let retained = (1..melody.len())
        .filter(|&i| melody.diff_at(i - 1) == Some(0))
        .count();
    match retained {
        0 | 1 => 1.0,
        2 => 0.5,
        3 => 0.25,
        _ => 0.0,
    }
}

/// Leap economy: counts disjunct steps and leaps that fail to recover,
/// scoring a small handful as ideal.
pub fn successive_leaps(melody: &Melody) -> f64 {
    let steps: Vec<i32> = (1..melody.len())
        .map(|i| melody.diatonic_diff_at(i - 1).unwrap_or(0))
        .collect();
    let mut disjunct = 0usize;
    let mut avoided = 0usize;
    for (i, &current) in steps.iter().enumerate() {
        if current.abs() > 2 {
            disjunct += 1;
        }
        if current > 1 && i > 0 {
            let previous = steps[i - 1];
            if previous > 0
                && ((current == 2 && current > previous)
                    || (current > 2 && current >= previous))
            {
                avoided += 1;
            }
        } else if current < -1 && i + 1 < steps.len() {
            let next = steps[i + 1];
            if next < 0
                && ((current == -2 && current < next)
                    || (current < -2 && current <= next))
            {
                avoided += 1;
            }
        }
    }
    match avoided + disjunct {
        1 | 2 => 1.0,
        0 | 3 => 0.5,
        4 | 5 => 0.25,
        _ => 0.0,
    }
}

/// Longest run of parallel motion against the reference.
pub fn successive_parallels(cpt: &Melody, cf: &CantusFirmus) -> f64 {
    let length = cpt.len().min(cf.len());
    let mut longest = 0usize;
    let mut run = 0usize;
    for locus in 0..length.saturating_sub(1) {
        let motion = match (cpt.note(locus), cpt.note(locus + 1), cf.note(locus), cf.note(locus + 1)) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => {
                contrapuntal_motion(PitchPath::of(a0, a1), PitchPath::of(b0, b1))
            }
            _ => Motion::Same,
        };
        if motion == Motion::Parallel {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    match longest {
        0..=2 => 1.0,
        3 => 0.5,
        4 => 0.25,
        _ => 0.0,
    }
}

/// Chromatic coverage beyond the plain diatonic palette.
pub fn chromaticism(melody: &Melody) -> f64 {
    let mut classes = [false; 12];
    for &note in melody.notes() {
        classes[note.chromatic_number().rem_euclid(12) as usize] = true;
    }
    let count = classes.iter().filter(|&&c| c).count() as i32 - 5;
    if count < 0 { 0.0 } else { count as f64 / 7.0 }
}

/// Hard validity: right length and every vertical interval consonant.
pub fn valid_against(cpt: &Melody, cf: &CantusFirmus) -> bool {
    cpt.len() == cf.len()
        && cpt
            .notes()
            .iter()
            .zip(cf.melody().notes())
            .all(|(&a, &b)| motion::consonant(a, b))
}

/// Weighted aggregate fitness of a counterpoint line, in [0, 1],
/// rounded half-up to eight decimals. Invalid lines score zero.
pub fn evaluate(cpt: &Melody, cf: &CantusFirmus, kind: EvalKind) -> f64 {
    if !valid_against(cpt, cf) {
        return 0.0;
    }
    let mut weighted = contrapuntal(cpt, cf) * 3.0
        + proper_repetition(cpt) * 3.0
        + successive_parallels(cpt, cf) * 2.0
        + successive_leaps(cpt) * 1.0
        + range(cpt) * 1.0;
    let base = match kind {
        EvalKind::Traditional => {
            weighted += retained_notes(cpt) * 1.0;
            11.0
        }
        EvalKind::Chromatic => {
            weighted += chromaticism(cpt) * 3.0;
            13.0
        }
    };
    let raw = weighted / base;
    (raw * 1e8).round() / 1e8
}

/// Path counts of the constrained graphs on both sides of a reference
/// line. An infeasible side counts zero.
pub fn side_counts(cf: &CantusFirmus, free: &PheromoneGraph<Pitch>) -> (u128, u128) {
    let count = |above: bool| {
        LocusGraph::build(cf.clone(), above, 1.0, 1.0, free)
            .map(|g| g.path_count())
            .unwrap_or(0)
    };
    (count(true), count(false))
}

/// Combine both-side counts into one rating.
pub fn count_rating(upper: u128, lower: u128) -> f64 {
    let product = (upper as f64) * (lower as f64);
    product / (1.0 + upper as f64 + lower as f64)
}

/// Rating of a reference line by the compositional room it leaves,
/// tempered for overlong lines.
pub fn reference_rating(
    cf: &CantusFirmus,
    free: &PheromoneGraph<Pitch>,
    length_higher: usize,
) -> f64 {
    let (upper, lower) = side_counts(cf, free);
    let index = (cf.len() as i64 - length_higher as i64).max(1) as f64;
    count_rating(upper, lower).powf(1.0 / index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use crate::pitch::pitch_space;
    use crate::pitch::Pitch::*;

    fn fux_dorian() -> CantusFirmus {
        CantusFirmus::new(
            Mode::Dorian,
            vec![D4, F4, E4, D4, G4, F4, A4, G4, F4, E4, D4],
        )
    }

    /// A first-species upper line over the Fux cantus (after Fux).
    fn fux_counterpoint() -> Melody {
        Melody::new(vec![A4, A4, G4, A4, B4, C5, C5, B4, D5, Cs5, D5])
    }

    #[test]
    fn the_classic_solution_is_valid() {
        assert!(valid_against(&fux_counterpoint(), &fux_dorian()));
    }

    #[test]
    fn range_bands() {
        assert_eq!(range(&Melody::new(vec![D4, A4, D4])), 1.0); // fifth: 7
        assert_eq!(range(&Melody::new(vec![D4, D5, D4])), 1.0); // octave
        assert_eq!(range(&Melody::new(vec![D4, G4, D4])), 0.5); // fourth: 5
        assert_eq!(range(&Melody::new(vec![D4, D4])), 0.0); // unison
    }

    #[test]
    fn retained_note_bands() {
        let none = Melody::new(vec![D4, E4, F4]);
        assert_eq!(retained_notes(&none), 1.0);
        let two = Melody::new(vec![D4, D4, E4, E4, F4]);
        assert_eq!(retained_notes(&two), 0.5);
        let four = Melody::new(vec![D4, D4, D4, D4, D4]);
        assert_eq!(retained_notes(&four), 0.0);
    }

    #[test]
    fn repetition_decays() {
        // A short varied line keeps its full score.
        let varied = Melody::new(vec![D4, F4, E4, G4, A4]);
        assert_eq!(proper_repetition(&varied), 1.0);
        // Hammering one letter kills it.
        let hammered = Melody::new(vec![D4, E4, D4, E4, D4, E4, D4]);
        assert_eq!(proper_repetition(&hammered), 0.0);
    }

    #[test]
    fn contrary_motion_is_rewarded() {
        let cf = fux_dorian();
        let cpt = fux_counterpoint();
        let score = contrapuntal(&cpt, &cf);
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn parallels_run_length() {
        let cf = CantusFirmus::new(Mode::Dorian, vec![D4, E4, F4, G4, A4, G4]);
        // Parallel thirds throughout the first five steps.
        let thirds = Melody::new(vec![F4, G4, A4, B4, C5, B4]);
        assert_eq!(successive_parallels(&thirds, &cf), 0.0);
        // Mixed motion stays in the full band.
        let mixed = Melody::new(vec![F4, G4, F4, B4, C5, B4]);
        assert_eq!(successive_parallels(&mixed, &cf), 1.0);
    }

    #[test]
    fn chromaticism_counts_classes() {
        // Pure diatonic heptatonic line: (7 - 5) / 7.
        let diatonic = Melody::new(vec![C4, D4, E4, F4, G4, A4, B4]);
        assert!((chromaticism(&diatonic) - 2.0 / 7.0).abs() < 1e-12);
        // Five classes or fewer scores zero.
        let narrow = Melody::new(vec![C4, D4, E4, C4]);
        assert_eq!(chromaticism(&narrow), 0.0);
    }

    #[test]
    fn evaluate_gates_on_validity() {
        let cf = fux_dorian();
        let good = evaluate(&fux_counterpoint(), &cf, EvalKind::Traditional);
        assert!(good > 0.0 && good <= 1.0);
        // Wrong length gates to zero.
        let short = Melody::new(vec![A4, A4, G4]);
        assert_eq!(evaluate(&short, &cf, EvalKind::Traditional), 0.0);
        // A dissonant vertical gates to zero.
        let mut notes = fux_counterpoint().notes().to_vec();
        notes[4] = A4; // A4 against G4: a second
        assert_eq!(
            evaluate(&Melody::new(notes), &cf, EvalKind::Traditional),
            0.0
        );
    }

    #[test]
    fn evaluate_is_rounded_to_eight_decimals() {
        let cf = fux_dorian();
        let score = evaluate(&fux_counterpoint(), &cf, EvalKind::Traditional);
        let rounded = (score * 1e8).round() / 1e8;
        assert_eq!(score, rounded);
    }

    #[test]
    fn count_rating_combines_sides() {
        assert_eq!(count_rating(0, 100), 0.0);
        let rating = count_rating(10, 20);
        assert!((rating - 200.0 / 31.0).abs() < 1e-12);
    }

    #[test]
    fn reference_rating_is_positive_for_a_workable_line() {
        let free = pitch_space(1.0, 1.0);
        let rating = reference_rating(&fux_dorian(), &free, 15);
        assert!(rating > 0.0);
    }
}
