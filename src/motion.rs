// Two-voice motion rules.
//
// Classifies the simultaneous motion of two voices (parallel,
// contrary, oblique, similar) and carries the forbidden-motion
// predicates the constrained graph filters with: parallel and hidden
// parallel arrivals on the perfect classes, the similar-motion leap
// combination, and the tritone cross-relation between the voices.
// Melodic feasibility of a single step lives here too; cadence
// splicing checks it on the approach paths.

use crate::pitch::{IntervalQuality, Pitch, PitchPath, quality};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Ascending,
    Descending,
    Same,
    Parallel,
    Contrary,
    Oblique,
    Similar,
}

/// Direction of a single melodic step.
pub fn melodic_motion(path: PitchPath) -> Motion {
    match path.diff() {
        d if d > 0 => Motion::Ascending,
        d if d < 0 => Motion::Descending,
        _ => Motion::Same,
    }
}

pub fn same_pitch(path: PitchPath) -> bool {
    melodic_motion(path) == Motion::Same
}

/// Joint classification of two simultaneous steps.
pub fn contrapuntal_motion(a: PitchPath, b: PitchPath) -> Motion {
    if a.diff() == 0 && b.diff() == 0 {
        return Motion::Same;
    }
    let product = a.diff() * b.diff();
    if product == 0 {
        return Motion::Oblique;
    }
    if product < 0 {
        return Motion::Contrary;
    }
    if a.diatonic_diff() == b.diatonic_diff() {
        Motion::Parallel
    } else {
        Motion::Similar
    }
}

/// Both steps move, in the same direction.
pub fn is_similar(a: PitchPath, b: PitchPath) -> bool {
    !same_pitch(a) && melodic_motion(a) == melodic_motion(b)
}

pub fn is_contrary(a: PitchPath, b: PitchPath) -> bool {
    a.diff() * b.diff() < 0
}

/// Unison/octave-class or fifth-class interval sustained across both
/// steps.
pub fn forbidden_parallel(a: PitchPath, b: PitchPath) -> bool {
    let from = a.from.diff(b.from).unsigned_abs() % 12;
    let to = a.to.diff(b.to).unsigned_abs() % 12;
    (from == 0 && to == 0) || (from == 7 && to == 7)
}

/// Similar-motion arrival on a perfect class.
pub fn forbidden_hidden_parallel(a: PitchPath, b: PitchPath) -> bool {
    let to = a.to.diff(b.to).unsigned_abs() % 12;
    (to == 0 || to == 7) && is_similar(a, b)
}

/// Any skip (a third or more, diatonically).
pub fn leap(path: PitchPath) -> bool {
    path.diatonic_diff().abs() >= 2
}

/// A leap beyond the fourth that is not a plain octave.
pub fn leap_over_fourth(path: PitchPath) -> bool {
    path.abs_diff() > 5 && path.abs_diff() % 12 > 0
}

/// Similar motion where one voice skips while the other leaps beyond
/// the fourth.
pub fn forbidden_leap(a: PitchPath, b: PitchPath) -> bool {
    is_similar(a, b)
        && ((leap(a) && leap_over_fourth(b)) || (leap(b) && leap_over_fourth(a)))
}

/// A diagonal (cross-voice) interval that exposes the tritone: an
/// augmented or diminished unison class, an augmented third class, or
/// a diminished fourth class.
pub fn expose_devil(cross: PitchPath) -> bool {
    let quality = cross.quality();
    match cross.diatonic_diff() % 7 {
        0 => matches!(
            quality,
            IntervalQuality::Augmented | IntervalQuality::Diminished
        ),
        3 | -3 => quality == IntervalQuality::Augmented,
        4 | -4 => quality == IntervalQuality::Diminished,
        _ => false,
    }
}

/// Tritone cross-relation between two simultaneous steps.
pub fn devil_across_voices(a: PitchPath, b: PitchPath) -> bool {
    expose_devil(PitchPath::of(a.from, b.to)) || expose_devil(PitchPath::of(b.from, a.to))
}

/// Whether a single melodic step is singable in the style: perfect
/// intervals always, major ones only as seconds and thirds, minor ones
/// also as the ascending sixth.
pub fn melodic_feasible(path: PitchPath) -> bool {
    let diff = path.diatonic_diff() % 7;
    match path.quality() {
        IntervalQuality::Perfect => true,
        IntervalQuality::Major => matches!(diff, 1 | 2 | -1 | -2),
        IntervalQuality::Minor => matches!(diff, 1 | 2 | 5 | -1 | -2),
        _ => false,
    }
}

/// Vertical consonance by interval class: perfect quality on the
/// unison/octave and fifth classes, imperfect on the third and sixth
/// classes, nothing else.
pub fn consonant(a: Pitch, b: Pitch) -> bool {
    let degree = a.diatonic_diff(b).unsigned_abs() % 7;
    match degree {
        0 | 4 => quality(a, b) == IntervalQuality::Perfect,
        2 | 5 => matches!(
            quality(a, b),
            IntervalQuality::Major | IntervalQuality::Minor
        ),
        _ => false,
    }
}

/// Convenience for rules that compare against a reference line step.
pub fn reference_step(cf: &crate::melody::CantusFirmus, locus: usize) -> Option<PitchPath> {
    Some(PitchPath::of(
        cf.note(locus.checked_sub(1)?)?,
        cf.note(locus)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::Pitch::*;

    #[test]
    fn motion_classification() {
        let up_a = PitchPath::of(C4, D4);
        let up_b = PitchPath::of(E4, F4);
        let down = PitchPath::of(G4, F4);
        let still = PitchPath::of(A3, A3);
        assert_eq!(contrapuntal_motion(up_a, down), Motion::Contrary);
        assert_eq!(contrapuntal_motion(up_a, still), Motion::Oblique);
        assert_eq!(contrapuntal_motion(still, still), Motion::Same);
        // Equal diatonic steps in the same direction are parallel.
        assert_eq!(contrapuntal_motion(up_a, up_b), Motion::Parallel);
        // Unequal ones are similar.
        let skip = PitchPath::of(C4, F4);
        assert_eq!(contrapuntal_motion(up_a, skip), Motion::Similar);
    }

    #[test]
    fn parallel_fifths_are_forbidden() {
        // D4/G4 moving to E4/A4: fifths on both sides.
        let lower = PitchPath::of(D4, E4);
        let upper = PitchPath::of(A4, B4);
        assert!(forbidden_parallel(lower, upper));
        // Thirds are not.
        let upper_third = PitchPath::of(F4, G4);
        assert!(!forbidden_parallel(lower, upper_third));
    }

    #[test]
    fn hidden_parallel_needs_similar_motion() {
        // Similar motion into a fifth.
        let lower = PitchPath::of(C4, D4);
        let upper = PitchPath::of(F4, A4);
        assert!(forbidden_hidden_parallel(lower, upper));
        // Contrary motion into a fifth is fine.
        let upper_contrary = PitchPath::of(C5, A4);
        assert!(!forbidden_hidden_parallel(lower, upper_contrary));
    }

    #[test]
    fn leap_combinations() {
        let skip = PitchPath::of(C4, E4);
        let big_leap = PitchPath::of(C4, A4);
        assert!(leap(skip));
        assert!(!leap_over_fourth(skip));
        assert!(leap_over_fourth(big_leap));
        assert!(forbidden_leap(skip, big_leap));
        // The plain octave is exempt.
        let octave = PitchPath::of(C4, C5);
        assert!(!leap_over_fourth(octave));
    }

    #[test]
    fn devil_cross_relations() {
        // F against B across the voices.
        let a = PitchPath::of(F3, E3);
        let b = PitchPath::of(A3, B3);
        assert!(devil_across_voices(a, b));
        let c = PitchPath::of(G3, A3);
        let d = PitchPath::of(C4, C4);
        assert!(!devil_across_voices(c, d));
    }

    #[test]
    fn feasible_steps() {
        assert!(melodic_feasible(PitchPath::of(C4, D4))); // major second
        assert!(melodic_feasible(PitchPath::of(A3, F4))); // minor sixth up
        assert!(!melodic_feasible(PitchPath::of(F4, A3))); // minor sixth down
        assert!(!melodic_feasible(PitchPath::of(F3, B3))); // tritone
        assert!(melodic_feasible(PitchPath::of(C4, G4))); // perfect fifth
    }
}
