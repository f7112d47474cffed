// Generational evolutionary refinement of complete counterpoint
// populations.
//
// Operates strictly on finished lines, never on walks in progress.
// Candidates live in a flat arena with a cached fitness (unevaluated
// until first ranked); ranking is a full sort by fitness, and
// tournament selection returns the best *rank* among k distinct
// samples, which presses harder than best-of-sample fitness.
//
// Crossover splices two parents at a randomly chosen interior locus
// where they agree on the same pitch; one parent comes from the
// population, the other is a fresh colony walk. Mutation forces a
// different continuation at a random interior locus and walks the
// locus graph forward, remerging onto the parent as soon as an edge
// into the parent's pitch exists. Both operators signal "no result"
// rather than failing; the caller simply tries again next quota slot.

use std::cmp::Ordering;

use log::debug;
use rand::Rng;

use crate::colony::{ColonyError, CounterpointColony};
use crate::eval;
use crate::locus::LocusGraph;
use crate::melody::Melody;
use crate::params::EvolveParams;
use crate::pitch::Pitch;
use crate::thread::CounterpointThread;

#[derive(Debug)]
struct Candidate {
    thread: CounterpointThread,
    fitness: Option<f64>,
}

impl Candidate {
    fn fresh(thread: CounterpointThread) -> Self {
        Candidate {
            thread,
            fitness: None,
        }
    }
}

/// Statistics of a refinement run.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub generations: usize,
    pub averages: Vec<f64>,
    pub final_average: f64,
}

enum Operator {
    Crossover,
    Mutation,
}

/// Generational refiner over a counterpoint colony's population.
pub struct Refiner<'a> {
    colony: &'a mut CounterpointColony,
    population: Vec<Candidate>,
    target_size: usize,
    params: EvolveParams,
}

impl<'a> Refiner<'a> {
    /// Take over the colony's (complete) population.
    pub fn new(colony: &'a mut CounterpointColony, params: EvolveParams) -> Self {
        let population: Vec<Candidate> = colony
            .take_threads()
            .into_iter()
            .map(Candidate::fresh)
            .collect();
        let target_size = population.len();
        Refiner {
            colony,
            population,
            target_size,
            params,
        }
    }

    fn eval_sort(&mut self) {
        let cf = self.colony.cf().clone();
        let kind = self.colony.eval_kind();
        for candidate in &mut self.population {
            if candidate.fitness.is_none() {
                candidate.fitness =
                    Some(eval::evaluate(candidate.thread.melody(), &cf, kind));
            }
        }
        self.population
            .sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
    }

    fn average(&self) -> f64 {
        if self.population.is_empty() {
            return 0.0;
        }
        let total: f64 = self.population.iter().filter_map(|c| c.fitness).sum();
        total / self.population.len() as f64
    }

    /// k-tournament over rank: draw k distinct indices into the ranked
    /// population, return the smallest (best-ranked).
    fn tournament(&self, rng: &mut impl Rng) -> usize {
        let len = self.population.len();
        let k = self.params.tournament_k.clamp(1, len);
        let mut best = rng.random_range(0..len);
        let mut drawn = vec![best];
        while drawn.len() < k {
            let index = rng.random_range(0..len);
            if !drawn.contains(&index) {
                drawn.push(index);
                best = best.min(index);
            }
        }
        best
    }

    fn contains(&self, offspring: &[Candidate], notes: &[Pitch]) -> bool {
        self.population
            .iter()
            .chain(offspring.iter())
            .any(|c| c.thread.melody().notes() == notes)
    }

    fn pick_operator(&self, rng: &mut impl Rng) -> Option<Operator> {
        let crossover = self.params.crossover_rate;
        let mutation = self.params.mutation_rate;
        if self.params.threshold.is_some() {
            // With a convergence goal the rates are normalized against
            // each other: every slot runs one of the two.
            let total = crossover + mutation;
            if total <= 0.0 {
                return None;
            }
            if rng.random::<f64>() < crossover / total {
                Some(Operator::Crossover)
            } else {
                Some(Operator::Mutation)
            }
        } else if rng.random::<f64>() < 0.5 {
            (rng.random::<f64>() < crossover).then_some(Operator::Crossover)
        } else {
            (rng.random::<f64>() < mutation).then_some(Operator::Mutation)
        }
    }

    /// Run the generational loop and hand the refined population back
    /// to the colony.
    pub fn run(mut self, rng: &mut impl Rng) -> Result<RefineOutcome, ColonyError> {
        self.eval_sort();
        let mut averages = vec![self.average()];
        let mut generation = 0usize;

        if self.population.is_empty() {
            return Ok(RefineOutcome {
                generations: 0,
                averages,
                final_average: 0.0,
            });
        }

        while generation < self.params.generations {
            if let Some(threshold) = self.params.threshold {
                if self.average() >= threshold {
                    break;
                }
            }

            // Cull the lowest-ranked fraction, keeping a breeding core.
            let cull = (self.target_size / self.params.select_div.max(1)).max(1);
            let keep = self.target_size.saturating_sub(cull).max(2);
            self.population.truncate(keep);

            let mut offspring: Vec<Candidate> = Vec::new();
            for _ in 0..cull {
                match self.pick_operator(rng) {
                    Some(Operator::Crossover) => {
                        let domestic = self.tournament(rng);
                        let external = self.colony.develop_thread(rng)?;
                        let a = self.population[domestic].thread.melody().notes();
                        let b = external.melody().notes();
                        if let Some((c0, c1)) = crossover_melodies(a, b, rng) {
                            for child in [c0, c1] {
                                if !self.contains(&offspring, &child) {
                                    offspring.push(Candidate::fresh(
                                        CounterpointThread::from_melody(Melody::new(child)),
                                    ));
                                }
                            }
                        }
                    }
                    Some(Operator::Mutation) => {
                        let parent = self.tournament(rng);
                        let notes = self.population[parent].thread.melody().notes().to_vec();
                        if let Some(mutant) =
                            mutate_melody(self.colony.locus_graph(), &notes, rng)
                        {
                            if !self.contains(&offspring, &mutant) {
                                offspring.push(Candidate::fresh(
                                    CounterpointThread::from_melody(Melody::new(mutant)),
                                ));
                            }
                        }
                    }
                    None => {}
                }
            }

            self.population.extend(offspring);
            self.eval_sort();
            self.population.truncate(self.target_size);

            generation += 1;
            let average = self.average();
            averages.push(average);
            debug!("generation {generation}: average fitness {average:.6}");
        }

        let final_average = self.average();
        self.colony.set_threads(
            self.population
                .into_iter()
                .map(|candidate| candidate.thread)
                .collect(),
        );
        Ok(RefineOutcome {
            generations: generation,
            averages,
            final_average,
        })
    }
}

/// Single-point crossover at a shared interior locus. Both offspring
/// keep the parents' length. `None` when the parents share no interior
/// locus, or agree everywhere (the offspring would clone them).
pub fn crossover_melodies(
    a: &[Pitch],
    b: &[Pitch],
    rng: &mut impl Rng,
) -> Option<(Vec<Pitch>, Vec<Pitch>)> {
    let length = a.len();
    if b.len() != length || length < 6 {
        return None;
    }
    let shared: Vec<usize> = (1..length - 4).filter(|&i| a[i] == b[i]).collect();
    if shared.is_empty() || shared.len() == length - 5 {
        return None;
    }
    let locus = shared[rng.random_range(0..shared.len())];
    let mut c0 = a[..locus].to_vec();
    c0.extend_from_slice(&b[locus..]);
    let mut c1 = b[..locus].to_vec();
    c1.extend_from_slice(&a[locus..]);
    Some((c0, c1))
}

/// Graph-guided mutation: force a different continuation at a random
/// interior locus with more than one legal option, then walk forward,
/// remerging onto the parent as soon as the locus graph offers an edge
/// into the pitch the parent already holds there.
pub fn mutate_melody(
    graph: &LocusGraph,
    notes: &[Pitch],
    rng: &mut impl Rng,
) -> Option<Vec<Pitch>> {
    let length = notes.len();
    if length < 6 {
        return None;
    }
    let qualifying: Vec<usize> = (1..length - 4)
        .filter(|&i| graph.candidates(i, notes[i - 1]).len() > 1)
        .collect();
    let locus = *pick(&qualifying, rng)?;

    let options = graph.candidates(locus, notes[locus - 1]);
    let different: Vec<usize> = options
        .into_iter()
        .filter(|&i| graph.layer(locus)[i].to != notes[locus])
        .collect();
    let replacement = *pick(&different, rng)?;

    let mut mutant: Vec<Pitch> = notes[..locus].to_vec();
    mutant.push(graph.layer(locus)[replacement].to);
    loop {
        if mutant.len() == length {
            return Some(mutant);
        }
        let position = mutant.len();
        let last = *mutant.last()?;
        let continuations = graph.candidates(position, last);
        if continuations
            .iter()
            .any(|&i| graph.layer(position)[i].to == notes[position])
        {
            mutant.extend_from_slice(&notes[position..]);
            return Some(mutant);
        }
        let first = *continuations.first()?;
        mutant.push(graph.layer(position)[first].to);
    }
}

fn pick<'a, T>(pool: &'a [T], rng: &mut impl Rng) -> Option<&'a T> {
    if pool.is_empty() {
        return None;
    }
    pool.get(rng.random_range(0..pool.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Task;
    use crate::melody::CantusFirmus;
    use crate::mode::Mode;
    use crate::pitch::{Pitch::*, pitch_space};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fux_dorian() -> CantusFirmus {
        CantusFirmus::new(
            Mode::Dorian,
            vec![D4, F4, E4, D4, G4, F4, A4, G4, F4, E4, D4],
        )
    }

    fn built_graph() -> LocusGraph {
        let free = pitch_space(1.0, 1.0);
        LocusGraph::build(fux_dorian(), true, 1.0, 1.0, &free).unwrap()
    }

    #[test]
    fn crossover_keeps_length_and_splices() {
        let a = vec![A4, A4, G4, A4, B4, C5, C5, B4, D5, Cs5, D5];
        let b = vec![D5, C5, B4, A4, B4, A4, C5, C5, A4, Cs5, D5];
        let mut rng = StdRng::seed_from_u64(1);
        let (c0, c1) = crossover_melodies(&a, &b, &mut rng).unwrap();
        assert_eq!(c0.len(), a.len());
        assert_eq!(c1.len(), a.len());
        // The splice point is one of the shared interior loci: 3, 4, 6.
        let shared = [3usize, 4, 6];
        assert!(
            shared
                .iter()
                .any(|&l| c0[..l] == a[..l] && c0[l..] == b[l..])
        );
        assert!(
            shared
                .iter()
                .any(|&l| c1[..l] == b[..l] && c1[l..] == a[l..])
        );
    }

    #[test]
    fn crossover_rejects_disjoint_and_identical_parents() {
        let a = vec![A4, A4, G4, A4, B4, C5, C5, B4, D5, Cs5, D5];
        let mut rng = StdRng::seed_from_u64(2);
        // Identical parents agree everywhere: rejected.
        assert!(crossover_melodies(&a, &a.clone(), &mut rng).is_none());
        // No shared interior locus: rejected.
        let b = vec![D5, C5, B4, C5, D5, A4, A4, A4, C5, B4, D5];
        assert!(crossover_melodies(&a, &b, &mut rng).is_none());
        // Length mismatch: rejected.
        assert!(crossover_melodies(&a, &a[..8], &mut rng).is_none());
    }

    #[test]
    fn mutation_changes_and_stays_legal() {
        let graph = built_graph();
        let mut colony = CounterpointColony::new(built_graph());
        colony.set_population(6);
        let mut rng = StdRng::seed_from_u64(9);
        colony.init_population(&mut rng).unwrap();
        colony.run(&mut rng).unwrap();
        let parent = colony.threads()[0].melody().notes().to_vec();

        let mut mutated_any = false;
        for attempt in 0..20 {
            let mut attempt_rng = StdRng::seed_from_u64(100 + attempt);
            let Some(mutant) = mutate_melody(&graph, &parent, &mut attempt_rng) else {
                continue;
            };
            assert_eq!(mutant.len(), parent.len());
            if mutant != parent {
                mutated_any = true;
            }
            // Every step of the mutant is an edge of the locus graph.
            for locus in 1..mutant.len() {
                assert!(
                    graph
                        .layer(locus)
                        .iter()
                        .any(|e| e.from == Some(mutant[locus - 1]) && e.to == mutant[locus]),
                    "illegal step {} -> {} at locus {locus}",
                    mutant[locus - 1],
                    mutant[locus]
                );
            }
        }
        assert!(mutated_any, "no attempt produced a mutation");
    }

    #[test]
    fn refinement_returns_a_bounded_ranked_population() {
        let mut colony = CounterpointColony::new(built_graph());
        colony.set_task(Task::Compose);
        colony.set_population(10);
        let mut rng = StdRng::seed_from_u64(33);
        colony.init_population(&mut rng).unwrap();
        colony.run(&mut rng).unwrap();

        let params = EvolveParams {
            generations: 8,
            threshold: Some(0.99),
            ..EvolveParams::default()
        };
        let outcome = Refiner::new(&mut colony, params).run(&mut rng).unwrap();
        assert!(outcome.generations <= 8);
        assert!(!outcome.averages.is_empty());
        assert!(outcome.final_average > 0.0);
        assert!(colony.threads().len() <= 10);
        // The population came back ranked and complete.
        for thread in colony.threads() {
            assert!(thread.is_completed());
            assert_eq!(thread.len(), colony.cf().len());
        }
    }

    #[test]
    fn refinement_is_deterministic_per_seed() {
        let outcome = |seed: u64| {
            let mut colony = CounterpointColony::new(built_graph());
            colony.set_task(Task::Compose);
            colony.set_population(8);
            let mut rng = StdRng::seed_from_u64(seed);
            colony.init_population(&mut rng).unwrap();
            colony.run(&mut rng).unwrap();
            let params = EvolveParams {
                generations: 5,
                ..EvolveParams::default()
            };
            let result = Refiner::new(&mut colony, params).run(&mut rng).unwrap();
            (
                result.averages,
                colony
                    .threads()
                    .iter()
                    .map(|t| t.melody().labels())
                    .collect::<Vec<_>>(),
            )
        };
        assert_eq!(outcome(77), outcome(77));
    }
}
