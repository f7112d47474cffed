// Tunable parameters with the system's stock defaults.
//
// Each stage owns a small config struct; `Default` carries the values
// the search was tuned with. The categorical ("thought") dimension and
// the pitch dimension are parameterized separately: the categorical
// graph runs hotter (alpha 2) and with a lower explore chance than the
// pitch graph.

/// Parameters of one pheromone dimension of a colony.
#[derive(Debug, Clone, Copy)]
pub struct DimensionParams {
    pub alpha: f64,
    pub beta: f64,
    pub deposit: f64,
    pub evaporate_rate: f64,
    pub explore_chance: f64,
}

impl DimensionParams {
    /// The categorical dimension's stock tuning.
    pub fn thought() -> Self {
        DimensionParams {
            alpha: 2.0,
            beta: 1.0,
            deposit: 1.0,
            evaporate_rate: 0.1,
            explore_chance: 0.1,
        }
    }

    /// The pitch dimension's stock tuning.
    pub fn pitch() -> Self {
        DimensionParams {
            alpha: 1.0,
            beta: 1.0,
            deposit: 1.0,
            evaporate_rate: 0.1,
            explore_chance: 0.2,
        }
    }

    /// The free-walk dimensions explore more.
    pub fn cantus_thought() -> Self {
        DimensionParams {
            explore_chance: 0.2,
            ..DimensionParams::thought()
        }
    }

    pub fn cantus_pitch() -> Self {
        DimensionParams {
            explore_chance: 0.4,
            ..DimensionParams::pitch()
        }
    }

    /// Freeze the dimension: no deposits, no evaporation. Used by the
    /// composing task so finished trails stay put.
    pub fn frozen(self) -> Self {
        DimensionParams {
            deposit: 0.0,
            evaporate_rate: 0.0,
            ..self
        }
    }
}

/// Reference-line (cantus) colony bounds.
#[derive(Debug, Clone, Copy)]
pub struct CantusParams {
    pub population: usize,
    /// Loci before the cadence short-circuit may fire.
    pub cadence_threshold: usize,
    /// Length above which the line rating starts tempering.
    pub length_higher: usize,
}

impl Default for CantusParams {
    fn default() -> Self {
        CantusParams {
            population: 1000,
            cadence_threshold: 7,
            length_higher: 15,
        }
    }
}

/// Evolutionary refinement knobs.
#[derive(Debug, Clone, Copy)]
pub struct EvolveParams {
    pub generations: usize,
    /// Average-fitness goal; `None` runs to the generation cap.
    pub threshold: Option<f64>,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    /// The lowest `population / select_div` candidates are culled each
    /// generation, and as many operator attempts are made.
    pub select_div: usize,
    pub tournament_k: usize,
}

impl Default for EvolveParams {
    fn default() -> Self {
        EvolveParams {
            generations: 120,
            threshold: Some(0.95),
            crossover_rate: 0.1,
            mutation_rate: 0.2,
            select_div: 4,
            tournament_k: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_zeroes_the_feedback() {
        let frozen = DimensionParams::pitch().frozen();
        assert_eq!(frozen.deposit, 0.0);
        assert_eq!(frozen.evaporate_rate, 0.0);
        assert_eq!(frozen.explore_chance, DimensionParams::pitch().explore_chance);
    }
}
