// Cantus Colony — demo pipeline entry point.
//
// Grows a population of reference lines, ranks them by the
// compositional room they leave, composes a refined counterpoint over
// the best one, and prints a JSON report of the winning pair together
// with the pheromone state of the constrained graph.
//
// Usage:
//   cargo run --bin compose -- [report.json] [--seed N] [--mode MODE]
//     [--population N] [--generations N] [--chromatic]
//
// Modes: dorian, phrygian, mixolydian, aeolian, ionian

use cantus_colony::colony::{CantusColony, CounterpointColony, Task};
use cantus_colony::eval::{self, EvalKind};
use cantus_colony::evolve::Refiner;
use cantus_colony::locus::LocusGraph;
use cantus_colony::melody::CantusFirmus;
use cantus_colony::mode::Mode;
use cantus_colony::params::{CantusParams, EvolveParams};
use cantus_colony::pitch::pitch_space;
use cantus_colony::thread::ThreadReport;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

#[derive(Serialize)]
struct Report {
    mode: String,
    seed: u64,
    reference: Vec<String>,
    reference_rating: f64,
    counterpoint: ThreadReport,
    fitness: f64,
    generations: usize,
    locus_state: Vec<Vec<cantus_colony::graph::PathState>>,
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str());
    let seed: u64 = parse_flag(&args, "--seed").unwrap_or(2021);
    let population: usize = parse_flag(&args, "--population").unwrap_or(60);
    let generations: usize = parse_flag(&args, "--generations").unwrap_or(40);
    let mode_name: String = parse_flag(&args, "--mode").unwrap_or_else(|| "dorian".to_string());
    let chromatic = args.iter().any(|a| a == "--chromatic");
    let mode = parse_mode(&mode_name);

    println!("=== Cantus Colony ===");
    println!("Mode: {mode:?}");
    println!("Seed: {seed}");
    println!("Population: {population}");
    println!();

    let mut rng = StdRng::seed_from_u64(seed);
    let free = pitch_space(1.0, 1.0);

    // Grow candidate reference lines.
    println!("[1/4] Growing reference lines...");
    let cantus_params = CantusParams {
        population,
        ..CantusParams::default()
    };
    let mut cantus_colony = CantusColony::new(mode, cantus_params, free.clone(), &mut rng);
    if let Err(error) = cantus_colony.run(80, &mut rng) {
        eprintln!("  reference search failed: {error}");
        std::process::exit(1);
    }
    let lines = cantus_colony.completed_lines();
    println!("  {} lines completed.", lines.len());

    // Rank by constrained-graph path counts.
    println!("[2/4] Ranking by compositional room...");
    let mut rated: Vec<(f64, CantusFirmus)> = lines
        .into_iter()
        .map(|cf| {
            let rating = eval::reference_rating(&cf, &free, cantus_params.length_higher);
            (rating, cf)
        })
        .filter(|(rating, _)| *rating > 0.0)
        .collect();
    rated.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let Some((rating, reference)) = rated.into_iter().next() else {
        eprintln!("  no workable reference line found; try another seed");
        std::process::exit(1);
    };
    println!(
        "  best line: {:?} (rating {:.2})",
        reference.melody().labels(),
        rating
    );

    // Compose counterpoint above it.
    println!("[3/4] Composing counterpoint...");
    let locus_graph = match LocusGraph::build(reference.clone(), true, 1.0, 1.0, &free) {
        Ok(graph) => graph,
        Err(error) => {
            eprintln!("  {error}");
            std::process::exit(1);
        }
    };
    let mut colony = CounterpointColony::new(locus_graph);
    colony.set_chromatic(chromatic);
    colony.set_task(Task::DevelopPrimary);
    colony.set_population(population);
    let composed = colony
        .init_population(&mut rng)
        .map_err(|e| e.to_string())
        .and_then(|()| colony.run(&mut rng).map_err(|e| e.to_string()));
    if let Err(error) = composed {
        eprintln!("  counterpoint search failed: {error}");
        std::process::exit(1);
    }
    println!("  average fitness: {:.6}", colony.average_eval());

    // Refine.
    println!("[4/4] Refining...");
    let refine_params = EvolveParams {
        generations,
        ..EvolveParams::default()
    };
    let outcome = match Refiner::new(&mut colony, refine_params).run(&mut rng) {
        Ok(outcome) => outcome,
        Err(error) => {
            eprintln!("  refinement failed: {error}");
            std::process::exit(1);
        }
    };
    println!(
        "  {} generations, average {:.6}",
        outcome.generations, outcome.final_average
    );

    let kind = if chromatic {
        EvalKind::Chromatic
    } else {
        EvalKind::Traditional
    };
    let best = &colony.threads()[0];
    let fitness = eval::evaluate(best.melody(), colony.cf(), kind);
    println!();
    println!("Reference:    {:?}", colony.cf().melody().labels());
    println!("Counterpoint: {:?}", best.melody().labels());
    println!("Fitness:      {fitness:.6}");

    let report = Report {
        mode: format!("{mode:?}"),
        seed,
        reference: colony.cf().melody().labels(),
        reference_rating: rating,
        counterpoint: best.report(),
        fitness,
        generations: outcome.generations,
        locus_state: colony.locus_graph().export_state(),
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            if let Some(path) = output_path {
                if let Err(error) = std::fs::write(path, &json) {
                    eprintln!("failed to write {path}: {error}");
                    std::process::exit(1);
                }
                println!("Report written to {path}");
            } else {
                println!("{json}");
            }
        }
        Err(error) => {
            eprintln!("failed to serialize report: {error}");
            std::process::exit(1);
        }
    }
}

fn parse_mode(name: &str) -> Mode {
    match name.to_lowercase().as_str() {
        "dorian" => Mode::Dorian,
        "phrygian" => Mode::Phrygian,
        "mixolydian" => Mode::Mixolydian,
        "aeolian" => Mode::Aeolian,
        "ionian" => Mode::Ionian,
        _ => {
            eprintln!("Unknown mode '{name}'. Using Dorian.");
            Mode::Dorian
        }
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
