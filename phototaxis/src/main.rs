//! Evolves network controllers that steer a group of
//! two-wheeled robots towards a light.
//!
//! Usage: `phototaxis [experiment.ron]`. Set `RUST_LOG`
//! to change the log verbosity (`info` by default).

mod arena;
mod config;
mod scenario;

use arena::{ACTUATORS, SENSORS};
use config::ExperimentConfig;
use scenario::{scenarios, Phototaxis};

use oxievo::evaluation::{ControllerDecoder, Evaluator, Scenario};
use oxievo::genomics::GeneticConfig;
use oxievo::populations::logging::EvolutionLogger;
use oxievo::populations::Checkpoint;
use oxievo::{EvolutionCycle, TaskScheduler};
use oxievo_nn::{Network, NetworkDecoder};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_EXPERIMENT: &str = "phototaxis/experiment.ron";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_EXPERIMENT.to_string());
    let experiment = ExperimentConfig::load(&path)?;

    let registry = scenarios().context("scenario registration")?;
    let factory = registry
        .get(&experiment.scenario)
        .with_context(|| format!("available scenarios: {:?}", registry.names().collect::<Vec<_>>()))?;
    let scenario: Phototaxis = factory(&experiment.arena);
    let genetics = GeneticConfig {
        input_count: <Phototaxis as Scenario<Network>>::sensor_count(&scenario),
        output_count: <Phototaxis as Scenario<Network>>::actuator_count(&scenario),
        ..experiment.genetics.clone()
    };

    let decoder = NetworkDecoder::new(experiment.network)
        .with_passes(experiment.passes)
        .expecting(SENSORS, ACTUATORS);
    let evaluator = Evaluator::new(decoder, scenario).with_time_delta(experiment.time_delta);

    let mut cycle = match &experiment.checkpoint {
        Some(path) if path.exists() => {
            let checkpoint = Checkpoint::load(path)
                .with_context(|| format!("loading checkpoint {}", path.display()))?;
            EvolutionCycle::resume(checkpoint, experiment.evolution.clone(), genetics)
                .context("resuming evolution")?
        }
        _ => EvolutionCycle::new(experiment.evolution.clone(), genetics, experiment.seed)
            .context("evolution configuration")?,
    };
    if let Some(genome) = cycle.genomes().first() {
        evaluator.preflight(genome).context("scenario wiring")?;
    }

    let scheduler = TaskScheduler::new(experiment.scheduler.clone()).context("task scheduler")?;
    let mut logger = EvolutionLogger::new(experiment.reporting_level);
    info!(
        scenario = %experiment.scenario,
        seed = cycle.master_seed(),
        generation = cycle.generation(),
        "starting run"
    );

    while !cycle.is_done() {
        let stats = cycle.evolve(&scheduler, &evaluator)?;
        println!("{}", stats);
        logger.log(&cycle, &stats);

        let every = experiment.checkpoint_every;
        if let Some(path) = &experiment.checkpoint {
            if cycle.is_done() || (every > 0 && cycle.generation() % every == 0) {
                cycle
                    .checkpoint()
                    .save(path)
                    .with_context(|| format!("writing checkpoint {}", path.display()))?;
                info!(generation = cycle.generation(), path = %path.display(), "checkpoint written");
            }
        }
    }

    let champion = match cycle.champion() {
        Some(champion) => champion,
        None => {
            warn!("no generation was evaluated");
            return Ok(());
        }
    };
    let mut controller = evaluator
        .decoder()
        .decode(champion)
        .context("decoding the champion")?;
    match evaluator.replay(&mut controller, champion, 0, cycle.master_seed()) {
        Ok(fitness) => println!("champion {} replayed with fitness {}", champion.id(), fitness),
        Err(failure) => warn!(%failure, "champion replay failed"),
    }
    println!("{}", controller);
    Ok(())
}
