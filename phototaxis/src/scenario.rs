use crate::arena::{Arena, ArenaSettings, ACTUATORS, SENSORS};
use oxievo::evaluation::{Controller, Fitness, Scenario};
use oxievo::simulation::{Observer, PluginRegistry, Signal, World};
use oxievo::{ConfigurationError, SeededRng, TrialFailure};

use tracing::trace;

/// Robots must reach a light, either fixed for the whole
/// trial or periodically relocated.
#[derive(Clone, Debug)]
pub struct Phototaxis {
    settings: ArenaSettings,
}

impl Phototaxis {
    pub fn new(settings: ArenaSettings) -> Phototaxis {
        Phototaxis { settings }
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }
}

/// Scenario factories, selected by name in the experiment file.
pub type ScenarioFactory = fn(&ArenaSettings) -> Phototaxis;

/// The table of the scenarios this binary knows about.
pub fn scenarios() -> Result<PluginRegistry<ScenarioFactory>, ConfigurationError> {
    let mut registry: PluginRegistry<ScenarioFactory> = PluginRegistry::new();
    registry.register("phototaxis", |settings| {
        Phototaxis::new(ArenaSettings {
            relocation_period: 0.0,
            ..settings.clone()
        })
    })?;
    registry.register("moving-light", |settings| Phototaxis::new(settings.clone()))?;
    Ok(registry)
}

impl<C: Controller + Clone> Scenario<C> for Phototaxis {
    type Environment = Arena<C>;

    fn sensor_count(&self) -> usize {
        SENSORS
    }

    fn actuator_count(&self) -> usize {
        ACTUATORS
    }

    fn build_world(
        &self,
        controller: C,
        sample: usize,
        rng: &mut SeededRng,
    ) -> Result<World<Arena<C>>, TrialFailure> {
        if self.settings.size <= 2.0 * self.settings.robot_radius {
            return Err(TrialFailure::Environment(format!(
                "arena of size {} cannot hold robots of radius {}",
                self.settings.size, self.settings.robot_radius
            )));
        }
        let (arena, robots) = Arena::populate(&self.settings, controller, rng);
        trace!(sample, light = ?arena.light(), "world built");
        Ok(World::new(arena, robots))
    }

    fn evaluation_observer(&self, _: usize) -> Box<dyn Observer<Arena<C>>> {
        Box::new(LightSeeker::new(self.settings.steps))
    }

    fn iterations(&self) -> usize {
        self.settings.steps
    }
}

/// Scores the mean closeness of the robots to the light
/// over the trial, in [0, 1]. Reaching the light ends the
/// trial early, with the remaining steps scored as full
/// closeness.
pub struct LightSeeker {
    steps: usize,
    observed: usize,
    closeness: f64,
    captured: bool,
}

impl LightSeeker {
    pub fn new(steps: usize) -> LightSeeker {
        LightSeeker {
            steps: steps.max(1),
            observed: 0,
            closeness: 0.0,
            captured: false,
        }
    }

    pub fn captured(&self) -> bool {
        self.captured
    }
}

impl<C: Controller> Observer<Arena<C>> for LightSeeker {
    fn on_step(&mut self, _: f64, world: &World<Arena<C>>) -> Signal {
        let arena = world.environment();
        let settings = arena.settings();
        let diagonal = settings.size * std::f64::consts::SQRT_2;
        let robots = world.robots();

        let mean_distance = robots
            .iter()
            .map(|r| r.position().distance(arena.light()))
            .sum::<f64>()
            / robots.len().max(1) as f64;
        self.closeness += 1.0 - (mean_distance / diagonal).min(1.0);
        self.observed += 1;

        if robots
            .iter()
            .any(|r| r.position().distance(arena.light()) <= settings.capture_radius)
        {
            trace!(robot = ?robots.iter().map(|r| r.id()).collect::<Vec<_>>(), "light reached");
            self.captured = true;
            return Signal::Stop;
        }
        Signal::Continue
    }

    fn fitness(&self) -> Option<Fitness> {
        if self.observed == 0 {
            return None;
        }
        let (remaining, scored) = if self.captured {
            let remaining = self.steps.saturating_sub(self.observed);
            (remaining as f64, self.observed + remaining)
        } else {
            (0.0, self.observed)
        };
        Some(Fitness::Scalar(((self.closeness + remaining) / scored as f64) as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxievo::evaluation::{ControllerDecoder, Evaluate, Evaluator};
    use oxievo::genomics::{Genome, InnovationRegistry};
    use oxievo_nn::{NetworkDecoder, NetworkKind};

    use rand::SeedableRng;

    fn settings() -> ArenaSettings {
        ArenaSettings {
            size: 10.0,
            robots: 2,
            robot_radius: 0.25,
            wheel_base: 0.4,
            max_speed: 1.0,
            wall_sensor_range: 1.0,
            capture_radius: 0.5,
            relocation_period: 5.0,
            steps: 60,
        }
    }

    fn genome(seed: u64) -> Genome {
        let mut registry = InnovationRegistry::new();
        let templates = registry
            .initialize_innovations(1, SENSORS, ACTUATORS, false, 0)
            .unwrap();
        Genome::from_template(&templates[0], 0, &mut SeededRng::seed_from_u64(seed))
    }

    fn evaluator(scenario: Phototaxis) -> Evaluator<NetworkDecoder, Phototaxis> {
        let decoder = NetworkDecoder::new(NetworkKind::Discrete).expecting(SENSORS, ACTUATORS);
        Evaluator::new(decoder, scenario)
    }

    #[test]
    fn registry_knows_both_scenarios() {
        let registry = scenarios().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["moving-light", "phototaxis"]);
        let still = registry.get("phototaxis").unwrap()(&settings());
        assert_eq!(still.settings().relocation_period, 0.0);
        let moving = registry.get("moving-light").unwrap()(&settings());
        assert_eq!(moving.settings().relocation_period, 5.0);
        assert!(registry.get("maze").is_err());
    }

    #[test]
    fn trials_are_reproducible() {
        let evaluator = evaluator(Phototaxis::new(settings()));
        let subject = genome(3);
        let a = evaluator.evaluate_sample(&subject, 2, 11).unwrap();
        let b = evaluator.evaluate_sample(&subject, 2, 11).unwrap();
        assert_eq!(a, b);
        let score = a.primary();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn preflight_checks_wiring() {
        let evaluator = evaluator(Phototaxis::new(settings()));
        assert!(evaluator.preflight(&genome(0)).is_ok());

        let empty = self::evaluator(Phototaxis::new(ArenaSettings {
            robots: 0,
            ..settings()
        }));
        assert_eq!(empty.preflight(&genome(0)), Err(ConfigurationError::NoRobots));

        let mut registry = InnovationRegistry::new();
        let wrong_shape = registry.initialize_innovations(1, 3, 2, false, 0).unwrap().remove(0);
        assert!(evaluator.preflight(&wrong_shape).is_err());
    }

    #[test]
    fn capture_scores_remaining_steps() {
        let mut seeker = LightSeeker::new(10);
        assert_eq!(Observer::<Arena<oxievo_nn::Network>>::fitness(&seeker), None);
        seeker.observed = 4;
        seeker.closeness = 2.0;
        seeker.captured = true;
        let fitness = Observer::<Arena<oxievo_nn::Network>>::fitness(&seeker);
        assert_eq!(fitness, Some(Fitness::Scalar(0.8)));
    }

    #[test]
    fn replay_matches_evaluation() {
        let evaluator = evaluator(Phototaxis::new(settings()));
        let champion = genome(5);
        let expected = evaluator.evaluate_sample(&champion, 0, 21).unwrap();
        let mut controller = evaluator.decoder().decode(&genome(9)).unwrap();
        let replayed = evaluator.replay(&mut controller, &champion, 0, 21).unwrap();
        assert_eq!(replayed, expected);
    }
}
