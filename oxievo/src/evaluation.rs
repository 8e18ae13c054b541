//! Turning genomes into fitness values.
//!
//! A [`ControllerDecoder`] builds a runnable [`Controller`] from a
//! genome, a [`Scenario`] builds a fresh simulated [`World`] around
//! it for every trial, and the [`Evaluator`] runs the trials and
//! averages what the scenario's evaluation observer reports.

use crate::genomics::Genome;
use crate::simulation::{Environment, Observer, SimulationEngine, World};
use crate::{ConfigurationError, SeededRng, TrialFailure};

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::Range;

/// Fitness given to genomes none of whose trials completed.
/// Fitness values are non-negative, so this is the worst possible.
pub const WORST_FITNESS: f32 = 0.0;

/// The result of evaluating a genome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Fitness {
    Scalar(f32),
    /// Multi-objective fitness. The first component
    /// is used for selection.
    Vector(Vec<f32>),
}

impl Fitness {
    /// Returns the value used for ranking genomes.
    pub fn primary(&self) -> f32 {
        match self {
            Fitness::Scalar(value) => *value,
            Fitness::Vector(values) => values.first().copied().unwrap_or(WORST_FITNESS),
        }
    }

    /// Whether both values are scalars, or vectors of the same length.
    pub fn same_shape(&self, other: &Fitness) -> bool {
        match (self, other) {
            (Fitness::Scalar(_), Fitness::Scalar(_)) => true,
            (Fitness::Vector(a), Fitness::Vector(b)) => a.len() == b.len(),
            _ => false,
        }
    }

    /// Replaces NaN components with the worst fitness.
    fn sanitized(self) -> Fitness {
        let clean = |v: f32| if v.is_nan() { WORST_FITNESS } else { v };
        match self {
            Fitness::Scalar(value) => Fitness::Scalar(clean(value)),
            Fitness::Vector(values) => Fitness::Vector(values.into_iter().map(clean).collect()),
        }
    }

    /// Arithmetic (component-wise, for vectors) mean.
    /// A single value is returned as is.
    ///
    /// # Examples
    /// ```
    /// use oxievo::Fitness;
    ///
    /// let samples = [Fitness::Scalar(2.0), Fitness::Scalar(4.0), Fitness::Scalar(6.0)];
    /// assert_eq!(Fitness::mean(&samples), Some(Fitness::Scalar(4.0)));
    /// assert_eq!(Fitness::mean(&[]), None);
    /// ```
    pub fn mean<'a, I>(samples: I) -> Option<Fitness>
    where
        I: IntoIterator<Item = &'a Fitness>,
    {
        Self::weighted_mean(samples.into_iter().map(|f| (f, 1)))
    }

    /// Mean of the samples weighted by their counts. Samples
    /// whose shape differs from the first one are ignored,
    /// as are those with zero weight.
    pub fn weighted_mean<'a, I>(samples: I) -> Option<Fitness>
    where
        I: IntoIterator<Item = (&'a Fitness, usize)>,
    {
        let samples: Vec<(&Fitness, usize)> =
            samples.into_iter().filter(|&(_, weight)| weight > 0).collect();
        let first = samples.first()?.0;
        if samples.len() == 1 {
            return Some(first.clone());
        }

        let compatible: Vec<(&Fitness, f32)> = samples
            .iter()
            .filter(|(fitness, _)| fitness.same_shape(first))
            .map(|&(fitness, weight)| (fitness, weight as f32))
            .collect();
        let total: f32 = compatible.iter().map(|(_, weight)| weight).sum();

        Some(match first {
            Fitness::Scalar(_) => Fitness::Scalar(
                compatible
                    .iter()
                    .map(|(fitness, weight)| fitness.primary() * weight)
                    .sum::<f32>()
                    / total,
            ),
            Fitness::Vector(values) => {
                let mut sums = vec![0.0; values.len()];
                for (fitness, weight) in &compatible {
                    if let Fitness::Vector(values) = fitness {
                        for (sum, value) in sums.iter_mut().zip(values) {
                            *sum += value * weight;
                        }
                    }
                }
                Fitness::Vector(sums.into_iter().map(|sum| sum / total).collect())
            }
        })
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fitness::Scalar(value) => write!(f, "{:.4}", value),
            Fitness::Vector(values) => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:.4}", value)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Aggregated outcome of several trials of one genome.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Mean fitness of the successful trials, or
    /// [`WORST_FITNESS`] if none succeeded.
    pub fitness: Fitness,
    /// Number of trials that contributed to the mean.
    pub successes: usize,
    /// Trials that failed, by sample index.
    pub failures: Vec<(usize, TrialFailure)>,
}

impl Evaluation {
    /// Aggregates per-sample outcomes. Failed samples, and those
    /// whose fitness shape differs from the first success, are
    /// excluded from the mean.
    pub fn aggregate(outcomes: Vec<(usize, Result<Fitness, TrialFailure>)>) -> Evaluation {
        let mut successes: Vec<Fitness> = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (sample, outcome) in outcomes {
            match outcome {
                Ok(fitness) => {
                    let compatible = successes.first().map_or(true, |f| f.same_shape(&fitness));
                    if compatible {
                        successes.push(fitness.sanitized());
                    } else {
                        failures.push((sample, TrialFailure::FitnessShape(sample)));
                    }
                }
                Err(failure) => failures.push((sample, failure)),
            }
        }
        Evaluation {
            fitness: Fitness::mean(&successes).unwrap_or(Fitness::Scalar(WORST_FITNESS)),
            successes: successes.len(),
            failures,
        }
    }
}

/// A runnable controller decoded from a genome.
pub trait Controller {
    /// Maps a sensor snapshot to actuator commands.
    fn act(&mut self, sensors: &[f32]) -> Vec<f32>;

    /// Clears any internal state.
    fn reset(&mut self);
}

/// Builds controllers from genomes.
pub trait ControllerDecoder: Sync {
    type Controller: Controller;
    type Error: std::error::Error;

    fn decode(&self, genome: &Genome) -> Result<Self::Controller, Self::Error>;

    /// Re-wires an existing controller to implement `genome`, in place.
    fn rewire(&self, controller: &mut Self::Controller, genome: &Genome) -> Result<(), Self::Error> {
        *controller = self.decode(genome)?;
        Ok(())
    }
}

/// An environment plugin: everything needed to run
/// one trial of a controller of type `C`.
pub trait Scenario<C>: Sync {
    type Environment: Environment;

    /// Number of sensor values each robot feeds its controller.
    fn sensor_count(&self) -> usize;

    /// Number of actuator commands each robot expects.
    fn actuator_count(&self) -> usize;

    /// Builds a fresh world for `sample` around `controller`.
    /// All randomness must come from `rng`.
    fn build_world(
        &self,
        controller: C,
        sample: usize,
        rng: &mut SeededRng,
    ) -> Result<World<Self::Environment>, TrialFailure>;

    /// The observer whose fitness is the trial's result.
    fn evaluation_observer(&self, sample: usize) -> Box<dyn Observer<Self::Environment>>;

    /// Maximum number of steps per trial.
    fn iterations(&self) -> usize;
}

/// Anything that can compute the fitness of a genome on one sample.
pub trait Evaluate: Sync {
    /// Runs trial `sample` of `genome`. The trial's randomness
    /// is derived from `(base_seed, sample)` only.
    fn evaluate_sample(
        &self,
        genome: &Genome,
        sample: usize,
        base_seed: u64,
    ) -> Result<Fitness, TrialFailure>;

    /// Runs the given samples and aggregates them.
    fn evaluate(&self, genome: &Genome, samples: Range<usize>, base_seed: u64) -> Evaluation {
        Evaluation::aggregate(
            samples
                .map(|sample| (sample, self.evaluate_sample(genome, sample, base_seed)))
                .collect(),
        )
    }
}

/// Derives the seed of trial `trial` from a base seed,
/// using the trial index as the ChaCha stream number.
///
/// # Examples
/// ```
/// use oxievo::evaluation::trial_seed;
///
/// assert_eq!(trial_seed(7, 3), trial_seed(7, 3));
/// assert_ne!(trial_seed(7, 3), trial_seed(7, 4));
/// ```
pub fn trial_seed(base_seed: u64, trial: usize) -> u64 {
    let mut rng = SeededRng::seed_from_u64(base_seed);
    rng.set_stream(trial as u64);
    rng.gen()
}

/// Evaluates genomes by simulation: decode, build a world, run, observe.
pub struct Evaluator<D, S> {
    decoder: D,
    scenario: S,
    time_delta: f64,
}

impl<D, S> Evaluator<D, S>
where
    D: ControllerDecoder,
    S: Scenario<D::Controller>,
{
    pub fn new(decoder: D, scenario: S) -> Evaluator<D, S> {
        Evaluator {
            decoder,
            scenario,
            time_delta: crate::simulation::DEFAULT_TIME_DELTA,
        }
    }

    /// Sets the simulated time step of every trial.
    pub fn with_time_delta(self, time_delta: f64) -> Evaluator<D, S> {
        Evaluator { time_delta, ..self }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn scenario(&self) -> &S {
        &self.scenario
    }

    /// Runs one trial of an already decoded controller.
    pub fn run_trial(
        &self,
        controller: D::Controller,
        sample: usize,
        seed: u64,
    ) -> Result<Fitness, TrialFailure> {
        let mut rng = SeededRng::seed_from_u64(seed);
        let world = self.scenario.build_world(controller, sample, &mut rng)?;
        let mut engine = SimulationEngine::with_rng(world, rng)?;
        engine.set_time_delta(self.time_delta);
        let observer = engine.add_observer(self.scenario.evaluation_observer(sample));
        engine.run(self.scenario.iterations())?;
        engine
            .observer(observer)
            .fitness()
            .ok_or(TrialFailure::MissingFitness)
    }

    /// Re-wires `controller` to implement `genome` and runs one
    /// trial with it, as done when replaying a champion.
    pub fn replay(
        &self,
        controller: &mut D::Controller,
        genome: &Genome,
        sample: usize,
        base_seed: u64,
    ) -> Result<Fitness, TrialFailure>
    where
        D::Controller: Clone,
    {
        self.decoder
            .rewire(controller, genome)
            .map_err(|e| TrialFailure::Decode(e.to_string()))?;
        controller.reset();
        self.run_trial(controller.clone(), sample, trial_seed(base_seed, sample))
    }

    /// Checks, before a run starts, that `genome` decodes
    /// and the scenario builds a simulable world around it.
    pub fn preflight(&self, genome: &Genome) -> Result<(), ConfigurationError> {
        let controller = self
            .decoder
            .decode(genome)
            .map_err(|e| ConfigurationError::invalid("decoder", e.to_string()))?;
        let mut rng = SeededRng::seed_from_u64(0);
        let world = match self.scenario.build_world(controller, 0, &mut rng) {
            Ok(world) => world,
            Err(TrialFailure::Wiring(error)) => return Err(error),
            Err(failure) => return Err(ConfigurationError::invalid("scenario", failure.to_string())),
        };
        SimulationEngine::with_rng(world, rng).map(|_| ())
    }
}

impl<D, S> Evaluate for Evaluator<D, S>
where
    D: ControllerDecoder,
    S: Scenario<D::Controller>,
{
    fn evaluate_sample(
        &self,
        genome: &Genome,
        sample: usize,
        base_seed: u64,
    ) -> Result<Fitness, TrialFailure> {
        let controller = self
            .decoder
            .decode(genome)
            .map_err(|e| TrialFailure::Decode(e.to_string()))?;
        self.run_trial(controller, sample, trial_seed(base_seed, sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{ObjectId, Robot, Signal};

    use thiserror::Error;

    #[test]
    fn aggregation_is_arithmetic_mean() {
        let evaluation = Evaluation::aggregate(vec![
            (0, Ok(Fitness::Scalar(2.0))),
            (1, Ok(Fitness::Scalar(4.0))),
            (2, Ok(Fitness::Scalar(6.0))),
        ]);
        assert_eq!(evaluation.fitness, Fitness::Scalar(4.0));
        assert_eq!(evaluation.successes, 3);
        assert!(evaluation.failures.is_empty());
    }

    #[test]
    fn single_sample_unaveraged() {
        let evaluation = Evaluation::aggregate(vec![(4, Ok(Fitness::Scalar(0.1)))]);
        assert_eq!(evaluation.fitness, Fitness::Scalar(0.1));
    }

    #[test]
    fn failures_excluded() {
        let evaluation = Evaluation::aggregate(vec![
            (0, Ok(Fitness::Scalar(3.0))),
            (1, Err(TrialFailure::MissingFitness)),
            (2, Ok(Fitness::Scalar(5.0))),
        ]);
        assert_eq!(evaluation.fitness, Fitness::Scalar(4.0));
        assert_eq!(evaluation.failures, vec![(1, TrialFailure::MissingFitness)]);

        let all_failed = Evaluation::aggregate(vec![
            (0, Err(TrialFailure::Environment("no light".into()))),
            (1, Err(TrialFailure::MissingFitness)),
        ]);
        assert_eq!(all_failed.fitness, Fitness::Scalar(WORST_FITNESS));
        assert_eq!(all_failed.successes, 0);
        assert_eq!(all_failed.failures.len(), 2);
    }

    #[test]
    fn vector_mean_and_shape_mismatch() {
        let evaluation = Evaluation::aggregate(vec![
            (0, Ok(Fitness::Vector(vec![1.0, 4.0]))),
            (1, Ok(Fitness::Vector(vec![3.0, 0.0]))),
            (2, Ok(Fitness::Scalar(9.0))),
            (3, Ok(Fitness::Vector(vec![f32::NAN, 2.0]))),
        ]);
        assert_eq!(evaluation.fitness, Fitness::Vector(vec![4.0 / 3.0, 2.0]));
        assert_eq!(evaluation.failures, vec![(2, TrialFailure::FitnessShape(2))]);
        assert_eq!(evaluation.fitness.primary(), 4.0 / 3.0);
    }

    #[test]
    fn weighted_mean() {
        let a = Fitness::Scalar(1.0);
        let b = Fitness::Scalar(4.0);
        assert_eq!(
            Fitness::weighted_mean(vec![(&a, 2), (&b, 1)]),
            Some(Fitness::Scalar(2.0))
        );
        assert_eq!(
            Fitness::weighted_mean(vec![(&a, 0), (&b, 3)]),
            Some(Fitness::Scalar(4.0))
        );
    }

    // A one-dimensional world: the robot starts at a random
    // position and moves by its controller's output each step.

    #[derive(Clone)]
    struct Constant(f32);

    impl Controller for Constant {
        fn act(&mut self, _: &[f32]) -> Vec<f32> {
            vec![self.0]
        }

        fn reset(&mut self) {}
    }

    #[derive(Error, Debug)]
    #[error("genome has no links")]
    struct NoLinks;

    struct SumOfWeights;

    impl ControllerDecoder for SumOfWeights {
        type Controller = Constant;
        type Error = NoLinks;

        fn decode(&self, genome: &Genome) -> Result<Constant, NoLinks> {
            if genome.links().count() == 0 {
                return Err(NoLinks);
            }
            Ok(Constant(genome.links().map(|l| l.weight()).sum()))
        }
    }

    struct Line;

    struct Mover {
        position: f32,
        controller: Constant,
        command: f32,
    }

    impl Environment for Line {
        type Robot = Mover;

        fn update(&mut self, _: f64, _: &mut SeededRng) {}

        fn update_collisions(&mut self, _: &mut [Mover], _: f64) {}
    }

    impl Robot<Line> for Mover {
        fn update_sensors(&mut self, _: &Line, _: &[ObjectId], _: f64) {}

        fn control_step(&mut self, _: f64) -> Result<(), TrialFailure> {
            self.command = self.controller.act(&[self.position])[0];
            Ok(())
        }

        fn update_actuators(&mut self, _: &mut Line, _: f64, dt: f64) -> Result<(), TrialFailure> {
            self.position += self.command * dt as f32;
            Ok(())
        }
    }

    struct Distance;

    impl Observer<Line> for Distance {
        fn on_step(&mut self, _: f64, _: &World<Line>) -> Signal {
            Signal::Continue
        }
    }

    struct FinalPosition(f32);

    impl Observer<Line> for FinalPosition {
        fn on_step(&mut self, _: f64, world: &World<Line>) -> Signal {
            self.0 = world.robots()[0].position;
            Signal::Continue
        }

        fn fitness(&self) -> Option<Fitness> {
            Some(Fitness::Scalar(self.0))
        }
    }

    struct LineScenario {
        robots: usize,
        silent: bool,
    }

    impl Scenario<Constant> for LineScenario {
        type Environment = Line;

        fn sensor_count(&self) -> usize {
            1
        }

        fn actuator_count(&self) -> usize {
            1
        }

        fn build_world(
            &self,
            controller: Constant,
            _: usize,
            rng: &mut SeededRng,
        ) -> Result<World<Line>, TrialFailure> {
            let robots = (0..self.robots)
                .map(|_| Mover {
                    position: rng.gen_range(0.0..1.0),
                    controller: controller.clone(),
                    command: 0.0,
                })
                .collect();
            Ok(World::new(Line, robots))
        }

        fn evaluation_observer(&self, _: usize) -> Box<dyn Observer<Line>> {
            if self.silent {
                Box::new(Distance)
            } else {
                Box::new(FinalPosition(0.0))
            }
        }

        fn iterations(&self) -> usize {
            10
        }
    }

    fn genome(weight: f32) -> Genome {
        use crate::genomics::{Gene, LinkGene, NodeGene, NodeRole};
        Genome::from_genes(
            0,
            vec![
                Gene::Node(NodeGene::new(0, NodeRole::Input, 0.0, 0.0)),
                Gene::Node(NodeGene::new(1, NodeRole::Output, 0.0, 0.0)),
                Gene::Link(LinkGene::new(2, 0, 1, weight)),
            ],
        )
    }

    #[test]
    fn same_seed_same_fitness() {
        let evaluator = Evaluator::new(SumOfWeights, LineScenario { robots: 1, silent: false });
        let first = evaluator.evaluate(&genome(1.0), 0..5, 99);
        let second = evaluator.evaluate(&genome(1.0), 0..5, 99);
        let other_seed = evaluator.evaluate(&genome(1.0), 0..5, 100);

        assert_eq!(first, second);
        assert_eq!(first.successes, 5);
        assert_ne!(first.fitness, other_seed.fitness);
        // Ten steps of 0.1 at speed 1.0 from a start in [0, 1).
        assert!((1.0..2.0).contains(&first.fitness.primary()));
    }

    #[test]
    fn trial_failures() {
        let evaluator = Evaluator::new(SumOfWeights, LineScenario { robots: 1, silent: true });
        assert_eq!(
            evaluator.evaluate_sample(&genome(1.0), 0, 1),
            Err(TrialFailure::MissingFitness)
        );
        assert_eq!(
            evaluator.evaluate_sample(&Genome::from_genes(0, vec![]), 0, 1),
            Err(TrialFailure::Decode("genome has no links".to_string()))
        );

        let empty = Evaluator::new(SumOfWeights, LineScenario { robots: 0, silent: false });
        assert_eq!(
            empty.evaluate_sample(&genome(1.0), 0, 1),
            Err(TrialFailure::Wiring(ConfigurationError::NoRobots))
        );
    }

    #[test]
    fn preflight_reports_wiring() {
        let empty = Evaluator::new(SumOfWeights, LineScenario { robots: 0, silent: false });
        assert_eq!(empty.preflight(&genome(1.0)), Err(ConfigurationError::NoRobots));

        let wired = Evaluator::new(SumOfWeights, LineScenario { robots: 2, silent: false });
        assert_eq!(wired.preflight(&genome(1.0)), Ok(()));
    }

    #[test]
    fn replay_rewires() {
        let evaluator = Evaluator::new(SumOfWeights, LineScenario { robots: 1, silent: false });
        let mut controller = Constant(0.0);
        let replayed = evaluator
            .replay(&mut controller, &genome(2.0), 3, 42)
            .unwrap();
        assert_eq!(controller.0, 2.0);
        assert_eq!(
            Ok(replayed),
            evaluator.evaluate_sample(&genome(2.0), 3, 42)
        );
    }
}
