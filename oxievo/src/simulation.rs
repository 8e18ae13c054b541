//! A deterministic, single-threaded, per-step simulation engine.
//!
//! An engine owns one [`World`] for one trial. Every call to
//! [`SimulationEngine::step`] runs the same fixed phases:
//! sensors, controllers, actuators (in a freshly shuffled order),
//! environment, collisions, and finally observer notification.
//! Environments and robots are supplied by plugins implementing
//! [`Environment`] and [`Robot`].

mod registry;
mod world;

pub use registry::PluginRegistry;
pub use world::World;

use crate::evaluation::Fitness;
use crate::{ConfigurationError, SeededRng, TrialFailure};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::trace;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifies an object (robot, light, obstacle...) in an environment.
pub type ObjectId = usize;

/// Simulated time step handed to actuators.
pub const DEFAULT_TIME_DELTA: f64 = 0.1;

/// The state of the simulated world outside the robots.
pub trait Environment: Sized {
    /// The robots that live in this environment.
    type Robot: Robot<Self>;

    /// Returns and clears the objects teleported since the last call.
    fn take_teleported(&mut self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Advances the environment to `time`.
    fn update(&mut self, time: f64, rng: &mut SeededRng);

    /// Resolves positions and collisions after movement.
    fn update_collisions(&mut self, robots: &mut [Self::Robot], time: f64);
}

/// A simulated robot carrying a controller.
pub trait Robot<E> {
    /// Reads the robot's sensors. `teleported` lists the
    /// objects moved discontinuously during the previous step.
    fn update_sensors(&mut self, environment: &E, teleported: &[ObjectId], time: f64);

    /// Runs the controller on the latest sensor readings.
    fn control_step(&mut self, time: f64) -> Result<(), TrialFailure>;

    /// Applies the controller's commands to the robot's body.
    fn update_actuators(
        &mut self,
        environment: &mut E,
        time: f64,
        time_delta: f64,
    ) -> Result<(), TrialFailure>;
}

/// An observer's verdict after a step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Signal {
    Continue,
    Stop,
}

/// Notified after every step, in registration order.
pub trait Observer<E: Environment> {
    fn on_step(&mut self, time: f64, world: &World<E>) -> Signal;

    /// The fitness accumulated so far, for observers that compute one.
    fn fitness(&self) -> Option<Fitness> {
        None
    }
}

/// Refers to an observer registered with an engine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ObserverHandle(usize);

/// A cancellation flag shared between an engine and the outside.
/// Once raised, it stays raised.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> StopHandle {
        StopHandle::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RunSummary {
    /// Steps executed.
    pub steps: usize,
    /// Whether an observer or the stop handle ended the run early.
    pub stopped: bool,
}

/// Runs one trial of a world, step by step.
pub struct SimulationEngine<E: Environment> {
    world: World<E>,
    rng: SeededRng,
    observers: Vec<Box<dyn Observer<E>>>,
    actuation_order: Vec<usize>,
    time_delta: f64,
    stop: StopHandle,
}

impl<E: Environment> SimulationEngine<E> {
    /// Creates an engine for `world`, seeding its random source with `seed`.
    pub fn new(world: World<E>, seed: u64) -> Result<Self, ConfigurationError> {
        Self::with_rng(world, SeededRng::seed_from_u64(seed))
    }

    /// Creates an engine that continues the given random stream.
    ///
    /// # Errors
    /// A world without robots cannot be simulated.
    pub fn with_rng(world: World<E>, rng: SeededRng) -> Result<Self, ConfigurationError> {
        if world.robots().is_empty() {
            return Err(ConfigurationError::NoRobots);
        }
        let actuation_order = (0..world.robots().len()).collect();
        Ok(SimulationEngine {
            world,
            rng,
            observers: Vec::new(),
            actuation_order,
            time_delta: DEFAULT_TIME_DELTA,
            stop: StopHandle::new(),
        })
    }

    /// Sets the time step handed to actuators.
    pub fn set_time_delta(&mut self, time_delta: f64) {
        self.time_delta = time_delta;
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer<E>>) -> ObserverHandle {
        self.observers.push(observer);
        ObserverHandle(self.observers.len() - 1)
    }

    pub fn observer(&self, handle: ObserverHandle) -> &dyn Observer<E> {
        self.observers[handle.0].as_ref()
    }

    /// Returns a handle that stops the engine from outside the trial.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn world(&self) -> &World<E> {
        &self.world
    }

    /// Consumes the engine, returning the final world.
    pub fn into_world(self) -> World<E> {
        self.world
    }

    /// Executes one step at `time`.
    ///
    /// Returns [`Signal::Stop`] if any observer asked to stop,
    /// in which case the engine stays stopped: later calls
    /// return [`Signal::Stop`] without simulating anything.
    /// A failing controller or actuator aborts the trial.
    pub fn step(&mut self, time: f64) -> Result<Signal, TrialFailure> {
        if self.stop.is_stopped() {
            return Ok(Signal::Stop);
        }
        let World {
            environment,
            robots,
            time: world_time,
        } = &mut self.world;

        let teleported = environment.take_teleported();
        for robot in robots.iter_mut() {
            robot.update_sensors(environment, &teleported, time);
        }

        for robot in robots.iter_mut() {
            robot.control_step(time)?;
        }

        self.actuation_order.shuffle(&mut self.rng);
        for &index in &self.actuation_order {
            robots[index].update_actuators(environment, time, self.time_delta)?;
        }

        environment.update(time, &mut self.rng);
        environment.update_collisions(robots, time);
        *world_time = time;

        let mut signal = Signal::Continue;
        for observer in &mut self.observers {
            if observer.on_step(time, &self.world) == Signal::Stop {
                signal = Signal::Stop;
            }
        }
        if signal == Signal::Stop {
            self.stop.stop();
        }
        Ok(signal)
    }

    /// Steps through times `0..iterations` until done or stopped.
    pub fn run(&mut self, iterations: usize) -> Result<RunSummary, TrialFailure> {
        let mut steps = 0;
        while steps < iterations && !self.stop.is_stopped() {
            self.step(steps as f64)?;
            steps += 1;
        }
        let stopped = steps < iterations;
        trace!(steps, stopped, "simulation finished");
        Ok(RunSummary { steps, stopped })
    }
}
