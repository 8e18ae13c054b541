use crate::simulation::Environment;

/// Everything one trial simulates: the environment,
/// its robots and the current time.
pub struct World<E: Environment> {
    pub(super) environment: E,
    pub(super) robots: Vec<E::Robot>,
    pub(super) time: f64,
}

impl<E: Environment> World<E> {
    /// Creates a world at time zero.
    pub fn new(environment: E, robots: Vec<E::Robot>) -> World<E> {
        World {
            environment,
            robots,
            time: 0.0,
        }
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.environment
    }

    pub fn robots(&self) -> &[E::Robot] {
        &self.robots
    }

    pub fn robots_mut(&mut self) -> &mut [E::Robot] {
        &mut self.robots
    }

    /// Time of the last completed step.
    pub fn time(&self) -> f64 {
        self.time
    }
}
