//! A walled, square arena with one light and a few
//! differential-drive robots carrying light sensors.
use oxievo::evaluation::Controller;
use oxievo::simulation::{Environment, ObjectId, Robot};
use oxievo::{SeededRng, TrialFailure};

use rand::Rng;
use serde::{Deserialize, Serialize};

use std::f64::consts::FRAC_PI_4;

/// Object id of the light; robots are numbered from 1.
pub const LIGHT: ObjectId = 0;

/// Left light, right light, wall proximity, light moved.
pub const SENSORS: usize = 4;

/// Left and right wheel speeds.
pub const ACTUATORS: usize = 2;

/// Geometry and dynamics shared by every trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArenaSettings {
    /// Side of the square arena.
    pub size: f64,
    pub robots: usize,
    pub robot_radius: f64,
    pub wheel_base: f64,
    pub max_speed: f64,
    /// Distance at which the wall sensor starts responding.
    pub wall_sensor_range: f64,
    /// A robot this close to the light has found it.
    pub capture_radius: f64,
    /// Simulated time between light relocations; zero keeps it still.
    pub relocation_period: f64,
    /// Simulation steps per trial.
    pub steps: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn random<R: Rng + ?Sized>(size: f64, margin: f64, rng: &mut R) -> Point {
        Point {
            x: rng.gen_range(margin..size - margin),
            y: rng.gen_range(margin..size - margin),
        }
    }
}

/// The arena, generic over the robots' controller.
pub struct Arena<C> {
    settings: ArenaSettings,
    light: Point,
    last_relocation: f64,
    teleported: Vec<ObjectId>,
    robot_type: std::marker::PhantomData<C>,
}

impl<C: Controller> Arena<C> {
    /// Builds an arena with the light and `settings.robots`
    /// robots at random places, each robot with a copy
    /// of `controller`.
    pub fn populate(settings: &ArenaSettings, controller: C, rng: &mut SeededRng) -> (Arena<C>, Vec<Drive<C>>)
    where
        C: Clone,
    {
        let margin = settings.robot_radius;
        let light = Point::random(settings.size, margin, rng);
        let robots = (0..settings.robots)
            .map(|i| Drive {
                id: i + 1,
                position: Point::random(settings.size, margin, rng),
                heading: rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
                controller: controller.clone(),
                readings: [0.0; SENSORS],
                commands: [0.0; ACTUATORS],
                settings: settings.clone(),
            })
            .collect();
        let arena = Arena {
            settings: settings.clone(),
            light,
            last_relocation: 0.0,
            teleported: Vec::new(),
            robot_type: std::marker::PhantomData,
        };
        (arena, robots)
    }

    pub fn light(&self) -> Point {
        self.light
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }
}

impl<C: Controller> Environment for Arena<C> {
    type Robot = Drive<C>;

    fn take_teleported(&mut self) -> Vec<ObjectId> {
        std::mem::take(&mut self.teleported)
    }

    fn update(&mut self, time: f64, rng: &mut SeededRng) {
        let period = self.settings.relocation_period;
        if period > 0.0 && time - self.last_relocation >= period {
            self.light = Point::random(self.settings.size, self.settings.robot_radius, rng);
            self.last_relocation = time;
            self.teleported.push(LIGHT);
        }
    }

    fn update_collisions(&mut self, robots: &mut [Drive<C>], _: f64) {
        let (low, high) = (self.settings.robot_radius, self.settings.size - self.settings.robot_radius);
        for robot in robots.iter_mut() {
            robot.position.x = robot.position.x.clamp(low, high);
            robot.position.y = robot.position.y.clamp(low, high);
        }
        // Overlapping robots are pushed apart along the line
        // joining their centres.
        let contact = 2.0 * self.settings.robot_radius;
        for i in 0..robots.len() {
            for j in i + 1..robots.len() {
                let (a, b) = (robots[i].position, robots[j].position);
                let distance = a.distance(b);
                if distance >= contact {
                    continue;
                }
                let (dx, dy) = if distance > f64::EPSILON {
                    ((b.x - a.x) / distance, (b.y - a.y) / distance)
                } else {
                    (1.0, 0.0)
                };
                let push = (contact - distance) / 2.0;
                robots[i].position = Point {
                    x: (a.x - dx * push).clamp(low, high),
                    y: (a.y - dy * push).clamp(low, high),
                };
                robots[j].position = Point {
                    x: (b.x + dx * push).clamp(low, high),
                    y: (b.y + dy * push).clamp(low, high),
                };
            }
        }
    }
}

/// A two-wheeled robot.
pub struct Drive<C> {
    id: usize,
    position: Point,
    heading: f64,
    controller: C,
    readings: [f32; SENSORS],
    commands: [f32; ACTUATORS],
    settings: ArenaSettings,
}

impl<C> Drive<C> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Intensity seen by a sensor pointing `offset` radians
    /// from the heading: cosine falloff with angle, inverse
    /// square falloff with distance.
    fn light_intensity(&self, light: Point, offset: f64) -> f32 {
        let direction = self.heading + offset;
        let (dx, dy) = (light.x - self.position.x, light.y - self.position.y);
        let distance = dx.hypot(dy);
        if distance < f64::EPSILON {
            return 1.0;
        }
        let alignment = (dx * direction.cos() + dy * direction.sin()) / distance;
        let falloff = 1.0 / (1.0 + (distance / self.settings.size * 4.0).powi(2));
        (alignment.max(0.0) * falloff) as f32
    }

    fn wall_proximity(&self) -> f32 {
        let Point { x, y } = self.position;
        let nearest = x.min(y).min(self.settings.size - x).min(self.settings.size - y)
            - self.settings.robot_radius;
        let range = self.settings.wall_sensor_range;
        if range <= 0.0 {
            return 0.0;
        }
        (1.0 - nearest / range).clamp(0.0, 1.0) as f32
    }
}

impl<C: Controller> Robot<Arena<C>> for Drive<C> {
    fn update_sensors(&mut self, arena: &Arena<C>, teleported: &[ObjectId], _: f64) {
        self.readings = [
            self.light_intensity(arena.light, FRAC_PI_4),
            self.light_intensity(arena.light, -FRAC_PI_4),
            self.wall_proximity(),
            if teleported.contains(&LIGHT) { 1.0 } else { 0.0 },
        ];
    }

    fn control_step(&mut self, _: f64) -> Result<(), TrialFailure> {
        let outputs = self.controller.act(&self.readings);
        if outputs.len() != ACTUATORS {
            return Err(TrialFailure::Controller {
                robot: self.id,
                reason: format!("{} outputs for {} wheels", outputs.len(), ACTUATORS),
            });
        }
        self.commands.copy_from_slice(&outputs);
        Ok(())
    }

    fn update_actuators(&mut self, _: &mut Arena<C>, _: f64, time_delta: f64) -> Result<(), TrialFailure> {
        // Commands in [0, 1] map to wheel speeds in ±max_speed.
        let [left, right] = self.commands.map(|c| (2.0 * c as f64 - 1.0) * self.settings.max_speed);
        if !(left.is_finite() && right.is_finite()) {
            return Err(TrialFailure::Actuator {
                robot: self.id,
                reason: "non-finite wheel speed".to_string(),
            });
        }
        let speed = (left + right) / 2.0;
        self.heading += (right - left) / self.settings.wheel_base * time_delta;
        self.position.x += speed * self.heading.cos() * time_delta;
        self.position.y += speed * self.heading.sin() * time_delta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// Always drives straight ahead at full speed.
    #[derive(Clone)]
    struct FullAhead;

    impl Controller for FullAhead {
        fn act(&mut self, _: &[f32]) -> Vec<f32> {
            vec![1.0, 1.0]
        }

        fn reset(&mut self) {}
    }

    fn settings() -> ArenaSettings {
        ArenaSettings {
            size: 10.0,
            robots: 2,
            robot_radius: 0.25,
            wheel_base: 0.4,
            max_speed: 1.0,
            wall_sensor_range: 1.0,
            capture_radius: 0.5,
            relocation_period: 0.0,
            steps: 100,
        }
    }

    fn robot(position: Point, heading: f64) -> Drive<FullAhead> {
        Drive {
            id: 1,
            position,
            heading,
            controller: FullAhead,
            readings: [0.0; SENSORS],
            commands: [0.0; ACTUATORS],
            settings: settings(),
        }
    }

    #[test]
    fn light_ahead_lights_both_sensors() {
        let robot = robot(Point { x: 2.0, y: 5.0 }, 0.0);
        let light = Point { x: 6.0, y: 5.0 };
        let left = robot.light_intensity(light, FRAC_PI_4);
        let right = robot.light_intensity(light, -FRAC_PI_4);
        assert!(left > 0.0);
        assert!((left - right).abs() < 1e-6);
        assert_eq!(robot.light_intensity(light, std::f64::consts::PI), 0.0);
    }

    #[test]
    fn drives_straight_and_stops_at_walls() {
        let mut arena = Arena::<FullAhead>::populate(&settings(), FullAhead, &mut SeededRng::seed_from_u64(0)).0;
        let mut robots = vec![robot(Point { x: 9.0, y: 5.0 }, 0.0)];
        robots[0].control_step(0.0).unwrap();
        for _ in 0..30 {
            robots[0].update_actuators(&mut arena, 0.0, 0.1).unwrap();
            arena.update_collisions(&mut robots, 0.0);
        }
        assert_eq!(robots[0].position().x, 9.75);
        assert!((robots[0].position().y - 5.0).abs() < 1e-9);
        assert_eq!(robots[0].wall_proximity(), 1.0);
    }

    #[test]
    fn overlapping_robots_separate() {
        let mut arena = Arena::<FullAhead>::populate(&settings(), FullAhead, &mut SeededRng::seed_from_u64(0)).0;
        let mut robots = vec![
            robot(Point { x: 5.0, y: 5.0 }, 0.0),
            robot(Point { x: 5.2, y: 5.0 }, 0.0),
        ];
        arena.update_collisions(&mut robots, 0.0);
        assert!((robots[0].position().distance(robots[1].position()) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn relocation_is_reported_once() {
        let settings = ArenaSettings {
            relocation_period: 1.0,
            ..settings()
        };
        let mut rng = SeededRng::seed_from_u64(4);
        let (mut arena, _) = Arena::populate(&settings, FullAhead, &mut rng);
        let before = arena.light();
        arena.update(0.5, &mut rng);
        assert!(arena.take_teleported().is_empty());
        arena.update(1.0, &mut rng);
        assert_ne!(arena.light(), before);
        assert_eq!(arena.take_teleported(), vec![LIGHT]);
        assert!(arena.take_teleported().is_empty());
    }

    #[test]
    fn wrong_output_count_fails_the_trial() {
        #[derive(Clone)]
        struct OneWheel;
        impl Controller for OneWheel {
            fn act(&mut self, _: &[f32]) -> Vec<f32> {
                vec![0.5]
            }
            fn reset(&mut self) {}
        }
        let (_, mut robots) = Arena::populate(&settings(), OneWheel, &mut SeededRng::seed_from_u64(1));
        assert!(matches!(
            robots[0].control_step(0.0),
            Err(TrialFailure::Controller { robot: 1, .. })
        ));
    }
}
