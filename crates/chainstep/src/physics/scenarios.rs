//! Ready-made initial conditions
//!
//! All scenarios are returned in the center-of-mass frame with particle ids
//! `0..n`.

use crate::config::RunConfig;
use crate::error::{ChainstepError, Result};
use crate::physics::diagnostics;
use crate::physics::math::{Scalar, Vector};
use crate::physics::particles::{Particle, ParticleSet};
use rand::Rng;
use rand_chacha::{ChaCha8Rng, rand_core::SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Unit-mass binary with semi-major axis one
    #[default]
    TwoBody,
    /// Binary with a grazing pericenter passage and a distant third body
    HierarchicalTriple,
    /// Seeded random cluster in virial equilibrium
    RandomCluster,
}

impl Scenario {
    pub fn build(self, run: &RunConfig, gravitational_constant: Scalar) -> Result<ParticleSet> {
        match self {
            Scenario::TwoBody => two_body(1.0, 1.0, 1.0, run.eccentricity, gravitational_constant),
            Scenario::HierarchicalTriple => hierarchical_triple(gravitational_constant),
            Scenario::RandomCluster => random_cluster(run.body_count, run.seed, gravitational_constant),
        }
    }
}

/// Orbital period of a bound two-body orbit
pub fn kepler_period(total_mass: Scalar, semi_major_axis: Scalar, gravitational_constant: Scalar) -> Scalar {
    2.0 * PI * libm::sqrt(semi_major_axis.powi(3) / (gravitational_constant * total_mass))
}

/// Two bodies on a Kepler orbit, starting at pericenter on the x axis and
/// moving along y
pub fn two_body(
    m1: Scalar,
    m2: Scalar,
    semi_major_axis: Scalar,
    eccentricity: Scalar,
    gravitational_constant: Scalar,
) -> Result<ParticleSet> {
    if !(semi_major_axis.is_finite() && semi_major_axis > 0.0) {
        return Err(ChainstepError::InvalidConfig(format!(
            "semi-major axis must be positive, got {semi_major_axis}"
        )));
    }
    if !(0.0..1.0).contains(&eccentricity) {
        return Err(ChainstepError::InvalidConfig(format!(
            "eccentricity must be in [0, 1), got {eccentricity}"
        )));
    }

    let total = m1 + m2;
    let separation = semi_major_axis * (1.0 - eccentricity);
    let speed = libm::sqrt(
        gravitational_constant * total * (1.0 + eccentricity) / (semi_major_axis * (1.0 - eccentricity)),
    );

    ParticleSet::new(
        &[
            Particle::new(
                0,
                m1,
                Vector::new(-m2 / total * separation, 0.0, 0.0),
                Vector::new(0.0, -m2 / total * speed, 0.0),
            ),
            Particle::new(
                1,
                m2,
                Vector::new(m1 / total * separation, 0.0, 0.0),
                Vector::new(0.0, m1 / total * speed, 0.0),
            ),
        ],
        0.0,
    )
}

/// A unit mass orbited by a light body on a nearly radial orbit (pericenter
/// about 0.005, first passage near t = 9) and a light body on a wide circular
/// orbit at radius 8
pub fn hierarchical_triple(gravitational_constant: Scalar) -> Result<ParticleSet> {
    let speed = libm::sqrt(gravitational_constant);
    let mut set = ParticleSet::new(
        &[
            Particle::new(0, 1.0, Vector::ZERO, Vector::ZERO),
            Particle::new(
                1,
                1e-3,
                Vector::new(-5.0, 0.5, 0.0),
                Vector::new(0.2 * speed, 0.0, 0.0),
            ),
            Particle::new(
                2,
                1e-3,
                Vector::new(8.0, 0.0, 0.0),
                Vector::new(0.0, libm::sqrt(1.0 / 8.0) * speed, 0.0),
            ),
        ],
        0.0,
    )?;
    set.move_to_center_of_mass_frame();
    Ok(set)
}

fn random_unit_vector(rng: &mut ChaCha8Rng) -> Vector {
    let theta = rng.random_range(0.0..=2.0 * PI);
    let phi = libm::acos(rng.random_range(-1.0..=1.0));

    Vector::new(
        libm::sin(phi) * libm::cos(theta),
        libm::sin(phi) * libm::sin(theta),
        libm::cos(phi),
    )
}

/// `count` bodies with masses in `[0.5, 1.5]`, uniformly filling the unit
/// sphere, with random velocities rescaled to virial equilibrium
/// (`2K = |U|`). Identical seeds give bit-identical sets.
pub fn random_cluster(count: usize, seed: u64, gravitational_constant: Scalar) -> Result<ParticleSet> {
    if count < 2 {
        return Err(ChainstepError::InvalidConfig(format!(
            "a cluster needs at least 2 bodies, got {count}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let particles: Vec<Particle> = (0..count)
        .map(|id| {
            let mass = rng.random_range(0.5..=1.5);
            let radius = libm::cbrt(rng.random_range(0.0..=1.0));
            let position = random_unit_vector(&mut rng) * radius;
            let velocity = random_unit_vector(&mut rng) * rng.random_range(0.0..=1.0);
            Particle::new(id, mass, position, velocity)
        })
        .collect();

    let mut set = ParticleSet::new(&particles, 0.0)?;
    set.move_to_center_of_mass_frame();

    let kinetic = diagnostics::kinetic_energy(&set);
    let potential = diagnostics::potential_energy(&set, gravitational_constant);
    if kinetic > 0.0 {
        let scale = libm::sqrt(0.5 * potential.abs() / kinetic);
        let rescaled: Vec<Particle> = set
            .particles()
            .map(|p| Particle {
                velocity: p.velocity * scale,
                ..p
            })
            .collect();
        set = ParticleSet::new(&rescaled, 0.0)?;
    }
    Ok(set)
}
