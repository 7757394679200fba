//! Conserved quantities and step-size heuristics

use crate::physics::math::{Scalar, Vector, norm};
use crate::physics::particles::ParticleSet;

/// Mass-weighted mean position and velocity
pub fn center_of_mass(particles: &ParticleSet) -> (Vector, Vector) {
    let mut position = Vector::ZERO;
    let mut velocity = Vector::ZERO;
    for p in particles.particles() {
        position += p.position * p.mass;
        velocity += p.velocity * p.mass;
    }
    let total = particles.total_mass();
    (position / total, velocity / total)
}

pub fn kinetic_energy(particles: &ParticleSet) -> Scalar {
    particles
        .particles()
        .map(|p| 0.5 * p.mass * p.velocity.length_squared())
        .sum()
}

pub fn potential_energy(particles: &ParticleSet, gravitational_constant: Scalar) -> Scalar {
    let masses = particles.masses();
    let positions = particles.positions();
    let mut potential = 0.0;
    for i in 0..particles.len() {
        for j in i + 1..particles.len() {
            let r = norm(positions.get(j) - positions.get(i));
            potential -= gravitational_constant * masses[i] * masses[j] / r;
        }
    }
    potential
}

pub fn total_energy(particles: &ParticleSet, gravitational_constant: Scalar) -> Scalar {
    kinetic_energy(particles) + potential_energy(particles, gravitational_constant)
}

pub fn angular_momentum(particles: &ParticleSet) -> Vector {
    particles
        .particles()
        .map(|p| p.position.cross(p.velocity) * p.mass)
        .sum()
}

/// `|current - reference| / |reference|`, or the absolute difference when
/// the reference is zero
pub fn relative_error(current: Scalar, reference: Scalar) -> Scalar {
    let difference = (current - reference).abs();
    if reference == 0.0 {
        difference
    } else {
        difference / reference.abs()
    }
}

/// A starting macro step from the shortest pairwise free-fall time,
/// `0.01 * min sqrt(r³ / (G (m_i + m_j)))`. `None` for a single particle.
pub fn suggested_step(particles: &ParticleSet, gravitational_constant: Scalar) -> Option<Scalar> {
    let masses = particles.masses();
    let positions = particles.positions();
    let mut shortest: Option<Scalar> = None;
    for i in 0..particles.len() {
        for j in i + 1..particles.len() {
            let r = norm(positions.get(j) - positions.get(i));
            let time = libm::sqrt(r * r * r / (gravitational_constant * (masses[i] + masses[j])));
            shortest = Some(shortest.map_or(time, |s| s.min(time)));
        }
    }
    shortest
        .filter(|t| t.is_finite() && *t > 0.0)
        .map(|t| 0.01 * t)
}

/// Snapshot of the conserved quantities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conserved {
    pub time: Scalar,
    pub kinetic: Scalar,
    pub potential: Scalar,
    pub angular_momentum: Vector,
}

impl Conserved {
    pub fn measure(particles: &ParticleSet, gravitational_constant: Scalar) -> Self {
        Self {
            time: particles.time(),
            kinetic: kinetic_energy(particles),
            potential: potential_energy(particles, gravitational_constant),
            angular_momentum: angular_momentum(particles),
        }
    }

    pub fn energy(&self) -> Scalar {
        self.kinetic + self.potential
    }
}
