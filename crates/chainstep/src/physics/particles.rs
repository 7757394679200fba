//! Particle state and its flat scalar form

use crate::error::{ChainstepError, Result};
use crate::physics::diagnostics;
use crate::physics::math::{Coordinates, Scalar, Vector};
use std::collections::HashSet;

/// A single point mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub id: usize,
    pub mass: Scalar,
    pub position: Vector,
    pub velocity: Vector,
}

impl Particle {
    pub fn new(id: usize, mass: Scalar, position: Vector, velocity: Vector) -> Self {
        Self {
            id,
            mass,
            position,
            velocity,
        }
    }
}

/// An ordered collection of particles sharing one clock.
///
/// Constructors validate the input, so a `ParticleSet` always holds at least
/// one particle, positive finite masses, finite positions and velocities, and
/// unique ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSet {
    ids: Vec<usize>,
    masses: Vec<Scalar>,
    positions: Coordinates,
    velocities: Coordinates,
    time: Scalar,
}

impl ParticleSet {
    pub fn new(particles: &[Particle], time: Scalar) -> Result<Self> {
        let set = Self {
            ids: particles.iter().map(|p| p.id).collect(),
            masses: particles.iter().map(|p| p.mass).collect(),
            positions: particles.iter().map(|p| p.position).collect(),
            velocities: particles.iter().map(|p| p.velocity).collect(),
            time,
        };
        set.validate()?;
        Ok(set)
    }

    /// Build a set from parallel arrays, checking that their lengths agree
    pub fn from_arrays(
        ids: Vec<usize>,
        masses: Vec<Scalar>,
        positions: Coordinates,
        velocities: Coordinates,
        time: Scalar,
    ) -> Result<Self> {
        let expected = ids.len();
        for (what, actual) in [
            ("masses", masses.len()),
            ("positions", positions.len()),
            ("velocities", velocities.len()),
        ] {
            if actual != expected {
                return Err(ChainstepError::LengthMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }

        let set = Self {
            ids,
            masses,
            positions,
            velocities,
            time,
        };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        if self.ids.is_empty() {
            return Err(ChainstepError::EmptySystem);
        }
        if !self.time.is_finite() {
            return Err(ChainstepError::NonFinite {
                index: 0,
                quantity: "time",
            });
        }

        let mut seen = HashSet::with_capacity(self.ids.len());
        for (index, &id) in self.ids.iter().enumerate() {
            let mass = self.masses[index];
            if !mass.is_finite() || mass <= 0.0 {
                return Err(ChainstepError::InvalidMass { index, mass });
            }
            if !self.positions.get(index).is_finite() {
                return Err(ChainstepError::NonFinite {
                    index,
                    quantity: "position",
                });
            }
            if !self.velocities.get(index).is_finite() {
                return Err(ChainstepError::NonFinite {
                    index,
                    quantity: "velocity",
                });
            }
            if !seen.insert(id) {
                return Err(ChainstepError::DuplicateId(id));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn time(&self) -> Scalar {
        self.time
    }

    pub fn set_time(&mut self, time: Scalar) {
        self.time = time;
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn masses(&self) -> &[Scalar] {
        &self.masses
    }

    pub fn positions(&self) -> &Coordinates {
        &self.positions
    }

    pub fn velocities(&self) -> &Coordinates {
        &self.velocities
    }

    /// Masses alongside mutable positions and velocities
    pub(crate) fn split_mut(&mut self) -> (&[Scalar], &mut Coordinates, &mut Coordinates) {
        (&self.masses, &mut self.positions, &mut self.velocities)
    }

    pub fn total_mass(&self) -> Scalar {
        self.masses.iter().sum()
    }

    pub fn particle(&self, index: usize) -> Particle {
        Particle {
            id: self.ids[index],
            mass: self.masses[index],
            position: self.positions.get(index),
            velocity: self.velocities.get(index),
        }
    }

    pub fn particles(&self) -> impl ExactSizeIterator<Item = Particle> + '_ {
        (0..self.len()).map(|i| self.particle(i))
    }

    /// Shift positions and velocities so the center of mass sits at rest at
    /// the origin
    pub fn move_to_center_of_mass_frame(&mut self) {
        let (com_position, com_velocity) = diagnostics::center_of_mass(self);
        for i in 0..self.len() {
            self.positions.sub_at(i, com_position);
            self.velocities.sub_at(i, com_velocity);
        }
    }

    /// Number of scalars written by [`ParticleSet::write_scalars`]
    pub fn scalar_len(&self) -> usize {
        1 + 6 * self.len()
    }

    /// Flatten to `time, positions (axis-major), velocities (axis-major)`
    pub fn write_scalars(&self, out: &mut Vec<Scalar>) {
        out.clear();
        out.reserve(self.scalar_len());
        out.push(self.time);
        self.positions.extend_scalars(out);
        self.velocities.extend_scalars(out);
    }

    /// Restore from the layout written by [`ParticleSet::write_scalars`]
    pub fn read_scalars(&mut self, scalars: &[Scalar]) -> Result<()> {
        let expected = self.scalar_len();
        if scalars.len() != expected {
            return Err(ChainstepError::BufferLength {
                expected,
                actual: scalars.len(),
            });
        }
        check_finite_scalars(scalars, self.len())?;
        let block = 3 * self.len();
        self.time = scalars[0];
        self.positions.load_scalars(&scalars[1..1 + block]);
        self.velocities.load_scalars(&scalars[1 + block..]);
        Ok(())
    }
}

/// Reject a scalar buffer in the `time, positions, velocities[, auxiliary]`
/// layout that holds a NaN or infinity, naming the offending particle
pub(crate) fn check_finite_scalars(scalars: &[Scalar], count: usize) -> Result<()> {
    let Some(offset) = scalars.iter().position(|value| !value.is_finite()) else {
        return Ok(());
    };
    if offset == 0 {
        return Err(ChainstepError::NonFinite {
            index: 0,
            quantity: "time",
        });
    }

    let block = 3 * count.max(1);
    let quantity = match (offset - 1) / block {
        0 => "position",
        1 => "velocity",
        _ => "auxiliary velocity",
    };
    Err(ChainstepError::NonFinite {
        index: (offset - 1) % block % count.max(1),
        quantity,
    })
}
