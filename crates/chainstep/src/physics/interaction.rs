//! Force evaluation
//!
//! Every force contribution implements [`Interaction`] and adds its
//! accelerations into a Cartesian buffer. [`NewtonianGravity`] reads the chain
//! links when the caller provides them and falls back to plain Cartesian
//! differences otherwise.

use crate::physics::math::{Coordinates, Scalar, Vector, norm};
use std::fmt::Debug;
use std::sync::Arc;

/// Read-only view of the state an interaction may depend on
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub masses: &'a [Scalar],
    pub positions: &'a Coordinates,
    pub velocities: &'a Coordinates,
    pub time: Scalar,
    /// Present when the system integrates in chain coordinates
    pub chain: Option<ChainView<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainView<'a> {
    pub order: &'a [usize],
    /// Chain links in the layout of [`crate::physics::chain`]
    pub links: &'a Coordinates,
}

/// A source of acceleration
pub trait Interaction: Send + Sync + Debug {
    /// Add this interaction's accelerations to `acceleration`
    fn add_acceleration(&self, state: &StateView<'_>, acceleration: &mut Coordinates);

    /// Whether the accelerations depend on particle velocities
    fn velocity_dependent(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Pairwise Newtonian attraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonianGravity {
    pub gravitational_constant: Scalar,
}

impl Default for NewtonianGravity {
    fn default() -> Self {
        Self {
            gravitational_constant: 1.0,
        }
    }
}

impl NewtonianGravity {
    pub fn new(gravitational_constant: Scalar) -> Self {
        Self {
            gravitational_constant,
        }
    }

    /// Apply the attraction between `i` and `j`, where `dr` points from `i`
    /// to `j`
    #[inline]
    fn pair(
        &self,
        masses: &[Scalar],
        dr: Vector,
        i: usize,
        j: usize,
        acceleration: &mut Coordinates,
    ) {
        let r = norm(dr);
        let inv_r3 = self.gravitational_constant / (r * r * r);
        acceleration.add_at(i, dr * (inv_r3 * masses[j]));
        acceleration.sub_at(j, dr * (inv_r3 * masses[i]));
    }

    /// All pairs from Cartesian differences
    pub fn add_plain(&self, masses: &[Scalar], positions: &Coordinates, acceleration: &mut Coordinates) {
        let n = positions.len();
        for i in 0..n {
            for j in i + 1..n {
                self.pair(masses, positions.get(j) - positions.get(i), i, j, acceleration);
            }
        }
    }

    /// Pairs ordered from far to near along the chain.
    ///
    /// Pairs three or more links apart use Cartesian differences, pairs two
    /// links apart use the sum of the two links between them, and chain
    /// neighbours use their link directly. The large, well-conditioned terms
    /// are accumulated before the small ones.
    pub fn add_chain(
        &self,
        masses: &[Scalar],
        positions: &Coordinates,
        chain: ChainView<'_>,
        acceleration: &mut Coordinates,
    ) {
        let order = chain.order;
        let links = chain.links;
        let n = order.len();

        for i in 0..n {
            for j in i + 3..n {
                let dr = positions.get(order[j]) - positions.get(order[i]);
                self.pair(masses, dr, order[i], order[j], acceleration);
            }
        }

        for i in 0..n.saturating_sub(2) {
            let dr = links.get(i) + links.get(i + 1);
            self.pair(masses, dr, order[i], order[i + 2], acceleration);
        }

        for i in 0..n.saturating_sub(1) {
            self.pair(masses, links.get(i), order[i], order[i + 1], acceleration);
        }
    }
}

impl Interaction for NewtonianGravity {
    fn add_acceleration(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        match state.chain {
            Some(chain) => self.add_chain(state.masses, state.positions, chain, acceleration),
            None => self.add_plain(state.masses, state.positions, acceleration),
        }
    }

    fn name(&self) -> &str {
        "newtonian_gravity"
    }
}

/// Constant acceleration applied to every particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformField {
    pub acceleration: Vector,
}

impl Interaction for UniformField {
    fn add_acceleration(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        for i in 0..state.positions.len() {
            acceleration.add_at(i, self.acceleration);
        }
    }

    fn name(&self) -> &str {
        "uniform_field"
    }
}

/// Drag proportional to velocity, `a = -k v`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDrag {
    pub coefficient: Scalar,
}

impl Interaction for LinearDrag {
    fn add_acceleration(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        for i in 0..state.velocities.len() {
            acceleration.sub_at(i, state.velocities.get(i) * self.coefficient);
        }
    }

    fn velocity_dependent(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "linear_drag"
    }
}

/// Newtonian gravity plus any number of perturbing interactions
#[derive(Debug, Clone, Default)]
pub struct ForceModel {
    gravity: NewtonianGravity,
    perturbations: Vec<Arc<dyn Interaction>>,
}

impl ForceModel {
    pub fn new(gravity: NewtonianGravity) -> Self {
        Self {
            gravity,
            perturbations: Vec::new(),
        }
    }

    pub fn with_perturbation(mut self, perturbation: impl Interaction + 'static) -> Self {
        self.perturbations.push(Arc::new(perturbation));
        self
    }

    pub fn gravity(&self) -> &NewtonianGravity {
        &self.gravity
    }

    pub fn perturbations(&self) -> &[Arc<dyn Interaction>] {
        &self.perturbations
    }

    pub fn velocity_dependent(&self) -> bool {
        self.perturbations.iter().any(|p| p.velocity_dependent())
    }

    /// Overwrite `acceleration` with gravity plus every velocity-independent
    /// perturbation
    pub fn velocity_independent(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        acceleration.resize(state.positions.len());
        acceleration.fill_zero();
        self.gravity.add_acceleration(state, acceleration);
        for perturbation in self.perturbations.iter().filter(|p| !p.velocity_dependent()) {
            perturbation.add_acceleration(state, acceleration);
        }
    }

    /// Overwrite `acceleration` with the velocity-dependent perturbations only
    pub fn velocity_dependent_part(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        acceleration.resize(state.positions.len());
        acceleration.fill_zero();
        for perturbation in self.perturbations.iter().filter(|p| p.velocity_dependent()) {
            perturbation.add_acceleration(state, acceleration);
        }
    }

    /// Overwrite `acceleration` with the total acceleration
    pub fn total(&self, state: &StateView<'_>, acceleration: &mut Coordinates) {
        self.velocity_independent(state, acceleration);
        for perturbation in self.perturbations.iter().filter(|p| p.velocity_dependent()) {
            perturbation.add_acceleration(state, acceleration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::chain::{build_chain, to_chain};

    fn scattered() -> (Vec<Scalar>, Coordinates) {
        let masses = vec![1.0, 0.5, 2.0, 0.25, 1.5];
        let positions = [
            Vector::new(0.0, 0.0, 0.0),
            Vector::new(1.0, 0.2, -0.3),
            Vector::new(-2.0, 1.0, 0.5),
            Vector::new(0.4, -3.0, 1.0),
            Vector::new(5.0, 0.0, -1.0),
        ]
        .into_iter()
        .collect();
        (masses, positions)
    }

    #[test]
    fn test_two_body_attraction() {
        let masses = [1.0, 3.0];
        let positions = Coordinates::from_vectors(&[Vector::ZERO, Vector::new(2.0, 0.0, 0.0)]);
        let mut acceleration = Coordinates::with_len(2);
        NewtonianGravity::new(1.0).add_plain(&masses, &positions, &mut acceleration);

        assert!((acceleration.get(0) - Vector::new(0.75, 0.0, 0.0)).length() < 1e-15);
        assert!((acceleration.get(1) - Vector::new(-0.25, 0.0, 0.0)).length() < 1e-15);
    }

    #[test]
    fn test_chain_evaluation_matches_plain() {
        let (masses, positions) = scattered();
        let ids: Vec<usize> = (0..masses.len()).collect();
        let order = build_chain(&positions, &ids);
        let links = to_chain(&positions, &masses, &order);
        let gravity = NewtonianGravity::new(1.0);

        let mut plain = Coordinates::with_len(masses.len());
        gravity.add_plain(&masses, &positions, &mut plain);

        let mut chained = Coordinates::with_len(masses.len());
        gravity.add_chain(
            &masses,
            &positions,
            ChainView {
                order: &order,
                links: &links,
            },
            &mut chained,
        );

        for i in 0..masses.len() {
            assert!(
                (plain.get(i) - chained.get(i)).length() < 1e-13,
                "particle {i}: {} vs {}",
                plain.get(i),
                chained.get(i)
            );
        }
    }

    #[test]
    fn test_total_momentum_change_vanishes() {
        let (masses, positions) = scattered();
        let mut acceleration = Coordinates::with_len(masses.len());
        NewtonianGravity::new(2.5).add_plain(&masses, &positions, &mut acceleration);

        let net: Vector = (0..masses.len())
            .map(|i| acceleration.get(i) * masses[i])
            .sum();
        assert!(net.length() < 1e-13);
    }

    #[test]
    fn test_force_model_split() {
        let masses = [1.0, 1.0];
        let positions = Coordinates::from_vectors(&[Vector::ZERO, Vector::new(1.0, 0.0, 0.0)]);
        let velocities = Coordinates::from_vectors(&[Vector::new(0.0, 2.0, 0.0), Vector::ZERO]);
        let view = StateView {
            masses: &masses,
            positions: &positions,
            velocities: &velocities,
            time: 0.0,
            chain: None,
        };

        let model = ForceModel::new(NewtonianGravity::new(0.0))
            .with_perturbation(UniformField {
                acceleration: Vector::new(0.0, 0.0, -1.0),
            })
            .with_perturbation(LinearDrag { coefficient: 0.5 });
        assert!(model.velocity_dependent());

        let mut independent = Coordinates::new();
        model.velocity_independent(&view, &mut independent);
        assert_eq!(independent.get(0), Vector::new(0.0, 0.0, -1.0));

        let mut dependent = Coordinates::new();
        model.velocity_dependent_part(&view, &mut dependent);
        assert_eq!(dependent.get(0), Vector::new(0.0, -1.0, 0.0));
        assert_eq!(dependent.get(1), Vector::ZERO);

        let mut total = Coordinates::new();
        model.total(&view, &mut total);
        assert_eq!(total.get(0), Vector::new(0.0, -1.0, -1.0));
    }
}
