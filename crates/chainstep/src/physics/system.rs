//! A particle set bound to its force model and integration representation

use crate::error::{ChainstepError, Result};
use crate::ode::Integrable;
use crate::physics::chain::{ChainState, build_chain, to_cartesian_into, to_chain_into};
use crate::physics::integrators::PhaseSpace;
use crate::physics::interaction::{ChainView, ForceModel, StateView};
use crate::physics::math::{Coordinates, Scalar};
use crate::physics::particles::{ParticleSet, check_finite_scalars};
use serde::{Deserialize, Serialize};

/// Which coordinates the integrator advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    #[default]
    ChainAware,
    PlainCartesian,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    PlainCartesian,
    ChainAware(ChainState),
}

/// Auxiliary velocity used to split velocity-dependent kicks. Kept in both
/// Cartesian and, for chain systems, chain form.
#[derive(Debug, Clone, PartialEq)]
struct AuxiliaryVelocity {
    cartesian: Coordinates,
    chain: Option<Coordinates>,
}

/// The dynamical state advanced by the integrators.
///
/// Cartesian positions and velocities in the particle set are always kept in
/// sync with the active representation. In chain mode the chain is the master
/// copy and Cartesian values are rebuilt from it after every update.
///
/// The auxiliary velocity is present iff the force model contains a
/// velocity-dependent interaction.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: ParticleSet,
    forces: ForceModel,
    representation: Representation,
    auxiliary: Option<AuxiliaryVelocity>,
    relinks: usize,
    independent: Coordinates,
    dependent: Coordinates,
    acceleration: Coordinates,
    chain_increment: Coordinates,
}

impl ParticleSystem {
    pub fn new(particles: ParticleSet, forces: ForceModel, kind: RepresentationKind) -> Self {
        let representation = match kind {
            RepresentationKind::PlainCartesian => Representation::PlainCartesian,
            RepresentationKind::ChainAware => Representation::ChainAware(ChainState::new(
                particles.ids(),
                particles.masses(),
                particles.positions(),
                particles.velocities(),
            )),
        };

        let auxiliary = forces.velocity_dependent().then(|| AuxiliaryVelocity {
            cartesian: particles.velocities().clone(),
            chain: match &representation {
                Representation::ChainAware(chain) => Some(chain.velocities().clone()),
                Representation::PlainCartesian => None,
            },
        });

        let n = particles.len();
        let mut system = Self {
            particles,
            forces,
            representation,
            auxiliary,
            relinks: 0,
            independent: Coordinates::with_len(n),
            dependent: Coordinates::with_len(n),
            acceleration: Coordinates::with_len(n),
            chain_increment: Coordinates::with_len(n),
        };
        system.sync_cartesian();
        system
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn into_particles(self) -> ParticleSet {
        self.particles
    }

    pub fn forces(&self) -> &ForceModel {
        &self.forces
    }

    pub fn time(&self) -> Scalar {
        self.particles.time()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn kind(&self) -> RepresentationKind {
        match self.representation {
            Representation::PlainCartesian => RepresentationKind::PlainCartesian,
            Representation::ChainAware(_) => RepresentationKind::ChainAware,
        }
    }

    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    pub fn chain(&self) -> Option<&ChainState> {
        match &self.representation {
            Representation::ChainAware(chain) => Some(chain),
            Representation::PlainCartesian => None,
        }
    }

    /// Active chain ordering, as particle indices
    pub fn chain_order(&self) -> Option<&[usize]> {
        self.chain().map(|c| c.order())
    }

    /// Number of times the chain ordering has changed
    pub fn relink_count(&self) -> usize {
        self.relinks
    }

    pub fn auxiliary_velocity(&self) -> Option<&Coordinates> {
        self.auxiliary.as_ref().map(|a| &a.cartesian)
    }

    /// Current accelerations (all interactions, real velocities)
    pub fn accelerations(&self) -> Coordinates {
        let mut acceleration = Coordinates::with_len(self.len());
        let view = state_view(&self.particles, &self.representation, self.particles.velocities());
        self.forces.total(&view, &mut acceleration);
        acceleration
    }

    /// Recompute the chain ordering from the current positions and adopt it
    /// if it changed. The physical state is unchanged up to rounding. Returns
    /// whether a relink happened.
    pub fn relink(&mut self) -> bool {
        let Representation::ChainAware(chain) = &mut self.representation else {
            return false;
        };
        let new_order = build_chain(self.particles.positions(), self.particles.ids());
        let auxiliary_chain = self.auxiliary.as_mut().and_then(|a| a.chain.as_mut());
        if !chain.relink_to(new_order, auxiliary_chain) {
            return false;
        }
        self.relinks += 1;
        self.sync_cartesian();
        true
    }

    /// Rebuild the Cartesian copies from the chain
    fn sync_cartesian(&mut self) {
        let Representation::ChainAware(chain) = &self.representation else {
            return;
        };
        let (masses, positions, velocities) = self.particles.split_mut();
        to_cartesian_into(masses, chain.positions(), chain.order(), positions);
        to_cartesian_into(masses, chain.velocities(), chain.order(), velocities);
        if let Some(AuxiliaryVelocity {
            cartesian,
            chain: Some(aux_chain),
        }) = &mut self.auxiliary
        {
            to_cartesian_into(masses, aux_chain, chain.order(), cartesian);
        }
    }

    /// Kick splitting for velocity-dependent forces. The velocity-independent
    /// part is evaluated once; the real velocity is half-kicked with the
    /// perturbation evaluated at the auxiliary velocity, the auxiliary
    /// velocity is fully kicked with it evaluated at the real velocity, and
    /// the real velocity receives the second half kick.
    fn kick_with_auxiliary(&mut self, step: Scalar) {
        let half_step = 0.5 * step;
        let view = state_view(&self.particles, &self.representation, self.particles.velocities());
        self.forces.velocity_independent(&view, &mut self.independent);

        self.kick_real(half_step);
        self.kick_auxiliary(step);
        self.kick_real(half_step);
    }

    fn kick_real(&mut self, step: Scalar) {
        let Some(auxiliary) = &self.auxiliary else {
            return;
        };
        let view = state_view(&self.particles, &self.representation, &auxiliary.cartesian);
        self.forces.velocity_dependent_part(&view, &mut self.dependent);
        self.acceleration.assign_sum(&self.independent, &self.dependent);

        let (masses, _, velocities) = self.particles.split_mut();
        let chain = match &mut self.representation {
            Representation::ChainAware(chain) => {
                let (order, _, chain_velocities) = chain.split_mut();
                Some((order, chain_velocities))
            }
            Representation::PlainCartesian => None,
        };
        apply_increment(
            masses,
            velocities,
            chain,
            &self.acceleration,
            &mut self.chain_increment,
            step,
        );
    }

    fn kick_auxiliary(&mut self, step: Scalar) {
        let view = state_view(&self.particles, &self.representation, self.particles.velocities());
        self.forces.velocity_dependent_part(&view, &mut self.dependent);
        self.acceleration.assign_sum(&self.independent, &self.dependent);

        let Some(auxiliary) = &mut self.auxiliary else {
            return;
        };
        let chain = match (&self.representation, auxiliary.chain.as_mut()) {
            (Representation::ChainAware(chain), Some(aux_chain)) => Some((chain.order(), aux_chain)),
            _ => None,
        };
        apply_increment(
            self.particles.masses(),
            &mut auxiliary.cartesian,
            chain,
            &self.acceleration,
            &mut self.chain_increment,
            step,
        );
    }
}

/// Build the view interactions evaluate against, with `velocities` standing
/// in for the particles' velocities
fn state_view<'a>(
    particles: &'a ParticleSet,
    representation: &'a Representation,
    velocities: &'a Coordinates,
) -> StateView<'a> {
    StateView {
        masses: particles.masses(),
        positions: particles.positions(),
        velocities,
        time: particles.time(),
        chain: match representation {
            Representation::ChainAware(chain) => Some(ChainView {
                order: chain.order(),
                links: chain.positions(),
            }),
            Representation::PlainCartesian => None,
        },
    }
}

/// `target += increment * step`, going through the chain when one is given
/// and refreshing the Cartesian copy from it
fn apply_increment(
    masses: &[Scalar],
    cartesian: &mut Coordinates,
    chain: Option<(&[usize], &mut Coordinates)>,
    increment: &Coordinates,
    scratch: &mut Coordinates,
    step: Scalar,
) {
    match chain {
        Some((order, links)) => {
            to_chain_into(increment, masses, order, scratch);
            links.advance(scratch, step);
            to_cartesian_into(masses, links, order, cartesian);
        }
        None => cartesian.advance(increment, step),
    }
}

impl PhaseSpace for ParticleSystem {
    fn advance_position(&mut self, step: Scalar) {
        let time = self.particles.time();
        self.particles.set_time(time + step);

        let (masses, positions, velocities) = self.particles.split_mut();
        match &mut self.representation {
            Representation::PlainCartesian => positions.advance(velocities, step),
            Representation::ChainAware(chain) => {
                let (order, links, chain_velocities) = chain.split_mut();
                links.advance(chain_velocities, step);
                to_cartesian_into(masses, links, order, positions);
            }
        }
    }

    fn advance_velocity(&mut self, step: Scalar) {
        if self.auxiliary.is_some() {
            self.kick_with_auxiliary(step);
            return;
        }

        let view = state_view(&self.particles, &self.representation, self.particles.velocities());
        self.forces.total(&view, &mut self.acceleration);

        let (masses, _, velocities) = self.particles.split_mut();
        let chain = match &mut self.representation {
            Representation::ChainAware(chain) => {
                let (order, _, chain_velocities) = chain.split_mut();
                Some((order, chain_velocities))
            }
            Representation::PlainCartesian => None,
        };
        apply_increment(
            masses,
            velocities,
            chain,
            &self.acceleration,
            &mut self.chain_increment,
            step,
        );
    }
}

impl Integrable for ParticleSystem {
    fn time(&self) -> Scalar {
        self.particles.time()
    }

    fn set_time(&mut self, time: Scalar) {
        self.particles.set_time(time);
    }

    /// `time`, positions, velocities, then the auxiliary velocity when present.
    /// Chain systems write their chain coordinates, plain systems their
    /// Cartesian ones.
    fn scalar_len(&self) -> usize {
        let n = self.len();
        let auxiliary = if self.auxiliary.is_some() { 3 * n } else { 0 };
        1 + 6 * n + auxiliary
    }

    fn write_scalars(&self, out: &mut Vec<Scalar>) {
        out.clear();
        out.reserve(self.scalar_len());
        out.push(self.particles.time());
        match &self.representation {
            Representation::PlainCartesian => {
                self.particles.positions().extend_scalars(out);
                self.particles.velocities().extend_scalars(out);
            }
            Representation::ChainAware(chain) => {
                chain.positions().extend_scalars(out);
                chain.velocities().extend_scalars(out);
            }
        }
        if let Some(auxiliary) = &self.auxiliary {
            auxiliary
                .chain
                .as_ref()
                .unwrap_or(&auxiliary.cartesian)
                .extend_scalars(out);
        }
    }

    fn read_scalars(&mut self, scalars: &[Scalar]) -> Result<()> {
        let expected = self.scalar_len();
        if scalars.len() != expected {
            return Err(ChainstepError::BufferLength {
                expected,
                actual: scalars.len(),
            });
        }

        check_finite_scalars(scalars, self.len())?;

        let block = 3 * self.len();
        let positions = &scalars[1..1 + block];
        let velocities = &scalars[1 + block..1 + 2 * block];
        self.particles.set_time(scalars[0]);

        match &mut self.representation {
            Representation::PlainCartesian => {
                let (_, cart_positions, cart_velocities) = self.particles.split_mut();
                cart_positions.load_scalars(positions);
                cart_velocities.load_scalars(velocities);
            }
            Representation::ChainAware(chain) => {
                let (_, links, chain_velocities) = chain.split_mut();
                links.load_scalars(positions);
                chain_velocities.load_scalars(velocities);
            }
        }
        if let Some(auxiliary) = &mut self.auxiliary {
            let target = auxiliary.chain.as_mut().unwrap_or(&mut auxiliary.cartesian);
            target.load_scalars(&scalars[1 + 2 * block..]);
        }

        self.sync_cartesian();
        Ok(())
    }

    /// Reset the auxiliary velocity to the real one
    fn pre_step(&mut self) {
        let Some(auxiliary) = &mut self.auxiliary else {
            return;
        };
        auxiliary.cartesian.clone_from(self.particles.velocities());
        if let (Some(aux_chain), Representation::ChainAware(chain)) =
            (&mut auxiliary.chain, &self.representation)
        {
            aux_chain.clone_from(chain.velocities());
        }
    }

    fn post_step(&mut self) {
        self.relink();
    }
}
