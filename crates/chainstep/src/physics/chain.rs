//! Chain coordinates
//!
//! A chain orders the particles so that consecutive particles are close to
//! each other, then stores the relative vectors between neighbours instead of
//! absolute positions. During a close encounter the two particles involved
//! are neighbours on the chain, so their separation is held directly as a
//! small vector rather than recovered by subtracting two large, nearly equal
//! Cartesian coordinates.
//!
//! A chain of `n` particles is stored in a [`Coordinates`] container of
//! length `n`: entries `0..n-1` are the links
//! `cart[order[k + 1]] - cart[order[k]]`, and entry `n - 1` is the
//! mass-weighted centroid that anchors the reconstruction. The same layout
//! serves positions, velocities and accelerations.

use crate::physics::math::{Coordinates, Scalar, Vector};
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::debug;

/// Order particles along a short chain.
///
/// Starts from the globally closest pair and repeatedly attaches the nearest
/// unvisited particle to whichever end of the chain is closer to one. Equal
/// distances are resolved by particle id, and the result is oriented so that
/// the first particle has a smaller id than the last, which makes the
/// ordering a pure function of positions and ids. O(n²).
pub fn build_chain(positions: &Coordinates, ids: &[usize]) -> Vec<usize> {
    let n = positions.len();
    debug_assert_eq!(n, ids.len());
    match n {
        0 => return Vec::new(),
        1 => return vec![0],
        _ => {}
    }

    let distance = |i: usize, j: usize| (positions.get(i) - positions.get(j)).length_squared();
    let pair_key = |i: usize, j: usize| (ids[i].min(ids[j]), ids[i].max(ids[j]));

    let mut best = (0, 1);
    let mut best_distance = distance(0, 1);
    for i in 0..n {
        for j in i + 1..n {
            let d = distance(i, j);
            let closer = match d.total_cmp(&best_distance) {
                Ordering::Less => true,
                Ordering::Equal => pair_key(i, j) < pair_key(best.0, best.1),
                Ordering::Greater => false,
            };
            if closer {
                best = (i, j);
                best_distance = d;
            }
        }
    }

    let (head, tail) = if ids[best.0] < ids[best.1] {
        best
    } else {
        (best.1, best.0)
    };
    let mut visited = vec![false; n];
    visited[head] = true;
    visited[tail] = true;
    let mut order = VecDeque::with_capacity(n);
    order.push_back(head);
    order.push_back(tail);

    // Nearest unvisited particle to `from`, as (squared distance, id, index)
    let nearest = |from: usize, visited: &[bool]| {
        (0..n)
            .filter(|&k| !visited[k])
            .map(|k| (distance(from, k), ids[k], k))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
    };

    while order.len() < n {
        let front = order.front().copied().and_then(|f| nearest(f, &visited));
        let back = order.back().copied().and_then(|b| nearest(b, &visited));
        let (attach_front, candidate) = match (front, back) {
            (Some(f), Some(b)) => {
                if f.0.total_cmp(&b.0).then(f.1.cmp(&b.1)) == Ordering::Less {
                    (true, f.2)
                } else {
                    (false, b.2)
                }
            }
            (Some(f), None) => (true, f.2),
            (None, Some(b)) => (false, b.2),
            (None, None) => break,
        };
        visited[candidate] = true;
        if attach_front {
            order.push_front(candidate);
        } else {
            order.push_back(candidate);
        }
    }

    let mut order: Vec<usize> = order.into();
    if ids[order[0]] > ids[order[n - 1]] {
        order.reverse();
    }
    order
}

/// Mass-weighted centroid of a set of vectors
pub fn centroid(masses: &[Scalar], cartesian: &Coordinates) -> Vector {
    let mut weighted = Vector::ZERO;
    let mut total = 0.0;
    for (i, &m) in masses.iter().enumerate() {
        weighted += cartesian.get(i) * m;
        total += m;
    }
    weighted / total
}

/// Express Cartesian vectors as chain links plus their centroid
pub fn to_chain(cartesian: &Coordinates, masses: &[Scalar], order: &[usize]) -> Coordinates {
    let mut chain = Coordinates::with_len(cartesian.len());
    to_chain_into(cartesian, masses, order, &mut chain);
    chain
}

pub(crate) fn to_chain_into(
    cartesian: &Coordinates,
    masses: &[Scalar],
    order: &[usize],
    chain: &mut Coordinates,
) {
    let n = order.len();
    chain.resize(n);
    if n == 0 {
        return;
    }
    for k in 0..n - 1 {
        chain.set(k, cartesian.get(order[k + 1]) - cartesian.get(order[k]));
    }
    chain.set(n - 1, centroid(masses, cartesian));
}

/// Reconstruct Cartesian vectors from chain links.
///
/// Links are summed from the first chain particle outward, then the whole set
/// is shifted so its centroid equals the one stored in the chain.
pub fn to_cartesian(masses: &[Scalar], chain: &Coordinates, order: &[usize]) -> Coordinates {
    let mut cartesian = Coordinates::with_len(chain.len());
    to_cartesian_into(masses, chain, order, &mut cartesian);
    cartesian
}

pub(crate) fn to_cartesian_into(
    masses: &[Scalar],
    chain: &Coordinates,
    order: &[usize],
    cartesian: &mut Coordinates,
) {
    let n = order.len();
    cartesian.resize(n);
    if n == 0 {
        return;
    }

    let mut running = Vector::ZERO;
    cartesian.set(order[0], running);
    for k in 0..n - 1 {
        running += chain.get(k);
        cartesian.set(order[k + 1], running);
    }

    let shift = chain.get(n - 1) - centroid(masses, cartesian);
    for i in 0..n {
        cartesian.add_at(i, shift);
    }
}

/// Re-express a chain under a new ordering without going through Cartesian
/// coordinates.
///
/// Each new link spans a contiguous run of old links and is their signed sum.
/// The centroid entry carries over unchanged.
pub fn relink(chain: &Coordinates, old_order: &[usize], new_order: &[usize]) -> Coordinates {
    let n = old_order.len();
    debug_assert_eq!(n, new_order.len());
    let mut relinked = Coordinates::with_len(n);
    if n == 0 {
        return relinked;
    }

    let mut old_slot = vec![0; n];
    for (k, &particle) in old_order.iter().enumerate() {
        old_slot[particle] = k;
    }

    for k in 0..n - 1 {
        let from = old_slot[new_order[k]];
        let to = old_slot[new_order[k + 1]];
        let link = if from < to {
            (from..to).fold(Vector::ZERO, |acc, m| acc + chain.get(m))
        } else {
            -(to..from).fold(Vector::ZERO, |acc, m| acc + chain.get(m))
        };
        relinked.set(k, link);
    }
    relinked.set(n - 1, chain.get(n - 1));
    relinked
}

/// Chain representation of a particle system's positions and velocities
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    order: Vec<usize>,
    positions: Coordinates,
    velocities: Coordinates,
}

impl ChainState {
    pub fn new(
        ids: &[usize],
        masses: &[Scalar],
        positions: &Coordinates,
        velocities: &Coordinates,
    ) -> Self {
        let order = build_chain(positions, ids);
        Self {
            positions: to_chain(positions, masses, &order),
            velocities: to_chain(velocities, masses, &order),
            order,
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn positions(&self) -> &Coordinates {
        &self.positions
    }

    pub fn velocities(&self) -> &Coordinates {
        &self.velocities
    }

    /// Ordering alongside mutable position and velocity chains
    pub(crate) fn split_mut(&mut self) -> (&[usize], &mut Coordinates, &mut Coordinates) {
        (&self.order, &mut self.positions, &mut self.velocities)
    }

    /// Adopt `new_order` if it differs from the active one, re-expressing the
    /// stored chains (and any `extra` chains in the same layout) under it.
    /// Returns whether the ordering changed.
    pub fn relink_to(&mut self, new_order: Vec<usize>, extra: Option<&mut Coordinates>) -> bool {
        if new_order == self.order {
            return false;
        }
        debug!(from = ?self.order, to = ?new_order, "chain relinked");
        self.positions = relink(&self.positions, &self.order, &new_order);
        self.velocities = relink(&self.velocities, &self.order, &new_order);
        if let Some(chain) = extra {
            *chain = relink(chain, &self.order, &new_order);
        }
        self.order = new_order;
        true
    }
}
