/// Scalar type for physics calculations (f64 for precision)
pub type Scalar = f64;

/// 3D vector type for positions, velocities, and accelerations
pub type Vector = glam::DVec3;

/// Structure-of-arrays container of 3D vectors.
///
/// Components are stored per axis (`x`, `y`, `z` arrays) so that whole-array
/// updates stay contiguous and the flattened form is axis-major: every `x`,
/// then every `y`, then every `z`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coordinates {
    x: Vec<Scalar>,
    y: Vec<Scalar>,
    z: Vec<Scalar>,
}

impl Coordinates {
    pub fn new() -> Self {
        Self::default()
    }

    /// A container of `len` zero vectors
    pub fn with_len(len: usize) -> Self {
        Self {
            x: vec![0.0; len],
            y: vec![0.0; len],
            z: vec![0.0; len],
        }
    }

    pub fn from_vectors(vectors: &[Vector]) -> Self {
        vectors.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// # Panics
    /// Panics if `index` is out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, index: usize) -> Vector {
        Vector::new(self.x[index], self.y[index], self.z[index])
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: Vector) {
        self.x[index] = value.x;
        self.y[index] = value.y;
        self.z[index] = value.z;
    }

    #[inline]
    pub fn add_at(&mut self, index: usize, value: Vector) {
        self.x[index] += value.x;
        self.y[index] += value.y;
        self.z[index] += value.z;
    }

    #[inline]
    pub fn sub_at(&mut self, index: usize, value: Vector) {
        self.x[index] -= value.x;
        self.y[index] -= value.y;
        self.z[index] -= value.z;
    }

    pub fn resize(&mut self, len: usize) {
        self.x.resize(len, 0.0);
        self.y.resize(len, 0.0);
        self.z.resize(len, 0.0);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.x.reserve(additional);
        self.y.reserve(additional);
        self.z.reserve(additional);
    }

    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }

    pub fn push(&mut self, value: Vector) {
        self.x.push(value.x);
        self.y.push(value.y);
        self.z.push(value.z);
    }

    /// Overwrite every entry with zero without changing the length
    pub fn fill_zero(&mut self) {
        self.x.fill(0.0);
        self.y.fill(0.0);
        self.z.fill(0.0);
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Vector> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    pub fn to_vectors(&self) -> Vec<Vector> {
        self.iter().collect()
    }

    /// `self[i] += increment[i] * factor` for every entry.
    ///
    /// # Panics
    /// Panics if the two containers differ in length.
    pub fn advance(&mut self, increment: &Coordinates, factor: Scalar) {
        assert_eq!(self.len(), increment.len(), "coordinate length mismatch");
        for (a, b) in self.x.iter_mut().zip(&increment.x) {
            *a += b * factor;
        }
        for (a, b) in self.y.iter_mut().zip(&increment.y) {
            *a += b * factor;
        }
        for (a, b) in self.z.iter_mut().zip(&increment.z) {
            *a += b * factor;
        }
    }

    /// Element-wise sum of two equally sized containers into `self`
    pub fn assign_sum(&mut self, lhs: &Coordinates, rhs: &Coordinates) {
        assert_eq!(lhs.len(), rhs.len(), "coordinate length mismatch");
        self.resize(lhs.len());
        for i in 0..lhs.len() {
            self.x[i] = lhs.x[i] + rhs.x[i];
            self.y[i] = lhs.y[i] + rhs.y[i];
            self.z[i] = lhs.z[i] + rhs.z[i];
        }
    }

    /// Append the axis-major flattening (`x..., y..., z...`) to `out`
    pub fn extend_scalars(&self, out: &mut Vec<Scalar>) {
        out.extend_from_slice(&self.x);
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&self.z);
    }

    /// Load an axis-major flattening produced by [`Coordinates::extend_scalars`].
    ///
    /// `scalars` must hold exactly `3 * self.len()` values.
    pub fn load_scalars(&mut self, scalars: &[Scalar]) {
        let n = self.len();
        assert_eq!(scalars.len(), 3 * n, "scalar slice length mismatch");
        self.x.copy_from_slice(&scalars[..n]);
        self.y.copy_from_slice(&scalars[n..2 * n]);
        self.z.copy_from_slice(&scalars[2 * n..]);
    }

    pub fn is_finite(&self) -> bool {
        self.x
            .iter()
            .chain(&self.y)
            .chain(&self.z)
            .all(|v| v.is_finite())
    }
}

impl FromIterator<Vector> for Coordinates {
    fn from_iter<I: IntoIterator<Item = Vector>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut coords = Coordinates::new();
        coords.reserve(iter.size_hint().0);
        for v in iter {
            coords.push(v);
        }
        coords
    }
}

/// Euclidean norm through `libm`, for results that do not depend on the
/// platform's `sqrt`.
#[inline]
pub fn norm(v: Vector) -> Scalar {
    libm::sqrt(v.length_squared())
}
