// Copyright 2024 the Bezfit Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cubic Bézier segments with n-dimensional control points.

use smallvec::SmallVec;

/// Control-point storage: four points of up to eight dimensions inline,
/// spilling to the heap for larger `dims`.
type PtStorage = SmallVec<[f64; 32]>;

/// A single cubic Bézier segment in `dims` dimensions.
///
/// The four control points are stored contiguously as `p0, p1, p2, p3`,
/// each `dims` wide. A segment produced by the fitter also records how many
/// input sample intervals it covers, which is what lets output knots be
/// mapped back to input indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Cubic {
    pts: PtStorage,
    dims: usize,
    orig_span: usize,
}

impl Cubic {
    /// Create a new cubic Bézier segment from four control points.
    ///
    /// All four slices must have the same length, which becomes the
    /// segment's dimension.
    pub fn new(p0: &[f64], p1: &[f64], p2: &[f64], p3: &[f64]) -> Cubic {
        let dims = p0.len();
        assert_eq!(dims, p1.len());
        assert_eq!(dims, p2.len());
        assert_eq!(dims, p3.len());
        let mut pts = PtStorage::with_capacity(4 * dims);
        pts.extend_from_slice(p0);
        pts.extend_from_slice(p1);
        pts.extend_from_slice(p2);
        pts.extend_from_slice(p3);
        Cubic {
            pts,
            dims,
            orig_span: 0,
        }
    }

    /// A segment with the given endpoints and zeroed handles, to be filled
    /// in by the solver.
    pub(crate) fn with_endpoints(p0: &[f64], p3: &[f64], orig_span: usize) -> Cubic {
        let dims = p0.len();
        debug_assert_eq!(dims, p3.len());
        let mut pts = PtStorage::from_elem(0.0, 4 * dims);
        pts[..dims].copy_from_slice(p0);
        pts[3 * dims..].copy_from_slice(p3);
        Cubic {
            pts,
            dims,
            orig_span,
        }
    }

    /// The degenerate segment whose four control points all coincide.
    pub(crate) fn from_single_point(p: &[f64]) -> Cubic {
        Cubic::new(p, p, p, p)
    }

    /// The dimension of the control points.
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of input sample intervals this segment covers.
    ///
    /// Zero for segments not produced by the fitter.
    #[inline]
    pub fn orig_span(&self) -> usize {
        self.orig_span
    }

    /// Control point `i` (0..=3).
    #[inline]
    pub fn pt(&self, i: usize) -> &[f64] {
        &self.pts[i * self.dims..(i + 1) * self.dims]
    }

    #[inline]
    pub(crate) fn pt_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.pts[i * self.dims..(i + 1) * self.dims]
    }

    /// The start point.
    #[inline]
    pub fn p0(&self) -> &[f64] {
        self.pt(0)
    }

    /// The first handle.
    #[inline]
    pub fn p1(&self) -> &[f64] {
        self.pt(1)
    }

    /// The second handle.
    #[inline]
    pub fn p2(&self) -> &[f64] {
        self.pt(2)
    }

    /// The end point.
    #[inline]
    pub fn p3(&self) -> &[f64] {
        self.pt(3)
    }

    /// Evaluate the position at parameter `t`, writing into `out`.
    ///
    /// Uses the de Casteljau recursion, which is numerically stabler than
    /// the expanded polynomial.
    pub fn eval(&self, t: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.dims);
        let (p0, p1, p2, p3) = (self.pt(0), self.pt(1), self.pt(2), self.pt(3));
        let s = 1.0 - t;
        for j in 0..self.dims {
            let p01 = p0[j] * s + p1[j] * t;
            let p12 = p1[j] * s + p2[j] * t;
            let p23 = p2[j] * s + p3[j] * t;
            out[j] = (p01 * s + p12 * t) * s + (p12 * s + p23 * t) * t;
        }
    }

    /// Evaluate the first derivative at parameter `t`, writing into `out`.
    pub fn velocity(&self, t: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.dims);
        let (p0, p1, p2, p3) = (self.pt(0), self.pt(1), self.pt(2), self.pt(3));
        let s = 1.0 - t;
        for j in 0..self.dims {
            out[j] = 3.0
                * ((p1[j] - p0[j]) * s * s
                    + 2.0 * (p2[j] - p1[j]) * s * t
                    + (p3[j] - p2[j]) * t * t);
        }
    }

    /// Evaluate the second derivative at parameter `t`, writing into `out`.
    pub fn acceleration(&self, t: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.dims);
        let (p0, p1, p2, p3) = (self.pt(0), self.pt(1), self.pt(2), self.pt(3));
        let s = 1.0 - t;
        for j in 0..self.dims {
            out[j] = 6.0
                * ((p2[j] - 2.0 * p1[j] + p0[j]) * s + (p3[j] - 2.0 * p2[j] + p1[j]) * t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cubic;
    use crate::vecn;

    fn unit_parabola() -> Cubic {
        // y = x^2
        Cubic::new(
            &[0.0, 0.0],
            &[1.0 / 3.0, 0.0],
            &[2.0 / 3.0, 1.0 / 3.0],
            &[1.0, 1.0],
        )
    }

    #[test]
    fn eval_endpoints_exact() {
        let c = Cubic::new(&[1.0, -2.0], &[0.5, 3.0], &[4.0, 4.0], &[-1.0, 7.0]);
        let mut v = [0.0; 2];
        c.eval(0.0, &mut v);
        assert_eq!(v, [1.0, -2.0]);
        c.eval(1.0, &mut v);
        assert_eq!(v, [-1.0, 7.0]);
    }

    #[test]
    fn eval_matches_polynomial() {
        let c = unit_parabola();
        let mut v = [0.0; 2];
        let n = 16;
        for i in 0..=n {
            let t = (i as f64) * (n as f64).recip();
            c.eval(t, &mut v);
            assert!((v[1] - v[0] * v[0]).abs() < 1e-14);
        }
    }

    #[test]
    fn velocity_matches_finite_difference() {
        let c = unit_parabola();
        let n = 10;
        let mut p = [0.0; 2];
        let mut p1 = [0.0; 2];
        let mut d = [0.0; 2];
        for i in 0..=n {
            let t = (i as f64) * (n as f64).recip();
            let delta = 1e-6;
            c.eval(t, &mut p);
            c.eval(t + delta, &mut p1);
            c.velocity(t, &mut d);
            let approx = [(p1[0] - p[0]) / delta, (p1[1] - p[1]) / delta];
            assert!(vecn::dist(&d, &approx) < delta * 10.0);
        }
    }

    #[test]
    fn acceleration_matches_finite_difference() {
        let c = unit_parabola();
        let n = 10;
        let mut d = [0.0; 2];
        let mut d1 = [0.0; 2];
        let mut dd = [0.0; 2];
        for i in 0..=n {
            let t = (i as f64) * (n as f64).recip();
            let delta = 1e-6;
            c.velocity(t, &mut d);
            c.velocity(t + delta, &mut d1);
            c.acceleration(t, &mut dd);
            let approx = [(d1[0] - d[0]) / delta, (d1[1] - d[1]) / delta];
            assert!(vecn::dist(&dd, &approx) < delta * 100.0);
        }
    }

    #[test]
    fn high_dims_spill() {
        // 12 dims spills the inline storage; evaluation is unaffected.
        let p0 = vec![0.0; 12];
        let p3 = vec![1.0; 12];
        let p1: Vec<f64> = (0..12).map(|_| 1.0 / 3.0).collect();
        let p2: Vec<f64> = (0..12).map(|_| 2.0 / 3.0).collect();
        let c = Cubic::new(&p0, &p1, &p2, &p3);
        let mut v = vec![0.0; 12];
        c.eval(0.5, &mut v);
        for x in &v {
            assert!((x - 0.5).abs() < 1e-15);
        }
    }
}
