// Copyright 2024 the Bezfit Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Least-squares fitting of cubic Bézier segments to point runs.
//!
//! The fitter works per run (the stretch between two consecutive corners):
//! chord-length parameterize, solve for the two tangent magnitudes that
//! minimize the squared residual, and measure the worst deviation. A run
//! that misses the tolerance gets up to four rounds of Newton–Raphson
//! reparameterization; if it still misses, it is split at the
//! worst-deviation sample and both halves are fit recursively, sharing an
//! interior tangent so the pieces meet C0 at an input point.

use smallvec::{smallvec, SmallVec};
use thiserror::Error;
use tracing::trace;

use crate::cubic::Cubic;
use crate::spline::{CubicSpline, CurveFit, CurveFitF32};
use crate::vecn;

/// Reparameterization rounds per run before giving up and splitting.
const MAX_ITERATIONS: usize = 4;
/// Handle-clamp radius, as a multiple of the worst centroid distance.
const CLAMP_SCALE: f64 = 3.0;
/// Replacement factor for a singular normal-equation determinant.
const DET_NUDGE: f64 = 1e-11;

/// Inline capacity for a single n-dimensional tangent vector.
type TanBuf = SmallVec<[f64; 8]>;

/// Invalid input reported by [`fit_cubic_to_points`].
#[derive(Error, Debug)]
pub enum FitError {
    /// The point array is empty.
    #[error("no input points")]
    NoPoints,

    /// `dims` is zero.
    #[error("dims must be nonzero")]
    ZeroDims,

    /// The flat point array does not divide evenly into points.
    #[error("point array length {len} is not a multiple of dims {dims}")]
    PointsNotDivisible {
        /// Length of the flat array.
        len: usize,
        /// Requested dimension.
        dims: usize,
    },

    /// Corner indices must be strictly ascending, at least two, and within
    /// the input.
    #[error("invalid corner indices")]
    BadCorners,
}

/// Point `i` of a flat `dims`-strided array.
#[inline]
fn pt(points: &[f64], dims: usize, i: usize) -> &[f64] {
    &points[i * dims..(i + 1) * dims]
}

/// Dimension-sized temporaries shared by one driver invocation.
///
/// Everything here is overwritten before use; keeping the buffers in one
/// place avoids re-allocating per sample in the hot loops.
struct FitScratch {
    q0: Vec<f64>,
    q1: Vec<f64>,
    q2: Vec<f64>,
    tmp: Vec<f64>,
    a0: Vec<f64>,
    a1: Vec<f64>,
    center: Vec<f64>,
}

impl FitScratch {
    fn new(dims: usize) -> FitScratch {
        FitScratch {
            q0: vec![0.0; dims],
            q1: vec![0.0; dims],
            q2: vec![0.0; dims],
            tmp: vec![0.0; dims],
            a0: vec![0.0; dims],
            a1: vec![0.0; dims],
            center: vec![0.0; dims],
        }
    }
}

// Bézier basis weights.

fn b1(u: f64) -> f64 {
    let s = 1.0 - u;
    3.0 * u * s * s
}

fn b2(u: f64) -> f64 {
    3.0 * u * u * (1.0 - u)
}

fn b0_plus_b1(u: f64) -> f64 {
    let s = 1.0 - u;
    s * s * (1.0 + 2.0 * u)
}

fn b2_plus_b3(u: f64) -> f64 {
    u * u * (3.0 - 2.0 * u)
}

/// Per-point chord lengths for a run; `lengths[0]` is zero.
fn fill_length_cache(points: &[f64], dims: usize, lengths: &mut [f64]) {
    let n = points.len() / dims;
    lengths[0] = 0.0;
    for i in 1..n {
        lengths[i] = vecn::dist(pt(points, dims, i - 1), pt(points, dims, i));
    }
}

/// Chord-length parameterization from cached lengths: cumulative sums
/// normalized so the last value is exactly one.
///
/// A run of total length zero has no valid parameterization; callers route
/// such runs around the fitter.
fn chord_length_parameterize(lengths: &[f64]) -> Vec<f64> {
    let n = lengths.len();
    let mut u = Vec::with_capacity(n);
    let mut acc = 0.0;
    u.push(0.0);
    for &length in &lengths[1..] {
        acc += length;
        u.push(acc);
    }
    debug_assert!(!vecn::almost_zero(acc));
    for v in &mut u {
        *v /= acc;
    }
    u
}

/// Centroid of a run with each point weighted by its incident chord
/// lengths.
///
/// The weighting wraps around from the last point to the first, which
/// compensates for uneven sample spacing.
fn weighted_centroid(points: &[f64], dims: usize, center: &mut [f64]) {
    let n = points.len() / dims;
    center.fill(0.0);
    let mut w_tot = 0.0;
    let mut w_prev = vecn::dist(pt(points, dims, n - 2), pt(points, dims, n - 1));
    let mut i_curr = n - 1;
    for i_next in 0..n {
        let w_next = vecn::dist(pt(points, dims, i_curr), pt(points, dims, i_next));
        let w = w_prev + w_next;
        w_tot += w;
        vecn::madd(center, pt(points, dims, i_curr), w);
        w_prev = w_next;
        i_curr = i_next;
    }
    if w_tot != 0.0 {
        vecn::scale(center, 1.0 / w_tot);
    }
}

/// Pull handles that escaped the run's neighborhood back toward it.
///
/// A handle farther than `CLAMP_SCALE` times the worst point-to-centroid
/// distance first gets the `|p3 - p0| / 3` fallback magnitude; if that is
/// still outside, it is projected radially onto the bounding sphere.
fn clamp_handles(
    cubic: &mut Cubic,
    points: &[f64],
    dims: usize,
    tan_l: &[f64],
    tan_r: &[f64],
    scratch: &mut FitScratch,
) {
    let n = points.len() / dims;
    weighted_centroid(points, dims, &mut scratch.center);

    let mut dist_sq_max = 0.0f64;
    for i in 0..n {
        let p = pt(points, dims, i);
        let mut d = 0.0;
        for j in 0..dims {
            let t = (p[j] - scratch.center[j]) * CLAMP_SCALE;
            d += t * t;
        }
        dist_sq_max = dist_sq_max.max(d);
    }

    let mut p1_dist_sq = vecn::dist_sq(&scratch.center, cubic.pt(1));
    let mut p2_dist_sq = vecn::dist_sq(&scratch.center, cubic.pt(2));

    if p1_dist_sq > dist_sq_max || p2_dist_sq > dist_sq_max {
        let p0 = pt(points, dims, 0);
        let p3 = pt(points, dims, n - 1);
        let alpha = vecn::dist(p0, p3) / 3.0;
        vecn::sub_scaled(cubic.pt_mut(1), p0, tan_l, alpha);
        vecn::add_scaled(cubic.pt_mut(2), p3, tan_r, alpha);
        p1_dist_sq = vecn::dist_sq(&scratch.center, cubic.pt(1));
        p2_dist_sq = vecn::dist_sq(&scratch.center, cubic.pt(2));
    }

    if p1_dist_sq > dist_sq_max {
        let p1 = cubic.pt_mut(1);
        vecn::sub_assign(p1, &scratch.center);
        vecn::scale(p1, dist_sq_max.sqrt() / p1_dist_sq.sqrt());
        vecn::add_assign(p1, &scratch.center);
    }
    if p2_dist_sq > dist_sq_max {
        let p2 = cubic.pt_mut(2);
        vecn::sub_assign(p2, &scratch.center);
        vecn::scale(p2, dist_sq_max.sqrt() / p2_dist_sq.sqrt());
        vecn::add_assign(p2, &scratch.center);
    }
}

/// Least-squares solve for the two tangent magnitudes, producing a
/// candidate segment with the run's endpoints fixed.
///
/// The 2x2 normal equations go through Cramer's rule; a singular
/// determinant is nudged rather than zeroed, and a negative or NaN
/// magnitude falls back to the `|p3 - p0| / 3` heuristic.
fn cubic_from_points(
    points: &[f64],
    dims: usize,
    u_prime: &[f64],
    tan_l: &[f64],
    tan_r: &[f64],
    scratch: &mut FitScratch,
) -> Cubic {
    let n = points.len() / dims;
    let p0 = pt(points, dims, 0);
    let p3 = pt(points, dims, n - 1);

    let mut c = [[0.0f64; 2]; 2];
    let mut x = [0.0f64; 2];

    for i in 0..n {
        let p = pt(points, dims, i);
        let b1v = b1(u_prime[i]);
        let b2v = b2(u_prime[i]);
        for j in 0..dims {
            scratch.a0[j] = tan_l[j] * b1v;
            scratch.a1[j] = tan_r[j] * b2v;
        }

        c[0][0] += vecn::dot(&scratch.a0, &scratch.a0);
        c[0][1] += vecn::dot(&scratch.a0, &scratch.a1);
        c[1][1] += vecn::dot(&scratch.a1, &scratch.a1);

        let b01 = b0_plus_b1(u_prime[i]);
        let b23 = b2_plus_b3(u_prime[i]);
        for j in 0..dims {
            scratch.tmp[j] = (p[j] - p0[j] * b01) + p3[j] * b23;
        }
        x[0] += vecn::dot(&scratch.a0, &scratch.tmp);
        x[1] += vecn::dot(&scratch.a1, &scratch.tmp);
    }
    c[1][0] = c[0][1];

    let mut det_c0_c1 = c[0][0] * c[1][1] - c[0][1] * c[1][0];
    let det_c_0x = x[1] * c[0][0] - x[0] * c[0][1];
    let det_x_c1 = x[0] * c[1][1] - x[1] * c[0][1];

    if vecn::almost_zero(det_c0_c1) {
        det_c0_c1 = c[0][0] * c[1][1] * DET_NUDGE;
    }

    // May still divide by zero; the sign test below catches the NaNs.
    let mut alpha_l = det_x_c1 / det_c0_c1;
    let mut alpha_r = det_c_0x / det_c0_c1;

    // Written with negated comparisons so NaN takes the fallback too.
    if !(alpha_l >= 0.0) || !(alpha_r >= 0.0) {
        let alpha = vecn::dist(p0, p3) / 3.0;
        alpha_l = alpha;
        alpha_r = alpha;
    }

    let mut cubic = Cubic::with_endpoints(p0, p3, n - 1);
    vecn::sub_scaled(cubic.pt_mut(1), p0, tan_l, alpha_l);
    vecn::add_scaled(cubic.pt_mut(2), p3, tan_r, alpha_r);

    clamp_handles(&mut cubic, points, dims, tan_l, tan_r, scratch);
    cubic
}

/// Worst squared deviation of the interior samples from the candidate, and
/// the sample index where it occurs.
///
/// Endpoints are pinned to the curve by construction and are skipped, which
/// also guarantees the returned index is interior.
fn max_error(
    cubic: &Cubic,
    points: &[f64],
    dims: usize,
    u: &[f64],
    scratch: &mut FitScratch,
) -> (f64, usize) {
    let n = points.len() / dims;
    let mut error_sq_max = 0.0;
    let mut error_index = 0;
    for i in 1..n - 1 {
        cubic.eval(u[i], &mut scratch.tmp);
        let err_sq = vecn::dist_sq(pt(points, dims, i), &scratch.tmp);
        if err_sq >= error_sq_max {
            error_sq_max = err_sq;
            error_index = i;
        }
    }
    (error_sq_max, error_index)
}

/// One Newton–Raphson step on the distance functional
/// `f(u) = (Q(u) - p) . Q'(u)`.
///
/// May return NaN or infinity; the caller checks.
fn newton_step(cubic: &Cubic, p: &[f64], u: f64, scratch: &mut FitScratch) -> f64 {
    cubic.eval(u, &mut scratch.q0);
    cubic.velocity(u, &mut scratch.q1);
    cubic.acceleration(u, &mut scratch.q2);

    vecn::sub_assign(&mut scratch.q0, p);
    u - vecn::dot(&scratch.q0, &scratch.q1)
        / (vecn::len_sq(&scratch.q1) + vecn::dot(&scratch.q0, &scratch.q2))
}

/// Refine the parameterization with one Newton step per sample.
///
/// Returns false (leaving the previous parameterization in force) if any
/// step diverges to a non-finite value or the refined parameters escape
/// `[0, 1]`. The sort guards against Newton steps reordering samples.
fn reparameterize(
    cubic: &Cubic,
    points: &[f64],
    dims: usize,
    u: &[f64],
    u_prime: &mut [f64],
    scratch: &mut FitScratch,
) -> bool {
    let n = points.len() / dims;
    for i in 0..n {
        u_prime[i] = newton_step(cubic, pt(points, dims, i), u[i], scratch);
        if !u_prime[i].is_finite() {
            return false;
        }
    }

    u_prime.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());

    if u_prime[0] < 0.0 || u_prime[n - 1] > 1.0 {
        return false;
    }
    true
}

/// Fit one run, appending segments to `spline` in geometric order.
///
/// `lengths` caches the chord length of each sample to its predecessor;
/// entry 0 is unused.
#[allow(clippy::too_many_arguments)]
fn fit_cubic_run(
    points: &[f64],
    dims: usize,
    lengths: &[f64],
    tan_l: &[f64],
    tan_r: &[f64],
    error_sq: f64,
    scratch: &mut FitScratch,
    spline: &mut CubicSpline,
) {
    let n = points.len() / dims;

    if n == 2 {
        let p0 = pt(points, dims, 0);
        let p3 = pt(points, dims, 1);
        let dist = vecn::dist(p0, p3) / 3.0;
        let mut cubic = Cubic::with_endpoints(p0, p3, 1);
        vecn::sub_scaled(cubic.pt_mut(1), p0, tan_l, dist);
        vecn::add_scaled(cubic.pt_mut(2), p3, tan_r, dist);
        spline.push(cubic);
        return;
    }

    let mut u = chord_length_parameterize(lengths);

    let mut cubic = cubic_from_points(points, dims, &u, tan_l, tan_r, scratch);
    let (mut error_sq_max, mut split_index) = max_error(&cubic, points, dims, &u, scratch);

    if error_sq_max < error_sq {
        spline.push(cubic);
        return;
    }

    // Not too far off; alternate reparameterization and refitting.
    let mut u_prime = vec![0.0; n];
    for _ in 0..MAX_ITERATIONS {
        if !reparameterize(&cubic, points, dims, &u, &mut u_prime, scratch) {
            break;
        }
        cubic = cubic_from_points(points, dims, &u_prime, tan_l, tan_r, scratch);
        let (e, s) = max_error(&cubic, points, dims, &u_prime, scratch);
        error_sq_max = e;
        split_index = s;
        if error_sq_max < error_sq {
            spline.push(cubic);
            return;
        }
        std::mem::swap(&mut u, &mut u_prime);
    }

    // Fitting failed; split at the worst sample and fit both halves, which
    // share the split point and an interior tangent.
    trace!(n, split_index, error_sq_max, "splitting run at worst deviation");
    debug_assert!(split_index >= 1 && split_index + 1 < n);

    let mut i_a = split_index - 1;
    let i_b = split_index + 1;
    if vecn::approx_eq(pt(points, dims, i_a), pt(points, dims, i_b)) {
        // Identical neighbors would give a zero tangent; step past one.
        i_a += 1;
    }
    let mut tan_center: TanBuf = smallvec![0.0; dims];
    vecn::normalize_sub(&mut tan_center, pt(points, dims, i_a), pt(points, dims, i_b));

    fit_cubic_run(
        &points[..(split_index + 1) * dims],
        dims,
        &lengths[..split_index + 1],
        tan_l,
        &tan_center,
        error_sq,
        scratch,
        spline,
    );
    fit_cubic_run(
        &points[split_index * dims..],
        dims,
        &lengths[split_index..],
        &tan_center,
        tan_r,
        error_sq,
        scratch,
        spline,
    );
}

/// Fit a sequence of cubic Bézier segments to a polyline of n-dimensional
/// points.
///
/// `points` holds `dims` coordinates per sample, row-major. The fitted
/// curve passes exactly through the first and last sample of every run and
/// deviates from the remaining samples by at most `error_threshold`
/// (Euclidean distance), splitting into more segments as needed.
///
/// `corners` optionally marks strictly ascending sample indices where the
/// curve must break; no tangent continuity is enforced across a corner.
/// When absent, the whole input forms a single run.
///
/// See [`CurveFit`] for the output layout.
///
/// # Examples
///
/// ```
/// let points = [0.0, 0.0, 3.0, 0.0];
/// let fit = bezfit::fit_cubic_to_points(&points, 2, 1e-6, None)?;
/// assert_eq!(fit.segment_count(), 1);
/// assert_eq!(fit.handle_right(0), [1.0, 0.0]);
/// # Ok::<(), bezfit::FitError>(())
/// ```
pub fn fit_cubic_to_points(
    points: &[f64],
    dims: usize,
    error_threshold: f64,
    corners: Option<&[usize]>,
) -> Result<CurveFit, FitError> {
    if dims == 0 {
        return Err(FitError::ZeroDims);
    }
    if points.is_empty() {
        return Err(FitError::NoPoints);
    }
    if points.len() % dims != 0 {
        return Err(FitError::PointsNotDivisible {
            len: points.len(),
            dims,
        });
    }
    let points_len = points.len() / dims;
    let corners_buf = [0, points_len - 1];
    let corners_slice = match corners {
        Some(c) => {
            if c.len() < 2 || !c.windows(2).all(|w| w[0] < w[1]) || c[c.len() - 1] >= points_len
            {
                return Err(FitError::BadCorners);
            }
            c
        }
        None => &corners_buf,
    };
    trace!(
        points_len,
        dims,
        runs = corners_slice.len() - 1,
        "fitting cubic segments"
    );

    let mut spline = CubicSpline::new(dims);
    let mut scratch = FitScratch::new(dims);
    // Chord-length cache, reused across runs and grown monotonically.
    let mut lengths: Vec<f64> = Vec::new();
    let mut corner_index = corners.map(|c| {
        let mut v = Vec::with_capacity(c.len());
        v.push(c[0]);
        v
    });

    for w in corners_slice.windows(2) {
        let (first, last) = (w[0], w[1]);
        let n = last - first + 1;
        trace!(first, last, n, "fitting run");
        if n > 1 {
            let run = &points[first * dims..(last + 1) * dims];

            let mut tan_l: TanBuf = smallvec![0.0; dims];
            let mut tan_r: TanBuf = smallvec![0.0; dims];
            vecn::normalize_sub(&mut tan_l, pt(run, dims, 0), pt(run, dims, 1));
            vecn::normalize_sub(&mut tan_r, pt(run, dims, n - 2), pt(run, dims, n - 1));

            if lengths.len() < n {
                lengths.resize(n, 0.0);
            }
            fill_length_cache(run, dims, &mut lengths[..n]);

            fit_cubic_run(
                run,
                dims,
                &lengths[..n],
                &tan_l,
                &tan_r,
                error_threshold * error_threshold,
                &mut scratch,
                &mut spline,
            );
        } else {
            // A single zero-length run: the whole input is one point.
            debug_assert_eq!(points_len, 1);
            spline.push(Cubic::from_single_point(pt(points, dims, 0)));
        }

        if let Some(ci) = corner_index.as_mut() {
            ci.push(spline.len());
        }
    }
    debug_assert!(corner_index
        .as_ref()
        .map_or(true, |ci| ci.len() == corners_slice.len()));

    Ok(spline.into_curve_fit(corners_slice[0], corner_index))
}

/// Single-precision variant of [`fit_cubic_to_points`].
///
/// Widens the input to `f64`, runs the double-precision fit, and narrows
/// the result. There are no semantic differences.
pub fn fit_cubic_to_points_f32(
    points: &[f32],
    dims: usize,
    error_threshold: f32,
    corners: Option<&[usize]>,
) -> Result<CurveFitF32, FitError> {
    let points_db: Vec<f64> = points.iter().map(|&v| f64::from(v)).collect();
    let fit = fit_cubic_to_points(&points_db, dims, f64::from(error_threshold), corners)?;
    Ok(fit.into_f32())
}
