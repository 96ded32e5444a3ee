// Copyright 2024 the Bezfit Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Accumulation of fitted segments and the flattened knot-triple output.

use crate::cubic::Cubic;
use crate::vecn;

/// An ordered sequence of fitted cubic segments.
///
/// Segments are pushed in geometric order as the fitter emits them; the
/// spline is then flattened into the caller-facing [`CurveFit`] layout.
#[derive(Debug)]
pub(crate) struct CubicSpline {
    cubics: Vec<Cubic>,
    dims: usize,
}

impl CubicSpline {
    pub(crate) fn new(dims: usize) -> CubicSpline {
        CubicSpline {
            cubics: Vec::new(),
            dims,
        }
    }

    pub(crate) fn push(&mut self, cubic: Cubic) {
        debug_assert_eq!(cubic.dims(), self.dims);
        self.cubics.push(cubic);
    }

    pub(crate) fn len(&self) -> usize {
        self.cubics.len()
    }

    /// Flatten into the knot-triple layout.
    ///
    /// Each knot is `(left-handle, anchor, right-handle)`, `3 * dims` wide.
    /// Knot `i`'s outgoing segment is `(anchor_i, right_i, left_{i+1},
    /// anchor_{i+1})`. The first knot's left handle and the last knot's
    /// right handle have no segment of their own; they are set to the
    /// mirror image of the opposite handle about the anchor so every triple
    /// is well formed.
    ///
    /// `first_index` seeds the per-knot original-sample-index array, which
    /// accumulates each segment's span in geometric order.
    pub(crate) fn into_curve_fit(
        self,
        first_index: usize,
        corner_index: Option<Vec<usize>>,
    ) -> CurveFit {
        let dims = self.dims;
        let seg_count = self.cubics.len();
        debug_assert!(seg_count > 0);
        let chunk = 3 * dims;
        let mut knots = vec![0.0; (seg_count + 1) * chunk];
        let mut orig_index = Vec::with_capacity(seg_count + 1);
        let mut running = first_index;
        orig_index.push(running);

        for (i, cubic) in self.cubics.iter().enumerate() {
            let base = i * chunk;
            knots[base + dims..base + 2 * dims].copy_from_slice(cubic.p0());
            knots[base + 2 * dims..base + 3 * dims].copy_from_slice(cubic.p1());
            let next = base + chunk;
            knots[next..next + dims].copy_from_slice(cubic.p2());
            knots[next + dims..next + 2 * dims].copy_from_slice(cubic.p3());
            running += cubic.orig_span();
            orig_index.push(running);
        }

        // Boundary handles at both ends.
        {
            let (left, rest) = knots[..chunk].split_at_mut(dims);
            let (anchor, right) = rest.split_at(dims);
            vecn::mirror(left, anchor, right);
        }
        {
            let triple = &mut knots[seg_count * chunk..];
            let (head, right) = triple.split_at_mut(2 * dims);
            vecn::mirror(right, &head[dims..], &head[..dims]);
        }

        CurveFit {
            dims,
            knots,
            orig_index,
            corner_index,
        }
    }
}

/// The result of fitting: a sequence of knots, each a
/// `(left-handle, anchor, right-handle)` triple of n-dimensional points.
///
/// `segment_count` cubic segments produce `segment_count + 1` knots.
/// Segment `i` runs from anchor `i` to anchor `i + 1`, with control points
/// `(anchor_i, right_i, left_{i+1}, anchor_{i+1})`; [`CurveFit::segments`]
/// iterates these directly.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurveFit {
    dims: usize,
    knots: Vec<f64>,
    orig_index: Vec<usize>,
    corner_index: Option<Vec<usize>>,
}

impl CurveFit {
    /// The dimension of the fitted points.
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The number of knots; always one more than [`CurveFit::segment_count`].
    #[inline]
    pub fn knot_count(&self) -> usize {
        self.knots.len() / (3 * self.dims)
    }

    /// The number of fitted cubic segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.knot_count() - 1
    }

    /// The flattened knot array: `knot_count * 3 * dims` values laid out as
    /// `(left-handle, anchor, right-handle)` per knot.
    #[inline]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    #[inline]
    fn triple(&self, i: usize) -> &[f64] {
        let chunk = 3 * self.dims;
        &self.knots[i * chunk..(i + 1) * chunk]
    }

    /// Knot `i`'s left handle.
    #[inline]
    pub fn handle_left(&self, i: usize) -> &[f64] {
        &self.triple(i)[..self.dims]
    }

    /// Knot `i`'s anchor, a point on the curve.
    #[inline]
    pub fn anchor(&self, i: usize) -> &[f64] {
        &self.triple(i)[self.dims..2 * self.dims]
    }

    /// Knot `i`'s right handle.
    #[inline]
    pub fn handle_right(&self, i: usize) -> &[f64] {
        &self.triple(i)[2 * self.dims..]
    }

    /// Per-knot index of the input sample the knot's anchor coincides with.
    #[inline]
    pub fn orig_index(&self) -> &[usize] {
        &self.orig_index
    }

    /// For each supplied corner, the cumulative segment count at that
    /// boundary. `None` when the fit ran with default corners.
    #[inline]
    pub fn corner_index(&self) -> Option<&[usize]> {
        self.corner_index.as_deref()
    }

    /// Iterate over the fitted segments in geometric order.
    #[inline]
    pub fn segments(&self) -> Segments<'_> {
        Segments { fit: self, ix: 0 }
    }

    /// Narrow to single precision, consuming the fit.
    pub fn into_f32(self) -> CurveFitF32 {
        CurveFitF32 {
            dims: self.dims,
            knots: self.knots.iter().map(|&v| v as f32).collect(),
            orig_index: self.orig_index,
            corner_index: self.corner_index,
        }
    }
}

/// One fitted cubic segment, viewed as slices into a [`CurveFit`].
#[derive(Clone, Copy, Debug)]
pub struct Segment<'a> {
    /// Start anchor.
    pub p0: &'a [f64],
    /// First handle.
    pub p1: &'a [f64],
    /// Second handle.
    pub p2: &'a [f64],
    /// End anchor.
    pub p3: &'a [f64],
}

impl Segment<'_> {
    /// Copy into an owned [`Cubic`] for evaluation.
    pub fn to_cubic(&self) -> Cubic {
        Cubic::new(self.p0, self.p1, self.p2, self.p3)
    }
}

/// Iterator over the segments of a [`CurveFit`].
pub struct Segments<'a> {
    fit: &'a CurveFit,
    ix: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        if self.ix + 1 >= self.fit.knot_count() {
            return None;
        }
        let i = self.ix;
        self.ix += 1;
        Some(Segment {
            p0: self.fit.anchor(i),
            p1: self.fit.handle_right(i),
            p2: self.fit.handle_left(i + 1),
            p3: self.fit.anchor(i + 1),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.fit.segment_count() - self.ix;
        (remaining, Some(remaining))
    }
}

/// Single-precision rendition of [`CurveFit`], produced by
/// [`fit_cubic_to_points_f32`](crate::fit_cubic_to_points_f32).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurveFitF32 {
    dims: usize,
    knots: Vec<f32>,
    orig_index: Vec<usize>,
    corner_index: Option<Vec<usize>>,
}

impl CurveFitF32 {
    /// The dimension of the fitted points.
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The number of knots.
    #[inline]
    pub fn knot_count(&self) -> usize {
        self.knots.len() / (3 * self.dims)
    }

    /// The number of fitted cubic segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.knot_count() - 1
    }

    /// The flattened knot array, `(left-handle, anchor, right-handle)` per
    /// knot.
    #[inline]
    pub fn knots(&self) -> &[f32] {
        &self.knots
    }

    /// Per-knot index of the input sample the knot's anchor coincides with.
    #[inline]
    pub fn orig_index(&self) -> &[usize] {
        &self.orig_index
    }

    /// For each supplied corner, the cumulative segment count at that
    /// boundary.
    #[inline]
    pub fn corner_index(&self) -> Option<&[usize]> {
        self.corner_index.as_deref()
    }
}
