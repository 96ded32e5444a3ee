// Copyright 2024 the Bezfit Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cubic Bézier fitting over n-dimensional point sequences.
//!
//! Given a polyline sampled from a smooth curve, [`fit_cubic_to_points`]
//! returns a chain of cubic Bézier segments whose union stays within a
//! caller-supplied tolerance of the samples. The fit is the classic
//! Schneider construction: least-squares tangent magnitudes under a
//! chord-length parameterization, Newton–Raphson refinement of the
//! parameters, and recursive splitting at the worst-deviation sample when
//! the tolerance cannot be met.
//!
//! Points live in any dimension: the input is a flat `f64` array holding
//! `dims` coordinates per sample. An optional `corners` array marks sample
//! indices where the fitted curve must break with no tangent continuity,
//! which is how polygon-with-rounded-features outlines are usually fit.
//!
//! The output is a sequence of knots, each a `(left-handle, anchor,
//! right-handle)` triple, along with a map from knots back to input sample
//! indices. See [`CurveFit`] for the layout.
//!
//! # Examples
//!
//! ```
//! use bezfit::fit_cubic_to_points;
//!
//! // A right angle with a marked corner: two runs, one segment each.
//! let points = [
//!     0.0, 0.0, //
//!     1.0, 0.0, //
//!     2.0, 0.0, //
//!     2.0, 1.0, //
//!     2.0, 2.0, //
//! ];
//! let fit = fit_cubic_to_points(&points, 2, 1e-6, Some(&[0, 2, 4]))?;
//! assert_eq!(fit.segment_count(), 2);
//! assert_eq!(fit.anchor(1), [2.0, 0.0]);
//! # Ok::<(), bezfit::FitError>(())
//! ```
//!
//! # Feature flags
//!
//! - `serde`: implement `serde::Serialize` and `serde::Deserialize` on the
//!   output types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![allow(clippy::many_single_char_names)]

mod cubic;
mod fit;
mod spline;
pub mod vecn;

pub use crate::cubic::Cubic;
pub use crate::fit::{fit_cubic_to_points, fit_cubic_to_points_f32, FitError};
pub use crate::spline::{CurveFit, CurveFitF32, Segment, Segments};
