//! In-plane downsampling of single slices and the per-series resolution plan.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VolumeError};
use crate::interpolator::Interpolator;
use crate::slice::Slice;

/// Requested in-plane resolution of an assembled volume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Scale of the source resolution, `1.0` keeps slices untouched.
    Fraction(f64),
    Pixels { width: usize, height: usize },
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Fraction(1.0)
    }
}

/// Target of a single resample call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetSize {
    Fraction(f64),
    Pixels { width: usize, height: usize },
}

impl From<Resolution> for TargetSize {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Fraction(f) => TargetSize::Fraction(f),
            Resolution::Pixels { width, height } => TargetSize::Pixels { width, height },
        }
    }
}

/// Magnification of one slice size onto a requested target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Magnification {
    /// Requested pixel dimensions `(width, height)`.
    pub target: (usize, usize),
    /// Per-axis spacing factors `(x, y)`.
    pub factors: (f64, f64),
    /// Dimensions of the resampled buffer `(width, height)`, always `target`.
    pub output: (usize, usize),
    source: (usize, usize),
}

impl Magnification {
    pub fn new(source: (usize, usize), target: TargetSize) -> Result<Self> {
        let (width, height) = source;
        if width == 0 || height == 0 {
            return Err(VolumeError::Resample(format!(
                "cannot resample an empty {width}x{height} slice"
            )));
        }

        let target = match target {
            TargetSize::Fraction(fraction) => {
                if !fraction.is_finite() || fraction <= 0.0 {
                    return Err(VolumeError::Resample(format!(
                        "resolution fraction must be positive, got {fraction}"
                    )));
                }
                (
                    (width as f64 * fraction).ceil() as usize,
                    (height as f64 * fraction).ceil() as usize,
                )
            }
            TargetSize::Pixels { width, height } => (width, height),
        };
        if target.0 == 0 || target.1 == 0 {
            return Err(VolumeError::Resample(format!(
                "target size must be positive, got {}x{}",
                target.0, target.1
            )));
        }

        let reference = reference_extent(width, height) as f64 + 1.0;
        let factors = (target.0 as f64 / reference, target.1 as f64 / reference);

        Ok(Self {
            target,
            factors,
            output: target,
            source,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.output == self.source
    }
}

/// Extent shared by both spacing factors.
///
/// Compares the pairwise distances between the x, y and z extents of a
/// single-slice image (z extent is always 0) and keeps the one belonging to
/// the closest pair. Only spacing depends on this choice; the pixel grid is
/// always the requested target.
fn reference_extent(width: usize, height: usize) -> i64 {
    let ex = width as i64 - 1;
    let ey = height as i64 - 1;
    let ez = 0i64;

    if (ex - ey).abs() < (ey - ez).abs() {
        ex
    } else if (ex - ez).abs() < (ex - ey).abs() {
        ex
    } else if (ey - ez).abs() < (ex - ey).abs() {
        ey
    } else {
        ex
    }
}

/// Source coordinate step between neighbouring output samples, pinning the
/// first and last samples to the source edges.
fn sample_step(source: usize, output: usize) -> f64 {
    if output > 1 {
        (source - 1) as f64 / (output - 1) as f64
    } else {
        0.0
    }
}

/// Resample `slice` towards `target`, returning the new slice and its spacing.
///
/// The buffer always has the target dimensions; spacing is scaled by the
/// magnification factors. A target equal to the source size returns the
/// slice unchanged.
pub fn resample(slice: &Slice, target: TargetSize) -> Result<(Slice, (f64, f64))> {
    let magnification = Magnification::new(slice.size(), target)?;
    let (fx, fy) = magnification.factors;
    let (out_width, out_height) = magnification.output;
    let spacing = if magnification.is_identity() {
        slice.spacing
    } else {
        (slice.spacing.0 * fx, slice.spacing.1 * fy)
    };

    debug!(
        source = ?slice.size(),
        output = ?magnification.output,
        ?spacing,
        "resampling slice"
    );

    let pixels = if magnification.is_identity() {
        slice.pixels.clone()
    } else {
        let source = slice.pixels.mapv(f32::from);
        let view = source.view();
        let view = &view;
        let (height, width) = view.dim();
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let step_x = sample_step(width, out_width);
        let step_y = sample_step(height, out_height);

        let samples: Vec<i16> = (0..out_height)
            .into_par_iter()
            .flat_map_iter(|y| {
                let src_y = ((y as f64 * step_y) as f32).min(max_y);
                (0..out_width).map(move |x| {
                    let src_x = ((x as f64 * step_x) as f32).min(max_x);
                    let value = Interpolator::bilinear_interpolate(view, src_y, src_x);
                    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
                })
            })
            .collect();

        Array2::from_shape_vec((out_height, out_width), samples)
            .map_err(|e| VolumeError::Resample(e.to_string()))?
    };

    Ok((
        Slice {
            pixels,
            spacing,
            position: slice.position,
            row_cosine: slice.row_cosine,
            column_cosine: slice.column_cosine,
        },
        spacing,
    ))
}

/// Resampling decision for a whole series, made once before assembly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionPlan {
    pub source: (usize, usize),
    pub resolution: Resolution,
    /// In-plane size of every slice written into the volume.
    pub output: (usize, usize),
}

impl ResolutionPlan {
    pub fn new(source: (usize, usize), resolution: Resolution) -> Result<Self> {
        let output = match resolution {
            Resolution::Fraction(f) if f == 1.0 => source,
            Resolution::Pixels { width, height } if (width, height) == source => source,
            other => Magnification::new(source, other.into())?.output,
        };
        Ok(Self {
            source,
            resolution,
            output,
        })
    }

    /// Pick the largest fraction whose i16 volume of `count` slices fits in
    /// `budget_bytes`.
    pub fn for_memory_budget(
        count: usize,
        source: (usize, usize),
        budget_bytes: u64,
    ) -> Result<Self> {
        let required = (count * source.0 * source.1 * std::mem::size_of::<i16>()) as f64;
        let fraction = if required <= budget_bytes as f64 {
            1.0
        } else {
            (budget_bytes as f64 / required).sqrt()
        };
        Self::new(source, Resolution::Fraction(fraction))
    }

    /// Whether slices pass through the resampler at all.
    pub fn reduces(&self) -> bool {
        match self.resolution {
            Resolution::Fraction(f) => f != 1.0,
            Resolution::Pixels { width, height } => (width, height) != self.source,
        }
    }

    pub fn target(&self) -> TargetSize {
        self.resolution.into()
    }
}
