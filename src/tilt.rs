//! Gantry tilt compensation for axial volumes.

use ndarray::{ArrayViewMut3, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::enums::Orientation;
use crate::error::{Result, VolumeError};
use crate::interpolator::Interpolator;
use crate::volume::Volume;

// Offsets this close to a whole pixel are treated as exact shifts.
const SNAP: f64 = 1e-9;

/// Shear every axial cross-section along its row axis to undo a gantry tilt.
///
/// Slice `n` is shifted by `tan(tilt) * n * spacing.2 / spacing.1` pixels.
/// Vacated pixels take the volume's global minimum.
pub fn correct_tilt(volume: &mut ArrayViewMut3<'_, i16>, spacing: (f64, f64, f64), tilt_degrees: f64) {
    if tilt_degrees == 0.0 || volume.is_empty() {
        return;
    }
    let fill = volume.iter().copied().min().unwrap_or(0);
    let gantry_tan = tilt_degrees.to_radians().tan();
    let (_, row_spacing, slice_spacing) = spacing;

    volume
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(n, mut section)| {
            let mut offset = gantry_tan * n as f64 * slice_spacing / row_spacing;
            if (offset - offset.round()).abs() < SNAP {
                offset = offset.round();
            }
            if offset == 0.0 {
                return;
            }
            debug!(slice = n, offset, "shifting for gantry tilt");
            for mut column in section.axis_iter_mut(Axis(1)) {
                let lane: Vec<f64> = column.iter().map(|&v| f64::from(v)).collect();
                for (y, value) in column.iter_mut().enumerate() {
                    *value = match Interpolator::linear_interpolate(&lane, y as f64 + offset) {
                        Some(sample) => sample.round() as i16,
                        None => fill,
                    };
                }
            }
        });
}

impl Volume {
    /// Apply [`correct_tilt`] using the volume's own spacing. Only axial
    /// volumes stack along axis 0 and can be corrected.
    pub fn correct_tilt(&mut self, tilt_degrees: f64) -> Result<()> {
        if self.orientation() != Orientation::Axial {
            return Err(VolumeError::InvalidVolume(format!(
                "gantry tilt correction needs an axial volume, got {}",
                self.orientation()
            )));
        }
        let spacing = self.spacing();
        correct_tilt(&mut self.data_mut(), spacing, tilt_degrees);
        let data = self.data();
        let range = data
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        self.set_scalar_range(range);
        Ok(())
    }
}
