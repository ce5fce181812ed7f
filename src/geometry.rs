//! Stacking direction of a series, resolved from its first two slices.

use tracing::debug;

use crate::enums::Orientation;
use crate::error::{Result, VolumeError};

const EPSILON: f64 = 1e-9;

#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    Negative = -1,
    Positive = 1,
}

impl Sign {
    fn of(value: f64) -> Self {
        if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }

    pub fn value(self) -> i8 {
        self as i8
    }

    pub fn flipped(self) -> Self {
        match self {
            Sign::Negative => Sign::Positive,
            Sign::Positive => Sign::Negative,
        }
    }
}

/// Per-series placement descriptor. Computed once and applied to every slice.
///
/// The in-plane flips are only derived for sagittal series; axial and
/// coronal series always carry `Positive` flips.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackingDirection {
    /// Reverse the first axis of a reshaped slice when `Negative`.
    pub row_flip: Sign,
    /// Reverse the second axis of a reshaped slice when `Negative`.
    pub column_flip: Sign,
    /// Whether slice index `n` maps to increasing position along the stacking axis.
    pub stacking: Sign,
    /// Distance between consecutive slices along the slice normal.
    pub slice_spacing: f64,
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Resolve the stacking direction from the positions of the first two
/// slices and the shared direction cosines.
pub fn resolve(
    first_position: [f64; 3],
    second_position: [f64; 3],
    row_cosine: [f64; 3],
    column_cosine: [f64; 3],
    orientation: Orientation,
) -> Result<StackingDirection> {
    let normal = cross(row_cosine, column_cosine);
    let normal_length = norm(normal);
    if normal_length < EPSILON {
        return Err(VolumeError::Geometry(
            "row and column direction cosines are parallel".into(),
        ));
    }
    let normal = normal.map(|c| c / normal_length);

    let displacement = sub(second_position, first_position);
    let distance = norm(displacement);
    if distance < EPSILON {
        return Err(VolumeError::Geometry(
            "first two slices share the same position".into(),
        ));
    }
    let projection = dot(normal, displacement.map(|c| c / distance));
    if projection.abs() < EPSILON {
        return Err(VolumeError::Geometry(
            "slice displacement lies within the slice plane".into(),
        ));
    }

    let direction = match orientation {
        Orientation::Sagittal => {
            // A normal pointing to patient right inverts the meaning of the projection.
            let stacking = if normal[0] < 0.0 {
                Sign::of(projection).flipped()
            } else {
                Sign::of(projection)
            };
            StackingDirection {
                row_flip: Sign::of(column_cosine[2]),
                column_flip: Sign::of(row_cosine[1]),
                stacking,
                slice_spacing: (projection * distance).abs(),
            }
        }
        Orientation::Coronal | Orientation::Axial => {
            let axis = if orientation == Orientation::Coronal { 1 } else { 2 };
            let stacking = if displacement[axis].abs() < EPSILON {
                Sign::of(projection)
            } else {
                Sign::of(displacement[axis])
            };
            StackingDirection {
                row_flip: Sign::Positive,
                column_flip: Sign::Positive,
                stacking,
                slice_spacing: (projection * distance).abs(),
            }
        }
    };

    debug!(?orientation, ?direction, "resolved stacking direction");
    Ok(direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AXIAL_ROW: [f64; 3] = [1.0, 0.0, 0.0];
    const AXIAL_COLUMN: [f64; 3] = [0.0, 1.0, 0.0];
    const CORONAL_ROW: [f64; 3] = [1.0, 0.0, 0.0];
    const CORONAL_COLUMN: [f64; 3] = [0.0, 0.0, -1.0];
    const SAGITTAL_ROW: [f64; 3] = [0.0, 1.0, 0.0];
    const SAGITTAL_COLUMN: [f64; 3] = [0.0, 0.0, -1.0];

    #[test]
    fn axial_stacking_follows_z_displacement() {
        let up = resolve([0.0; 3], [0.0, 0.0, 2.5], AXIAL_ROW, AXIAL_COLUMN, Orientation::Axial)
            .unwrap();
        assert_eq!(up.stacking, Sign::Positive);
        assert!((up.slice_spacing - 2.5).abs() < 1e-12);
        assert_eq!(up.row_flip, Sign::Positive);
        assert_eq!(up.column_flip, Sign::Positive);

        let down = resolve([0.0; 3], [0.0, 0.0, -2.5], AXIAL_ROW, AXIAL_COLUMN, Orientation::Axial)
            .unwrap();
        assert_eq!(down.stacking, Sign::Negative);
    }

    #[test]
    fn coronal_stacking_follows_y_displacement() {
        let d = resolve(
            [0.0, 10.0, 0.0],
            [0.0, 9.0, 0.0],
            CORONAL_ROW,
            CORONAL_COLUMN,
            Orientation::Coronal,
        )
        .unwrap();
        assert_eq!(d.stacking, Sign::Negative);
        assert_eq!(d.row_flip, Sign::Positive);
        assert_eq!(d.column_flip, Sign::Positive);
    }

    #[test]
    fn sagittal_derives_in_plane_flips_from_cosines() {
        let d = resolve(
            [0.0; 3],
            [1.0, 0.0, 0.0],
            SAGITTAL_ROW,
            SAGITTAL_COLUMN,
            Orientation::Sagittal,
        )
        .unwrap();
        assert_eq!(d.row_flip, Sign::Negative);
        assert_eq!(d.column_flip, Sign::Positive);
        // Normal is (-1, 0, 0): moving to +x projects negatively, then gets inverted.
        assert_eq!(d.stacking, Sign::Positive);
        assert!((d.slice_spacing - 1.0).abs() < 1e-12);
    }

    #[test]
    fn swapping_slices_flips_stacking_sign() {
        let cases = [
            (Orientation::Axial, AXIAL_ROW, AXIAL_COLUMN, [0.3, -0.2, 1.7]),
            (Orientation::Coronal, CORONAL_ROW, CORONAL_COLUMN, [0.1, -3.0, 0.2]),
            (Orientation::Sagittal, SAGITTAL_ROW, SAGITTAL_COLUMN, [4.0, 0.5, 0.0]),
        ];
        for (orientation, row, column, p2) in cases {
            let p1 = [0.0, 0.0, 0.0];
            let forward = resolve(p1, p2, row, column, orientation).unwrap();
            let backward = resolve(p2, p1, row, column, orientation).unwrap();
            assert_eq!(
                forward.stacking,
                backward.stacking.flipped(),
                "{orientation} did not flip"
            );
            assert_eq!(forward.row_flip, backward.row_flip);
            assert_eq!(forward.column_flip, backward.column_flip);
        }
    }

    #[test]
    fn duplicate_positions_are_rejected() {
        let err = resolve([1.0; 3], [1.0; 3], AXIAL_ROW, AXIAL_COLUMN, Orientation::Axial)
            .unwrap_err();
        assert!(matches!(err, VolumeError::Geometry(_)));
    }

    #[test]
    fn in_plane_displacement_is_rejected() {
        let err = resolve([0.0; 3], [5.0, 0.0, 0.0], AXIAL_ROW, AXIAL_COLUMN, Orientation::Axial)
            .unwrap_err();
        assert!(matches!(err, VolumeError::Geometry(_)));
    }

    #[test]
    fn parallel_cosines_are_rejected() {
        let err = resolve([0.0; 3], [0.0, 0.0, 1.0], AXIAL_ROW, AXIAL_ROW, Orientation::Axial)
            .unwrap_err();
        assert!(matches!(err, VolumeError::Geometry(_)));
    }
}
