//! Orientation-specific volume layout and slice placement.
//!
//! Every orientation owns one [`Layout`] entry: how an in-plane size and a
//! slice count become the volume shape, which 2D shape a slice is reshaped
//! to, and how it is written into its cross-section.
//!
//! Only sagittal series correct in-plane mirroring. Axial and coronal slices
//! are copied as decoded.

use ndarray::{ArrayView2, ArrayViewMut3, Axis, s};

use crate::enums::Orientation;
use crate::geometry::{Sign, StackingDirection};

pub(crate) type Shape = (usize, usize, usize);

pub(crate) struct Layout {
    /// Volume shape for `count` slices of `(width, height)` pixels.
    pub shape: fn(count: usize, size: (usize, usize)) -> Shape,
    /// Shape a slice buffer is reshaped to before placement.
    pub cross_section: fn(shape: Shape) -> (usize, usize),
    /// Write slice `n` into the volume. Returns the index along the stacking axis.
    pub place: fn(&mut ArrayViewMut3<'_, i16>, usize, ArrayView2<'_, i16>, &StackingDirection) -> usize,
}

const AXIAL: Layout = Layout {
    shape: |count, (width, height)| (count, height, width),
    cross_section: |(_, rows, columns)| (rows, columns),
    place: place_axial,
};

const CORONAL: Layout = Layout {
    shape: |count, (width, height)| (height, count, width),
    cross_section: |(rows, _, columns)| (rows, columns),
    place: place_coronal,
};

const SAGITTAL: Layout = Layout {
    shape: |count, (width, height)| (width, height, count),
    cross_section: |(rows, columns, _)| (rows, columns),
    place: place_sagittal,
};

pub(crate) fn layout(orientation: Orientation) -> &'static Layout {
    match orientation {
        Orientation::Axial => &AXIAL,
        Orientation::Coronal => &CORONAL,
        Orientation::Sagittal => &SAGITTAL,
    }
}

fn place_axial(
    volume: &mut ArrayViewMut3<'_, i16>,
    n: usize,
    slice: ArrayView2<'_, i16>,
    _direction: &StackingDirection,
) -> usize {
    volume.slice_mut(s![n, .., ..]).assign(&slice);
    n
}

fn place_coronal(
    volume: &mut ArrayViewMut3<'_, i16>,
    n: usize,
    slice: ArrayView2<'_, i16>,
    _direction: &StackingDirection,
) -> usize {
    let index = volume.len_of(Axis(1)) - 1 - n;
    volume.slice_mut(s![.., index, ..]).assign(&slice);
    index
}

fn place_sagittal(
    volume: &mut ArrayViewMut3<'_, i16>,
    n: usize,
    mut slice: ArrayView2<'_, i16>,
    direction: &StackingDirection,
) -> usize {
    let index = match direction.stacking {
        Sign::Positive => n,
        Sign::Negative => volume.len_of(Axis(2)) - 1 - n,
    };
    // Reversal on a negative flag assumes a top-left-origin buffer; a
    // bottom-up buffer would need the opposite polarity.
    if direction.row_flip == Sign::Negative {
        slice.invert_axis(Axis(0));
    }
    if direction.column_flip == Sign::Negative {
        slice.invert_axis(Axis(1));
    }
    volume.slice_mut(s![.., .., index]).assign(&slice);
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn direction(row_flip: Sign, column_flip: Sign, stacking: Sign) -> StackingDirection {
        StackingDirection {
            row_flip,
            column_flip,
            stacking,
            slice_spacing: 1.0,
        }
    }

    fn numbered(rows: usize, columns: usize) -> Array2<i16> {
        Array2::from_shape_fn((rows, columns), |(r, c)| (r * columns + c) as i16 + 1)
    }

    #[test]
    fn shapes_permute_per_orientation() {
        let size = (4, 5);
        assert_eq!((layout(Orientation::Axial).shape)(3, size), (3, 5, 4));
        assert_eq!((layout(Orientation::Coronal).shape)(3, size), (5, 3, 4));
        assert_eq!((layout(Orientation::Sagittal).shape)(3, size), (4, 5, 3));
    }

    #[test]
    fn cross_sections_exclude_the_stacking_axis() {
        assert_eq!((layout(Orientation::Axial).cross_section)((3, 5, 4)), (5, 4));
        assert_eq!((layout(Orientation::Coronal).cross_section)((5, 3, 4)), (5, 4));
        assert_eq!((layout(Orientation::Sagittal).cross_section)((4, 5, 3)), (4, 5));
    }

    #[test]
    fn axial_copies_directly_at_n() {
        let mut data = Array3::<i16>::zeros((3, 2, 2));
        let slice = numbered(2, 2);
        let d = direction(Sign::Negative, Sign::Negative, Sign::Negative);
        let index = (AXIAL.place)(&mut data.view_mut(), 1, slice.view(), &d);
        assert_eq!(index, 1);
        assert_eq!(data.slice(s![1, .., ..]), slice);
    }

    #[test]
    fn coronal_fills_from_the_back() {
        let mut data = Array3::<i16>::zeros((2, 3, 2));
        let slice = numbered(2, 2);
        let d = direction(Sign::Positive, Sign::Positive, Sign::Positive);
        let index = (CORONAL.place)(&mut data.view_mut(), 0, slice.view(), &d);
        assert_eq!(index, 2);
        assert_eq!(data.slice(s![.., 2, ..]), slice);
    }

    #[test]
    fn sagittal_applies_stacking_and_flips() {
        let slice = numbered(2, 3);

        let mut data = Array3::<i16>::zeros((2, 3, 4));
        let d = direction(Sign::Positive, Sign::Positive, Sign::Positive);
        assert_eq!((SAGITTAL.place)(&mut data.view_mut(), 1, slice.view(), &d), 1);
        assert_eq!(data.slice(s![.., .., 1]), slice);

        let mut data = Array3::<i16>::zeros((2, 3, 4));
        let d = direction(Sign::Negative, Sign::Negative, Sign::Negative);
        assert_eq!((SAGITTAL.place)(&mut data.view_mut(), 1, slice.view(), &d), 2);
        let written = data.slice(s![.., .., 2]);
        assert_eq!(written[[0usize, 0]], slice[[1, 2]]);
        assert_eq!(written[[1usize, 2]], slice[[0, 0]]);
    }

    #[test]
    fn sagittal_row_flip_only_reverses_first_axis() {
        let slice = numbered(2, 3);
        let mut data = Array3::<i16>::zeros((2, 3, 1));
        let d = direction(Sign::Negative, Sign::Positive, Sign::Positive);
        (SAGITTAL.place)(&mut data.view_mut(), 0, slice.view(), &d);
        let written = data.slice(s![.., .., 0]);
        assert_eq!(written.row(0), slice.row(1));
        assert_eq!(written.row(1), slice.row(0));
    }
}
