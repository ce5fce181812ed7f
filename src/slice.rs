use std::path::Path;

use ndarray::Array2;

/// One decoded 2D image of a series.
///
/// `pixels` is indexed `(row, column)` with the DICOM top-left origin, so its
/// shape is `(height, width)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub pixels: Array2<i16>,
    /// Physical pixel spacing as `(column spacing, row spacing)`, i.e. `(x, y)`.
    pub spacing: (f64, f64),
    /// Image position (patient) of the top-left pixel.
    pub position: [f64; 3],
    /// Direction cosine of the row axis (increasing column index).
    pub row_cosine: [f64; 3],
    /// Direction cosine of the column axis (increasing row index).
    pub column_cosine: [f64; 3],
}

impl Slice {
    /// Pixel dimensions as `(width, height)`.
    pub fn size(&self) -> (usize, usize) {
        let (height, width) = self.pixels.dim();
        (width, height)
    }

    /// Minimum and maximum sample, `None` for an empty slice.
    pub fn scalar_range(&self) -> Option<(i16, i16)> {
        self.pixels.iter().fold(None, |range, &value| match range {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        })
    }
}

/// Source of decoded slices.
///
/// Errors are passed through the assembler unchanged.
pub trait SliceDecoder {
    fn decode(&self, source: &Path) -> std::io::Result<Slice>;
}

impl<D: SliceDecoder + ?Sized> SliceDecoder for &D {
    fn decode(&self, source: &Path) -> std::io::Result<Slice> {
        (**self).decode(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn slice(pixels: Array2<i16>) -> Slice {
        Slice {
            pixels,
            spacing: (1.0, 1.0),
            position: [0.0; 3],
            row_cosine: [1.0, 0.0, 0.0],
            column_cosine: [0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn size_is_width_then_height() {
        let s = slice(Array2::zeros((5, 4)));
        assert_eq!(s.size(), (4, 5));
    }

    #[test]
    fn scalar_range_covers_all_samples() {
        let s = slice(array![[3, -7], [12, 0]]);
        assert_eq!(s.scalar_range(), Some((-7, 12)));
        assert_eq!(slice(Array2::zeros((0, 0))).scalar_range(), None);
    }
}
