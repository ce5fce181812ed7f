use ndarray::ArrayView2;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Sample `slice` at a continuous `(y, x)` position. Callers clamp the
    /// position to the slice bounds.
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = (y.floor() as usize).min(height - 1);
        let x0 = (x.floor() as usize).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Linear sample of a 1D lane at `position`, or `None` outside it.
    #[inline]
    pub(crate) fn linear_interpolate(lane: &[f64], position: f64) -> Option<f64> {
        let last = lane.len().checked_sub(1)? as f64;
        if position < 0.0 || position > last {
            return None;
        }
        let i0 = position.floor() as usize;
        let t = position - i0 as f64;
        if t == 0.0 {
            return Some(lane[i0]);
        }
        Some(lane[i0].mul_add(1.0 - t, lane[i0 + 1] * t))
    }
}
