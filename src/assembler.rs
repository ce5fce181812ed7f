use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::enums::Orientation;
use crate::error::{Result, VolumeError};
use crate::geometry::{self, StackingDirection};
use crate::placement;
use crate::progress::{CancelToken, ProgressSink};
use crate::resample::{self, Resolution, ResolutionPlan};
use crate::slice::{Slice, SliceDecoder};
use crate::volume::Volume;

/// Settings for one assembly run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    pub orientation: Orientation,
    pub resolution: Resolution,
    /// Shrink slices so the finished volume fits this many bytes. Only used
    /// when `resolution` is left at full size.
    pub memory_budget_bytes: Option<u64>,
    /// Directory for the backing file, system temp directory when unset.
    pub work_dir: Option<PathBuf>,
}

/// Outcome of [`VolumeAssembler::assemble`].
pub enum Assembly {
    Completed {
        volume: Volume,
        scalar_range: (i16, i16),
    },
    /// Stopped through the cancel token after `processed` slices. The
    /// partially written volume has been discarded.
    Cancelled { processed: usize },
}

impl Assembly {
    pub fn is_completed(&self) -> bool {
        matches!(self, Assembly::Completed { .. })
    }

    pub fn into_volume(self) -> Option<Volume> {
        match self {
            Assembly::Completed { volume, .. } => Some(volume),
            Assembly::Cancelled { .. } => None,
        }
    }
}

/// Builds a [`Volume`] from an ordered series of slices.
pub struct VolumeAssembler<D> {
    decoder: D,
    options: AssemblyOptions,
}

impl<D: SliceDecoder> VolumeAssembler<D> {
    pub fn new(decoder: D, options: AssemblyOptions) -> Self {
        Self { decoder, options }
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    fn decode(&self, path: &Path) -> Result<Slice> {
        self.decoder.decode(path).map_err(|source| VolumeError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn plan(&self, count: usize, source: (usize, usize)) -> Result<ResolutionPlan> {
        match (self.options.resolution, self.options.memory_budget_bytes) {
            (Resolution::Fraction(f), Some(budget)) if f == 1.0 => {
                ResolutionPlan::for_memory_budget(count, source, budget)
            }
            (resolution, _) => ResolutionPlan::new(source, resolution),
        }
    }

    /// Assemble `files`, in the given order, into a disk-backed volume.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two slices are given, the stacking
    /// direction is degenerate, a slice cannot be decoded or resampled, or a
    /// slice does not match the volume cross-section.
    pub fn assemble(
        &self,
        files: &[impl AsRef<Path>],
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Assembly> {
        if files.len() < 2 {
            return Err(VolumeError::Geometry(format!(
                "at least two slices are needed to resolve the stacking direction, got {}",
                files.len()
            )));
        }
        if cancel.is_cancelled() {
            warn!("assembly cancelled before start");
            return Ok(Assembly::Cancelled { processed: 0 });
        }

        let orientation = self.options.orientation;
        let layout = placement::layout(orientation);
        let count = files.len();

        let first = self.decode(files[0].as_ref())?;
        let second = self.decode(files[1].as_ref())?;
        let direction = geometry::resolve(
            first.position,
            second.position,
            first.row_cosine,
            first.column_cosine,
            orientation,
        )?;

        let plan = self.plan(count, first.size())?;
        if plan.reduces() {
            warn!(source = ?plan.source, output = ?plan.output, "slices will be resampled");
        }
        let shape = (layout.shape)(count, plan.output);
        let cross_section = (layout.cross_section)(shape);

        let (x_spacing, y_spacing) = if plan.reduces() {
            resample::Magnification::new(first.size(), plan.target())
                .map(|m| (first.spacing.0 * m.factors.0, first.spacing.1 * m.factors.1))?
        } else {
            first.spacing
        };
        let spacing = (x_spacing, y_spacing, direction.slice_spacing);

        info!(
            count,
            %orientation,
            ?shape,
            ?spacing,
            "assembling volume"
        );
        let mut volume = Volume::create(shape, spacing, orientation, self.options.work_dir.as_deref())?;

        let mut pending = [Some(first), Some(second)];
        let mut scalar_range: Option<(i16, i16)> = None;

        for (n, file) in files.iter().enumerate() {
            let slice = match pending.get_mut(n).and_then(Option::take) {
                Some(slice) => slice,
                None => self.decode(file.as_ref())?,
            };
            let slice = if plan.reduces() {
                resample::resample(&slice, plan.target())?.0
            } else {
                slice
            };

            if let Some((lo, hi)) = slice.scalar_range() {
                scalar_range = Some(match scalar_range {
                    None => (lo, hi),
                    Some((min, max)) => (min.min(lo), max.max(hi)),
                });
            }

            let index = write_slice(&mut volume, n, &slice, cross_section, layout, &direction)?;
            debug!(slice = n, index, "placed slice");

            progress.report(n + 1, &format!("Assembling slice {}/{count}", n + 1));
            if cancel.is_cancelled() {
                warn!(processed = n + 1, "assembly cancelled");
                return Ok(Assembly::Cancelled { processed: n + 1 });
            }
        }

        volume.flush()?;
        let scalar_range = scalar_range.unwrap_or((0, 0));
        volume.set_scalar_range(scalar_range);
        info!(?scalar_range, path = %volume.path().display(), "volume assembled");

        Ok(Assembly::Completed {
            volume,
            scalar_range,
        })
    }
}

fn write_slice(
    volume: &mut Volume,
    n: usize,
    slice: &Slice,
    cross_section: (usize, usize),
    layout: &placement::Layout,
    direction: &StackingDirection,
) -> Result<usize> {
    let mismatch = || VolumeError::ShapeMismatch {
        index: n,
        expected: cross_section,
        actual: slice.pixels.len(),
    };
    if slice.pixels.len() != cross_section.0 * cross_section.1 {
        return Err(mismatch());
    }

    let raw = slice.pixels.as_standard_layout();
    let samples = raw.as_slice().ok_or_else(mismatch)?;
    let buffer = ArrayView2::from_shape(cross_section, samples).map_err(|_| mismatch())?;

    Ok((layout.place)(&mut volume.data_mut(), n, buffer, direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use ndarray::Array2;
    use std::collections::HashMap;
    use std::io;

    struct Fixture(HashMap<PathBuf, Slice>);

    impl SliceDecoder for Fixture {
        fn decode(&self, source: &Path) -> io::Result<Slice> {
            self.0
                .get(source)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such slice"))
        }
    }

    fn axial(z: f64, pixels: Array2<i16>) -> Slice {
        Slice {
            pixels,
            spacing: (0.5, 0.5),
            position: [0.0, 0.0, z],
            row_cosine: [1.0, 0.0, 0.0],
            column_cosine: [0.0, 1.0, 0.0],
        }
    }

    fn series(slices: Vec<Slice>) -> (Fixture, Vec<PathBuf>) {
        let paths: Vec<PathBuf> = (0..slices.len())
            .map(|i| PathBuf::from(format!("slice-{i}.dcm")))
            .collect();
        let map = paths.iter().cloned().zip(slices).collect();
        (Fixture(map), paths)
    }

    #[test]
    fn single_slice_cannot_be_stacked() {
        let (decoder, paths) = series(vec![axial(0.0, Array2::zeros((2, 2)))]);
        let assembler = VolumeAssembler::new(decoder, AssemblyOptions::default());
        let err = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, VolumeError::Geometry(_)));
    }

    #[test]
    fn mismatched_slice_reports_its_index() {
        let (decoder, paths) = series(vec![
            axial(0.0, Array2::zeros((2, 2))),
            axial(1.0, Array2::zeros((2, 2))),
            axial(2.0, Array2::zeros((3, 2))),
        ]);
        let assembler = VolumeAssembler::new(decoder, AssemblyOptions::default());
        let err = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .err()
            .unwrap();
        match err {
            VolumeError::ShapeMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 2);
                assert_eq!(expected, (2, 2));
                assert_eq!(actual, 6);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn decoder_failures_keep_the_io_error() {
        let (decoder, mut paths) = series(vec![
            axial(0.0, Array2::zeros((2, 2))),
            axial(1.0, Array2::zeros((2, 2))),
        ]);
        paths.push(PathBuf::from("missing.dcm"));
        let assembler = VolumeAssembler::new(decoder, AssemblyOptions::default());
        let err = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .err()
            .unwrap();
        match err {
            VolumeError::Decode { path, source } => {
                assert_eq!(path, PathBuf::from("missing.dcm"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn volume_spacing_uses_slice_distance() {
        let (decoder, paths) = series(vec![
            axial(10.0, Array2::zeros((2, 2))),
            axial(12.5, Array2::zeros((2, 2))),
        ]);
        let assembler = VolumeAssembler::new(decoder, AssemblyOptions::default());
        let volume = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .unwrap()
            .into_volume()
            .unwrap();
        let (sx, sy, sz) = volume.spacing();
        assert_eq!((sx, sy), (0.5, 0.5));
        assert!((sz - 2.5).abs() < 1e-12);
    }

    #[test]
    fn memory_budget_triggers_resampling() {
        let (decoder, paths) = series(vec![
            axial(0.0, Array2::from_elem((8, 8), 5)),
            axial(1.0, Array2::from_elem((8, 8), 5)),
        ]);
        let options = AssemblyOptions {
            memory_budget_bytes: Some(64),
            ..AssemblyOptions::default()
        };
        let assembler = VolumeAssembler::new(decoder, options);
        let volume = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .unwrap()
            .into_volume()
            .unwrap();
        // 2 * 8 * 8 * 2 bytes against a 64 byte budget halves each side.
        assert_eq!(volume.dim(), (2, 4, 4));
        assert!(volume.data().iter().all(|&v| v == 5));
    }

    #[test]
    fn non_square_slices_shrink_along_both_axes() {
        let ramp = Array2::from_shape_fn((4, 8), |(y, x)| (y * 10 + x) as i16);
        let (decoder, paths) = series(vec![axial(0.0, ramp.clone()), axial(1.0, ramp)]);
        let options = AssemblyOptions {
            resolution: Resolution::Fraction(0.5),
            ..AssemblyOptions::default()
        };
        let assembler = VolumeAssembler::new(decoder, options);
        let volume = assembler
            .assemble(&paths, &mut NoProgress, &CancelToken::new())
            .unwrap()
            .into_volume()
            .unwrap();
        assert_eq!(volume.dim(), (2, 2, 4));
        let (sx, sy, sz) = volume.spacing();
        assert_eq!((sx, sy), (0.5, 0.25));
        assert!((sz - 1.0).abs() < 1e-12);
        let data = volume.data();
        assert_eq!(data[[0, 0, 0]], 0);
        assert_eq!(data[[1, 1, 3]], 37);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: AssemblyOptions =
            serde_json::from_str(r#"{ "orientation": "CORONAL", "resolution": { "fraction": 0.5 } }"#)
                .unwrap();
        assert_eq!(options.orientation, Orientation::Coronal);
        assert_eq!(options.resolution, Resolution::Fraction(0.5));
        assert_eq!(options.memory_budget_bytes, None);
    }
}
