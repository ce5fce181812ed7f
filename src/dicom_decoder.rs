//! [`SliceDecoder`] backed by dicom-rs, plus series discovery helpers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::s;
use tracing::{debug, warn};

use crate::enums::SortBy;
use crate::slice::{Slice, SliceDecoder};

type DicomObject = FileDicomObject<InMemDicomObject>;

/// Decodes the first frame of single-file DICOM images.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomSliceDecoder;

impl SliceDecoder for DicomSliceDecoder {
    fn decode(&self, source: &Path) -> io::Result<Slice> {
        let object = open_file(source).map_err(io::Error::other)?;

        let position = float_values::<3>(&object, tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient")?;
        let cosines = float_values::<6>(&object, tags::IMAGE_ORIENTATION_PATIENT, "ImageOrientationPatient")?;
        let pixel_spacing = float_values::<2>(&object, tags::PIXEL_SPACING, "PixelSpacing")?;

        let pixel_data = object.decode_pixel_data().map_err(io::Error::other)?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let pixels = pixel_data
            .to_ndarray_with_options::<i16>(&options)
            .map_err(io::Error::other)?
            .slice_move(s![0, .., .., 0]);

        Ok(Slice {
            pixels,
            // PixelSpacing is (row spacing, column spacing).
            spacing: (pixel_spacing[1], pixel_spacing[0]),
            position,
            row_cosine: [cosines[0], cosines[1], cosines[2]],
            column_cosine: [cosines[3], cosines[4], cosines[5]],
        })
    }
}

fn float_values<const N: usize>(object: &DicomObject, tag: Tag, name: &str) -> io::Result<[f64; N]> {
    let values = object
        .element(tag)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("missing {name}")))?
        .to_multi_float64()
        .map_err(io::Error::other)?;
    values.get(..N).and_then(|v| v.try_into().ok()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{name} has {} values, expected {N}", values.len()),
        )
    })
}

/// Gantry/detector tilt of a slice in degrees, `None` when absent.
pub fn gantry_tilt(path: impl AsRef<Path>) -> io::Result<Option<f64>> {
    let object = read_header(path.as_ref())?;
    Ok(object
        .element(tags::GANTRY_DETECTOR_TILT)
        .ok()
        .and_then(|element| element.to_float64().ok()))
}

fn read_header(path: &Path) -> io::Result<DicomObject> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(io::Error::other)
}

/// List the `.dcm` files of `dir` in the order given by `sort_by`.
pub fn collect_series(dir: impl AsRef<Path>, sort_by: SortBy) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    paths.sort();

    if matches!(sort_by, SortBy::None) || paths.is_empty() {
        return Ok(paths);
    }

    let mut keyed = Vec::with_capacity(paths.len());
    for path in paths {
        let header = read_header(&path)?;
        let key = sort_key(&header, sort_by);
        if key.is_none() {
            warn!(path = %path.display(), ?sort_by, "missing sort attribute");
        }
        keyed.push((key, path));
    }
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    debug!(count = keyed.len(), ?sort_by, "sorted series");

    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}

fn sort_key(object: &DicomObject, sort_by: SortBy) -> Option<f64> {
    match sort_by {
        SortBy::ImagePositionPatient => {
            let position = float_values::<3>(object, tags::IMAGE_POSITION_PATIENT, "").ok()?;
            let c = float_values::<6>(object, tags::IMAGE_ORIENTATION_PATIENT, "").ok()?;
            let normal = [
                c[1] * c[5] - c[2] * c[4],
                c[2] * c[3] - c[0] * c[5],
                c[0] * c[4] - c[1] * c[3],
            ];
            Some(position.iter().zip(normal).map(|(p, n)| p * n).sum())
        }
        SortBy::TablePosition => object
            .element(tags::TABLE_POSITION)
            .ok()?
            .to_float64()
            .ok(),
        SortBy::InstanceNumber => object
            .element(tags::INSTANCE_NUMBER)
            .ok()?
            .to_int::<i32>()
            .ok()
            .map(f64::from),
        SortBy::None => Some(0.0),
    }
}
