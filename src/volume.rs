use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma};
use memmap2::MmapMut;
use ndarray::{ArrayView2, ArrayView3, ArrayViewMut3, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tracing::debug;

use crate::enums::Orientation;
use crate::error::{Result, VolumeError};

const SAMPLE_SIZE: usize = std::mem::size_of::<i16>();

/// Everything needed to reopen a persisted volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub shape: (usize, usize, usize),
    /// `(column spacing, row spacing, slice spacing)` of the source slices.
    pub spacing: (f64, f64, f64),
    pub scalar_range: (i16, i16),
    pub orientation: Orientation,
}

enum Storage {
    /// Deleted when the volume is dropped.
    Temporary(TempPath),
    Persistent(PathBuf),
}

impl Storage {
    fn path(&self) -> &Path {
        match self {
            Storage::Temporary(path) => &**path,
            Storage::Persistent(path) => path.as_path(),
        }
    }
}

/// Memory-mapped 3D array of i16 samples in RPI order.
///
/// The shape is fixed at creation. Axis 0 runs inferior to superior for
/// axial series; see [`Orientation`] for how the axes are filled.
pub struct Volume {
    // Declared before `storage` so the mapping is released before a
    // temporary backing file is removed.
    mmap: MmapMut,
    shape: (usize, usize, usize),
    spacing: (f64, f64, f64),
    scalar_range: (i16, i16),
    orientation: Orientation,
    storage: Storage,
}

impl Volume {
    /// Allocate a zero-filled temporary backing file in `dir` (or the system
    /// temp directory) and map it.
    pub fn create(
        shape: (usize, usize, usize),
        spacing: (f64, f64, f64),
        orientation: Orientation,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let bytes = byte_len(shape)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("rpi-volume-").suffix(".raw");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.as_file().set_len(bytes as u64)?;

        // SAFETY: the file was just created by us with the exact length and is
        // not shared with other writers while mapped.
        let mmap = unsafe { MmapMut::map_mut(file.as_file())? };
        let path = file.into_temp_path();
        debug!(?shape, path = %path.display(), "created volume backing file");

        Ok(Self {
            mmap,
            shape,
            spacing,
            scalar_range: (0, 0),
            orientation,
            storage: Storage::Temporary(path),
        })
    }

    /// Map an existing raw backing file without copying it into memory.
    pub fn open(path: impl AsRef<Path>, info: &VolumeInfo) -> Result<Self> {
        let path = path.as_ref();
        let bytes = byte_len(info.shape)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = file.metadata()?.len();
        if actual != bytes as u64 {
            return Err(VolumeError::InvalidVolume(format!(
                "{} holds {actual} bytes, shape {:?} needs {bytes}",
                path.display(),
                info.shape
            )));
        }

        // SAFETY: the length was checked against the shape; the caller owns
        // the file exclusively while the volume is alive.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            mmap,
            shape: info.shape,
            spacing: info.spacing,
            scalar_range: info.scalar_range,
            orientation: info.orientation,
            storage: Storage::Persistent(path.to_path_buf()),
        })
    }

    /// Get the dimensions of the volume
    pub fn dim(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn spacing(&self) -> (f64, f64, f64) {
        self.spacing
    }

    pub fn scalar_range(&self) -> (i16, i16) {
        self.scalar_range
    }

    pub(crate) fn set_scalar_range(&mut self, range: (i16, i16)) {
        self.scalar_range = range;
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.storage, Storage::Persistent(_))
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            shape: self.shape,
            spacing: self.spacing,
            scalar_range: self.scalar_range,
            orientation: self.orientation,
        }
    }

    /// Get a view of the underlying data
    pub fn data(&self) -> ArrayView3<'_, i16> {
        ArrayView3::from_shape(self.shape, bytemuck::cast_slice(&self.mmap[..]))
            .expect("backing file length matches the volume shape")
    }

    /// Get a mutable view of the underlying data
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, i16> {
        ArrayViewMut3::from_shape(self.shape, bytemuck::cast_slice_mut(&mut self.mmap[..]))
            .expect("backing file length matches the volume shape")
    }

    /// Write pending changes to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Move the backing file to `dest` and keep it after the volume is dropped.
    ///
    /// When `dest` is on another filesystem the file is copied, the mapping
    /// is moved onto the copy and the original is removed.
    pub fn persist(&mut self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref().to_path_buf();
        self.flush()?;
        let previous = std::mem::replace(&mut self.storage, Storage::Persistent(dest.clone()));
        match previous {
            Storage::Temporary(path) => match path.persist(&dest) {
                Ok(()) => {}
                Err(err) if err.error.kind() == io::ErrorKind::CrossesDevices => {
                    match copy_and_map(&err.path, &dest) {
                        // Dropping the temp path removes the original.
                        Ok(mmap) => self.mmap = mmap,
                        Err(copy_err) => {
                            self.storage = Storage::Temporary(err.path);
                            return Err(copy_err.into());
                        }
                    }
                }
                Err(err) => {
                    self.storage = Storage::Temporary(err.path);
                    return Err(err.error.into());
                }
            },
            Storage::Persistent(path) => match fs::rename(&path, &dest) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                    match copy_and_map(&path, &dest) {
                        Ok(mmap) => {
                            self.mmap = mmap;
                            fs::remove_file(&path)?;
                        }
                        Err(copy_err) => {
                            self.storage = Storage::Persistent(path);
                            return Err(copy_err.into());
                        }
                    }
                }
                Err(err) => {
                    self.storage = Storage::Persistent(path);
                    return Err(err.into());
                }
            },
        }
        debug!(path = %dest.display(), "persisted volume");
        Ok(())
    }

    /// Cross-section at `index` perpendicular to the orientation's axis:
    /// axial indexes axis 0, coronal axis 1, sagittal axis 2.
    pub fn cross_section(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, i16>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let data = self.data();
        let section = match orientation {
            Orientation::Axial => data.slice_move(s![index, .., ..]),
            Orientation::Coronal => data.slice_move(s![.., index, ..]),
            Orientation::Sagittal => data.slice_move(s![.., .., index]),
        };
        Some(section)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let (d0, d1, d2) = self.shape;
        let max_index = match orientation {
            Orientation::Axial => d0,
            Orientation::Coronal => d1,
            Orientation::Sagittal => d2,
        };
        index < max_index
    }

    #[inline]
    fn normalize_to_u8(value: i16, (min, max): (i16, i16)) -> u8 {
        let span = (max as f32 - min as f32).max(1.0);
        (((value as f32 - min as f32) / span) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Render a cross-section as 8-bit grey, stretched over the volume's
    /// scalar range.
    pub fn cross_section_image(&self, index: usize, orientation: Orientation) -> Result<GrayImage> {
        let section = self.cross_section(index, orientation).ok_or_else(|| {
            VolumeError::InvalidVolume(format!(
                "{orientation} index {index} is outside shape {:?}",
                self.shape
            ))
        })?;
        let (height, width) = section.dim();
        let range = self.scalar_range;
        let pixels: Vec<u8> = section
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, range))
            .collect();
        ImageBuffer::<Luma<u8>, _>::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| VolumeError::InvalidVolume("cross-section buffer size mismatch".into()))
    }

    pub fn save_cross_section(
        &self,
        index: usize,
        orientation: Orientation,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        self.cross_section_image(index, orientation)?.save(path)?;
        Ok(())
    }
}

/// Copy a flushed backing file to `dest` and map the copy.
fn copy_and_map(source: &Path, dest: &Path) -> io::Result<MmapMut> {
    debug!(from = %source.display(), to = %dest.display(), "copying volume across filesystems");
    let mapped = fs::copy(source, dest).and_then(|_| {
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        // SAFETY: `dest` was just written by us and has the source's length,
        // which was checked against the shape when the volume was created.
        unsafe { MmapMut::map_mut(&file) }
    });
    if mapped.is_err() {
        let _ = fs::remove_file(dest);
    }
    mapped
}

fn byte_len(shape: (usize, usize, usize)) -> Result<usize> {
    let (d0, d1, d2) = shape;
    d0.checked_mul(d1)
        .and_then(|n| n.checked_mul(d2))
        .and_then(|n| n.checked_mul(SAMPLE_SIZE))
        .filter(|&n| n > 0)
        .ok_or_else(|| VolumeError::InvalidVolume(format!("unusable volume shape {shape:?}")))
}
