//! # RPI volume assembly
//!
//! This crate turns an ordered series of 2D DICOM slices into a single 3D
//! voxel grid stored in radiological (RPI) order: increasing indices run
//! Right to Left, Posterior to Anterior and Inferior to Superior.
//!
//! The volume lives in a memory-mapped file so series larger than working
//! memory can be assembled one slice at a time. Slices are handed in by a
//! [`SliceDecoder`]; [`DicomSliceDecoder`] reads them with dicom-rs, but any
//! source of pixel buffers with position and direction cosines works.
//!
//! Assembly proceeds in a fixed order:
//!  - the stacking direction is resolved once from the first two slices
//!  - a [`ResolutionPlan`] decides whether slices are downsampled
//!  - every slice is reshaped to the volume cross-section and written at its
//!    orientation-specific index (sagittal series are also mirrored into RPI)
//!  - the backing file is flushed and handed back with the scalar range
//!
//! Axial and coronal series are written without in-plane mirror correction.
//!
//! A [`CancelToken`] is polled after every slice. A cancelled run returns
//! [`Assembly::Cancelled`] and the partially written volume is removed.
//!
//! # Examples
//!
//! ## Assembling a directory of axial slices
//!
//! ```no_run
//! # use rpi_volume::{AssemblyOptions, Assembly, CancelToken, DicomSliceDecoder, NoProgress, SortBy, VolumeAssembler, collect_series};
//! let files = collect_series("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have listed the series");
//! let assembler = VolumeAssembler::new(DicomSliceDecoder, AssemblyOptions::default());
//! match assembler
//!     .assemble(&files, &mut NoProgress, &CancelToken::new())
//!     .expect("should have assembled the series")
//! {
//!     Assembly::Completed { mut volume, scalar_range } => {
//!         println!("{:?} voxels, range {scalar_range:?}", volume.dim());
//!         volume.persist("series.raw").expect("should have kept the volume");
//!     }
//!     Assembly::Cancelled { processed } => println!("stopped after {processed} slices"),
//! }
//! ```

pub mod assembler;
pub mod dicom_decoder;
pub mod enums;
pub mod error;
pub mod geometry;
mod interpolator;
mod placement;
pub mod progress;
pub mod resample;
pub mod slice;
pub mod tilt;
pub mod volume;

pub use assembler::{Assembly, AssemblyOptions, VolumeAssembler};
pub use dicom_decoder::{DicomSliceDecoder, collect_series, gantry_tilt};
pub use enums::{Orientation, SortBy};
pub use error::{Result, VolumeError};
pub use geometry::{Sign, StackingDirection, resolve};
pub use progress::{CancelToken, ChannelProgress, NoProgress, ProgressSink, TracingProgress};
pub use resample::{Resolution, ResolutionPlan, TargetSize, resample};
pub use slice::{Slice, SliceDecoder};
pub use tilt::correct_tilt;
pub use volume::{Volume, VolumeInfo};
