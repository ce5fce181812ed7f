use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Acquisition plane of a series. Selects the axis slices are stacked along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    /// Stacked along the inferior-superior axis.
    #[default]
    Axial,
    /// Stacked along the posterior-anterior axis.
    Coronal,
    /// Stacked along the right-left axis.
    #[serde(alias = "SAGITAL")]
    Sagittal,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Axial => "AXIAL",
            Orientation::Coronal => "CORONAL",
            Orientation::Sagittal => "SAGITTAL",
        };
        f.write_str(name)
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AXIAL" => Ok(Orientation::Axial),
            "CORONAL" => Ok(Orientation::Coronal),
            "SAGITTAL" | "SAGITAL" => Ok(Orientation::Sagittal),
            other => Err(format!("unknown orientation `{other}`")),
        }
    }
}

/// Ordering applied to the files of a series before assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    /// Image position projected onto the slice normal.
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    /// File name order.
    None,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "position" | "image-position-patient" => Ok(SortBy::ImagePositionPatient),
            "table" | "table-position" => Ok(SortBy::TablePosition),
            "instance" | "instance-number" => Ok(SortBy::InstanceNumber),
            "none" | "name" => Ok(SortBy::None),
            other => Err(format!("unknown sort order `{other}`")),
        }
    }
}
