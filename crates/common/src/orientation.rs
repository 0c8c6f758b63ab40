//! Anatomical orientation codes and volume reorientation.
//!
//! An orientation is a 3-letter code naming, per data axis, the anatomical
//! direction the axis starts from: one letter each from the
//! anterior/posterior, superior/inferior and left/right families, e.g.
//! `asr` or `psl`. Remapping between two codes permutes data axes so the
//! families line up, then flips every axis whose letter is the family
//! opposite.

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::AtlasRegError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisLabel {
    Anterior,
    Posterior,
    Superior,
    Inferior,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisFamily {
    AnteroPosterior,
    SuperoInferior,
    LeftRight,
}

impl AxisLabel {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'a' => Some(Self::Anterior),
            'p' => Some(Self::Posterior),
            's' => Some(Self::Superior),
            'i' => Some(Self::Inferior),
            'l' => Some(Self::Left),
            'r' => Some(Self::Right),
            _ => None,
        }
    }

    fn to_char(self) -> char {
        match self {
            Self::Anterior => 'a',
            Self::Posterior => 'p',
            Self::Superior => 's',
            Self::Inferior => 'i',
            Self::Left => 'l',
            Self::Right => 'r',
        }
    }

    #[must_use]
    pub fn family(self) -> AxisFamily {
        match self {
            Self::Anterior | Self::Posterior => AxisFamily::AnteroPosterior,
            Self::Superior | Self::Inferior => AxisFamily::SuperoInferior,
            Self::Left | Self::Right => AxisFamily::LeftRight,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Anterior => Self::Posterior,
            Self::Posterior => Self::Anterior,
            Self::Superior => Self::Inferior,
            Self::Inferior => Self::Superior,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Validated 3-letter anatomical orientation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Orientation([AxisLabel; 3]);

impl Orientation {
    pub fn parse(code: &str) -> Result<Self, AtlasRegError> {
        let chars: Vec<char> = code.chars().collect();
        if chars.len() != 3 {
            return Err(AtlasRegError::Config(format!(
                "orientation code '{code}' must have exactly 3 letters"
            )));
        }
        let mut labels = [AxisLabel::Anterior; 3];
        for (i, c) in chars.iter().enumerate() {
            labels[i] = AxisLabel::from_char(*c).ok_or_else(|| {
                AtlasRegError::Config(format!(
                    "orientation code '{code}' has invalid letter '{c}'"
                ))
            })?;
        }
        for i in 0..3 {
            for j in (i + 1)..3 {
                if labels[i].family() == labels[j].family() {
                    return Err(AtlasRegError::Config(format!(
                        "orientation code '{code}' repeats an axis family"
                    )));
                }
            }
        }
        Ok(Self(labels))
    }

    #[must_use]
    pub fn labels(&self) -> [AxisLabel; 3] {
        self.0
    }

    #[must_use]
    pub fn code(&self) -> String {
        self.0.iter().map(|l| l.to_char()).collect()
    }
}

impl TryFrom<String> for Orientation {
    type Error = AtlasRegError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Orientation> for String {
    fn from(value: Orientation) -> Self {
        value.code()
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code())
    }
}

/// Reorient a volume from one anatomical frame to another.
///
/// The output is in standard (row-major) layout regardless of the axis
/// permutation applied.
#[must_use]
pub fn remap_volume<T: Clone>(volume: Array3<T>, from: Orientation, to: Orientation) -> Array3<T> {
    let from = from.labels();
    let to = to.labels();

    let mut perm = [0usize; 3];
    for (target_axis, target_label) in to.iter().enumerate() {
        for (source_axis, source_label) in from.iter().enumerate() {
            if source_label.family() == target_label.family() {
                perm[target_axis] = source_axis;
            }
        }
    }

    let mut remapped = volume.permuted_axes(perm);
    for (target_axis, target_label) in to.iter().enumerate() {
        if from[perm[target_axis]] != *target_label {
            remapped.invert_axis(Axis(target_axis));
        }
    }
    remapped.as_standard_layout().to_owned()
}
