//! Keypoint and descriptor value types.

use serde::{Deserialize, Serialize};

use crate::util::{IconMatchError, IconMatchResult};

/// Bytes per binary descriptor row (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// Detected keypoint in canonical image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the described patch, in level-0 pixels.
    pub size: f32,
    /// Orientation in degrees, [0, 360).
    pub angle: f32,
    /// Harris corner response.
    pub response: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: i32,
    pub class_id: i32,
}

/// Dense row-major binary descriptor matrix, one row per keypoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Descriptors {
    data: Vec<u8>,
}

impl Descriptors {
    /// Wraps a flat buffer whose length is a multiple of [`DESCRIPTOR_BYTES`].
    pub fn from_vec(data: Vec<u8>) -> IconMatchResult<Self> {
        if data.len() % DESCRIPTOR_BYTES != 0 {
            return Err(IconMatchError::BufferTooSmall {
                needed: data.len().div_ceil(DESCRIPTOR_BYTES) * DESCRIPTOR_BYTES,
                got: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn from_rows(rows: &[[u8; DESCRIPTOR_BYTES]]) -> Self {
        Self {
            data: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.data.len() / DESCRIPTOR_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns row `i`, or `None` past the end.
    pub fn row(&self, i: usize) -> Option<&[u8]> {
        let start = i.checked_mul(DESCRIPTOR_BYTES)?;
        self.data.get(start..start + DESCRIPTOR_BYTES)
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(DESCRIPTOR_BYTES)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Keypoints with their descriptors for one canonical image.
///
/// Row `i` of `descriptors` describes `keypoints[i]`; both are empty
/// together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeatureSetRepr", into = "FeatureSetRepr")]
pub struct FeatureSet {
    keypoints: Vec<KeyPoint>,
    descriptors: Descriptors,
    image_shape: (u32, u32),
}

impl FeatureSet {
    pub fn new(
        keypoints: Vec<KeyPoint>,
        descriptors: Descriptors,
        image_shape: (u32, u32),
    ) -> IconMatchResult<Self> {
        if descriptors.as_bytes().len() != keypoints.len() * DESCRIPTOR_BYTES {
            return Err(IconMatchError::BufferTooSmall {
                needed: keypoints.len() * DESCRIPTOR_BYTES,
                got: descriptors.as_bytes().len(),
            });
        }
        Ok(Self {
            keypoints,
            descriptors,
            image_shape,
        })
    }

    /// Feature set of an image that yielded no keypoints.
    pub fn empty(image_shape: (u32, u32)) -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Descriptors::default(),
            image_shape,
        }
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// `(width, height)` of the image the features were extracted from.
    pub fn image_shape(&self) -> (u32, u32) {
        self.image_shape
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

impl TryFrom<Vec<u8>> for Descriptors {
    type Error = IconMatchError;

    fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
        Descriptors::from_vec(data)
    }
}

impl From<Descriptors> for Vec<u8> {
    fn from(desc: Descriptors) -> Self {
        desc.data
    }
}

#[derive(Serialize, Deserialize)]
struct FeatureSetRepr {
    keypoints: Vec<KeyPoint>,
    descriptors: Descriptors,
    image_shape: (u32, u32),
}

impl TryFrom<FeatureSetRepr> for FeatureSet {
    type Error = IconMatchError;

    fn try_from(repr: FeatureSetRepr) -> Result<Self, Self::Error> {
        FeatureSet::new(repr.keypoints, repr.descriptors, repr.image_shape)
    }
}

impl From<FeatureSet> for FeatureSetRepr {
    fn from(set: FeatureSet) -> Self {
        Self {
            keypoints: set.keypoints,
            descriptors: set.descriptors,
            image_shape: set.image_shape,
        }
    }
}
