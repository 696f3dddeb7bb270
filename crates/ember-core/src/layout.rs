//! Per-particle record layout.
//!
//! A particle record is a fixed-width run of `f32`s. The engine only cares
//! about the width; the attribute breakdown exists so render collaborators
//! can bind each attribute as an instanced vertex input.

use smallvec::SmallVec;

use crate::error::LayoutError;

/// Size in bytes of one record float.
pub const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// Attribute sizes of the default record, in layout order.
///
/// The first attribute is the tracking-slot index (`-1.0` when the particle
/// does not follow its emitter); the last carries fade and lifetime data.
pub const DEFAULT_ATTRIBUTE_SIZES: [u32; 13] = [
    1, // tracking slot
    4, // position and emitter position
    1, // emitter facing
    4, // velocity and acceleration
    3, // sinusoidal motion along x
    3, // sinusoidal motion along y
    3, // angular data
    2, // revolution data
    3, // x-size data
    3, // y-size data
    4, // starting color
    4, // color shift
    4, // fade and time data
];

/// Width and attribute breakdown of one particle record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    attributes: SmallVec<[u32; 16]>,
    floats_per_particle: usize,
}

impl RecordLayout {
    /// Build a layout from attribute sizes (in floats), in binding order.
    pub fn from_attribute_sizes(sizes: &[u32]) -> Result<Self, LayoutError> {
        if sizes.is_empty() {
            return Err(LayoutError::Empty);
        }
        if let Some(index) = sizes.iter().position(|&s| s == 0) {
            return Err(LayoutError::ZeroSizedAttribute { index });
        }
        let floats_per_particle = sizes.iter().map(|&s| s as usize).sum();
        Ok(Self {
            attributes: sizes.iter().copied().collect(),
            floats_per_particle,
        })
    }

    /// A layout with a single opaque attribute of `floats` width.
    ///
    /// Useful when the record contents are not bound attribute-by-attribute.
    pub fn opaque(floats: u32) -> Result<Self, LayoutError> {
        Self::from_attribute_sizes(&[floats])
    }

    /// Floats per particle record.
    pub fn floats_per_particle(&self) -> usize {
        self.floats_per_particle
    }

    /// Bytes per particle record.
    pub fn bytes_per_particle(&self) -> usize {
        self.floats_per_particle * FLOAT_SIZE
    }

    /// Attribute sizes in floats, in binding order.
    pub fn attribute_sizes(&self) -> &[u32] {
        &self.attributes
    }

    /// Byte offset of each attribute within a record, in binding order.
    pub fn attribute_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.attributes.iter().scan(0usize, |offset, &size| {
            let current = *offset;
            *offset += size as usize * FLOAT_SIZE;
            Some(current)
        })
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        let attributes: SmallVec<[u32; 16]> = DEFAULT_ATTRIBUTE_SIZES.iter().copied().collect();
        let floats_per_particle = attributes.iter().map(|&s| s as usize).sum();
        Self {
            attributes,
            floats_per_particle,
        }
    }
}
