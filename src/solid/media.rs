use crate::error::{ConstructionError, Result};

/// Medium index per region.
///
/// The kernel does not interpret medium indices; it only hands them back to
/// the caller together with region lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMedia {
    media: Vec<Option<usize>>,
}

impl RegionMedia {
    /// Creates a table with no medium assigned to any of `regions` regions.
    #[must_use]
    pub fn empty(regions: usize) -> Self {
        Self {
            media: vec![None; regions],
        }
    }

    /// Creates a table with one medium per region.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::LengthMismatch` if `media` does not have
    /// exactly `regions` entries.
    pub fn from_slice(regions: usize, media: &[usize]) -> Result<Self> {
        if media.len() != regions {
            return Err(ConstructionError::LengthMismatch {
                what: "media",
                expected: regions,
                found: media.len(),
            }
            .into());
        }
        Ok(Self {
            media: media.iter().copied().map(Some).collect(),
        })
    }

    /// Creates a table from per-region optional media.
    #[must_use]
    pub fn from_options(media: Vec<Option<usize>>) -> Self {
        Self { media }
    }

    #[must_use]
    pub fn get(&self, region: usize) -> Option<usize> {
        self.media.get(region).copied().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.media.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}
