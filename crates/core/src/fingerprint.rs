//! Perceptual fingerprints for decoded images.
//!
//! The fingerprint is an average hash computed by `image_hasher`: the image is
//! reduced to an 8×8 luminance grid, each cell becomes one bit depending on
//! whether it is brighter than the grid mean, and the 64 bits are rendered as
//! 16 lowercase hex digits. Recompression and rescaling barely move it;
//! cropping and real edits do. Unrelated images can collide, which is accepted.

use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::fmt;

/// Side length of the luminance grid.
pub const HASH_SIZE: u32 = 8;

/// Computes fingerprints for decoded images.
pub struct Fingerprinter {
    hasher: Hasher,
}

impl Fingerprinter {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .hash_size(HASH_SIZE, HASH_SIZE)
            .to_hasher();
        Self { hasher }
    }

    /// Average hash of `image` as a fixed-width lowercase hex string.
    pub fn fingerprint(&self, image: &DynamicImage) -> String {
        self.hasher
            .hash_image(image)
            .as_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("hash_size", &HASH_SIZE)
            .finish()
    }
}
