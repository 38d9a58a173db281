use sha2::{Digest, Sha256};

/// Compute the checksum of a step from its forward and backward scripts.
///
/// The two scripts are separated by a NUL byte so that moving text from one
/// script to the other changes the checksum.
pub fn compute_step_checksum(up: &str, down: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up.as_bytes());
    hasher.update([0u8]);
    hasher.update(down.as_bytes());
    hex::encode(hasher.finalize())
}
