//! Deterministic hashing of resource declarations.
//!
//! The engine persists the hash of each resource's declaration alongside
//! its converged mark; a resumed run skips a resource only when the
//! persisted hash still matches the bound declaration.

use sha2::{Digest, Sha256};

use crate::error::{ConvergeError, Result};

use super::spec::Resource;

/// Hasher for resource declarations.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the convergence hash for a resource declaration.
    ///
    /// Serialization is deterministic: attribute maps are ordered and
    /// list order is meaningful.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the declaration cannot be serialized.
    pub fn hash_resource(&self, resource: &Resource) -> Result<String> {
        let bytes = serde_json::to_vec(resource)
            .map_err(|e| ConvergeError::internal(format!("Unhashable resource: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Shortens a hash for display.
    #[must_use]
    pub fn short(hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::spec::{LinkSpec, Policy, ResourceKind};

    fn link(name: &str, to: &str) -> Resource {
        Resource {
            kind: ResourceKind::Link(LinkSpec {
                name: name.to_string(),
                to: Some(to.to_string()),
                owner: None,
                group: None,
            }),
            policy: Policy::Apply,
            requires: vec![],
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = SpecHasher::new();
        let resource = link("/etc/somelink", "/etc");
        assert_eq!(
            hasher.hash_resource(&resource).expect("hash"),
            hasher.hash_resource(&resource).expect("hash")
        );
    }

    #[test]
    fn test_hash_changes_with_declaration() {
        let hasher = SpecHasher::new();
        let a = hasher.hash_resource(&link("/etc/somelink", "/etc")).expect("hash");
        let b = hasher.hash_resource(&link("/etc/somelink", "/srv")).expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(SpecHasher::short("abcdef1234567890"), "abcdef12");
    }
}
