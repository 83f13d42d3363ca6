//! Cache keys for skip decisions.
//!
//! A key covers the engine version, the action's identity and code version,
//! and the exact versions of its resolved inputs in io order. Two executions
//! share a key only when they would run the same logic on the same data.

use dagrun_types::action::ActionMeta;
use dagrun_types::artifact::ArtifactRef;

use crate::hash::ContentHasher;

/// Engine version folded into every cache key.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Derive the cache key for one action execution.
pub fn cache_key(
    hasher: &dyn ContentHasher,
    meta: &ActionMeta,
    code_version: &str,
    inputs: &[ArtifactRef],
) -> String {
    let mut material = format!(
        "dagrun/{ENGINE_VERSION}\naction\0{}\njob_type\0{}\ncode\0{}\n",
        meta.name, meta.job_type, code_version
    );
    for input in inputs {
        material.push_str("input\0");
        material.push_str(&input.name);
        material.push('\0');
        material.push_str(&input.version);
        material.push('\n');
    }
    hasher.compute_hash(material.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHasher;

    fn meta() -> ActionMeta {
        ActionMeta::new("train", "train-model", "model")
    }

    #[test]
    fn test_key_is_deterministic() {
        let inputs = vec![ArtifactRef::new("dataset", "v1")];
        assert_eq!(
            cache_key(&TestHasher, &meta(), "1", &inputs),
            cache_key(&TestHasher, &meta(), "1", &inputs)
        );
    }

    #[test]
    fn test_key_changes_with_code_and_inputs() {
        let inputs = vec![ArtifactRef::new("dataset", "v1")];
        let base = cache_key(&TestHasher, &meta(), "1", &inputs);
        assert_ne!(base, cache_key(&TestHasher, &meta(), "2", &inputs));
        assert_ne!(
            base,
            cache_key(&TestHasher, &meta(), "1", &[ArtifactRef::new("dataset", "v2")])
        );
        assert_ne!(base, cache_key(&TestHasher, &meta(), "1", &[]));
        let renamed = ActionMeta::new("train2", "train-model", "model");
        assert_ne!(base, cache_key(&TestHasher, &renamed, "1", &inputs));
    }

    #[test]
    fn test_key_respects_input_order() {
        let a = ArtifactRef::new("a", "1");
        let b = ArtifactRef::new("b", "1");
        assert_ne!(
            cache_key(&TestHasher, &meta(), "1", &[a.clone(), b.clone()]),
            cache_key(&TestHasher, &meta(), "1", &[b, a])
        );
    }
}
