//! Query identity for cacheable similarity searches

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Distance metric used by a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    L2,
    InnerProduct,
    Cosine,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::InnerProduct => write!(f, "inner_product"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

/// Buckets a requested result count so near-identical requests share a
/// fingerprint. Counts above 100 are kept as-is.
pub fn round_top_k(k: usize) -> usize {
    match k {
        0..=5 => 5,
        6..=10 => 10,
        11..=20 => 20,
        21..=50 => 50,
        51..=100 => 100,
        _ => k,
    }
}

/// Canonical identity of a cacheable query.
///
/// Two fingerprints are equal iff tenant, index, top-k and metric match, the
/// vectors are element-wise equal, and the tag sets are equal as sets. The
/// hash is consistent with that equality; tag hashing is order-independent.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct QueryFingerprint {
    tenant_id: String,
    index_name: String,
    vector: Vec<f32>,
    top_k: usize,
    metric: DistanceMetric,
    tags: BTreeSet<String>,
}

impl QueryFingerprint {
    /// Builds a fingerprint, normalizing the tag set. An absent tag list and
    /// an empty one produce the same identity.
    pub fn new(
        tenant_id: impl Into<String>,
        index_name: impl Into<String>,
        vector: Vec<f32>,
        top_k: usize,
        metric: DistanceMetric,
        tags: Option<Vec<String>>,
    ) -> Result<Self, DomainError> {
        let tenant_id = tenant_id.into();
        let index_name = index_name.into();

        if tenant_id.trim().is_empty() {
            return Err(DomainError::validation("tenant id cannot be empty"));
        }
        if index_name.trim().is_empty() {
            return Err(DomainError::validation("index name cannot be empty"));
        }
        if top_k == 0 {
            return Err(DomainError::validation("top_k must be positive"));
        }

        Ok(Self {
            tenant_id,
            index_name,
            vector,
            top_k,
            metric,
            tags: tags.unwrap_or_default().into_iter().collect(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Stable 64-bit identity used by the alias index and storage keys
    pub fn hash64(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for QueryFingerprint {
    fn eq(&self, other: &Self) -> bool {
        // Cheap scalar checks first
        self.top_k == other.top_k
            && self.metric == other.metric
            && self.tenant_id == other.tenant_id
            && self.index_name == other.index_name
            && self.tags == other.tags
            && self.vector.len() == other.vector.len()
            && self
                .vector
                .iter()
                .zip(&other.vector)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for QueryFingerprint {}

impl Hash for QueryFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tenant_id.hash(state);
        self.index_name.hash(state);
        self.top_k.hash(state);
        self.metric.hash(state);

        // XOR keeps the tag contribution order-independent
        let mut tags_hash: u64 = 0;
        for tag in &self.tags {
            let mut tag_hasher = DefaultHasher::new();
            tag.hash(&mut tag_hasher);
            tags_hash ^= tag_hasher.finish();
        }
        tags_hash.hash(state);

        for component in &self.vector {
            component.to_bits().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(
        vector: Vec<f32>,
        top_k: usize,
        tags: Option<Vec<String>>,
    ) -> QueryFingerprint {
        QueryFingerprint::new("tenant1", "idx1", vector, top_k, DistanceMetric::L2, tags).unwrap()
    }

    fn tags(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_equals_same_values() {
        let a = fingerprint(vec![1.0, 2.0], 10, tags(&["tag1", "tag2"]));
        let b = fingerprint(vec![1.0, 2.0], 10, tags(&["tag1", "tag2"]));

        assert_eq!(a, b);
        assert_eq!(a.hash64(), b.hash64());
    }

    #[test]
    fn test_equals_different_tag_order() {
        let a = fingerprint(vec![1.0], 10, tags(&["a", "b"]));
        let b = fingerprint(vec![1.0], 10, tags(&["b", "a"]));

        assert_eq!(a, b);
        assert_eq!(a.hash64(), b.hash64());
    }

    #[test]
    fn test_equals_none_tags_vs_empty_tags() {
        let a = fingerprint(vec![1.0], 10, None);
        let b = fingerprint(vec![1.0], 10, Some(vec![]));

        assert_eq!(a, b);
        assert_eq!(a.hash64(), b.hash64());
    }

    #[test]
    fn test_not_equal_different_vector() {
        let a = fingerprint(vec![1.0, 2.0], 10, None);
        let b = fingerprint(vec![1.0, 2.1], 10, None);

        assert_ne!(a, b);
    }

    #[test]
    fn test_not_equal_different_tags() {
        let a = fingerprint(vec![1.0], 10, tags(&["a"]));
        let b = fingerprint(vec![1.0], 10, tags(&["a", "b"]));

        assert_ne!(a, b);
    }

    #[test]
    fn test_not_equal_different_scalars() {
        let base = fingerprint(vec![1.0], 10, None);

        let other_k = fingerprint(vec![1.0], 20, None);
        assert_ne!(base, other_k);

        let other_metric = QueryFingerprint::new(
            "tenant1",
            "idx1",
            vec![1.0],
            10,
            DistanceMetric::Cosine,
            None,
        )
        .unwrap();
        assert_ne!(base, other_metric);

        let other_tenant =
            QueryFingerprint::new("tenant2", "idx1", vec![1.0], 10, DistanceMetric::L2, None)
                .unwrap();
        assert_ne!(base, other_tenant);

        let other_index =
            QueryFingerprint::new("tenant1", "idx2", vec![1.0], 10, DistanceMetric::L2, None)
                .unwrap();
        assert_ne!(base, other_index);
    }

    #[test]
    fn test_hash64_is_stable() {
        let fp = fingerprint(vec![1.0, 2.0], 10, tags(&["tag1"]));

        assert_eq!(fp.hash64(), fp.hash64());
    }

    #[test]
    fn test_rejects_empty_tenant() {
        let result =
            QueryFingerprint::new("", "idx1", vec![1.0], 10, DistanceMetric::L2, None);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_rejects_empty_index() {
        let result =
            QueryFingerprint::new("tenant1", "  ", vec![1.0], 10, DistanceMetric::L2, None);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let result =
            QueryFingerprint::new("tenant1", "idx1", vec![1.0], 0, DistanceMetric::L2, None);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_round_top_k_buckets() {
        let cases = [
            (1, 5),
            (4, 5),
            (5, 5),
            (6, 10),
            (9, 10),
            (11, 20),
            (49, 50),
            (51, 100),
            (101, 101),
        ];

        for (input, expected) in cases {
            assert_eq!(round_top_k(input), expected, "round_top_k({})", input);
        }
    }
}
