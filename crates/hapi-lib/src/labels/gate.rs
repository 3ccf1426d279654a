//! Disclosure gate for detected labels
//!
//! Cluster characteristics of the signal's resource are only surfaced when
//! the RCA target is provably related to it. Absence of proof excludes.

use crate::models::{OwnerChainEntry, ResourceRef};
use tracing::debug;

/// Decide whether detected labels may accompany an RCA about `rca_resource`
///
/// `owner_chain` is the signal resource's chain: `None` means it was never
/// queried (or the query failed), an empty slice means it was queried and empty.
pub fn should_include_detected_labels(
    source_resource: Option<&ResourceRef>,
    rca_resource: Option<&ResourceRef>,
    owner_chain: Option<&[OwnerChainEntry]>,
) -> bool {
    let (Some(source), Some(rca)) = (source_resource, rca_resource) else {
        return false;
    };
    if !rca.has_kind() {
        return false;
    }

    if source.same_identity(rca) {
        return true;
    }

    let Some(chain) = owner_chain else {
        debug!(source = %source, rca = %rca, "No owner chain, excluding detected labels");
        return false;
    };

    if chain.iter().any(|entry| entry.matches(rca)) {
        return true;
    }

    // Sibling fallback: same kind within the same scope
    let include = match (source.namespace(), rca.namespace()) {
        (Some(src_ns), Some(rca_ns)) => src_ns == rca_ns && source.kind == rca.kind,
        (None, None) => source.kind == rca.kind,
        _ => false,
    };

    debug!(source = %source, rca = %rca, include, "Detected labels gate fallback");
    include
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &[OwnerChainEntry] = &[];

    fn pod() -> ResourceRef {
        ResourceRef::namespaced("Pod", "prod", "api-xyz")
    }

    fn deployment() -> ResourceRef {
        ResourceRef::namespaced("Deployment", "prod", "api")
    }

    #[test]
    fn test_missing_source_excludes() {
        let chain = vec![OwnerChainEntry::new("Deployment", "prod", "api")];
        assert!(!should_include_detected_labels(None, Some(&deployment()), Some(chain.as_slice())));
        assert!(!should_include_detected_labels(None, Some(&pod()), None));
    }

    #[test]
    fn test_missing_rca_or_kind_excludes() {
        assert!(!should_include_detected_labels(Some(&pod()), None, Some(EMPTY)));

        let no_kind = ResourceRef {
            kind: String::new(),
            name: "api-xyz".to_string(),
            namespace: Some("prod".to_string()),
        };
        assert!(!should_include_detected_labels(Some(&pod()), Some(&no_kind), Some(EMPTY)));
    }

    #[test]
    fn test_exact_match_needs_no_chain() {
        assert!(should_include_detected_labels(Some(&pod()), Some(&pod()), None));
    }

    #[test]
    fn test_owner_chain_proof() {
        let chain = vec![
            OwnerChainEntry::new("ReplicaSet", "prod", "api-rs"),
            OwnerChainEntry::new("Deployment", "prod", "api"),
        ];
        assert!(should_include_detected_labels(
            Some(&pod()),
            Some(&deployment()),
            Some(chain.as_slice())
        ));
    }

    #[test]
    fn test_unqueried_chain_excludes_non_exact() {
        assert!(!should_include_detected_labels(Some(&pod()), Some(&deployment()), None));

        let sibling = ResourceRef::namespaced("Pod", "prod", "api-abc");
        assert!(!should_include_detected_labels(Some(&pod()), Some(&sibling), None));
    }

    #[test]
    fn test_sibling_fallback_with_empty_chain() {
        let sibling = ResourceRef::namespaced("Pod", "prod", "api-abc");
        assert!(should_include_detected_labels(Some(&pod()), Some(&sibling), Some(EMPTY)));

        let other_ns = ResourceRef::namespaced("Pod", "staging", "api-abc");
        assert!(!should_include_detected_labels(Some(&pod()), Some(&other_ns), Some(EMPTY)));

        let other_kind = ResourceRef::namespaced("Service", "prod", "api");
        assert!(!should_include_detected_labels(Some(&pod()), Some(&other_kind), Some(EMPTY)));
    }

    #[test]
    fn test_cluster_scoped_fallback() {
        let node_a = ResourceRef::cluster_scoped("Node", "worker-1");
        let node_b = ResourceRef::cluster_scoped("Node", "worker-2");
        assert!(should_include_detected_labels(Some(&node_a), Some(&node_b), Some(EMPTY)));

        // Mixed scopes never fall back
        assert!(!should_include_detected_labels(Some(&pod()), Some(&node_b), Some(EMPTY)));
        assert!(!should_include_detected_labels(Some(&node_a), Some(&pod()), Some(EMPTY)));
    }
}
