//! Cluster characteristic detection and disclosure gating
//!
//! This module provides:
//! - Read-only Kubernetes queries (trait plus kube-backed implementation)
//! - Owner chain resolution and target context assembly
//! - Detection of GitOps, PDB, HPA, stateful, Helm, network and mesh characteristics
//! - The relationship gate deciding whether detected labels may be disclosed

mod detector;
mod gate;
mod k8s;
mod kube_queries;

pub use detector::{
    detect_gitops, detect_helm, detect_service_mesh, detect_stateful, hpa_targets, pdb_matches,
    LabelDetector,
};
pub use gate::should_include_detected_labels;
pub use k8s::{
    build_k8s_context, resolve_owner_chain, walk_owner_chain, BoundedQueries, HpaInfo,
    K8sQueries, NamespaceMetadata, NetworkPolicyInfo, ObjectMetadata, OwnerChain,
    OwnerReference, PdbInfo,
};
pub use kube_queries::KubeQueries;

#[cfg(test)]
pub(crate) use k8s::fakes;
