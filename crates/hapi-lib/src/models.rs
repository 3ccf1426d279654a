//! Core data models shared across detection, investigation and review

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a Kubernetes resource
///
/// A missing or empty namespace denotes a cluster-scoped resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster_scoped(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Namespace, treating an empty string as cluster-scoped
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub fn has_kind(&self) -> bool {
        !self.kind.trim().is_empty()
    }

    /// Kind, namespace and name all agree
    pub fn same_identity(&self, other: &ResourceRef) -> bool {
        self.kind == other.kind && self.name == other.name && self.namespace() == other.namespace()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// One link of an ownerReferences chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerChainEntry {
    pub kind: String,
    pub name: String,
    /// Empty for cluster-scoped owners
    #[serde(default)]
    pub namespace: String,
}

impl OwnerChainEntry {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_resource(resource: &ResourceRef) -> Self {
        Self {
            kind: resource.kind.clone(),
            name: resource.name.clone(),
            namespace: resource.namespace().unwrap_or_default().to_string(),
        }
    }

    /// Matches on kind, namespace and name
    pub fn matches(&self, resource: &ResourceRef) -> bool {
        self.kind == resource.kind
            && self.name == resource.name
            && self.namespace == resource.namespace().unwrap_or_default()
    }
}

/// Metadata already fetched for a target resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K8sContext {
    pub resource: Option<ResourceRef>,
    /// Labels of the pods backing the resource (pod template labels for workloads)
    pub pod_labels: BTreeMap<String, String>,
    pub pod_annotations: BTreeMap<String, String>,
    pub deployment_labels: BTreeMap<String, String>,
    pub deployment_annotations: BTreeMap<String, String>,
    pub namespace_labels: BTreeMap<String, String>,
    pub namespace_annotations: BTreeMap<String, String>,
    /// Characteristics whose metadata inputs could not be fetched
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unavailable: BTreeSet<DetectionField>,
}

/// GitOps controller reconciling the resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitOpsTool {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "argocd")]
    ArgoCd,
    #[serde(rename = "flux")]
    Flux,
}

impl fmt::Display for GitOpsTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitOpsTool::None => write!(f, ""),
            GitOpsTool::ArgoCd => write!(f, "argocd"),
            GitOpsTool::Flux => write!(f, "flux"),
        }
    }
}

/// Service mesh injecting a sidecar into the resource's pods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceMesh {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "istio")]
    Istio,
    #[serde(rename = "linkerd")]
    Linkerd,
}

impl fmt::Display for ServiceMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMesh::None => write!(f, ""),
            ServiceMesh::Istio => write!(f, "istio"),
            ServiceMesh::Linkerd => write!(f, "linkerd"),
        }
    }
}

/// Names of the cluster characteristics, as reported in `failedDetections`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectionField {
    GitOpsManaged,
    PdbProtected,
    HpaEnabled,
    Stateful,
    HelmManaged,
    NetworkIsolated,
    ServiceMesh,
}

impl DetectionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionField::GitOpsManaged => "gitOpsManaged",
            DetectionField::PdbProtected => "pdbProtected",
            DetectionField::HpaEnabled => "hpaEnabled",
            DetectionField::Stateful => "stateful",
            DetectionField::HelmManaged => "helmManaged",
            DetectionField::NetworkIsolated => "networkIsolated",
            DetectionField::ServiceMesh => "serviceMesh",
        }
    }
}

impl fmt::Display for DetectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster characteristics of one remediation target
///
/// A field left at its default because its query failed is listed in
/// `failed_detections`; a field that is legitimately absent is not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLabels {
    pub git_ops_managed: bool,
    pub git_ops_tool: GitOpsTool,
    pub pdb_protected: bool,
    pub hpa_enabled: bool,
    pub stateful: bool,
    pub helm_managed: bool,
    pub network_isolated: bool,
    pub service_mesh: ServiceMesh,
    pub failed_detections: BTreeSet<DetectionField>,
}

impl DetectedLabels {
    pub fn detection_failed(&self, field: DetectionField) -> bool {
        self.failed_detections.contains(&field)
    }
}

/// Why an investigation result must be reviewed by a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanReviewReason {
    WorkflowNotFound,
    ImageMismatch,
    ParameterValidationFailed,
    NoMatchingWorkflows,
    LowConfidence,
    LlmParsingError,
    InvestigationInconclusive,
    RcaIncomplete,
}

impl HumanReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HumanReviewReason::WorkflowNotFound => "workflow_not_found",
            HumanReviewReason::ImageMismatch => "image_mismatch",
            HumanReviewReason::ParameterValidationFailed => "parameter_validation_failed",
            HumanReviewReason::NoMatchingWorkflows => "no_matching_workflows",
            HumanReviewReason::LowConfidence => "low_confidence",
            HumanReviewReason::LlmParsingError => "llm_parsing_error",
            HumanReviewReason::InvestigationInconclusive => "investigation_inconclusive",
            HumanReviewReason::RcaIncomplete => "rca_incomplete",
        }
    }
}

impl fmt::Display for HumanReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-review flag and reason, set together or not at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewVerdict {
    needs_human_review: bool,
    human_review_reason: Option<HumanReviewReason>,
}

impl ReviewVerdict {
    /// No human review required
    pub fn automatic() -> Self {
        Self::default()
    }

    pub fn required(reason: HumanReviewReason) -> Self {
        Self {
            needs_human_review: true,
            human_review_reason: Some(reason),
        }
    }

    pub fn needs_human_review(&self) -> bool {
        self.needs_human_review
    }

    pub fn reason(&self) -> Option<HumanReviewReason> {
        self.human_review_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_verdict_biconditional() {
        let auto = ReviewVerdict::automatic();
        assert!(!auto.needs_human_review());
        assert!(auto.reason().is_none());

        let review = ReviewVerdict::required(HumanReviewReason::LowConfidence);
        assert!(review.needs_human_review());
        assert_eq!(review.reason(), Some(HumanReviewReason::LowConfidence));
    }

    #[test]
    fn test_detected_labels_serialization() {
        let mut labels = DetectedLabels {
            git_ops_managed: true,
            git_ops_tool: GitOpsTool::ArgoCd,
            ..Default::default()
        };
        labels.failed_detections.insert(DetectionField::PdbProtected);

        let json = serde_json::to_value(&labels).unwrap();
        assert_eq!(json["gitOpsManaged"], true);
        assert_eq!(json["gitOpsTool"], "argocd");
        assert_eq!(json["serviceMesh"], "");
        assert_eq!(json["failedDetections"][0], "pdbProtected");
    }

    #[test]
    fn test_empty_namespace_is_cluster_scoped() {
        let node = ResourceRef {
            kind: "Node".to_string(),
            name: "worker-1".to_string(),
            namespace: Some(String::new()),
        };
        assert!(node.namespace().is_none());
        assert!(node.same_identity(&ResourceRef::cluster_scoped("Node", "worker-1")));
        assert_eq!(node.to_string(), "Node/worker-1");
    }

    #[test]
    fn test_owner_chain_entry_matches() {
        let entry = OwnerChainEntry::new("Deployment", "prod", "api");
        assert!(entry.matches(&ResourceRef::namespaced("Deployment", "prod", "api")));
        assert!(!entry.matches(&ResourceRef::namespaced("Deployment", "staging", "api")));
        assert!(!entry.matches(&ResourceRef::namespaced("StatefulSet", "prod", "api")));
    }

    #[test]
    fn test_review_reason_wire_names() {
        let json = serde_json::to_string(&HumanReviewReason::InvestigationInconclusive).unwrap();
        assert_eq!(json, "\"investigation_inconclusive\"");
        assert_eq!(HumanReviewReason::RcaIncomplete.to_string(), "rca_incomplete");
    }
}
