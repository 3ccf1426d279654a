//! Cluster characteristic detection
//!
//! Computes the seven `DetectedLabels` characteristics for one target from its
//! already-fetched metadata plus namespace-scoped list queries. Each detection
//! is independent: a failed query only affects its own field, which is then
//! reported in `failed_detections` instead of guessed.

use super::k8s::{HpaInfo, K8sQueries, PdbInfo};
use crate::models::{
    DetectedLabels, DetectionField, GitOpsTool, K8sContext, OwnerChainEntry, ServiceMesh,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on each list query
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const ARGOCD_TRACKING_ID: &str = "argocd.argoproj.io/tracking-id";
const ARGOCD_INSTANCE: &str = "argocd.argoproj.io/instance";
const ARGOCD_MANAGED: &str = "argocd.argoproj.io/managed";
const FLUX_SYNC_GC_MARK: &str = "fluxcd.io/sync-gc-mark";
const FLUX_SYNC_STATUS: &str = "fluxcd.io/sync-status";

const HELM_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const HELM_CHART: &str = "helm.sh/chart";

const ISTIO_SIDECAR_STATUS: &str = "sidecar.istio.io/status";
const LINKERD_PROXY_VERSION: &str = "linkerd.io/proxy-version";

/// Which metadata map a GitOps marker is read from
#[derive(Debug, Clone, Copy)]
enum MarkerSource {
    PodAnnotation,
    DeploymentLabel,
    DeploymentAnnotation,
    NamespaceLabel,
    NamespaceAnnotation,
}

/// GitOps markers in precedence order; the first present key wins
const GITOPS_MARKERS: &[(MarkerSource, &str, GitOpsTool)] = &[
    (MarkerSource::PodAnnotation, ARGOCD_TRACKING_ID, GitOpsTool::ArgoCd),
    (MarkerSource::PodAnnotation, ARGOCD_INSTANCE, GitOpsTool::ArgoCd),
    (MarkerSource::DeploymentLabel, FLUX_SYNC_GC_MARK, GitOpsTool::Flux),
    (MarkerSource::DeploymentLabel, ARGOCD_INSTANCE, GitOpsTool::ArgoCd),
    (MarkerSource::DeploymentAnnotation, ARGOCD_TRACKING_ID, GitOpsTool::ArgoCd),
    (MarkerSource::NamespaceLabel, ARGOCD_INSTANCE, GitOpsTool::ArgoCd),
    (MarkerSource::NamespaceLabel, FLUX_SYNC_GC_MARK, GitOpsTool::Flux),
    (MarkerSource::NamespaceAnnotation, ARGOCD_TRACKING_ID, GitOpsTool::ArgoCd),
    (MarkerSource::NamespaceAnnotation, ARGOCD_MANAGED, GitOpsTool::ArgoCd),
    (MarkerSource::NamespaceAnnotation, FLUX_SYNC_STATUS, GitOpsTool::Flux),
];

/// Detects cluster characteristics for a remediation target
pub struct LabelDetector {
    queries: Arc<dyn K8sQueries>,
    query_timeout: Duration,
}

impl LabelDetector {
    pub fn new(queries: Arc<dyn K8sQueries>) -> Self {
        Self {
            queries,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set custom per-query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Detect labels for the resource described by `k8s_context`
    ///
    /// Returns `None` only when there is no context at all.
    pub async fn detect_labels(
        &self,
        k8s_context: Option<&K8sContext>,
        owner_chain: &[OwnerChainEntry],
    ) -> Option<DetectedLabels> {
        let ctx = k8s_context?;
        let mut labels = DetectedLabels::default();

        if let Some(tool) = detect_gitops(ctx) {
            labels.git_ops_managed = true;
            labels.git_ops_tool = tool;
        }
        labels.stateful = detect_stateful(owner_chain);
        labels.helm_managed = detect_helm(ctx);
        labels.service_mesh = detect_service_mesh(ctx);

        let namespace = ctx.resource.as_ref().and_then(|r| r.namespace());
        let Some(namespace) = namespace else {
            // Cluster-scoped targets carry no namespaced PDB/HPA/NetworkPolicy
            record_unavailable_inputs(&mut labels, ctx);
            return Some(labels);
        };

        let (pdbs, hpas, policies) = tokio::join!(
            self.bounded(self.queries.list_pdbs(namespace)),
            self.bounded(self.queries.list_hpas(namespace)),
            self.bounded(self.queries.list_network_policies(namespace)),
        );

        match pdbs {
            Ok(pdbs) => labels.pdb_protected = pdbs.iter().any(|p| pdb_matches(p, &ctx.pod_labels)),
            Err(e) => record_failure(&mut labels, DetectionField::PdbProtected, namespace, &e),
        }

        match hpas {
            Ok(hpas) => labels.hpa_enabled = hpas.iter().any(|h| hpa_targets(h, ctx, owner_chain)),
            Err(e) => record_failure(&mut labels, DetectionField::HpaEnabled, namespace, &e),
        }

        match policies {
            Ok(policies) => labels.network_isolated = !policies.is_empty(),
            Err(e) => record_failure(&mut labels, DetectionField::NetworkIsolated, namespace, &e),
        }

        record_unavailable_inputs(&mut labels, ctx);

        debug!(
            namespace = %namespace,
            failed = labels.failed_detections.len(),
            "Label detection complete"
        );
        Some(labels)
    }

    /// Run a query under the configured timeout; a timeout becomes a query error
    async fn bounded<T>(&self, query: impl Future<Output = Result<T, String>>) -> Result<T, String> {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(format!("query timed out after {:?}", self.query_timeout)),
        }
    }
}

fn record_failure(labels: &mut DetectedLabels, field: DetectionField, namespace: &str, error: &str) {
    warn!(
        field = %field,
        namespace = %namespace,
        error = %error,
        "Label detection failed, leaving field unset"
    );
    labels.failed_detections.insert(field);
}

/// Fields still at their default although their metadata could not be read
/// are unknown, not absent
fn record_unavailable_inputs(labels: &mut DetectedLabels, ctx: &K8sContext) {
    for field in &ctx.unavailable {
        let detected = match field {
            DetectionField::GitOpsManaged => labels.git_ops_managed,
            DetectionField::PdbProtected => labels.pdb_protected,
            DetectionField::HpaEnabled => labels.hpa_enabled,
            DetectionField::Stateful => labels.stateful,
            DetectionField::HelmManaged => labels.helm_managed,
            DetectionField::NetworkIsolated => labels.network_isolated,
            DetectionField::ServiceMesh => labels.service_mesh != ServiceMesh::None,
        };
        if !detected {
            labels.failed_detections.insert(*field);
        }
    }
}

/// First GitOps marker found in precedence order
pub fn detect_gitops(ctx: &K8sContext) -> Option<GitOpsTool> {
    GITOPS_MARKERS.iter().find_map(|(source, key, tool)| {
        let map = match source {
            MarkerSource::PodAnnotation => &ctx.pod_annotations,
            MarkerSource::DeploymentLabel => &ctx.deployment_labels,
            MarkerSource::DeploymentAnnotation => &ctx.deployment_annotations,
            MarkerSource::NamespaceLabel => &ctx.namespace_labels,
            MarkerSource::NamespaceAnnotation => &ctx.namespace_annotations,
        };
        map.contains_key(*key).then_some(*tool)
    })
}

/// Subset match of the PDB's `matchLabels` against the pod labels
///
/// A PDB without `matchLabels` never matches.
pub fn pdb_matches(pdb: &PdbInfo, pod_labels: &BTreeMap<String, String>) -> bool {
    match &pdb.match_labels {
        Some(selector) if !selector.is_empty() => selector
            .iter()
            .all(|(k, v)| pod_labels.get(k) == Some(v)),
        _ => false,
    }
}

/// HPA scale target is the resource itself or one of its owners
pub fn hpa_targets(hpa: &HpaInfo, ctx: &K8sContext, owner_chain: &[OwnerChainEntry]) -> bool {
    let is_self = ctx
        .resource
        .as_ref()
        .is_some_and(|r| r.kind == hpa.target_kind && r.name == hpa.target_name);

    is_self
        || owner_chain
            .iter()
            .any(|e| e.kind == hpa.target_kind && e.name == hpa.target_name)
}

pub fn detect_stateful(owner_chain: &[OwnerChainEntry]) -> bool {
    owner_chain.iter().any(|e| e.kind == "StatefulSet")
}

pub fn detect_helm(ctx: &K8sContext) -> bool {
    ctx.deployment_labels
        .get(HELM_MANAGED_BY)
        .is_some_and(|v| v == "Helm")
        || ctx.deployment_labels.contains_key(HELM_CHART)
}

/// Istio takes precedence over Linkerd
pub fn detect_service_mesh(ctx: &K8sContext) -> ServiceMesh {
    if ctx.pod_annotations.contains_key(ISTIO_SIDECAR_STATUS) {
        ServiceMesh::Istio
    } else if ctx.pod_annotations.contains_key(LINKERD_PROXY_VERSION) {
        ServiceMesh::Linkerd
    } else {
        ServiceMesh::None
    }
}
