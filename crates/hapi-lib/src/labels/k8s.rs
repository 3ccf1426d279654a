//! Read-only Kubernetes queries consumed by label detection
//!
//! Every query reports failures as an error string instead of raising, so
//! callers always have a defined fallback path.

use crate::models::{DetectionField, K8sContext, OwnerChainEntry, ResourceRef};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on ownerReferences hops, guards against cyclic owners
const MAX_OWNER_CHAIN_DEPTH: usize = 10;

/// PodDisruptionBudget reduced to its label selector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbInfo {
    pub name: String,
    /// `spec.selector.matchLabels`; `matchExpressions` are not supported
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// HorizontalPodAutoscaler reduced to its scale target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HpaInfo {
    pub name: String,
    pub target_kind: String,
    pub target_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkPolicyInfo {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

/// Metadata of a single object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    /// Pod template labels for workload kinds
    pub pod_template_labels: Option<BTreeMap<String, String>>,
    /// Pod template annotations for workload kinds
    pub pod_template_annotations: Option<BTreeMap<String, String>>,
}

/// Kubernetes queries the investigation core depends on
#[async_trait]
pub trait K8sQueries: Send + Sync {
    async fn list_pdbs(&self, namespace: &str) -> Result<Vec<PdbInfo>, String>;

    async fn list_hpas(&self, namespace: &str) -> Result<Vec<HpaInfo>, String>;

    async fn list_network_policies(&self, namespace: &str)
        -> Result<Vec<NetworkPolicyInfo>, String>;

    /// `Ok(None)` when the namespace does not exist
    async fn get_namespace_metadata(
        &self,
        namespace: &str,
    ) -> Result<Option<NamespaceMetadata>, String>;

    /// `Ok(None)` when the object does not exist
    async fn get_object_metadata(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<ObjectMetadata>, String>;
}

/// Owner chain of a resource, first entry being the resource itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerChain {
    pub entries: Vec<OwnerChainEntry>,
    /// An owner could not be fetched, so higher owners are unknown
    pub truncated: bool,
}

/// Walk ownerReferences from `resource` up to its root owner
///
/// Returns an empty chain if the resource itself does not exist. An owner
/// that no longer exists ends the chain; an owner that cannot be fetched
/// ends it as truncated.
pub async fn walk_owner_chain(
    queries: &dyn K8sQueries,
    resource: &ResourceRef,
) -> Result<OwnerChain, String> {
    let namespace = resource.namespace();
    let Some(mut metadata) = queries
        .get_object_metadata(&resource.kind, &resource.name, namespace)
        .await?
    else {
        return Ok(OwnerChain::default());
    };

    let mut chain = OwnerChain {
        entries: vec![OwnerChainEntry::from_resource(resource)],
        truncated: false,
    };

    while chain.entries.len() < MAX_OWNER_CHAIN_DEPTH {
        // Prefer the managing controller when several owners are listed
        let Some(owner) = metadata
            .owner_references
            .iter()
            .find(|o| o.controller)
            .or_else(|| metadata.owner_references.first())
            .cloned()
        else {
            break;
        };

        chain.entries.push(OwnerChainEntry::new(
            &owner.kind,
            namespace.unwrap_or_default(),
            &owner.name,
        ));

        match queries
            .get_object_metadata(&owner.kind, &owner.name, namespace)
            .await
        {
            Ok(Some(next)) => metadata = next,
            Ok(None) => break,
            Err(e) => {
                warn!(kind = %owner.kind, name = %owner.name, error = %e, "Owner chain walk truncated");
                chain.truncated = true;
                break;
            }
        }
    }

    Ok(chain)
}

/// Owner chain entries of `resource`, see [`walk_owner_chain`]
pub async fn resolve_owner_chain(
    queries: &dyn K8sQueries,
    resource: &ResourceRef,
) -> Result<Vec<OwnerChainEntry>, String> {
    walk_owner_chain(queries, resource)
        .await
        .map(|chain| chain.entries)
}

/// Assemble the metadata label detection reads for `resource`
///
/// Returns `Ok(None)` when the resource does not exist. Namespace or
/// deployment metadata that cannot be fetched, and owners beyond a
/// truncated chain, mark the characteristics read from them unavailable.
pub async fn build_k8s_context(
    queries: &dyn K8sQueries,
    resource: &ResourceRef,
    owner_chain: &OwnerChain,
) -> Result<Option<K8sContext>, String> {
    let namespace = resource.namespace();
    let Some(metadata) = queries
        .get_object_metadata(&resource.kind, &resource.name, namespace)
        .await?
    else {
        return Ok(None);
    };

    let mut ctx = K8sContext {
        resource: Some(resource.clone()),
        ..Default::default()
    };

    if resource.kind == "Pod" {
        ctx.pod_labels = metadata.labels.clone();
        ctx.pod_annotations = metadata.annotations.clone();
    } else {
        ctx.pod_labels = metadata.pod_template_labels.clone().unwrap_or_default();
        ctx.pod_annotations = metadata.pod_template_annotations.clone().unwrap_or_default();
    }

    if owner_chain.truncated {
        ctx.unavailable.extend([
            DetectionField::GitOpsManaged,
            DetectionField::HelmManaged,
            DetectionField::HpaEnabled,
            DetectionField::Stateful,
        ]);
    }

    if resource.kind == "Deployment" {
        ctx.deployment_labels = metadata.labels;
        ctx.deployment_annotations = metadata.annotations;
    } else if let Some(deployment) = owner_chain.entries.iter().find(|e| e.kind == "Deployment") {
        match queries
            .get_object_metadata("Deployment", &deployment.name, namespace)
            .await
        {
            Ok(Some(meta)) => {
                ctx.deployment_labels = meta.labels;
                ctx.deployment_annotations = meta.annotations;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(deployment = %deployment.name, error = %e, "Deployment metadata unavailable");
                ctx.unavailable
                    .extend([DetectionField::GitOpsManaged, DetectionField::HelmManaged]);
            }
        }
    }

    if let Some(ns) = namespace {
        match queries.get_namespace_metadata(ns).await {
            Ok(Some(meta)) => {
                ctx.namespace_labels = meta.labels;
                ctx.namespace_annotations = meta.annotations;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(namespace = %ns, error = %e, "Namespace metadata unavailable");
                ctx.unavailable.insert(DetectionField::GitOpsManaged);
            }
        }
    }

    Ok(Some(ctx))
}

/// Bounds every query of the wrapped implementation by one timeout
///
/// A query that runs out of time fails like any other query.
pub struct BoundedQueries {
    inner: Arc<dyn K8sQueries>,
    timeout: Duration,
}

impl BoundedQueries {
    pub fn new(inner: Arc<dyn K8sQueries>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        query: &str,
        call: impl Future<Output = Result<T, String>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(format!("{} timed out after {:?}", query, self.timeout)),
        }
    }
}

#[async_trait]
impl K8sQueries for BoundedQueries {
    async fn list_pdbs(&self, namespace: &str) -> Result<Vec<PdbInfo>, String> {
        self.bounded("list poddisruptionbudgets", self.inner.list_pdbs(namespace))
            .await
    }

    async fn list_hpas(&self, namespace: &str) -> Result<Vec<HpaInfo>, String> {
        self.bounded("list horizontalpodautoscalers", self.inner.list_hpas(namespace))
            .await
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicyInfo>, String> {
        self.bounded(
            "list networkpolicies",
            self.inner.list_network_policies(namespace),
        )
        .await
    }

    async fn get_namespace_metadata(
        &self,
        namespace: &str,
    ) -> Result<Option<NamespaceMetadata>, String> {
        self.bounded("get namespace", self.inner.get_namespace_metadata(namespace))
            .await
    }

    async fn get_object_metadata(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<ObjectMetadata>, String> {
        self.bounded(
            &format!("get {}/{}", kind, name),
            self.inner.get_object_metadata(kind, name, namespace),
        )
        .await
    }
}
