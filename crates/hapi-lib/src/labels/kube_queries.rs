//! `K8sQueries` backed by the Kubernetes API server

use super::k8s::{
    HpaInfo, K8sQueries, NamespaceMetadata, NetworkPolicyInfo, ObjectMetadata, OwnerReference,
    PdbInfo,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, PodTemplateSpec, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::discovery::{Discovery, Scope};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Served resource for each kind, with whether it is namespaced
type KindIndex = HashMap<String, (ApiResource, bool)>;

/// Read-only queries against a live cluster
///
/// Well-known kinds are read through typed APIs. Any other kind the API
/// server serves is resolved through discovery and read as a
/// `DynamicObject`, which yields labels, annotations and owners but no pod
/// template.
#[derive(Clone)]
pub struct KubeQueries {
    client: Client,
    kinds: Arc<OnceCell<KindIndex>>,
}

impl KubeQueries {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: Arc::new(OnceCell::new()),
        }
    }

    /// Run API discovery once; a failed run is retried on the next lookup
    async fn kind_index(&self) -> Result<&KindIndex, String> {
        self.kinds
            .get_or_try_init(|| async {
                let discovery = Discovery::new(self.client.clone())
                    .run()
                    .await
                    .map_err(|e| format!("API discovery failed: {}", e))?;
                let resources = discovery.groups().flat_map(|group| {
                    group
                        .recommended_resources()
                        .into_iter()
                        .map(|(resource, caps)| {
                            let namespaced = matches!(caps.scope, Scope::Namespaced);
                            (resource, namespaced)
                        })
                });
                let index = index_by_kind(resources);
                info!(kinds = index.len(), "API discovery complete");
                Ok::<_, String>(index)
            })
            .await
    }

    async fn get_dynamic(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<ObjectMetadata>, String> {
        let Some((resource, namespaced)) = self.kind_index().await?.get(kind).cloned() else {
            return Err(format!("unsupported resource kind {kind}"));
        };

        let api: Api<DynamicObject> = if namespaced {
            let namespace =
                namespace.ok_or_else(|| format!("namespace required to get {kind} {name}"))?;
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        let object = api.get_opt(name).await.map_err(|e| e.to_string())?;
        Ok(object.map(|o| object_metadata(&o.metadata, None)))
    }

    async fn list_in<K>(&self, namespace: &str) -> Result<Vec<K>, String>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| e.to_string())
    }

    async fn get_in<K>(&self, name: &str, namespace: Option<&str>) -> Result<Option<K>, String>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = namespace.ok_or_else(|| format!("namespace required to get {name}"))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(|e| e.to_string())
    }
}

/// Index discovered resources by kind; the first group serving a kind wins
fn index_by_kind(resources: impl IntoIterator<Item = (ApiResource, bool)>) -> KindIndex {
    let mut index = KindIndex::new();
    for (resource, namespaced) in resources {
        index
            .entry(resource.kind.clone())
            .or_insert((resource, namespaced));
    }
    index
}

fn object_metadata(meta: &ObjectMeta, template: Option<&PodTemplateSpec>) -> ObjectMetadata {
    let template_meta = template.and_then(|t| t.metadata.as_ref());

    ObjectMetadata {
        labels: meta.labels.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        owner_references: meta
            .owner_references
            .iter()
            .flatten()
            .map(|o| OwnerReference {
                kind: o.kind.clone(),
                name: o.name.clone(),
                controller: o.controller.unwrap_or(false),
            })
            .collect(),
        pod_template_labels: template_meta.map(|m| m.labels.clone().unwrap_or_default()),
        pod_template_annotations: template_meta.map(|m| m.annotations.clone().unwrap_or_default()),
    }
}

#[async_trait]
impl K8sQueries for KubeQueries {
    async fn list_pdbs(&self, namespace: &str) -> Result<Vec<PdbInfo>, String> {
        let pdbs = self.list_in::<PodDisruptionBudget>(namespace).await?;
        Ok(pdbs
            .into_iter()
            .map(|pdb| PdbInfo {
                name: pdb.metadata.name.unwrap_or_default(),
                match_labels: pdb
                    .spec
                    .and_then(|s| s.selector)
                    .and_then(|sel| sel.match_labels),
            })
            .collect())
    }

    async fn list_hpas(&self, namespace: &str) -> Result<Vec<HpaInfo>, String> {
        let hpas = self.list_in::<HorizontalPodAutoscaler>(namespace).await?;
        Ok(hpas
            .into_iter()
            .filter_map(|hpa| {
                let target = hpa.spec?.scale_target_ref;
                Some(HpaInfo {
                    name: hpa.metadata.name.unwrap_or_default(),
                    target_kind: target.kind,
                    target_name: target.name,
                })
            })
            .collect())
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicyInfo>, String> {
        let policies = self.list_in::<NetworkPolicy>(namespace).await?;
        Ok(policies
            .into_iter()
            .map(|np| NetworkPolicyInfo {
                name: np.metadata.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn get_namespace_metadata(
        &self,
        namespace: &str,
    ) -> Result<Option<NamespaceMetadata>, String> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api.get_opt(namespace).await.map_err(|e| e.to_string())?;
        Ok(ns.map(|ns| NamespaceMetadata {
            labels: ns.metadata.labels.unwrap_or_default(),
            annotations: ns.metadata.annotations.unwrap_or_default(),
        }))
    }

    async fn get_object_metadata(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<ObjectMetadata>, String> {
        debug!(kind = %kind, name = %name, namespace = ?namespace, "Fetching object metadata");

        match kind {
            "Pod" => Ok(self
                .get_in::<Pod>(name, namespace)
                .await?
                .map(|p| object_metadata(&p.metadata, None))),
            "ReplicaSet" => Ok(self.get_in::<ReplicaSet>(name, namespace).await?.map(|rs| {
                let template = rs.spec.as_ref().and_then(|s| s.template.as_ref());
                object_metadata(&rs.metadata, template)
            })),
            "Deployment" => Ok(self.get_in::<Deployment>(name, namespace).await?.map(|d| {
                let template = d.spec.as_ref().map(|s| &s.template);
                object_metadata(&d.metadata, template)
            })),
            "StatefulSet" => Ok(self.get_in::<StatefulSet>(name, namespace).await?.map(|s| {
                let template = s.spec.as_ref().map(|spec| &spec.template);
                object_metadata(&s.metadata, template)
            })),
            "DaemonSet" => Ok(self.get_in::<DaemonSet>(name, namespace).await?.map(|d| {
                let template = d.spec.as_ref().map(|s| &s.template);
                object_metadata(&d.metadata, template)
            })),
            "Job" => Ok(self.get_in::<Job>(name, namespace).await?.map(|j| {
                let template = j.spec.as_ref().map(|s| &s.template);
                object_metadata(&j.metadata, template)
            })),
            "CronJob" => Ok(self.get_in::<CronJob>(name, namespace).await?.map(|c| {
                let template = c
                    .spec
                    .as_ref()
                    .and_then(|s| s.job_template.spec.as_ref())
                    .map(|s| &s.template);
                object_metadata(&c.metadata, template)
            })),
            // The selector stands in for the pod labels of the backing pods
            "Service" => Ok(self.get_in::<Service>(name, namespace).await?.map(|svc| {
                let selector = svc.spec.as_ref().and_then(|s| s.selector.clone());
                ObjectMetadata {
                    pod_template_labels: selector,
                    ..object_metadata(&svc.metadata, None)
                }
            })),
            "Node" => {
                let api: Api<Node> = Api::all(self.client.clone());
                let node = api.get_opt(name).await.map_err(|e| e.to_string())?;
                Ok(node.map(|n| object_metadata(&n.metadata, None)))
            }
            other => self.get_dynamic(other, name, namespace).await,
        }
    }
}
