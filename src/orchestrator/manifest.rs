//! Manifest diff/apply for the Kubernetes-native orchestrator (spec.md
//! §4.2.2 Apply protocol / Delete protocol): a `kubectl apply`-shaped
//! reconciliation of an arbitrary list of Kubernetes objects against a
//! `last-applied-config` ConfigMap, content-hashed so unchanged objects are
//! never re-applied.

use base64::Engine as _;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind, ObjectMeta, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("malformed last-applied-config: {0}")]
    Decode(String),
    #[error("no API resource registered for {0}")]
    UnknownKind(String),
}

const LAST_APPLIED_KEY: &str = "last-applied-config";
const MANAGED_BY_LABEL: &str = "managed-by";
const MANAGED_BY_VALUE: &str = "neutree";
const RESOURCE_LABEL: &str = "neutree.io/resource";
const COMPONENT_LABEL: &str = "neutree.io/component";

fn config_map_name(resource_name: &str, component_name: &str) -> String {
    format!("neutree-{resource_name}-{component_name}-config")
}

/// Unique key for a manifest object: `apiVersion/kind/namespace/name`
/// (spec.md §4.2.2 step 2).
fn object_key(obj: &DynamicObject) -> String {
    let api_version = obj.types.as_ref().map(|t| t.api_version.as_str()).unwrap_or("");
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("");
    let name = obj.name_any();
    format!("{api_version}/{kind}/{namespace}/{name}")
}

fn content_hash(obj: &DynamicObject) -> String {
    let hashed = obj.data.get("spec").cloned().unwrap_or_else(|| {
        serde_json::to_value(obj).unwrap_or(Value::Null)
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(&hashed));
    format!("{:x}", hasher.finalize())
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
                serde_json::to_value(sorted).unwrap_or(Value::Null)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_vec(&canonicalize(value)).unwrap_or_default()
}

async fn load_last_applied(
    configmaps: &Api<ConfigMap>,
    name: &str,
) -> Result<Vec<DynamicObject>, Error> {
    let cm = match configmaps.get_opt(name).await? {
        Some(cm) => cm,
        None => return Ok(Vec::new()),
    };
    let encoded = cm
        .data
        .as_ref()
        .and_then(|d| d.get(LAST_APPLIED_KEY))
        .cloned()
        .unwrap_or_default();
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| Error::Decode(e.to_string()))?;
    serde_json::from_slice(&decoded).map_err(|e| Error::Decode(e.to_string()))
}

async fn save_last_applied(
    configmaps: &Api<ConfigMap>,
    name: &str,
    resource_name: &str,
    component_name: &str,
    objects: &[DynamicObject],
) -> Result<(), Error> {
    let serialized = serde_json::to_vec(objects).map_err(|e| Error::Decode(e.to_string()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(serialized);

    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(RESOURCE_LABEL.to_string(), resource_name.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), component_name.to_string());

    let mut data = BTreeMap::new();
    data.insert(LAST_APPLIED_KEY.to_string(), encoded);

    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    configmaps
        .patch(
            name,
            &PatchParams::apply("neutree-core").force(),
            &Patch::Apply(&cm),
        )
        .await?;
    Ok(())
}

/// Resolve the discovered API resource for a manifest object's
/// `apiVersion`/`kind`, used to build a dynamic `Api<DynamicObject>` for
/// arbitrary (possibly CRD) kinds.
async fn api_for(
    client: &Client,
    discovery: &Discovery,
    obj: &DynamicObject,
    namespace: &str,
) -> Result<Api<DynamicObject>, Error> {
    let types = obj
        .types
        .clone()
        .ok_or_else(|| Error::UnknownKind("object has no apiVersion/kind".to_string()))?;
    let gvk = GroupVersionKind::try_from(&types)
        .map_err(|e| Error::UnknownKind(format!("{}: {e}", types.kind)))?;

    let (resource, caps): (ApiResource, ApiCapabilities) = discovery
        .resolve_gvk(&gvk)
        .ok_or_else(|| Error::UnknownKind(format!("{}/{}", types.api_version, types.kind)))?;

    Ok(match caps.scope {
        Scope::Namespaced => Api::namespaced_with(client.clone(), namespace, &resource),
        Scope::Cluster => Api::all_with(client.clone(), &resource),
    })
}

fn inject_labels(obj: &mut DynamicObject, resource_name: &str, component_name: &str) {
    let labels = obj.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(RESOURCE_LABEL.to_string(), resource_name.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), component_name.to_string());
}

/// Apply `desired` against what was last applied for `(resource_name,
/// component_name)` in `namespace`, per spec.md §4.2.2's five-step
/// protocol. Returns the number of objects actually mutated.
pub async fn apply(
    client: &Client,
    discovery: &Discovery,
    namespace: &str,
    resource_name: &str,
    component_name: &str,
    mut desired: Vec<DynamicObject>,
) -> Result<usize, Error> {
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm_name = config_map_name(resource_name, component_name);

    for obj in desired.iter_mut() {
        inject_labels(obj, resource_name, component_name);
    }

    let previous = load_last_applied(&configmaps, &cm_name).await?;
    let previous_by_key: BTreeMap<String, &DynamicObject> =
        previous.iter().map(|o| (object_key(o), o)).collect();
    let desired_keys: std::collections::HashSet<String> =
        desired.iter().map(object_key).collect();

    let mut changed = Vec::new();
    for obj in &desired {
        let key = object_key(obj);
        let changed_or_new = match previous_by_key.get(&key) {
            None => true,
            Some(prev) => content_hash(prev) != content_hash(obj),
        };
        if changed_or_new {
            changed.push(key);
        }
    }

    let deleted: Vec<&DynamicObject> = previous
        .iter()
        .filter(|o| !desired_keys.contains(&object_key(o)))
        .collect();

    if changed.is_empty() && deleted.is_empty() {
        debug!(resource_name, component_name, "manifest unchanged, skipping apply");
        return Ok(0);
    }

    for obj in desired.iter_mut() {
        if changed.contains(&object_key(obj)) {
            let api = api_for(client, discovery, obj, namespace).await?;
            let name = obj.name_any();
            api.patch(
                &name,
                &PatchParams::apply("neutree-core").force(),
                &Patch::Apply(&obj),
            )
            .await?;
        }
    }

    for obj in &deleted {
        let api = api_for(client, discovery, obj, namespace).await?;
        let _ = api.delete(&obj.name_any(), &DeleteParams::default()).await;
    }

    save_last_applied(&configmaps, &cm_name, resource_name, component_name, &desired).await?;
    info!(
        resource_name,
        component_name,
        changed = changed.len(),
        deleted = deleted.len(),
        "applied manifest"
    );
    Ok(changed.len() + deleted.len())
}

/// Tear down every object this `(resource_name, component_name)` last
/// applied, then the tracking ConfigMap itself. Returns `true` once nothing
/// remains (spec.md §4.2.2 Delete protocol).
pub async fn delete(
    client: &Client,
    discovery: &Discovery,
    namespace: &str,
    resource_name: &str,
    component_name: &str,
) -> Result<bool, Error> {
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm_name = config_map_name(resource_name, component_name);

    let previous = load_last_applied(&configmaps, &cm_name).await?;
    if previous.is_empty() && configmaps.get_opt(&cm_name).await?.is_none() {
        return Ok(true);
    }

    let mut still_present = false;
    for obj in &previous {
        let api = api_for(client, discovery, obj, namespace).await?;
        match api.get_opt(&obj.name_any()).await? {
            Some(_) => {
                let _ = api.delete(&obj.name_any(), &DeleteParams::default()).await;
                still_present = true;
            }
            None => {}
        }
    }

    if still_present {
        return Ok(false);
    }

    let _ = configmaps.delete(&cm_name, &DeleteParams::default()).await;
    Ok(true)
}

/// Build a [`DynamicObject`] from a rendered manifest fragment's JSON value,
/// used by `kubernetes::KubernetesOrchestrator` after template rendering.
pub fn from_value(value: Value) -> Result<DynamicObject, Error> {
    let api_version = value
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode("manifest object missing apiVersion".into()))?
        .to_string();
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode("manifest object missing kind".into()))?
        .to_string();

    let mut obj: DynamicObject =
        serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
    obj.types = Some(TypeMeta { api_version, kind });
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(api_version: &str, kind: &str, name: &str, spec: Value) -> DynamicObject {
        let mut obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": {"name": name},
            "spec": spec,
        }))
        .unwrap();
        obj.types = Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });
        obj
    }

    #[test]
    fn content_hash_is_stable_under_key_reordering() {
        let a = object("apps/v1", "Deployment", "x", serde_json::json!({"a": 1, "b": 2}));
        let b = object("apps/v1", "Deployment", "x", serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_detects_spec_change() {
        let a = object("apps/v1", "Deployment", "x", serde_json::json!({"replicas": 1}));
        let b = object("apps/v1", "Deployment", "x", serde_json::json!({"replicas": 2}));
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn object_key_includes_namespace_and_name() {
        let obj = object("v1", "ConfigMap", "cfg", serde_json::json!({}));
        assert_eq!(object_key(&obj), "v1/ConfigMap//cfg");
    }

    #[test]
    fn from_value_requires_kind_and_api_version() {
        let err = from_value(serde_json::json!({"metadata": {"name": "x"}})).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
