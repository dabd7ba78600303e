//! In-memory Storage used by tests (and available for local/offline runs).
//! One `MemoryStorage<E>` instance backs a single kind, the same way a
//! real Storage deployment partitions rows by kind.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{Error, ListOptions, Operator, Storage};
use crate::entities::{Entity, HasPhase, Resource};

pub struct MemoryStorage<E: Entity> {
    rows: Mutex<HashMap<Uuid, Resource<E>>>,
}

impl<E: Entity> Default for MemoryStorage<E> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Entity> MemoryStorage<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, obj: Resource<E>) {
        self.rows.lock().unwrap().insert(obj.id, obj);
    }
}

fn matches(obj: &serde_json::Value, filter: &super::Filter) -> bool {
    let pointer = format!("/{}", filter.column.replace("->", "/"));
    let actual = obj.pointer(&pointer);
    match filter.operator {
        Operator::IsNull => actual.is_none() || actual == Some(&serde_json::Value::Null),
        Operator::IsNotNull => actual.is_some() && actual != Some(&serde_json::Value::Null),
        Operator::Eq => actual == Some(&filter.value),
        Operator::Neq => actual != Some(&filter.value),
        Operator::Gt => actual
            .and_then(|v| v.as_f64())
            .zip(filter.value.as_f64())
            .map(|(a, b)| a > b)
            .unwrap_or(false),
        Operator::Lt => actual
            .and_then(|v| v.as_f64())
            .zip(filter.value.as_f64())
            .map(|(a, b)| a < b)
            .unwrap_or(false),
    }
}

#[async_trait]
impl<E: Entity> Storage<E> for MemoryStorage<E> {
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Resource<E>>, Error> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<Resource<E>> = rows
            .values()
            .filter(|obj| {
                let json = serde_json::to_value(obj).expect("resource is always serializable");
                opts.filters.iter().all(|f| matches(&json, f))
            })
            .cloned()
            .collect();
        out.sort_by_key(|o| o.metadata.creation_timestamp);
        if let Some(limit) = opts.limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn get(&self, id: Uuid) -> Result<Resource<E>, Error> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn get_by_name(&self, workspace: &str, name: &str) -> Result<Resource<E>, Error> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|o| o.metadata.workspace == workspace && o.metadata.name == name)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn create(&self, obj: &Resource<E>) -> Result<Resource<E>, Error> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&obj.id) {
            return Err(Error::Conflict { expected: None });
        }
        rows.insert(obj.id, obj.clone());
        Ok(obj.clone())
    }

    async fn update(&self, obj: &Resource<E>) -> Result<Resource<E>, Error> {
        let mut rows = self.rows.lock().unwrap();
        if !rows.contains_key(&obj.id) {
            return Err(Error::NotFound);
        }
        rows.insert(obj.id, obj.clone());
        Ok(obj.clone())
    }

    async fn patch(&self, id: Uuid, patch: serde_json::Value) -> Result<Resource<E>, Error> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.get(&id).ok_or(Error::NotFound)?;
        let mut json = serde_json::to_value(existing).map_err(|e| Error::Decode(e.to_string()))?;
        merge_json(&mut json, &patch);
        let updated: Resource<E> =
            serde_json::from_value(json).map_err(|e| Error::Decode(e.to_string()))?;
        rows.insert(id, updated.clone());
        Ok(updated)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: &E::Status,
        expected_phase: Option<&str>,
    ) -> Result<(), Error> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.get_mut(&id).ok_or(Error::NotFound)?;
        if let Some(expected) = expected_phase {
            if existing.status.phase() != expected {
                return Err(Error::Conflict {
                    expected: Some(expected.to_string()),
                });
            }
        }
        existing.status = status.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), Error> {
        self.rows.lock().unwrap().remove(&id);
        Ok(())
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_json(base_map.entry(k.clone()).or_insert(serde_json::Value::Null), v);
            }
        }
        (base, patch) => {
            *base = patch.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::image_registry::{ImageRegistry, ImageRegistrySpec};
    use crate::entities::Metadata;

    fn seed_one(store: &MemoryStorage<ImageRegistry>) -> Uuid {
        let id = Uuid::new_v4();
        let obj = Resource::new(
            id,
            Metadata::new("prod", "docker-hub"),
            ImageRegistrySpec {
                url: "https://registry-1.docker.io".to_string(),
                repository: "acme".to_string(),
                auth: Default::default(),
                ca: None,
            },
        );
        store.seed(obj);
        id
    }

    #[tokio::test]
    async fn get_by_name_finds_seeded_object() {
        let store = MemoryStorage::<ImageRegistry>::new();
        seed_one(&store);
        let found = store.get_by_name("prod", "docker-hub").await.unwrap();
        assert_eq!(found.metadata.name, "docker-hub");
    }

    #[tokio::test]
    async fn update_status_respects_expected_phase_guard() {
        let store = MemoryStorage::<ImageRegistry>::new();
        let id = seed_one(&store);

        let mut status = crate::entities::image_registry::ImageRegistryStatus::default();
        status.phase = crate::entities::image_registry::ImageRegistryPhase::Connected;

        let err = store
            .update_status(id, &status, Some("Connected"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        store.update_status(id, &status, Some("Pending")).await.unwrap();
        let obj = store.get(id).await.unwrap();
        assert_eq!(obj.status.phase.as_str(), "Connected");
    }

    #[tokio::test]
    async fn list_filters_by_workspace() {
        let store = MemoryStorage::<ImageRegistry>::new();
        seed_one(&store);
        let opts = ListOptions::new().filter(super::super::Filter::eq("metadata->workspace", "staging"));
        let found = store.list(&opts).await.unwrap();
        assert!(found.is_empty());
    }
}
