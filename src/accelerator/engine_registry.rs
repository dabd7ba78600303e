//! The in-memory engine catalog (spec.md §4.4): a pure mapping
//! `name -> Engine`, rebuilt from scratch whenever the accelerator manager's
//! plugin set changes. Deliberately has no persistence and no link to
//! [`crate::entities::engine`] — this is the aggregate view the accelerator
//! manager reports, not the Storage-backed `Engine` resource kind that
//! controllers reconcile.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineImage {
    pub image_name: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineVersion {
    pub version: String,
    /// accelerator type -> image.
    pub images: HashMap<String, EngineImage>,
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub name: String,
    pub versions: Vec<EngineVersion>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Engine>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `engine` in: if an entry with the same name exists, union its
    /// versions by `version` field, and within a shared version union images
    /// by accelerator type (spec.md §4.4: "merge semantics: union of
    /// versions by `version` field").
    pub fn register(&mut self, engine: Engine) {
        match self.engines.get_mut(&engine.name) {
            None => {
                self.engines.insert(engine.name.clone(), engine);
            }
            Some(existing) => {
                for incoming_version in engine.versions {
                    match existing
                        .versions
                        .iter_mut()
                        .find(|v| v.version == incoming_version.version)
                    {
                        None => existing.versions.push(incoming_version),
                        Some(existing_version) => {
                            for (accel_type, image) in incoming_version.images {
                                existing_version.images.insert(accel_type, image);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Discard everything (spec.md §4.4 `Cleanup()`).
    pub fn cleanup(&mut self) {
        self.engines.clear();
    }

    pub fn get(&self, name: &str) -> Option<&Engine> {
        self.engines.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> EngineImage {
        EngineImage {
            image_name: name.to_string(),
            tag: "latest".to_string(),
        }
    }

    #[test]
    fn register_merges_versions_by_name() {
        let mut registry = EngineRegistry::new();
        registry.register(Engine {
            name: "vllm".into(),
            versions: vec![EngineVersion {
                version: "0.5".into(),
                images: HashMap::from([("cpu".into(), image("vllm-cpu"))]),
            }],
        });
        registry.register(Engine {
            name: "vllm".into(),
            versions: vec![EngineVersion {
                version: "0.5".into(),
                images: HashMap::from([("nvidia.com/gpu".into(), image("vllm-cuda"))]),
            }],
        });

        let merged = registry.get("vllm").unwrap();
        assert_eq!(merged.versions.len(), 1);
        assert_eq!(merged.versions[0].images.len(), 2);
    }

    #[test]
    fn cleanup_empties_registry() {
        let mut registry = EngineRegistry::new();
        registry.register(Engine {
            name: "vllm".into(),
            versions: vec![],
        });
        registry.cleanup();
        assert!(registry.is_empty());
    }
}
