use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::algorithm::{Algorithm, AlgorithmInstance};
use crate::core::error::RegistryError;
use crate::core::property::{PropertyDescriptor, PropertySchema};

type Factory = Arc<dyn Fn() -> Arc<dyn Algorithm> + Send + Sync>;

struct Registration {
    factory: Factory,
    template: PropertySchema,
    category: String,
    summary: String,
}

/// What [`AlgorithmRegistry::list`] and [`AlgorithmRegistry::describe`] report.
#[derive(Debug, Clone)]
pub struct AlgorithmDescription {
    pub name: String,
    pub version: u32,
    pub category: String,
    pub summary: String,
    pub properties: Vec<PropertyDescriptor>,
}

/// Factories for every known algorithm, keyed by name and version.
///
/// Each registration initializes its algorithm once and keeps the declarations as
/// a template; every [`create`](Self::create) gets a fresh instance sharing them.
#[derive(Default)]
pub struct AlgorithmRegistry {
    entries: BTreeMap<(String, u32), Registration>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in algorithm.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::algorithms::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register<A, F>(&mut self, factory: F) -> Result<(), RegistryError>
    where
        A: Algorithm + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn Algorithm>);
        let algorithm = factory();
        let key = (algorithm.name().to_string(), algorithm.version());
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                name: key.0,
                version: key.1,
            });
        }

        let mut template = PropertySchema::new();
        algorithm
            .initialize(&mut template)
            .map_err(|source| RegistryError::Initialize {
                name: key.0.clone(),
                source,
            })?;

        log::debug!("registered algorithm {} v{}", key.0, key.1);
        self.entries.insert(
            key,
            Registration {
                factory,
                template,
                category: algorithm.category().to_string(),
                summary: algorithm.summary().to_string(),
            },
        );
        Ok(())
    }

    /// A new instance of `name`, at `version` or else the highest registered one.
    pub fn create(&self, name: &str, version: Option<u32>) -> Result<AlgorithmInstance, RegistryError> {
        let (_, registration) = self.lookup(name, version)?;
        Ok(AlgorithmInstance::with_schema(
            (registration.factory)(),
            registration.template.unbound(),
        ))
    }

    pub fn describe(&self, name: &str, version: Option<u32>) -> Result<AlgorithmDescription, RegistryError> {
        let (key, registration) = self.lookup(name, version)?;
        Ok(describe(key, registration))
    }

    /// Every registration, sorted by name then version.
    pub fn list(&self) -> Vec<AlgorithmDescription> {
        self.entries
            .iter()
            .map(|(key, registration)| describe(key, registration))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.latest_version(name).is_some()
    }

    pub fn latest_version(&self, name: &str) -> Option<u32> {
        self.entries
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .max()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<(&(String, u32), &Registration), RegistryError> {
        let unknown = || RegistryError::Unknown {
            name: name.to_string(),
            version,
        };
        let version = match version {
            Some(v) => v,
            None => self.latest_version(name).ok_or_else(unknown)?,
        };
        self.entries
            .get_key_value(&(name.to_string(), version))
            .ok_or_else(unknown)
    }
}

fn describe(key: &(String, u32), registration: &Registration) -> AlgorithmDescription {
    AlgorithmDescription {
        name: key.0.clone(),
        version: key.1,
        category: registration.category.clone(),
        summary: registration.summary.clone(),
        properties: registration.template.descriptors().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ExecutionContext;
    use crate::core::error::{AlgorithmError, SchemaError};
    use crate::core::property::ValueType;
    use crate::core::sync_impl::ChildPipelineRunner;

    struct Versioned(u32);

    impl Algorithm for Versioned {
        fn name(&self) -> &str {
            "Versioned"
        }

        fn version(&self) -> u32 {
            self.0
        }

        fn summary(&self) -> &str {
            "Does nothing, in several versions"
        }

        fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
            schema.declare(PropertyDescriptor::input("Level", ValueType::Integer).default(self.0 as i64))
        }

        fn build_pipeline(
            &self,
            _properties: &PropertySchema,
            _pipeline: &mut ChildPipelineRunner,
            _ctx: &ExecutionContext,
        ) -> Result<(), AlgorithmError> {
            Ok(())
        }
    }

    struct Broken;

    impl Algorithm for Broken {
        fn name(&self) -> &str {
            "Broken"
        }

        fn initialize(&self, schema: &mut PropertySchema) -> Result<(), SchemaError> {
            schema.declare(PropertyDescriptor::input("A", ValueType::Float))?;
            schema.declare(PropertyDescriptor::input("A", ValueType::Float))
        }

        fn build_pipeline(
            &self,
            _properties: &PropertySchema,
            _pipeline: &mut ChildPipelineRunner,
            _ctx: &ExecutionContext,
        ) -> Result<(), AlgorithmError> {
            Ok(())
        }
    }

    #[test]
    fn test_latest_version_is_default() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(|| Versioned(1)).unwrap();
        registry.register(|| Versioned(3)).unwrap();
        registry.register(|| Versioned(2)).unwrap();

        let latest = registry.create("Versioned", None).unwrap();
        assert_eq!(latest.version(), 3);
        assert_eq!(latest.property("Level").unwrap().as_i64(), Some(3));

        let pinned = registry.create("Versioned", Some(1)).unwrap();
        assert_eq!(pinned.version(), 1);
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(|| Versioned(1)).unwrap();
        assert!(matches!(
            registry.register(|| Versioned(1)),
            Err(RegistryError::Duplicate { version: 1, .. })
        ));
        assert!(matches!(
            registry.create("Versioned", Some(9)),
            Err(RegistryError::Unknown { version: Some(9), .. })
        ));
        assert!(matches!(
            registry.create("Nope", None),
            Err(RegistryError::Unknown { version: None, .. })
        ));
    }

    #[test]
    fn test_broken_initialize_is_rejected() {
        let mut registry = AlgorithmRegistry::new();
        let err = registry.register(|| Broken).unwrap_err();
        assert!(matches!(err, RegistryError::Initialize { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_instances_do_not_share_bindings() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(|| Versioned(1)).unwrap();

        let mut first = registry.create("Versioned", None).unwrap();
        first.set_property("Level", 42_i64).unwrap();
        let second = registry.create("Versioned", None).unwrap();
        assert_eq!(second.property("Level").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_list_is_sorted() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(|| Versioned(2)).unwrap();
        registry.register(|| Broken).unwrap_err();
        registry.register(|| Versioned(1)).unwrap();

        let listed: Vec<(String, u32)> = registry.list().into_iter().map(|d| (d.name, d.version)).collect();
        assert_eq!(listed, vec![("Versioned".into(), 1), ("Versioned".into(), 2)]);
        assert_eq!(registry.describe("Versioned", None).unwrap().properties.len(), 1);
    }
}
