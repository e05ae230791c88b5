use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::{Direction, PropertyDescriptor, PropertyValue, ValueType};
use crate::core::error::SchemaError;

/// The declared properties of one algorithm and the values currently bound to them.
///
/// Declarations are shared behind an [`Arc`], so every instance created from a
/// registered template reuses them; only the binding table is per instance.
#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    declarations: Arc<Vec<PropertyDescriptor>>,
    index: Arc<HashMap<String, usize>>,
    bindings: HashMap<String, PropertyValue>,
    executing: bool,
    set_this_run: HashSet<String>,
    /// Outputs bound by the last execution rather than requested by the caller.
    produced: HashSet<String>,
}

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a property. Names are unique regardless of type or direction.
    ///
    /// A declared default must itself pass the type and validator checks.
    pub fn declare(&mut self, descriptor: PropertyDescriptor) -> Result<(), SchemaError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(SchemaError::Duplicate(descriptor.name));
        }
        if let Some(default) = &descriptor.default {
            descriptor.check(default)?;
        }

        let position = self.declarations.len();
        Arc::make_mut(&mut self.index).insert(descriptor.name.clone(), position);
        Arc::make_mut(&mut self.declarations).push(descriptor);
        Ok(())
    }

    /// Convenience form of [`declare`](Self::declare) taking every field positionally.
    pub fn declare_with(
        &mut self,
        name: &str,
        direction: Direction,
        value_type: ValueType,
        default: Option<PropertyValue>,
        validator: Option<super::Validator>,
        doc: &str,
    ) -> Result<(), SchemaError> {
        let mut descriptor = PropertyDescriptor::new(name, direction, value_type).doc(doc);
        descriptor.default = default;
        descriptor.validator = validator;
        self.declare(descriptor)
    }

    pub fn descriptor(&self, name: &str) -> Result<&PropertyDescriptor, SchemaError> {
        self.index
            .get(name)
            .map(|i| &self.declarations[*i])
            .ok_or_else(|| SchemaError::Unknown(name.to_string()))
    }

    /// All declarations, in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.declarations.iter()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether `name` was explicitly set, as opposed to falling back on its default.
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Binds `value` to `name` after type, enum and validator checks.
    ///
    /// While an execution is in progress an Output property may be set only once.
    /// Outside one, setting an Output is a request that later executions keep.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), SchemaError> {
        let value = value.into();
        let descriptor = self.descriptor(name)?;
        descriptor.check(&value)?;

        if self.executing && descriptor.direction == Direction::Output {
            if self.set_this_run.contains(name) {
                return Err(SchemaError::OutputAlreadySet(name.to_string()));
            }
            self.set_this_run.insert(name.to_string());
            if !self.bindings.contains_key(name) {
                self.produced.insert(name.to_string());
            }
        } else if descriptor.direction == Direction::Output {
            self.produced.remove(name);
        }

        self.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// The bound value, else the default, else [`SchemaError::Unbound`].
    pub fn get(&self, name: &str) -> Result<&PropertyValue, SchemaError> {
        self.try_get(name)?
            .ok_or_else(|| SchemaError::Unbound(name.to_string()))
    }

    /// Like [`get`](Self::get) but an unbound property is `Ok(None)`.
    pub fn try_get(&self, name: &str) -> Result<Option<&PropertyValue>, SchemaError> {
        let descriptor = self.descriptor(name)?;
        Ok(self.bindings.get(name).or(descriptor.default.as_ref()))
    }

    pub fn get_f64(&self, name: &str) -> Result<f64, SchemaError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| mismatch(name, "float", value))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, SchemaError> {
        let value = self.get(name)?;
        value.as_i64().ok_or_else(|| mismatch(name, "integer", value))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, SchemaError> {
        let value = self.get(name)?;
        value.as_bool().ok_or_else(|| mismatch(name, "boolean", value))
    }

    pub fn get_str(&self, name: &str) -> Result<&str, SchemaError> {
        let value = self.get(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "string", value))
    }

    pub fn get_f64_array(&self, name: &str) -> Result<&[f64], SchemaError> {
        let value = self.get(name)?;
        value.as_f64_array().ok_or_else(|| mismatch(name, "float array", value))
    }

    pub fn get_string_array(&self, name: &str) -> Result<&[String], SchemaError> {
        let value = self.get(name)?;
        value
            .as_string_array()
            .ok_or_else(|| mismatch(name, "string array", value))
    }

    pub fn get_workspace(&self, name: &str) -> Result<&str, SchemaError> {
        let value = self.get(name)?;
        value.as_workspace().ok_or_else(|| mismatch(name, "workspace", value))
    }

    /// Input/InOut properties that are neither bound nor defaulted.
    pub fn missing_mandatory(&self) -> Vec<&str> {
        self.declarations
            .iter()
            .filter(|d| d.is_mandatory() && !self.bindings.contains_key(&d.name))
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Every property that currently resolves to a value, bound or default.
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        self.declarations
            .iter()
            .filter_map(|d| {
                self.bindings
                    .get(&d.name)
                    .or(d.default.as_ref())
                    .map(|v| (d.name.clone(), v.clone()))
            })
            .collect()
    }

    /// A copy sharing the declarations with no values bound.
    pub fn unbound(&self) -> Self {
        Self {
            declarations: Arc::clone(&self.declarations),
            index: Arc::clone(&self.index),
            ..Self::default()
        }
    }

    /// Drops the outputs the previous execution produced, so a failed run
    /// never leaves them visible. Requested outputs stay bound.
    pub(crate) fn begin_execution(&mut self) {
        for name in self.produced.drain() {
            self.bindings.remove(&name);
        }
        self.executing = true;
        self.set_this_run.clear();
    }

    pub(crate) fn end_execution(&mut self) {
        self.executing = false;
    }
}

fn mismatch(name: &str, expected: &str, actual: &PropertyValue) -> SchemaError {
    SchemaError::TypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}
