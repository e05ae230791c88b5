use std::collections::BTreeMap;

use crate::core::error::BindError;
use crate::core::property::{Direction, PropertySchema, PropertyValue};

/// Copies pipeline results onto the output properties of the same name.
pub struct OutputBinder;

impl OutputBinder {
    /// Every `Output` property must have a result. `InOut` properties are bound when
    /// a result exists and keep their input value otherwise. Anything else in
    /// `results` is ignored.
    ///
    /// All or nothing: on error the schema is left as it was.
    pub fn bind(
        mut results: BTreeMap<String, PropertyValue>,
        schema: &mut PropertySchema,
    ) -> Result<(), BindError> {
        let targets: Vec<(String, Direction)> = schema
            .descriptors()
            .filter(|d| d.direction.is_output())
            .map(|d| (d.name.clone(), d.direction))
            .collect();

        let mut pending = Vec::with_capacity(targets.len());
        for (name, direction) in targets {
            match results.remove(&name) {
                Some(value) => {
                    schema.descriptor(&name)?.check(&value)?;
                    pending.push((name, value));
                }
                None if direction == Direction::Output => return Err(BindError::MissingOutput(name)),
                None => {}
            }
        }

        for (name, value) in pending {
            schema.set(&name, value)?;
        }

        for name in results.keys() {
            log::debug!("ignoring pipeline result '{name}' with no matching output property");
        }
        Ok(())
    }
}
