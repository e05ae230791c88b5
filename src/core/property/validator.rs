use std::fmt;
use std::sync::Arc;

use super::PropertyValue;

type CheckFn = dyn Fn(&PropertyValue) -> Result<(), String> + Send + Sync;

/// A single-property check run every time a value is bound.
///
/// Cross-property constraints live in [`InputValidator`](crate::core::validation::InputValidator)
/// instead; a `Validator` only ever sees the one value being set.
#[derive(Clone)]
pub enum Validator {
    /// Scalar numeric bounds. `exclusive` turns both bounds into strict inequalities.
    Bounded {
        lower: Option<f64>,
        upper: Option<f64>,
        exclusive: bool,
    },
    /// Bounds applied to every element of a numeric array.
    ArrayBounded {
        lower: Option<f64>,
        upper: Option<f64>,
    },
    /// Inclusive bounds on the number of elements of an array.
    ArrayLength { min: usize, max: Option<usize> },
    /// Strings and arrays must not be empty.
    NonEmpty,
    /// The string must be one of the listed values.
    OneOf(Vec<String>),
    /// The string must end with one of the listed extensions (case-insensitive).
    FileExtension(Vec<String>),
    /// Every contained validator must pass; the first failure is reported.
    All(Vec<Validator>),
    Custom(String, Arc<CheckFn>),
}

impl Validator {
    pub fn bounded(lower: Option<f64>, upper: Option<f64>) -> Self {
        Validator::Bounded {
            lower,
            upper,
            exclusive: false,
        }
    }

    /// Any finite number.
    pub fn finite() -> Self {
        Validator::bounded(None, None)
    }

    /// Every element finite.
    pub fn finite_elements() -> Self {
        Validator::ArrayBounded {
            lower: None,
            upper: None,
        }
    }

    /// Strictly greater than zero.
    pub fn positive() -> Self {
        Validator::Bounded {
            lower: Some(0.0),
            upper: None,
            exclusive: true,
        }
    }

    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&PropertyValue) -> Result<(), String> + Send + Sync + 'static,
    {
        Validator::Custom(name.into(), Arc::new(check))
    }

    pub fn check(&self, value: &PropertyValue) -> Result<(), String> {
        match self {
            Validator::Bounded {
                lower,
                upper,
                exclusive,
            } => match value {
                PropertyValue::Float(_) | PropertyValue::Integer(_) => {
                    let v = value.as_f64().unwrap_or_default();
                    check_bounds(v, *lower, *upper, *exclusive)
                }
                other => Err(format!("bounds apply to numbers, not {}", other.kind())),
            },
            Validator::ArrayBounded { lower, upper } => {
                let values: Vec<f64> = match value {
                    PropertyValue::FloatArray(v) => v.clone(),
                    PropertyValue::IntegerArray(v) => v.iter().map(|i| *i as f64).collect(),
                    other => return Err(format!("element bounds apply to numeric arrays, not {}", other.kind())),
                };
                values
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, v)| {
                        check_bounds(*v, *lower, *upper, false).map_err(|e| format!("element {i}: {e}"))
                    })
            }
            Validator::ArrayLength { min, max } => {
                let len = value
                    .array_len()
                    .ok_or_else(|| format!("length limits apply to arrays, not {}", value.kind()))?;
                if len < *min {
                    return Err(format!("expected at least {min} values, got {len}"));
                }
                match max {
                    Some(max) if len > *max => Err(format!("expected at most {max} values, got {len}")),
                    _ => Ok(()),
                }
            }
            Validator::NonEmpty => {
                let empty = match value {
                    PropertyValue::String(s) | PropertyValue::Workspace(s) => s.trim().is_empty(),
                    other => other.array_len() == Some(0),
                };
                if empty {
                    Err("a value is required".to_string())
                } else {
                    Ok(())
                }
            }
            Validator::OneOf(options) => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(()),
                Some(s) => Err(format!("'{s}' is not one of [{}]", options.join(", "))),
                None => Err(format!("expected a string, not {}", value.kind())),
            },
            Validator::FileExtension(extensions) => {
                let name = value
                    .as_str()
                    .ok_or_else(|| format!("expected a file name, not {}", value.kind()))?
                    .to_ascii_lowercase();
                if extensions
                    .iter()
                    .any(|ext| name.ends_with(&ext.to_ascii_lowercase()))
                {
                    Ok(())
                } else {
                    Err(format!(
                        "file must have one of the extensions [{}]",
                        extensions.join(", ")
                    ))
                }
            }
            Validator::All(validators) => validators.iter().try_for_each(|v| v.check(value)),
            Validator::Custom(_, check) => check(value),
        }
    }
}

/// NaN and the infinities fail every bound, including an absent one.
fn check_bounds(value: f64, lower: Option<f64>, upper: Option<f64>, exclusive: bool) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{value} is not a finite number"));
    }
    if let Some(lo) = lower {
        let below = if exclusive { value <= lo } else { value < lo };
        if below {
            let op = if exclusive { ">" } else { ">=" };
            return Err(format!("{value} must be {op} {lo}"));
        }
    }
    if let Some(hi) = upper {
        let above = if exclusive { value >= hi } else { value > hi };
        if above {
            let op = if exclusive { "<" } else { "<=" };
            return Err(format!("{value} must be {op} {hi}"));
        }
    }
    Ok(())
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Bounded {
                lower,
                upper,
                exclusive,
            } => f
                .debug_struct("Bounded")
                .field("lower", lower)
                .field("upper", upper)
                .field("exclusive", exclusive)
                .finish(),
            Validator::ArrayBounded { lower, upper } => f
                .debug_struct("ArrayBounded")
                .field("lower", lower)
                .field("upper", upper)
                .finish(),
            Validator::ArrayLength { min, max } => f
                .debug_struct("ArrayLength")
                .field("min", min)
                .field("max", max)
                .finish(),
            Validator::NonEmpty => write!(f, "NonEmpty"),
            Validator::OneOf(options) => f.debug_tuple("OneOf").field(options).finish(),
            Validator::FileExtension(exts) => f.debug_tuple("FileExtension").field(exts).finish(),
            Validator::All(validators) => f.debug_tuple("All").field(validators).finish(),
            Validator::Custom(name, _) => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}
