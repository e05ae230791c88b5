use std::collections::BTreeMap;
use std::fmt;

use crate::core::broadcast;
use crate::core::property::PropertySchema;
use crate::workspace::WorkspaceStore;

/// Per-field problems found before an algorithm is allowed to run.
///
/// Empty means valid. Only the first message recorded for a field is kept, so
/// rules listed earlier take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Logs every problem, one line per field.
    pub fn log_summary(&self, algorithm: &str) {
        if self.is_valid() {
            log::debug!("{algorithm}: all property checks passed");
            return;
        }
        for (field, message) in self.iter() {
            log::error!("{algorithm}: invalid value for {field}: {message}");
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// A named cross-property check yielding at most one `(field, message)`.
///
/// Rules must be pure: evaluating one twice against the same schema gives the same answer.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, schema: &PropertySchema) -> Option<(String, String)>;
}

/// Both properties are set, or neither is.
pub struct Paired {
    pub first: String,
    pub second: String,
}

impl Rule for Paired {
    fn name(&self) -> &str {
        "paired"
    }

    fn check(&self, schema: &PropertySchema) -> Option<(String, String)> {
        match (schema.is_bound(&self.first), schema.is_bound(&self.second)) {
            (true, false) => Some((
                self.second.clone(),
                format!("must be set together with {}", self.first),
            )),
            (false, true) => Some((
                self.first.clone(),
                format!("must be set together with {}", self.second),
            )),
            _ => None,
        }
    }
}

/// `low < high` whenever both resolve to numbers. NaN on either side fails.
pub struct Ordered {
    pub low: String,
    pub high: String,
}

impl Rule for Ordered {
    fn name(&self) -> &str {
        "ordered"
    }

    fn check(&self, schema: &PropertySchema) -> Option<(String, String)> {
        let value = |name: &str| schema.try_get(name).ok().flatten().and_then(|v| v.as_f64());
        let (low, high) = (value(&self.low)?, value(&self.high)?);
        if low.is_nan() || high.is_nan() || low >= high {
            Some((
                self.low.clone(),
                format!("{} ({low}) must be less than {} ({high})", self.low, self.high),
            ))
        } else {
            None
        }
    }
}

/// Where the expected element count of a per-spectrum array comes from.
#[derive(Clone)]
pub enum SpectrumCount {
    Fixed(usize),
    /// The spectrum count of the workspace named by `property`, looked up in `store`.
    FromWorkspace {
        property: String,
        store: WorkspaceStore,
    },
}

/// An array property must have 0, 1 or N elements.
pub struct PerSpectrum {
    pub array: String,
    pub count: SpectrumCount,
}

impl Rule for PerSpectrum {
    fn name(&self) -> &str {
        "per-spectrum"
    }

    fn check(&self, schema: &PropertySchema) -> Option<(String, String)> {
        let len = schema.try_get(&self.array).ok().flatten()?.array_len()?;

        let n = match &self.count {
            SpectrumCount::Fixed(n) => *n,
            SpectrumCount::FromWorkspace { property, store } => {
                let name = schema.try_get(property).ok().flatten()?.as_workspace()?;
                match store.get(name) {
                    Ok(workspace) => workspace.spectrum_count(),
                    Err(e) => return Some((property.clone(), e.to_string())),
                }
            }
        };

        broadcast::classify(len, n)
            .err()
            .map(|e| (self.array.clone(), e.to_string()))
    }
}

type RuleFn = dyn Fn(&PropertySchema) -> Option<(String, String)> + Send + Sync;

/// A rule backed by a closure, for checks specific to one algorithm.
pub struct CustomRule {
    name: String,
    check: Box<RuleFn>,
}

impl CustomRule {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&PropertySchema) -> Option<(String, String)> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl Rule for CustomRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, schema: &PropertySchema) -> Option<(String, String)> {
        (self.check)(schema)
    }
}

/// An ordered list of cross-property rules.
#[derive(Default)]
pub struct InputValidator {
    rules: Vec<Box<dyn Rule>>,
}

impl InputValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule<R: Rule + 'static>(&mut self, rule: R) -> &mut Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn paired(&mut self, first: &str, second: &str) -> &mut Self {
        self.add_rule(Paired {
            first: first.to_string(),
            second: second.to_string(),
        })
    }

    pub fn ordered(&mut self, low: &str, high: &str) -> &mut Self {
        self.add_rule(Ordered {
            low: low.to_string(),
            high: high.to_string(),
        })
    }

    pub fn per_spectrum(&mut self, array: &str, count: SpectrumCount) -> &mut Self {
        self.add_rule(PerSpectrum {
            array: array.to_string(),
            count,
        })
    }

    pub fn custom<F>(&mut self, name: &str, check: F) -> &mut Self
    where
        F: Fn(&PropertySchema) -> Option<(String, String)> + Send + Sync + 'static,
    {
        self.add_rule(CustomRule::new(name, check))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluates every rule in order. Never fails; an empty result means valid.
    pub fn validate(&self, schema: &PropertySchema) -> ValidationResult {
        let mut result = ValidationResult::new();
        for rule in &self.rules {
            if let Some((field, message)) = rule.check(schema) {
                log::trace!("rule '{}' flagged {field}", rule.name());
                result.add_error(field, message);
            }
        }
        result
    }
}
