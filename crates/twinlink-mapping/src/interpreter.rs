//! Template interpreter.
//!
//! A value template is a JSON object whose string leaves may be directives:
//!
//! | Leaf | Result |
//! |------|--------|
//! | `$a.b.c` | value at that path in the source, remapped; key removed when absent |
//! | `timestamp()` | current Unix time in milliseconds |
//! | `++key` | next value of the named counter |
//! | anything else | copied verbatim |
//!
//! Nested objects are evaluated recursively, arrays are copied verbatim.
//! Output is always a fresh object, the template itself is never touched.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace};
use twinlink_core::catalog::{MappingRule, REFERENCE_PREFIX};
use twinlink_core::envelope::unix_timestamp_ms;

use crate::counters::CounterStore;
use crate::remapper::{is_drop, remap};

const FUNC_TIMESTAMP: &str = "timestamp()";
const INCREMENT_PREFIX: &str = "++";

/// A parsed template leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// `$path`; holds the full reference including the prefix.
    Reference(&'a str),
    Timestamp,
    Increment(&'a str),
    Literal,
}

impl<'a> Directive<'a> {
    pub fn parse(leaf: &'a str) -> Self {
        if leaf.starts_with(REFERENCE_PREFIX) {
            Directive::Reference(leaf)
        } else if leaf == FUNC_TIMESTAMP {
            Directive::Timestamp
        } else if let Some(key) = leaf.strip_prefix(INCREMENT_PREFIX) {
            Directive::Increment(key)
        } else {
            Directive::Literal
        }
    }
}

/// Result of evaluating a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Mapped(Map<String, Value>),
    /// A field remapped to the drop sentinel; the message must be suppressed.
    Dropped,
}

impl Interpretation {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Interpretation::Dropped)
    }

    pub fn into_mapped(self) -> Option<Map<String, Value>> {
        match self {
            Interpretation::Mapped(map) => Some(map),
            Interpretation::Dropped => None,
        }
    }
}

/// Evaluates value templates against source values.
#[derive(Debug, Clone, Default)]
pub struct TemplateInterpreter {
    counters: Arc<CounterStore>,
}

impl TemplateInterpreter {
    pub fn new(counters: Arc<CounterStore>) -> Self {
        Self { counters }
    }

    pub fn counters(&self) -> &Arc<CounterStore> {
        &self.counters
    }

    /// Evaluate the rule's template against `source`.
    ///
    /// A rule without a template maps to a copy of the source.
    pub fn interpret(&self, rule: &MappingRule, source: &Map<String, Value>) -> Interpretation {
        let Some(template) = &rule.value_template else {
            return Interpretation::Mapped(source.clone());
        };

        match self.evaluate(rule, template, source) {
            Some(mapped) => Interpretation::Mapped(mapped),
            None => {
                debug!("Value template evaluated to the drop sentinel");
                Interpretation::Dropped
            }
        }
    }

    /// `None` means the drop sentinel was hit.
    fn evaluate(
        &self,
        rule: &MappingRule,
        template: &Map<String, Value>,
        source: &Map<String, Value>,
    ) -> Option<Map<String, Value>> {
        let mut output = Map::with_capacity(template.len());

        for (key, leaf) in template {
            let value = match leaf {
                Value::String(s) => match Directive::parse(s) {
                    Directive::Reference(reference) => {
                        let Some(raw) = resolve(source, &reference[1..]) else {
                            trace!(key, reference, "Reference not found, removing key");
                            continue;
                        };
                        let value = remap(rule, reference, raw);
                        if is_drop(&value) {
                            trace!(key, reference, "Reference remapped to drop sentinel");
                            return None;
                        }
                        value
                    }
                    Directive::Timestamp => Value::from(unix_timestamp_ms()),
                    Directive::Increment(counter) => {
                        let next = self.counters.increment(counter);
                        trace!(key, counter, next, "Incremented counter");
                        Value::from(next)
                    }
                    Directive::Literal => leaf.clone(),
                },
                Value::Object(nested) => Value::Object(self.evaluate(rule, nested, source)?),
                other => other.clone(),
            };
            output.insert(key.clone(), value);
        }

        Some(output)
    }
}

/// Resolve a dotted path by descending nested objects.
///
/// Missing segments, non-object intermediates and explicit nulls all
/// resolve to `None`.
pub fn resolve<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = source.get(first)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}
