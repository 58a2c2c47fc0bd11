//! Message mapping engine.
//!
//! - [`RuleMatcher`] picks the rule for a Ditto envelope or a cloud command.
//! - [`TemplateInterpreter`] rewrites a source value through a rule's template.
//! - [`remapper`] substitutes enumerated values, including the drop sentinel.
//! - [`CounterStore`] backs the `++key` directive.

pub mod counters;
pub mod interpreter;
pub mod matcher;
pub mod remapper;

pub use counters::CounterStore;
pub use interpreter::{resolve, Directive, Interpretation, TemplateInterpreter};
pub use matcher::RuleMatcher;
pub use remapper::{is_drop, remap, DROP_SENTINEL};
