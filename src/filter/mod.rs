//! Search filters and candidate evaluation

mod ast;
mod candidates;
mod component;
mod errors;

pub use ast::{Ava, Computed, Filter, MatchingRuleAssertion, SubstringAssertion};
pub use candidates::CandidateEvaluator;
pub use component::{ComponentFilter, ComponentIndex, ComponentItem};
pub use errors::{FilterError, FilterResult};
