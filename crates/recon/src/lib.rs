pub mod lifecycle;
pub mod matcher;
pub mod reference;

pub use lifecycle::{BatchOutcome, LifecycleError, MatchStore, Reconciler, StoreError};
pub use matcher::{CandidateMatch, MatchConfig, Matcher, RoleConvention};
pub use reference::{Reference, ReferenceExtractor, ReferenceKind};
