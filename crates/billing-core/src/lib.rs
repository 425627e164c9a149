//! Stage pipeline, permission and claim evaluators, and the pre/postprocessor
//! orchestration that wraps a route handler with billing enforcement.

pub mod claim;
pub mod decorator;
pub mod error;
pub mod permission;
pub mod pipeline;
pub mod postprocessor;
pub mod preprocessor;

pub use claim::{evaluate_claim_candidates, ClaimCandidate, ClaimResult, MatchType};
pub use decorator::{HandlerFlags, HandlerSpec, Moniker};
pub use error::{InfraError, PolicyError, StageError, StageResult};
pub use permission::evaluate_permission;
pub use pipeline::{bind, block, claim as claim_stage, dunning_warning, enforce, permission as permission_stage, subscription_missing_header, StageInputs};
pub use postprocessor::{postprocess, PostprocessOutcome};
pub use preprocessor::{preprocess, PreprocessResult, ResponseHeaders};
