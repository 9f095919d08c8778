//! LLM-backed pipeline stages and the deterministic machinery around them:
//! prompt templates, typed stage outputs, the interview decision rule, the
//! post-recommendation classifier, and the pre-pipeline validator.

mod decide;
mod error;
mod prompts;
mod signals;
mod stages;
mod validator;

pub use decide::{InterviewAction, decide_interview};
pub use error::StageFailure;
pub use signals::{
    CartOp, DomainDetection, ExtractedSignals, GeneratedQuestion, RefinementDecision,
    RefinementIntent,
};
pub use stages::AgentStages;
pub use validator::{
    InvalidReason, Validation, correct_domain_terms, domain_quick_replies, impatience_phrase,
    validate,
};
