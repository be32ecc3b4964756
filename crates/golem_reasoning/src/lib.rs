pub mod command;
pub mod decision;
pub mod fallback;
pub mod outcome;
pub mod prompts;
pub mod scheduler;

pub use command::CommandDecisionService;
pub use decision::{
    parse_decision_text, validate_decision, Decision, DecisionRejected, DecisionRequest,
    DecisionService, RawDecision,
};
pub use fallback::{action_from_decision, pick_category, FallbackCategory, FallbackPicker};
pub use outcome::{OutcomeRecord, OutcomeTracker, PendingAction};
pub use prompts::build_decision_prompt;
pub use scheduler::{
    retry_context_for, ActionOutcome, CycleOutcome, CycleReport, DecisionSource, IdleScheduler,
    SchedulerHandle, SchedulerPhase,
};
