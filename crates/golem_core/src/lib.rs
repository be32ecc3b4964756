pub mod action;
pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod world;

pub use action::{ActionId, ActionPayload, AutonomousAction, FsmState, Position};
pub use bus::{ActionBus, ActionLifecycle, ActionRequest, BusEvent, InProcessBus, Origin};
pub use config::{
    clamp_secs, duration_from_secs, DecisionConfig, FallbackWeights, GolemConfig, MemoryConfig,
    PersistenceConfig, SchedulerConfig, MAX_DURATION_SECS,
};
pub use context::{ContextHash, ContextHasher, ContextSnapshot};
pub use error::GolemError;
pub use world::{AgentBody, EntityRef, WorldQuery};
