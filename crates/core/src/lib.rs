pub mod config;
pub mod domain;
pub mod errors;
pub mod preferences;
pub mod reconciler;
pub mod store;

pub use config::{AppConfig, ConfigError, FeedMode, LoadOptions, LogFormat};
pub use domain::{
    AgentEvent, AgentStage, DecodeError, EventType, PendingApproval, Phase, Vendor, VendorKey,
    VendorStatus,
};
pub use errors::{ApplicationError, DomainError};
pub use preferences::{
    Direction, FeedbackRecord, Parameter, PreferenceEngine, PreferenceWeights, RankedVendor,
    ScoreBreakdown, VendorCandidate, VendorListing, VendorScores,
};
pub use reconciler::{ActivityEntry, ConnectionState, Fact, FoldOutcome, OrderView, Reconciler};
pub use store::{OrderStore, ShutdownSignal, StoreSettings, TerminalTransitions};
