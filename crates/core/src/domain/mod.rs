pub mod approval;
pub mod event;
pub mod vendor;

pub use approval::PendingApproval;
pub use event::{stage_to_phase, AgentEvent, AgentStage, DecodeError, EventType, Phase};
pub use vendor::{Vendor, VendorKey, VendorPatch, VendorStatus};
