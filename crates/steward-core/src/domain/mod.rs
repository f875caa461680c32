//! Domain model (IDs, task types, records, states, phases, errors).

pub mod errors;
pub mod ids;
pub mod phase;
pub mod record;
pub mod state;
pub mod task_type;

pub use errors::StewardError;
pub use ids::{Id, IdMarker, ResourceId, TaskId};
pub use phase::{PhaseProgress, aggregate_phases};
pub use record::{ErrorCode, TaskDetails, TaskError, TaskRecord};
pub use state::{TaskState, merge_phase_state};
pub use task_type::{GroupType, TaskType};
