//! Domain model (identifiers, handle states, faults, signatures).

pub mod fault;
pub mod ids;
pub mod signature;
pub mod state;

pub use self::fault::{ExecutionFault, FaultKind};
pub use self::ids::{Id, IdMarker, OperationId, WovenTypeId};
pub use self::signature::{Args, ParamType};
pub use self::state::HandleState;
