//! External process layer module.

pub mod launcher;
pub mod mock;
pub mod slot;
pub mod system;
pub mod traits;

pub use launcher::{LaunchPolicy, candidate_dirs, launch};
pub use mock::{MockProcess, MockRun};
pub use slot::ProcessSlot;
pub use system::SystemProcess;
pub use traits::{ProcessError, ProcessEvent, ProcessExit, ToolProcess};
