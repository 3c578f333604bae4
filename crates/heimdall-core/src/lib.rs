//! Heimdall-Core: frontend core for the Heimdall Samsung flashing tool.
//!
//! This crate parses Partition Information Tables, models firmware
//! packages and drives the external `heimdall` and `adb` executables.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **PIT**: Binary partition table codec
//! - **Firmware**: Firmware metadata and partition bindings
//! - **Package**: Gzip-compressed tar packages with a TOML manifest
//! - **Matcher**: Quick conversion of loose images onto a PIT
//! - **Command**: Argument vectors for the flashing tool and adb
//! - **Process**: Child process abstraction (std, mock) with PATH fallback
//! - **Monitor**: Run state machine and output scanning
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use heimdall_core::{FrontendConfig, FrontendSession};
//!
//! let mut session = FrontendSession::new(FrontendConfig::default());
//! session.load_package(Path::new("stock.tar.gz")).expect("bad package");
//! session.load_for_flash().expect("bad firmware");
//! session.start_flash().expect("flash failed to start");
//! let outcome = session.wait_tool(Duration::from_secs(600));
//! println!("{:?}", outcome);
//! ```

pub mod command;
pub mod config;
pub mod events;
pub mod firmware;
pub mod matcher;
pub mod monitor;
pub mod package;
pub mod pit;
pub mod process;
pub mod session;

// Re-exports for convenience
pub use command::{AdbCommand, AdbOutcome, FlashCommand, ToolCommand, ToolOptions};
pub use config::FrontendConfig;
pub use events::{NullObserver, ToolEvent, ToolObserver, TracingObserver};
pub use firmware::{DeviceInfo, FileInfo, FirmwareInfo, PlatformInfo, ValidationError};
pub use matcher::{MatchError, MatchReport, PartitionMatcher, quick_convert};
pub use monitor::{RunState, TerminalOutcome, ToolSessionMonitor};
pub use package::{PackageData, PackageError, build_package, extract_package};
pub use pit::{FormatError, PitEntry, PitTable, read_pit_file};
pub use process::{MockProcess, ProcessError, SystemProcess, ToolProcess};
pub use session::{FrontendSession, SessionError};
