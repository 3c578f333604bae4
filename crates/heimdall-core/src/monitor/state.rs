//! What the flashing tool is currently doing.

use std::fmt;

/// Kind of run occupying the flashing-tool slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    #[default]
    Idle,
    Flashing,
    DetectingDevice,
    ClosingPcScreen,
    DownloadingPit,
    PrintingPit,
}

impl RunState {
    pub fn is_idle(self) -> bool {
        self == RunState::Idle
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Flashing => write!(f, "Flashing"),
            RunState::DetectingDevice => write!(f, "Detecting Device"),
            RunState::ClosingPcScreen => write!(f, "Closing PC Screen"),
            RunState::DownloadingPit => write!(f, "Downloading PIT"),
            RunState::PrintingPit => write!(f, "Printing PIT"),
        }
    }
}

/// Run kind plus the sticky no-reboot bit.
///
/// `no_reboot` records that the current run leaves the device in download
/// mode. It survives until the run ends, where a successful exit turns it
/// into the next run's resume default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub run: RunState,
    pub no_reboot: bool,
}

impl SessionState {
    pub fn new(run: RunState, no_reboot: bool) -> Self {
        Self { run, no_reboot }
    }

    pub fn is_idle(&self) -> bool {
        self.run.is_idle()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
