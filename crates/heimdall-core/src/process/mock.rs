//! Scripted process for testing session logic.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{ProcessError, ProcessEvent, ProcessExit, ToolProcess};

/// Scripted result of one `start` call.
#[derive(Debug, Clone)]
pub enum MockRun {
    /// Start succeeds and the queued events are delivered in order.
    Runs(Vec<ProcessEvent>),
    /// Start fails with this error.
    Fails(ProcessError),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockRun>,
    launches: Vec<(PathBuf, Vec<String>)>,
    events: VecDeque<ProcessEvent>,
    running: bool,
}

/// Mock process. Clones share the same script and launch log, so a test
/// can keep a handle after moving one into a session.
#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    state: Arc<Mutex<MockState>>,
}

impl MockProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a run that prints `output` in the given chunks and exits with
    /// `code`.
    pub fn queue_exit(&self, output: &[&[u8]], code: i32) {
        let mut events: Vec<ProcessEvent> = output
            .iter()
            .map(|chunk| ProcessEvent::Output(chunk.to_vec()))
            .collect();
        events.push(ProcessEvent::Finished(ProcessExit::Exited {
            code,
            stderr: String::new(),
        }));
        self.queue(MockRun::Runs(events));
    }

    /// Queue a start failure.
    pub fn queue_start_failure(&self) {
        self.queue(MockRun::Fails(ProcessError::FailedToStart {
            program: "mock".into(),
            reason: "No such file or directory".into(),
        }));
    }

    pub fn queue(&self, run: MockRun) {
        self.lock().script.push_back(run);
    }

    /// Every `start` call so far: program and arguments.
    pub fn launches(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.lock().launches.clone()
    }

    pub fn programs(&self) -> Vec<PathBuf> {
        self.lock().launches.iter().map(|(p, _)| p.clone()).collect()
    }
}

impl ToolProcess for MockProcess {
    fn start(
        &mut self,
        program: &Path,
        args: &[String],
        _start_timeout: Duration,
    ) -> Result<(), ProcessError> {
        let mut state = self.lock();
        if state.running {
            return Err(ProcessError::Busy);
        }
        state.launches.push((program.to_path_buf(), args.to_vec()));

        match state.script.pop_front() {
            Some(MockRun::Runs(events)) => {
                state.events = events.into();
                state.running = true;
                Ok(())
            }
            Some(MockRun::Fails(error)) => Err(error),
            None => Err(ProcessError::FailedToStart {
                program: program.display().to_string(),
                reason: "no scripted run".into(),
            }),
        }
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn try_event(&mut self) -> Option<ProcessEvent> {
        let mut state = self.lock();
        if !state.running {
            return None;
        }
        let event = state.events.pop_front()?;
        if matches!(event, ProcessEvent::Finished(_)) {
            state.running = false;
        }
        Some(event)
    }

    fn wait_event(&mut self, _timeout: Duration) -> Option<ProcessEvent> {
        self.try_event()
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        let mut state = self.lock();
        if state.running {
            state.events.clear();
            state
                .events
                .push_back(ProcessEvent::Finished(ProcessExit::Error {
                    error: ProcessError::Crashed,
                    stderr: String::new(),
                }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn test_scripted_run() {
        let mut mock = MockProcess::new();
        mock.queue_exit(&[b"Uploading BOOT\n", b"\x0850%"], 0);

        mock.start(Path::new("heimdall"), &["detect".into()], TIMEOUT)
            .unwrap();
        assert!(mock.is_running());
        assert_eq!(
            mock.try_event(),
            Some(ProcessEvent::Output(b"Uploading BOOT\n".to_vec()))
        );
        assert_eq!(
            mock.try_event(),
            Some(ProcessEvent::Output(b"\x0850%".to_vec()))
        );
        assert!(matches!(
            mock.try_event(),
            Some(ProcessEvent::Finished(ProcessExit::Exited { code: 0, .. }))
        ));
        assert!(!mock.is_running());
        assert_eq!(mock.try_event(), None);
    }

    #[test]
    fn test_start_failures_and_log() {
        let mut mock = MockProcess::new();
        let observer = mock.clone();
        mock.queue_start_failure();

        assert!(mock.start(Path::new("heimdall"), &[], TIMEOUT).is_err());
        // Empty script also fails.
        assert!(mock.start(Path::new("/usr/bin/heimdall"), &[], TIMEOUT).is_err());
        assert_eq!(
            observer.programs(),
            vec![PathBuf::from("heimdall"), PathBuf::from("/usr/bin/heimdall")]
        );
    }

    #[test]
    fn test_busy_and_kill() {
        let mut mock = MockProcess::new();
        mock.queue_exit(&[b"a", b"b"], 0);
        mock.queue_exit(&[], 0);

        mock.start(Path::new("heimdall"), &[], TIMEOUT).unwrap();
        assert_eq!(
            mock.start(Path::new("heimdall"), &[], TIMEOUT),
            Err(ProcessError::Busy)
        );

        mock.kill().unwrap();
        assert!(matches!(
            mock.try_event(),
            Some(ProcessEvent::Finished(ProcessExit::Error {
                error: ProcessError::Crashed,
                ..
            }))
        ));
    }
}
