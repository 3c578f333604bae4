//! `std::process` backend.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::traits::{ProcessError, ProcessEvent, ProcessExit, ToolProcess};

const READ_CHUNK: usize = 4096;

/// Poll interval while waiting for exit after stdout closed.
const EXIT_POLL: Duration = Duration::from_millis(10);

enum Message {
    Stdout(Vec<u8>),
    Closed,
}

struct Running {
    child: Child,
    rx: Receiver<Message>,
    stderr: Option<JoinHandle<String>>,
    stdout_closed: bool,
}

impl Running {
    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn exit(mut self, status: ExitStatus) -> ProcessExit {
        let stderr = self.collect_stderr();
        match status.code() {
            Some(code) => ProcessExit::Exited { code, stderr },
            // Terminated by a signal.
            None => ProcessExit::Error {
                error: ProcessError::Crashed,
                stderr,
            },
        }
    }
}

/// Child process with stdout streamed by a reader thread.
#[derive(Default)]
pub struct SystemProcess {
    running: Option<Running>,
}

impl SystemProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Option<ProcessEvent> {
        let running = self.running.as_mut()?;

        if !running.stdout_closed {
            let message = match timeout {
                None => match running.rx.try_recv() {
                    Ok(message) => Some(message),
                    Err(TryRecvError::Empty) => return None,
                    Err(TryRecvError::Disconnected) => None,
                },
                Some(timeout) => match running.rx.recv_timeout(timeout) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => return None,
                    Err(RecvTimeoutError::Disconnected) => None,
                },
            };
            match message {
                Some(Message::Stdout(bytes)) => return Some(ProcessEvent::Output(bytes)),
                Some(Message::Closed) | None => running.stdout_closed = true,
            }
        }

        match running.child.try_wait() {
            Ok(Some(status)) => {
                let running = self.running.take()?;
                debug!(?status, "Process exited");
                Some(ProcessEvent::Finished(running.exit(status)))
            }
            Ok(None) => {
                if let Some(timeout) = timeout {
                    thread::sleep(timeout.min(EXIT_POLL));
                }
                None
            }
            Err(e) => {
                let mut running = self.running.take()?;
                let stderr = running.collect_stderr();
                Some(ProcessEvent::Finished(ProcessExit::Error {
                    error: ProcessError::Unknown(e.to_string()),
                    stderr,
                }))
            }
        }
    }
}

impl ToolProcess for SystemProcess {
    fn start(
        &mut self,
        program: &Path,
        args: &[String],
        start_timeout: Duration,
    ) -> Result<(), ProcessError> {
        if self.is_running() {
            return Err(ProcessError::Busy);
        }

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessError::FailedToStart {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;

        if started.elapsed() > start_timeout {
            warn!(program = %program.display(), "Process start exceeded {:?}", start_timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Timedout);
        }

        let (tx, rx) = mpsc::channel();
        let stdout = child.stdout.take();
        thread::spawn(move || {
            if let Some(mut stdout) = stdout {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            trace!(len = n, "stdout chunk");
                            if tx.send(Message::Stdout(buf[..n].to_vec())).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            let _ = tx.send(Message::Closed);
        });

        let stderr = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = Vec::new();
                let _ = stderr.read_to_end(&mut text);
                String::from_utf8_lossy(&text).into_owned()
            })
        });

        debug!(program = %program.display(), pid = child.id(), "Process started");
        self.running = Some(Running {
            child,
            rx,
            stderr,
            stdout_closed: false,
        });
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn try_event(&mut self) -> Option<ProcessEvent> {
        self.poll(None)
    }

    fn wait_event(&mut self, timeout: Duration) -> Option<ProcessEvent> {
        self.poll(Some(timeout))
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        match self.running.as_mut() {
            Some(running) => running
                .child
                .kill()
                .map_err(|e| ProcessError::Unknown(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            debug!(pid = running.child.id(), "Killing process on drop");
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}
