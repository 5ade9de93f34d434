//! A single worker thread that runs submitted lines one at a time.
//!
//! The producer (the REPL or a test) hands lines over with [`DispatcherHandle::prepare`].
//! There is no queue: a line prepared while another is still pending replaces it. The
//! line currently executing can be interrupted with [`DispatcherHandle::interrupt_job`],
//! which handlers observe at their next checkpoint.

use crate::error::ShellError;
use crate::interpreter::Interpreter;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Interruption flag shared between the producer and one running step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Result<(), ShellError> {
        if self.is_cancelled() {
            Err(ShellError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps in short slices, checking the flag between them.
    pub fn sleep(&self, duration: Duration) -> Result<(), ShellError> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing pending, nothing running.
    Idle,
    /// A line is waiting for the worker.
    Primed,
    /// The worker is running a line.
    Executing,
}

struct Slot {
    pending: Option<String>,
    state: State,
    current: Option<CancelToken>,
    shutting_down: bool,
    finished: bool,
}

impl Slot {
    fn finish(&mut self) {
        self.finished = true;
        self.state = State::Idle;
        self.pending = None;
        self.current = None;
    }
}

struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
    idle: Condvar,
    worker: Mutex<Option<JoinHandle<Interpreter>>>,
}

/// Owns the interpreter until the worker thread is started.
pub struct Dispatcher {
    shared: Arc<Shared>,
    interpreter: Interpreter,
}

impl Dispatcher {
    pub fn new(interpreter: Interpreter) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                pending: None,
                state: State::Idle,
                current: None,
                shutting_down: false,
                finished: false,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            worker: Mutex::new(None),
        });
        Self {
            shared,
            interpreter,
        }
    }

    /// A handle usable before and after the worker starts.
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Moves the interpreter into a new worker thread and starts taking lines.
    pub fn begin_listening(self) -> std::io::Result<DispatcherHandle> {
        let handle = self.handle();
        let shared = Arc::clone(&self.shared);
        let interpreter = self.interpreter;
        let worker = thread::Builder::new()
            .name("wah-worker".to_string())
            .spawn(move || command_loop(shared, interpreter))?;
        *self.shared.worker.lock() = Some(worker);
        Ok(handle)
    }
}

/// Marks the worker as stopped when the loop ends, including by unwinding.
struct Finished<'a>(&'a Shared);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        let mut slot = self.0.slot.lock();
        slot.finish();
        self.0.idle.notify_all();
        if thread::panicking() {
            tracing::error!("worker panicked");
        } else {
            tracing::info!("worker stopped");
        }
    }
}

fn command_loop(shared: Arc<Shared>, mut interpreter: Interpreter) -> Interpreter {
    let _finished = Finished(&shared);
    tracing::info!("worker listening");
    loop {
        let (line, token) = {
            let mut slot = shared.slot.lock();
            let line = loop {
                if slot.shutting_down {
                    break None;
                }
                if let Some(line) = slot.pending.take() {
                    break Some(line);
                }
                shared.wake.wait(&mut slot);
            };
            let Some(line) = line else { break };
            let token = CancelToken::new();
            slot.state = State::Executing;
            slot.current = Some(token.clone());
            (line, token)
        };

        // the outcome has already been rendered
        let _ = interpreter.run(&line, &token);
        let exit = interpreter.should_exit();

        let mut slot = shared.slot.lock();
        slot.current = None;
        if exit {
            slot.shutting_down = true;
            slot.finish();
        } else if slot.pending.is_some() {
            slot.state = State::Primed;
        } else {
            slot.state = State::Idle;
        }
        shared.idle.notify_all();
        if exit {
            break;
        }
    }
    interpreter
}

/// Producer side of the dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<Shared>,
}

impl DispatcherHandle {
    /// Hands a line to the worker, replacing any line still waiting to start.
    pub fn prepare(&self, line: impl Into<String>) {
        let line = line.into();
        let mut slot = self.shared.slot.lock();
        if slot.finished {
            tracing::debug!(line = %line, "worker stopped, line dropped");
            return;
        }
        if let Some(dropped) = slot.pending.replace(line) {
            tracing::debug!(line = %dropped, "pending line replaced");
        }
        if slot.state == State::Idle {
            slot.state = State::Primed;
        }
        self.shared.wake.notify_one();
    }

    pub fn submit_line(&self, line: impl Into<String>) {
        self.prepare(line);
    }

    /// Cancels the line currently executing, if any. A pending line is not affected.
    pub fn interrupt_job(&self) {
        let slot = self.shared.slot.lock();
        match &slot.current {
            Some(token) => {
                tracing::warn!("interrupting running command");
                token.cancel();
            }
            None => tracing::debug!("nothing to interrupt"),
        }
    }

    pub fn cancel_current(&self) {
        self.interrupt_job();
    }

    pub fn state(&self) -> State {
        self.shared.slot.lock().state
    }

    /// Whether the worker loop has stopped, e.g. after `exit`.
    pub fn is_finished(&self) -> bool {
        self.shared.slot.lock().finished
    }

    /// Blocks until no line is pending or executing.
    pub fn wait_idle(&self) {
        let mut slot = self.shared.slot.lock();
        while !Self::settled(&slot) {
            self.shared.idle.wait(&mut slot);
        }
    }

    /// Like [`DispatcherHandle::wait_idle`] with a time limit. Returns whether the
    /// dispatcher became idle in time.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while !Self::settled(&slot) {
            if self.shared.idle.wait_until(&mut slot, deadline).timed_out() {
                return Self::settled(&slot);
            }
        }
        true
    }

    fn settled(slot: &Slot) -> bool {
        slot.finished || (slot.state == State::Idle && slot.pending.is_none())
    }

    /// Stops the worker after the current step and returns its interpreter.
    ///
    /// Returns `None` if the worker was never started, has already been joined, or
    /// panicked.
    pub fn shutdown(&self) -> Option<Interpreter> {
        {
            let mut slot = self.shared.slot.lock();
            slot.shutting_down = true;
            self.shared.wake.notify_all();
        }
        let worker = self.shared.worker.lock().take()?;
        match worker.join() {
            Ok(interpreter) => Some(interpreter),
            Err(_) => {
                tracing::error!("worker thread panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::output::{RecordingRenderer, Renderer};
    use crate::registry::ModuleCatalog;
    use std::io;

    #[test]
    fn test_token_checkpoint() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        token.clone().cancel();
        assert!(matches!(token.checkpoint(), Err(ShellError::Cancelled)));
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let started = Instant::now();
        assert!(matches!(
            token.sleep(Duration::from_secs(10)),
            Err(ShellError::Cancelled)
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn test_sleep_completes() {
        assert!(CancelToken::new().sleep(Duration::from_millis(5)).is_ok());
    }

    struct BrokenRenderer;

    impl Renderer for BrokenRenderer {
        fn render(&mut self, _value: &Value) -> io::Result<()> {
            Ok(())
        }

        fn echo(&mut self, _line: &str) -> io::Result<()> {
            panic!("terminal went away");
        }

        fn report_error(&mut self, _err: &ShellError) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_worker_panic_does_not_hang_waiters() {
        let sh = Interpreter::new(ModuleCatalog::new(), Box::new(BrokenRenderer)).unwrap();
        let handle = Dispatcher::new(sh).begin_listening().unwrap();
        handle.submit_line("wah!");
        assert!(handle.wait_idle_timeout(Duration::from_secs(10)));
        assert!(handle.is_finished());
        assert_eq!(handle.state(), State::Idle);
        assert!(handle.shutdown().is_none());
    }

    #[test]
    fn test_prepare_after_finish_is_dropped() {
        let sh = Interpreter::new(ModuleCatalog::new(), Box::new(RecordingRenderer::new())).unwrap();
        let handle = Dispatcher::new(sh).begin_listening().unwrap();
        handle.submit_line("exit");
        handle.wait_idle();
        handle.prepare("wah!");
        assert_eq!(handle.state(), State::Idle);
        handle.shutdown();
    }
}
