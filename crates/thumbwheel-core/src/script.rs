//! Cooperative script engine
//!
//! A main routine plus any number of sub-routines, each an explicit state
//! machine that runs until its next suspension point. Nothing advances on
//! its own: every `pump` resumes the main routine and then each live
//! sub-routine in creation order, at most once each. All routines share one
//! `&mut S` that the caller owns and hands in on every pump.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Where a routine stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Resume on the next pump
    Yield,
    /// Resume on the first pump at least this long from now
    Sleep(Duration),
    /// The routine is finished and will be dropped
    Done,
}

/// A resumable unit of script code
pub trait Routine<S>: Send {
    fn resume(&mut self, cx: &mut Script<'_, S>) -> Suspend;
}

impl<S, F> Routine<S> for F
where
    F: FnMut(&mut Script<'_, S>) -> Suspend + Send,
{
    fn resume(&mut self, cx: &mut Script<'_, S>) -> Suspend {
        self(cx)
    }
}

/// What a routine sees while it runs: the shared state, plus the ability to
/// spawn sub-routines
pub struct Script<'a, S> {
    state: &'a mut S,
    spawned: &'a mut Vec<Task<S>>,
}

impl<S> Script<'_, S> {
    /// Spawn a sub-routine. It is first resumed on the next pump.
    pub fn start_async<R>(&mut self, routine: R) -> TaskHandle
    where
        R: Routine<S> + 'static,
    {
        let task = Task::new(Box::new(routine));
        let handle = task.handle();
        self.spawned.push(task);
        handle
    }
}

impl<S> Deref for Script<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.state
    }
}

impl<S> DerefMut for Script<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.state
    }
}

/// Handle to a spawned sub-routine
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Abandon the sub-routine wherever it is suspended. It is never resumed
    /// again. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Task<S> {
    routine: Box<dyn Routine<S>>,
    cancelled: Arc<AtomicBool>,
    wake_at: Option<Instant>,
}

impl<S> Task<S> {
    fn new(routine: Box<dyn Routine<S>>) -> Self {
        Self {
            routine,
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_at: None,
        }
    }

    fn handle(&self) -> TaskHandle {
        TaskHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Run one turn. Returns false once the task is finished.
    fn advance(&mut self, state: &mut S, spawned: &mut Vec<Task<S>>) -> bool {
        if let Some(wake_at) = self.wake_at {
            if Instant::now() < wake_at {
                return true;
            }
            self.wake_at = None;
        }

        let mut cx = Script { state, spawned };
        match self.routine.resume(&mut cx) {
            Suspend::Yield => true,
            Suspend::Sleep(duration) => {
                self.wake_at = Some(Instant::now() + duration);
                true
            }
            Suspend::Done => false,
        }
    }
}

pub struct Engine<S> {
    main: Option<Task<S>>,
    tasks: Vec<Task<S>>,
}

impl<S> Engine<S> {
    /// Create the engine and run the main routine up to its first
    /// suspension point
    pub fn start<R>(main: R, state: &mut S) -> Self
    where
        R: Routine<S> + 'static,
    {
        let mut engine = Self {
            main: Some(Task::new(Box::new(main))),
            tasks: Vec::new(),
        };
        engine.pump(state);
        engine
    }

    /// Advance the main routine, then every live sub-routine, once each
    pub fn pump(&mut self, state: &mut S) {
        let mut spawned = Vec::new();

        if let Some(main) = self.main.as_mut() {
            if !main.advance(state, &mut spawned) {
                tracing::debug!("main routine finished");
                self.main = None;
            }
        }

        self.tasks
            .retain_mut(|task| !task.is_cancelled() && task.advance(state, &mut spawned));
        self.tasks.append(&mut spawned);
    }

    /// Number of sub-routines that will still be resumed
    pub fn live_tasks(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_cancelled()).count()
    }

    #[cfg(test)]
    fn main_finished(&self) -> bool {
        self.main.is_none()
    }
}
