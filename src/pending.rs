//! One-shot background work whose result is picked up by polling.
//!
//! The UI thread never blocks: it calls [`Pending::poll`] once per frame and
//! reacts when the worker has answered.

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use std::thread;

/// The worker went away without sending a result (panicked or was dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("background task ended without a result")]
pub struct TaskLost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<T, E> {
    Waiting,
    Ready(T),
    Failed(E),
}

impl<T, E> Progress<T, E> {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Progress::Waiting)
    }
}

enum State<T, E> {
    Waiting(Receiver<Result<T, E>>),
    Ready(T),
    Failed(E),
}

pub struct Pending<T, E> {
    state: State<T, E>,
}

impl<T, E> Pending<T, E>
where
    T: Send + 'static,
    E: From<TaskLost> + Send + 'static,
{
    /// Runs `work` on a named thread.
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            // Receiver gone means nobody cares any more.
            let _ = tx.send(work());
        });
        match spawned {
            Ok(_) => Self::from_receiver(rx),
            Err(e) => {
                tracing::error!("failed to spawn {name} thread: {e}");
                Self::failed(TaskLost.into())
            }
        }
    }
}

impl<T, E> Pending<T, E>
where
    E: From<TaskLost>,
{
    pub fn from_receiver(rx: Receiver<Result<T, E>>) -> Self {
        Self { state: State::Waiting(rx) }
    }

    pub fn ready(value: T) -> Self {
        Self { state: State::Ready(value) }
    }

    pub fn failed(error: E) -> Self {
        Self { state: State::Failed(error) }
    }

    fn refresh(&mut self) {
        let received = match &self.state {
            State::Waiting(rx) => rx.try_recv(),
            _ => return,
        };
        self.state = match received {
            Ok(Ok(value)) => State::Ready(value),
            Ok(Err(error)) => State::Failed(error),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => State::Failed(TaskLost.into()),
        };
    }

    pub fn poll(&mut self) -> Progress<&T, &E> {
        self.refresh();
        match &self.state {
            State::Waiting(_) => Progress::Waiting,
            State::Ready(value) => Progress::Ready(value),
            State::Failed(error) => Progress::Failed(error),
        }
    }

    pub fn poll_mut(&mut self) -> Progress<&mut T, &E> {
        self.refresh();
        match &mut self.state {
            State::Waiting(_) => Progress::Waiting,
            State::Ready(value) => Progress::Ready(value),
            State::Failed(error) => Progress::Failed(&*error),
        }
    }
}
