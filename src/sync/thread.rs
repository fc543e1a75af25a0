//! Exposes [`CommandThread`], a named OS thread that can be dispatched once and joined.

use std::thread::{self, JoinHandle, ThreadId};

use anyhow::Result;

use crate::Error;

/// Thin wrapper around one named, joinable OS thread.
#[derive(Debug)]
pub struct CommandThread {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl CommandThread {
    /// Create a new thread wrapper. No OS thread is spawned until [`CommandThread::dispatch()`] is called.
    pub fn new(name: impl Into<String>) -> Self {
        CommandThread {
            name: name.into(),
            handle: None,
        }
    }

    /// Spawn the OS thread, running `func` on it. The thread carries the name given at construction.
    /// # Errors
    /// * Fails if this thread was already dispatched and not joined yet.
    /// * Fails if the OS refuses to spawn a thread.
    pub fn dispatch<F>(&mut self, func: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static, {
        if self.handle.is_some() {
            return Err(Error::Uncategorized("Thread dispatched twice").into());
        }
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(func)
            .map_err(Error::from)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Block until the thread finishes. Joining a thread that was never dispatched or is already joined does nothing.
    /// # Errors
    /// * Fails with [`Error::ThreadPanicked`] if the thread panicked.
    pub fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            None => Ok(()),
            Some(handle) => handle
                .join()
                .map_err(|_| Error::ThreadPanicked(self.name.clone()).into()),
        }
    }

    /// Whether the thread was dispatched and not yet joined.
    pub fn is_joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// The id of the OS thread, if it is running.
    pub fn id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|handle| handle.thread().id())
    }

    /// The name of this thread.
    pub fn name(&self) -> &str {
        &self.name
    }
}
