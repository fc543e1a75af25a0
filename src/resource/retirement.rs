//! Deferred destruction of GPU resources, one queue per frame in flight.
//!
//! A command buffer that was submitted for frame slot `K` may still be executing on the GPU long after the CPU moved
//! on. Destroying a resource it references at that point is a GPU use-after-free. Instead, destructors are queued for
//! the slot that is current when the resource is released, and only run when that slot is reused, after its fence
//! proved that the GPU finished every command buffer submitted with it.
//!
//! Destructors can be queued from any thread through a [`ResourceReleaser`]. These arrive over a channel and are moved
//! into the current slot by the render thread when it finishes a frame.
//!
//! Every method taking a `slot` panics if it is not smaller than [`ResourceRetirement::slot_count()`].

use anyhow::Result;
use crossbeam_channel::{Receiver, SendError, Sender, TryRecvError};

use crate::{CommandQueue, Error, OverflowPolicy};

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Per-slot queues of destructor closures.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ResourceRetirement {
    slots: Vec<CommandQueue>,
    #[derivative(Debug = "ignore")]
    sender: Sender<ReleaseFn>,
    #[derivative(Debug = "ignore")]
    incoming: Receiver<ReleaseFn>,
}

impl ResourceRetirement {
    /// Create one retirement queue per frame in flight.
    /// # Errors
    /// * Fails with [`Error::InvalidFramesInFlight`] if `frames_in_flight` is zero.
    pub fn new(frames_in_flight: usize, capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InvalidFramesInFlight(frames_in_flight).into());
        }
        let (sender, incoming) = crossbeam_channel::unbounded();
        Ok(ResourceRetirement {
            slots: (0..frames_in_flight)
                .map(|_| CommandQueue::new(capacity, policy))
                .collect(),
            sender,
            incoming,
        })
    }

    /// Obtain a handle that can queue destructors from any thread.
    pub fn releaser(&self) -> ResourceReleaser {
        ResourceReleaser {
            sender: self.sender.clone(),
        }
    }

    /// Queue a destructor directly into `slot`. Only the thread owning the retirement queues can do this, other
    /// threads go through a [`ResourceReleaser`].
    /// # Panics
    /// * Panics if `slot` is out of range.
    pub fn push(&mut self, slot: usize, func: impl FnOnce() + Send + 'static) -> Result<()> {
        self.slots[slot].push(move |_: &mut ()| func())
    }

    /// Move every destructor that arrived through a [`ResourceReleaser`] into `slot`.
    /// # Panics
    /// * Panics if `slot` is out of range.
    pub fn collect(&mut self, slot: usize) -> Result<()> {
        loop {
            match self.incoming.try_recv() {
                Ok(func) => self.slots[slot].push(move |_: &mut ()| func())?,
                // We hold a sender ourselves, so the channel never disconnects.
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Run every destructor queued for `slot`. Must only be called once the GPU finished all work submitted for it.
    /// # Panics
    /// * Panics if `slot` is out of range.
    pub fn execute(&mut self, slot: usize) {
        self.slots[slot].execute();
    }

    /// Run every queued destructor in every slot, including those still in transit. Must only be called while the
    /// device is idle.
    pub fn flush(&mut self) {
        for func in self.incoming.try_iter() {
            func();
        }
        for slot in &mut self.slots {
            slot.execute();
        }
    }

    /// Amount of destructors waiting in `slot`.
    /// # Panics
    /// * Panics if `slot` is out of range.
    pub fn pending(&self, slot: usize) -> usize {
        self.slots[slot].len()
    }

    /// Amount of frame slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Cloneable handle used to queue resource destructors from any thread.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ResourceReleaser {
    #[derivative(Debug = "ignore")]
    sender: Sender<ReleaseFn>,
}

impl ResourceReleaser {
    /// Queue `func` to run once the GPU can no longer be using the resource it destroys. The destructor should only
    /// capture native handles.
    ///
    /// If the owning [`ResourceRetirement`] is gone the device was already flushed, so `func` runs immediately.
    pub fn release(&self, func: impl FnOnce() + Send + 'static) {
        if let Err(SendError(func)) = self.sender.send(Box::new(func)) {
            warn!("Resource released after the renderer shut down, destroying it immediately.");
            func();
        }
    }
}

static_assertions::assert_impl_all!(ResourceReleaser: Send, Sync, Clone);
