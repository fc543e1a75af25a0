//! Exposes the [`RenderThread`], which hands render commands from a producer thread to a consumer.
//!
//! Two [`CommandQueue`]s are used in turns. The producer fills one of them with [`RenderThread::submit()`] while
//! the consumer drains the other. [`RenderThread::next_frame()`] swaps them and [`RenderThread::kick()`] tells the
//! consumer to start on the swapped-out queue. Because a queue is only ever owned by one side at a time, submitting
//! a command never takes a lock.
//!
//! Under [`ThreadingPolicy::MultiThreaded`] the consumer is a dedicated OS thread. The filled queue travels to it
//! over a channel and comes back empty over a second one. Under [`ThreadingPolicy::SingleThreaded`] there is no
//! thread at all: kicking drains the queue inline, and waiting returns immediately.
//!
//! # Example
//! ```
//! # use tandem::*;
//! # use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//! let executed = Arc::new(AtomicU32::new(0));
//! let mut thread = RenderThread::new(ThreadingPolicy::MultiThreaded, "Render Thread", (), 1024, OverflowPolicy::Grow);
//! thread.run()?;
//! for _ in 0..3 {
//!     let executed = executed.clone();
//!     thread.submit(move |_: &mut ()| { executed.fetch_add(1, Ordering::SeqCst); })?;
//! }
//! thread.next_frame()?;
//! thread.kick()?;
//! thread.block_until_render_complete()?;
//! assert_eq!(executed.load(Ordering::SeqCst), 3);
//! thread.terminate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};

use crate::{CommandQueue, CommandThread, Error, OverflowPolicy};

/// Whether render commands get their own OS thread.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ThreadingPolicy {
    /// No render thread. Every coordination call runs synchronously on the caller.
    SingleThreaded,
    /// Commands are executed on a dedicated render thread.
    #[default]
    MultiThreaded,
}

/// Hand-off state between the producer and the render thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// The render thread is waiting for work.
    Idle,
    /// The producer handed over a frame that was not picked up yet.
    Kick,
    /// The render thread is executing a frame.
    Busy,
    /// The render thread has shut down.
    Joined,
}

#[derive(Debug)]
struct StateSignal {
    state: Mutex<ThreadState>,
    changed: Condvar,
}

impl StateSignal {
    fn new() -> Self {
        StateSignal {
            state: Mutex::new(ThreadState::Idle),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> ThreadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ThreadState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *current = state;
        self.changed.notify_all();
    }

    /// Blocks until the render thread is neither kicked nor busy.
    fn wait_until_settled(&self) -> ThreadState {
        let current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self
            .changed
            .wait_while(current, |state| matches!(state, ThreadState::Kick | ThreadState::Busy))
            .unwrap_or_else(PoisonError::into_inner);
        *current
    }
}

/// Coordinates a producer thread submitting render commands with the consumer executing them.
/// `C` is the context every command receives, owned by the consumer.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RenderThread<C: Send + 'static> {
    policy: ThreadingPolicy,
    thread: CommandThread,
    signal: Arc<StateSignal>,
    /// Queue the producer is currently filling.
    submission: CommandQueue<C>,
    /// Swapped-out queue waiting for a kick.
    pending: Option<CommandQueue<C>>,
    /// Empty queue ready to be swapped in.
    spare: Option<CommandQueue<C>>,
    #[derivative(Debug = "ignore")]
    kicks: Option<Sender<CommandQueue<C>>>,
    #[derivative(Debug = "ignore")]
    recycled: Option<Receiver<CommandQueue<C>>>,
    #[derivative(Debug = "ignore")]
    context: Option<C>,
    render_thread_id: Option<ThreadId>,
    app_frame: u64,
    running: bool,
}

impl<C: Send + 'static> RenderThread<C> {
    /// Create a new render thread. Nothing is spawned until [`RenderThread::run()`] is called.
    /// Both command queues are created with the given byte capacity and overflow policy.
    pub fn new(policy: ThreadingPolicy, name: impl Into<String>, context: C, capacity: usize, overflow: OverflowPolicy) -> Self {
        RenderThread {
            policy,
            thread: CommandThread::new(name),
            signal: Arc::new(StateSignal::new()),
            submission: CommandQueue::new(capacity, overflow),
            pending: None,
            spare: Some(CommandQueue::new(capacity, overflow)),
            kicks: None,
            recycled: None,
            context: Some(context),
            render_thread_id: None,
            app_frame: 0,
            running: false,
        }
    }

    /// Start consuming commands. Under [`ThreadingPolicy::MultiThreaded`] this spawns the render thread and moves the
    /// command context to it. Under [`ThreadingPolicy::SingleThreaded`] the calling thread becomes the render thread.
    /// # Errors
    /// * Fails with [`Error::RenderThreadAlreadyRunning`] if called twice.
    /// * Fails if the OS thread cannot be spawned.
    pub fn run(&mut self) -> Result<()> {
        if self.running || self.thread.is_joinable() {
            return Err(Error::RenderThreadAlreadyRunning.into());
        }

        match self.policy {
            ThreadingPolicy::SingleThreaded => {
                self.render_thread_id = Some(thread::current().id());
            }
            ThreadingPolicy::MultiThreaded => {
                let context = self.context.take().ok_or(Error::RenderThreadJoined)?;
                let (kick_tx, kick_rx) = crossbeam_channel::unbounded();
                let (recycle_tx, recycle_rx) = crossbeam_channel::unbounded();
                let signal = self.signal.clone();
                self.thread
                    .dispatch(move || render_loop(context, kick_rx, recycle_tx, signal))?;
                self.kicks = Some(kick_tx);
                self.recycled = Some(recycle_rx);
                self.render_thread_id = self.thread.id();
                info!("Started render thread `{}`", self.thread.name());
            }
        }

        self.signal.set(ThreadState::Idle);
        self.running = true;
        Ok(())
    }

    /// Queue a command for the frame currently being recorded.
    /// # Errors
    /// * Fails if the command does not fit and the queue uses [`OverflowPolicy::Fail`].
    pub fn submit<F>(&mut self, func: F) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static, {
        self.submission.push(func)
    }

    /// Finish recording the current frame. The filled queue becomes the snapshot the next [`RenderThread::kick()`]
    /// hands to the consumer and recording continues into an empty queue.
    ///
    /// If the consumer still owns the other queue this blocks until it hands it back. If the previous snapshot was
    /// never kicked, the new commands are appended to it instead, keeping their order.
    /// # Errors
    /// * Fails with [`Error::RenderThreadJoined`] if the render thread exited while holding the other queue.
    pub fn next_frame(&mut self) -> Result<()> {
        self.app_frame += 1;

        if let Some(pending) = self.pending.as_mut() {
            debug!("next_frame() called twice without kick(), merging frames");
            return pending.append(&mut self.submission);
        }

        let fresh = self.take_spare()?;
        let filled = mem::replace(&mut self.submission, fresh);
        self.pending = Some(filled);
        Ok(())
    }

    /// Hand the last finished frame to the consumer. Under [`ThreadingPolicy::SingleThreaded`] the frame is executed
    /// before this returns. Kicking without a finished frame does nothing.
    ///
    /// A panicking render command aborts the process under both policies.
    /// # Errors
    /// * Fails with [`Error::RenderThreadNotRunning`] if [`RenderThread::run()`] was not called.
    /// * Fails with [`Error::RenderThreadJoined`] if the render thread has exited.
    pub fn kick(&mut self) -> Result<()> {
        if !self.running && self.render_thread_id.is_none() {
            return Err(Error::RenderThreadNotRunning.into());
        }

        let Some(mut queue) = self.pending.take() else {
            debug!("kick() called without a finished frame");
            return Ok(());
        };

        match self.policy {
            ThreadingPolicy::SingleThreaded => {
                let context = self.context.as_mut().ok_or(Error::RenderThreadJoined)?;
                self.signal.set(ThreadState::Busy);
                execute_or_abort(&mut queue, context);
                self.signal.set(ThreadState::Idle);
                self.spare = Some(queue);
            }
            ThreadingPolicy::MultiThreaded => {
                let kicks = self.kicks.as_ref().ok_or(Error::RenderThreadJoined)?;
                self.signal.set(ThreadState::Kick);
                if kicks.send(queue).is_err() {
                    self.signal.set(ThreadState::Joined);
                    return Err(Error::RenderThreadJoined.into());
                }
            }
        }
        Ok(())
    }

    /// Block until the consumer has finished the last kicked frame. Returns immediately when it is already idle and
    /// under [`ThreadingPolicy::SingleThreaded`].
    pub fn block_until_render_complete(&self) -> Result<()> {
        if self.policy == ThreadingPolicy::SingleThreaded {
            return Ok(());
        }
        if self.signal.wait_until_settled() == ThreadState::Joined && self.running {
            return Err(Error::RenderThreadJoined.into());
        }
        Ok(())
    }

    /// Render exactly one frame and wait for it: [`RenderThread::next_frame()`], [`RenderThread::kick()`] and
    /// [`RenderThread::block_until_render_complete()`].
    pub fn pump(&mut self) -> Result<()> {
        self.next_frame()?;
        self.kick()?;
        self.block_until_render_complete()
    }

    /// Shut the render thread down. Everything submitted so far is executed in one final frame, then the render
    /// thread exits and is joined. Terminating a thread that is not running does nothing.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        let result = self.pump();

        // Closing the kick channel ends the render loop.
        self.kicks = None;
        self.thread.join()?;
        self.signal.set(ThreadState::Joined);
        self.render_thread_id = None;
        if self.policy == ThreadingPolicy::MultiThreaded {
            info!("Joined render thread `{}`", self.thread.name());
        }
        result
    }

    /// Current hand-off state.
    pub fn state(&self) -> ThreadState {
        self.signal.get()
    }

    /// Whether [`RenderThread::run()`] was called and the thread was not terminated yet.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The threading policy this render thread was created with.
    pub fn policy(&self) -> ThreadingPolicy {
        self.policy
    }

    /// Amount of frames finished with [`RenderThread::next_frame()`] so far.
    pub fn app_frame(&self) -> u64 {
        self.app_frame
    }

    /// Amount of commands submitted since the last [`RenderThread::next_frame()`].
    pub fn submitted(&self) -> usize {
        self.submission.len()
    }

    /// Whether the calling thread is the one executing render commands.
    pub fn is_render_thread(&self) -> bool {
        self.render_thread_id == Some(thread::current().id())
    }

    /// Access the command context while no thread owns it. This is always available under
    /// [`ThreadingPolicy::SingleThreaded`], and under [`ThreadingPolicy::MultiThreaded`] before [`RenderThread::run()`].
    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    fn take_spare(&mut self) -> Result<CommandQueue<C>> {
        if let Some(spare) = self.spare.take() {
            return Ok(spare);
        }
        let recycled = self.recycled.as_ref().ok_or(Error::RenderThreadJoined)?;
        recycled.recv().map_err(|_| Error::RenderThreadJoined.into())
    }
}

impl<C: Send + 'static> Drop for RenderThread<C> {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            error!("Failed to terminate render thread `{}`: {err}", self.thread.name());
        }
    }
}

/// Runs every command in `queue`. A panicking render command leaves the frame half recorded, which cannot be
/// recovered from, so the whole process is aborted.
fn execute_or_abort<C>(queue: &mut CommandQueue<C>, context: &mut C) {
    if panic::catch_unwind(AssertUnwindSafe(|| queue.execute_with(context))).is_err() {
        error!("Render command panicked. A partially rendered frame cannot be recovered, aborting.");
        std::process::abort();
    }
}

fn render_loop<C>(mut context: C, kicks: Receiver<CommandQueue<C>>, recycled: Sender<CommandQueue<C>>, signal: Arc<StateSignal>) {
    while let Ok(mut queue) = kicks.recv() {
        signal.set(ThreadState::Busy);
        execute_or_abort(&mut queue, &mut context);
        // Idle must be visible before the queue is handed back, a new kick may follow right after.
        signal.set(ThreadState::Idle);
        if recycled.send(queue).is_err() {
            break;
        }
    }
    signal.set(ThreadState::Joined);
}
