//! Exposes the [`CommandQueue`], a drain-to-empty queue of deferred closures.
//!
//! A command queue accepts arbitrary value-captured closures and replays them, in push order, when it is executed.
//! Executing a queue always drains it completely: after [`CommandQueue::execute_with()`] returns the queue is empty
//! and can be filled again. It is not a ring buffer.
//!
//! Commands receive a mutable reference to a context object owned by whoever executes the queue. The render thread
//! uses this to hand commands the [`FramePacer`](crate::FramePacer). Queues that need no context use `()`.
//!
//! # Example
//! ```
//! # use tandem::*;
//! let mut queue = CommandQueue::<Vec<u32>>::new(1024, OverflowPolicy::Grow);
//! queue.push(|log: &mut Vec<u32>| log.push(1))?;
//! queue.push(|log: &mut Vec<u32>| log.push(2))?;
//!
//! let mut log = Vec::new();
//! queue.execute_with(&mut log);
//! assert_eq!(log, [1, 2]);
//! assert!(queue.is_empty());
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::mem;

use anyhow::Result;

use crate::Error;

/// What a [`CommandQueue`] does when a pushed command does not fit in its byte capacity.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Double the capacity until the command fits. Every growth is logged as a warning.
    #[default]
    Grow,
    /// Reject the command with [`Error::CommandQueueOverflow`]. The queue is left unchanged.
    Fail,
}

type CommandFn<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Bytes charged for every command on top of its captured payload.
pub const COMMAND_HEADER_SIZE: usize = mem::size_of::<CommandFn<()>>() + mem::size_of::<usize>();

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct Command<C> {
    #[derivative(Debug = "ignore")]
    func: CommandFn<C>,
    size: usize,
}

/// Append-only queue of deferred commands, drained to empty every time it is executed.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct CommandQueue<C = ()> {
    commands: Vec<Command<C>>,
    used: usize,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<C> CommandQueue<C> {
    /// Create a new, empty command queue with a byte capacity and an overflow policy.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        CommandQueue {
            commands: Vec::new(),
            used: 0,
            capacity,
            policy,
        }
    }

    /// Push a command onto the queue. The closure is stored until the queue is executed, so it must own everything
    /// it needs. Capture a [`Ref`](crate::Ref) by value to keep a shared object alive until then.
    /// # Errors
    /// * Fails with [`Error::CommandQueueOverflow`] if the command does not fit and the policy is [`OverflowPolicy::Fail`].
    pub fn push<F>(&mut self, func: F) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static, {
        let size = COMMAND_HEADER_SIZE + mem::size_of::<F>();
        self.reserve(size)?;
        self.commands.push(Command {
            func: Box::new(func),
            size,
        });
        self.used += size;
        Ok(())
    }

    /// Moves all commands of `other` to the back of this queue, leaving `other` empty.
    /// # Errors
    /// * Fails with [`Error::CommandQueueOverflow`] if the commands do not fit and the policy is [`OverflowPolicy::Fail`].
    ///   Both queues are left unchanged in that case.
    pub fn append(&mut self, other: &mut CommandQueue<C>) -> Result<()> {
        self.reserve(other.used)?;
        self.used += other.used;
        self.commands.append(&mut other.commands);
        other.used = 0;
        Ok(())
    }

    /// Invoke every command in push order, then reset the queue. Each closure is consumed by its call, so everything
    /// it captured is dropped right after it runs. Executing an empty queue does nothing.
    pub fn execute_with(&mut self, ctx: &mut C) {
        for command in self.commands.drain(..) {
            (command.func)(ctx);
        }
        self.used = 0;
    }

    /// Amount of commands waiting to be executed.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether there are no commands waiting to be executed.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Bytes currently used by queued commands.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The overflow policy of this queue.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.policy
    }

    fn reserve(&mut self, size: usize) -> Result<()> {
        let requested = self.used + size;
        if requested <= self.capacity {
            return Ok(());
        }

        match self.policy {
            OverflowPolicy::Grow => {
                let mut capacity = self.capacity.max(1);
                while capacity < requested {
                    capacity *= 2;
                }
                warn!(
                    "Command queue grew from {} to {} bytes. Consider raising its initial capacity.",
                    self.capacity, capacity
                );
                self.capacity = capacity;
                Ok(())
            }
            OverflowPolicy::Fail => Err(Error::CommandQueueOverflow {
                capacity: self.capacity,
                requested,
            }
            .into()),
        }
    }
}

impl CommandQueue<()> {
    /// Execute a queue that needs no context. See [`CommandQueue::execute_with()`].
    pub fn execute(&mut self) {
        self.execute_with(&mut ());
    }
}

impl<C> Drop for CommandQueue<C> {
    fn drop(&mut self) {
        if !self.commands.is_empty() {
            warn!("Dropping command queue with {} commands that were never executed.", self.commands.len());
        }
    }
}
