use std::panic::{self, AssertUnwindSafe};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use anyhow::Result;

use tandem::{Error, OverflowPolicy, RenderThread, ThreadState, ThreadingPolicy};

mod framework;

fn make_thread<C: Send + 'static>(policy: ThreadingPolicy, context: C) -> RenderThread<C> {
    RenderThread::new(policy, "Test Render Thread", context, 1024, OverflowPolicy::Grow)
}

#[test]
pub fn single_threaded_kick_executes_inline() -> Result<()> {
    framework::init_logging();
    let executed = framework::counter();
    let mut thread = make_thread(ThreadingPolicy::SingleThreaded, ());
    thread.run()?;
    assert!(thread.is_render_thread());

    let bump = framework::bump(&executed);
    thread.submit(move |_| bump())?;
    thread.next_frame()?;
    assert_eq!(framework::count(&executed), 0);
    thread.kick()?;
    assert_eq!(framework::count(&executed), 1);
    assert_eq!(thread.state(), ThreadState::Idle);
    // Nothing to wait for.
    thread.block_until_render_complete()?;
    thread.terminate()
}

#[test]
pub fn single_threaded_commands_mutate_context() -> Result<()> {
    let mut thread = make_thread(ThreadingPolicy::SingleThreaded, Vec::new());
    thread.run()?;
    for i in 0..3 {
        thread.submit(move |log: &mut Vec<i32>| log.push(i))?;
    }
    thread.pump()?;
    assert_eq!(thread.context_mut().map(|log| log.clone()), Some(vec![0, 1, 2]));
    thread.terminate()
}

#[test]
pub fn multi_threaded_end_to_end() -> Result<()> {
    framework::init_logging();
    let executed = framework::counter();
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;
    assert!(!thread.is_render_thread());
    assert!(thread.context_mut().is_none());

    for _ in 0..3 {
        let bump = framework::bump(&executed);
        thread.submit(move |_| bump())?;
    }
    thread.next_frame()?;
    thread.kick()?;
    thread.block_until_render_complete()?;
    assert_eq!(framework::count(&executed), 3);
    assert_eq!(thread.state(), ThreadState::Idle);

    thread.terminate()?;
    assert_eq!(thread.state(), ThreadState::Joined);
    assert!(!thread.is_running());
    Ok(())
}

#[test]
pub fn commands_run_on_render_thread() -> Result<()> {
    let seen = Arc::new(Mutex::new(None));
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;
    let captured = seen.clone();
    thread.submit(move |_| {
        let current = std::thread::current();
        *captured.lock().unwrap() = Some((current.id(), current.name().map(String::from)));
    })?;
    thread.pump()?;
    let (id, name) = seen.lock().unwrap().clone().expect("command should have run");
    assert_ne!(id, std::thread::current().id());
    assert_eq!(name.as_deref(), Some("Test Render Thread"));
    thread.terminate()
}

#[test]
pub fn frames_execute_in_order() -> Result<()> {
    let sequence = Arc::new(Mutex::new(Vec::new()));
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;
    for frame in 0..10 {
        for command in 0..4 {
            let sequence = sequence.clone();
            thread.submit(move |_| sequence.lock().unwrap().push((frame, command)))?;
        }
        // Overlap recording of this frame with execution of the previous one.
        thread.block_until_render_complete()?;
        thread.next_frame()?;
        thread.kick()?;
    }
    thread.block_until_render_complete()?;
    let expected = (0..10)
        .flat_map(|frame| (0..4).map(move |command| (frame, command)))
        .collect::<Vec<_>>();
    assert_eq!(*sequence.lock().unwrap(), expected);
    assert_eq!(thread.app_frame(), 10);
    thread.terminate()
}

#[test]
pub fn next_frame_without_kick_merges_frames() -> Result<()> {
    for policy in [ThreadingPolicy::SingleThreaded, ThreadingPolicy::MultiThreaded] {
        let sequence = Arc::new(Mutex::new(Vec::new()));
        let mut thread = make_thread(policy, ());
        thread.run()?;
        for i in 0..3 {
            let sequence = sequence.clone();
            thread.submit(move |_| sequence.lock().unwrap().push(i))?;
            thread.next_frame()?;
        }
        thread.kick()?;
        thread.block_until_render_complete()?;
        assert_eq!(*sequence.lock().unwrap(), [0, 1, 2]);
        thread.terminate()?;
    }
    Ok(())
}

#[test]
pub fn terminate_executes_remaining_commands() -> Result<()> {
    let executed = framework::counter();
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;
    let bump = framework::bump(&executed);
    thread.submit(move |_| bump())?;
    thread.terminate()?;
    assert_eq!(framework::count(&executed), 1);
    Ok(())
}

#[test]
pub fn context_is_dropped_on_render_thread_exit() -> Result<()> {
    let (context, drops) = framework::DropCounter::new();
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, context);
    thread.run()?;
    thread.pump()?;
    assert_eq!(framework::count(&drops), 0);
    thread.terminate()?;
    assert_eq!(framework::count(&drops), 1);
    Ok(())
}

#[test]
pub fn redundant_calls_are_noops() -> Result<()> {
    for policy in [ThreadingPolicy::SingleThreaded, ThreadingPolicy::MultiThreaded] {
        let mut thread = make_thread(policy, ());
        thread.run()?;
        // Blocking while idle and kicking without a finished frame do nothing.
        thread.block_until_render_complete()?;
        thread.kick()?;
        thread.block_until_render_complete()?;
        assert_eq!(thread.state(), ThreadState::Idle);
        thread.terminate()?;
        // Terminating twice does nothing either.
        thread.terminate()?;
    }
    Ok(())
}

#[test]
pub fn kick_before_run_fails() -> Result<()> {
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.submit(|_| {})?;
    thread.next_frame()?;
    let err = thread.kick().expect_err("kick requires a running render thread");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::RenderThreadNotRunning)));
    // Terminating a thread that never ran does nothing.
    thread.terminate()?;
    Ok(())
}

#[test]
pub fn run_twice_fails() -> Result<()> {
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;
    let err = thread.run().expect_err("run can only be called once");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::RenderThreadAlreadyRunning)));
    thread.terminate()
}

#[test]
pub fn drop_joins_render_thread() -> Result<()> {
    let executed = Arc::new(AtomicUsize::new(0));
    {
        let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
        thread.run()?;
        let executed = executed.clone();
        thread.submit(move |_| {
            executed.fetch_add(1, Ordering::SeqCst);
        })?;
    }
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
pub fn render_thread_is_busy_while_executing() -> Result<()> {
    framework::init_logging();
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let executed = framework::counter();
    let mut thread = make_thread(ThreadingPolicy::MultiThreaded, ());
    thread.run()?;

    let (command_started, command_release) = (started.clone(), release.clone());
    let bump = framework::bump(&executed);
    thread.submit(move |_| {
        command_started.wait();
        command_release.wait();
        std::thread::sleep(Duration::from_millis(50));
        bump();
    })?;
    thread.next_frame()?;
    thread.kick()?;

    started.wait();
    assert_eq!(thread.state(), ThreadState::Busy);
    release.wait();
    thread.block_until_render_complete()?;
    assert_eq!(framework::count(&executed), 1);
    assert_eq!(thread.state(), ThreadState::Idle);
    thread.terminate()
}

/// Set in the environment of the child process that is expected to abort.
const ABORTING_CHILD: &str = "TANDEM_ABORTING_CHILD";

/// Re-runs the test named `name` in a child process and checks that it was aborted.
fn assert_test_aborts(name: &str) -> Result<()> {
    let output = Command::new(std::env::current_exe()?)
        .args(["--exact", name, "--test-threads=1", "--nocapture"])
        .env(ABORTING_CHILD, "1")
        .output()?;
    assert!(!output.status.success(), "the child process survived a panicking render command");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // SIGABRT
        assert_eq!(output.status.signal(), Some(6));
    }
    Ok(())
}

fn panic_in_render_command(policy: ThreadingPolicy) -> Result<()> {
    let mut thread = make_thread(policy, ());
    thread.run()?;
    thread.submit(|_| panic!("render command failed"))?;
    let _ = panic::catch_unwind(AssertUnwindSafe(|| thread.pump()));
    // Only reached if the process kept running after the fault.
    std::process::exit(0);
}

#[test]
pub fn single_threaded_panic_aborts_process() -> Result<()> {
    if std::env::var_os(ABORTING_CHILD).is_some() {
        return panic_in_render_command(ThreadingPolicy::SingleThreaded);
    }
    assert_test_aborts("single_threaded_panic_aborts_process")
}

#[test]
pub fn multi_threaded_panic_aborts_process() -> Result<()> {
    if std::env::var_os(ABORTING_CHILD).is_some() {
        return panic_in_render_command(ThreadingPolicy::MultiThreaded);
    }
    assert_test_aborts("multi_threaded_panic_aborts_process")
}
