#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use tandem::{AcquiredImage, FrameTarget, PresentStatus};

/// Installs a logger so test output shows the crate's log messages. Safe to call from every test.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Everything the mock frame target was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WaitForSlot(usize),
    Acquire(usize),
    Recreate,
    Submit(usize, u32),
    Present(usize, u32),
    WaitIdle,
    /// Recorded by test code, to order its own side effects against the target's calls.
    Marker(&'static str),
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<Event>,
    acquire_out_of_date: usize,
    present_out_of_date: usize,
}

/// Shared view on a [`MockTarget`] that stays usable after the target moved into a pacer or renderer.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().events.clear();
    }

    /// The next `count` acquires report an out of date swapchain.
    pub fn fail_acquires(&self, count: usize) {
        self.state.lock().unwrap().acquire_out_of_date = count;
    }

    /// The next `count` presents report an out of date swapchain.
    pub fn fail_presents(&self, count: usize) {
        self.state.lock().unwrap().present_out_of_date = count;
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Frame target that records every call instead of talking to a GPU.
#[derive(Debug)]
pub struct MockTarget {
    state: Arc<Mutex<MockState>>,
    image_count: usize,
    slot_count: usize,
    next_image: u32,
}

impl MockTarget {
    pub fn new(image_count: usize, slot_count: usize) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let target = MockTarget {
            state: state.clone(),
            image_count,
            slot_count,
            next_image: 0,
        };
        (target, MockHandle { state })
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl FrameTarget for MockTarget {
    fn image_count(&self) -> usize {
        self.image_count
    }

    fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.record(Event::WaitForSlot(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquiredImage> {
        self.record(Event::Acquire(slot));
        let mut state = self.state.lock().unwrap();
        if state.acquire_out_of_date > 0 {
            state.acquire_out_of_date -= 1;
            return Ok(AcquiredImage {
                index: 0,
                resize_required: true,
            });
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1) as u32;
        Ok(AcquiredImage {
            index,
            resize_required: false,
        })
    }

    fn recreate(&mut self) -> Result<()> {
        self.record(Event::Recreate);
        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        self.record(Event::Submit(slot, image));
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus> {
        self.record(Event::Present(slot, image));
        let mut state = self.state.lock().unwrap();
        if state.present_out_of_date > 0 {
            state.present_out_of_date -= 1;
            return Ok(PresentStatus::OutOfDate);
        }
        Ok(PresentStatus::Presented)
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.record(Event::WaitIdle);
        Ok(())
    }
}

/// Payload that counts how often it was dropped.
#[derive(Debug)]
pub struct DropCounter {
    drops: Arc<AtomicUsize>,
}

impl DropCounter {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            DropCounter {
                drops: drops.clone(),
            },
            drops,
        )
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counter that can be bumped from inside a `'static` closure.
pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn bump(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}
