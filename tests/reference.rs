use std::thread;

use anyhow::Result;

use tandem::{LiveRegistry, Ref};

mod framework;

#[test]
pub fn destructor_runs_once_after_copies() -> Result<()> {
    framework::init_logging();
    let registry = LiveRegistry::new();
    let (payload, drops) = framework::DropCounter::new();
    let original = registry.create(payload);

    let mut copies = (0..10).map(|_| original.clone()).collect::<Vec<_>>();
    assert_eq!(original.ref_count(), 11);
    copies.clear();
    assert_eq!(original.ref_count(), 1);
    assert_eq!(framework::count(&drops), 0);

    drop(original);
    assert_eq!(framework::count(&drops), 1);
    assert_eq!(registry.live_count(), 0);
    Ok(())
}

#[test]
pub fn weak_ref_is_invalid_after_last_drop() -> Result<()> {
    let registry = LiveRegistry::new();
    let strong = registry.create(42u32);
    let copy = strong.clone();
    let weak = strong.downgrade();
    assert!(weak.is_valid());

    drop(strong);
    assert!(weak.is_valid(), "a strong copy is still alive");
    drop(copy);
    assert!(!weak.is_valid());
    assert!(weak.upgrade().is_none());
    Ok(())
}

#[test]
pub fn upgrade_keeps_object_alive() -> Result<()> {
    let registry = LiveRegistry::new();
    let (payload, drops) = framework::DropCounter::new();
    let strong = registry.create(payload);
    let weak = strong.downgrade();

    let upgraded = weak.upgrade().expect("object is alive");
    assert!(upgraded.ptr_eq(&strong));
    drop(strong);
    assert_eq!(framework::count(&drops), 0);
    assert!(weak.is_valid());

    drop(upgraded);
    assert_eq!(framework::count(&drops), 1);
    assert!(!weak.is_valid());
    Ok(())
}

#[test]
pub fn registry_tracks_live_objects() -> Result<()> {
    let registry = LiveRegistry::new();
    let objects = (0..100).map(|i| registry.create(i)).collect::<Vec<Ref<i32>>>();
    assert_eq!(registry.live_count(), 100);
    assert!(objects.iter().all(|object| registry.is_live(object.as_ptr())));

    let address = objects[0].as_ptr();
    drop(objects);
    assert_eq!(registry.live_count(), 0);
    assert!(!registry.is_live(address));
    Ok(())
}

#[test]
pub fn separate_registries_do_not_share_objects() -> Result<()> {
    let first = LiveRegistry::new();
    let second = LiveRegistry::new();
    let object = first.create(String::from("texture"));
    assert!(first.is_live(object.as_ptr()));
    assert!(!second.is_live(object.as_ptr()));
    assert_eq!(second.live_count(), 0);
    Ok(())
}

#[test]
pub fn weak_ref_survives_address_reuse() -> Result<()> {
    let registry = LiveRegistry::new();
    let weak = registry.create(1u64).downgrade();
    assert!(!weak.is_valid());
    // New objects may land on the old address, they must not revive the old observer.
    let newer = (0..16).map(|i| registry.create(i as u64)).collect::<Vec<_>>();
    assert!(!weak.is_valid());
    assert_eq!(registry.live_count(), newer.len());
    Ok(())
}

#[test]
pub fn concurrent_copies_destroy_once() -> Result<()> {
    framework::init_logging();
    let registry = LiveRegistry::new();
    let (payload, drops) = framework::DropCounter::new();
    let shared = registry.create(payload);
    let weak = shared.downgrade();

    let workers = (0..8)
        .map(|_| {
            let shared = shared.clone();
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let copies = (0..4).map(|_| shared.clone()).collect::<Vec<_>>();
                    let temporary = registry.create(i);
                    drop(temporary);
                    drop(copies);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("worker should not panic");
    }

    assert_eq!(shared.ref_count(), 1);
    assert!(weak.is_valid());
    drop(shared);
    assert_eq!(framework::count(&drops), 1);
    assert!(!weak.is_valid());
    assert_eq!(registry.live_count(), 0);
    Ok(())
}
