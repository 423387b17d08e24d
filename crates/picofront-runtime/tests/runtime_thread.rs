mod common;

use common::{Rig, config};
use picofront_runtime::{EngineState, PersistError, Runtime, RuntimeError};

#[test]
fn control_calls_round_trip_through_the_emulation_thread() {
    let rig = Rig::new("thread", 2_000, None);
    let root = rig.root.clone();
    let log = rig.log.clone();

    let runtime = Runtime::start(config(), move || Ok(rig.session().0)).unwrap();
    let handle = runtime.handle();

    handle.save_state(2).unwrap();
    assert!(root.join("mds/game.2.mds").is_file());

    assert!(matches!(
        handle.select_slot(12),
        Err(RuntimeError::InvalidSlot(12))
    ));
    assert!(matches!(
        handle.save_state(10),
        Err(RuntimeError::InvalidSlot(10))
    ));
    assert!(matches!(
        handle.load_state(7),
        Err(RuntimeError::Persist(PersistError::MissingFile { .. }))
    ));
    handle.load_state(2).unwrap();

    handle.pause().unwrap();
    assert_eq!(handle.state(), EngineState::Paused);
    handle.menu().unwrap();
    assert_eq!(handle.state(), EngineState::Menu);

    // Persistence keeps working while the loop is parked.
    handle.save_state(3).unwrap();
    assert!(root.join("mds/game.3.mds").is_file());

    handle.resume().unwrap();
    assert_eq!(handle.state(), EngineState::Running);
    handle.set_fast_forward(true).unwrap();
    assert!(handle.stats().fast_forward);
    handle.set_fast_forward(false).unwrap();

    handle.quit();
    runtime.join();

    assert_eq!(handle.state(), EngineState::Quit);
    assert!(handle.stats().frames_rendered > 0);
    assert!(!handle.stats().fast_forward);
    assert_eq!(log.lock().loop_ends, 2);
}

#[test]
fn build_failure_is_returned_from_start() {
    let res = Runtime::start(config(), || {
        Err(RuntimeError::Platform("no display".to_string()))
    });
    assert!(matches!(res, Err(RuntimeError::Platform(_))));
}

#[test]
fn dropping_the_runtime_stops_the_thread() {
    let rig = Rig::new("drop", 2_000, None);

    let runtime = Runtime::start(config(), move || Ok(rig.session().0)).unwrap();
    let handle = runtime.handle();
    drop(runtime);

    assert_eq!(handle.state(), EngineState::Quit);
    assert!(handle.save_state(0).is_err());
}
