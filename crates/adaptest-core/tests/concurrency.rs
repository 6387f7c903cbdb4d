//! Concurrent access to the engine from many threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use adaptest_core::bank::ItemBank;
use adaptest_core::config::EngineSettings;
use adaptest_core::engine::{AssessmentEngine, NextItem};
use adaptest_core::error::EngineError;
use adaptest_core::irt::Metric;
use adaptest_core::model::{Item, ItemContent, ItemParams};
use adaptest_core::session::{SessionConfig, SessionId, SessionStatus};
use adaptest_core::simulation::{simulate_session, SimulatedExaminee};

fn engine() -> AssessmentEngine {
    let items = (0..50)
        .map(|i| {
            Item::new(
                format!("t{i:02}"),
                if i % 2 == 0 { "verbal" } else { "numeric" },
                ItemParams::new(1.3, -2.5 + 5.0 * i as f64 / 49.0, 0.1),
                ItemContent::default(),
                "a",
            )
            .unwrap()
        })
        .collect();
    let bank = ItemBank::new("threads", "Threads", Metric::NormalOgive, items).unwrap();
    let mut settings = EngineSettings::default();
    settings.selector.seed = Some(17);
    AssessmentEngine::new(bank, settings).unwrap()
}

fn pending_item(engine: &AssessmentEngine, id: SessionId) -> Item {
    match engine.next_item(id).unwrap() {
        NextItem::Item(item) => (*item).clone(),
        NextItem::SessionComplete { reason } => panic!("session stopped early: {reason}"),
    }
}

#[test]
fn duplicate_submissions_record_once() {
    let engine = engine();

    for _ in 0..50 {
        let id = engine.start_session(SessionConfig::default()).unwrap();
        let item = pending_item(&engine, id);
        let accepted = AtomicUsize::new(0);
        let barrier = Barrier::new(4);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    barrier.wait();
                    match engine.submit_outcome(id, item.id(), true, 2_000) {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => assert!(matches!(e, EngineError::UnexpectedResponse { .. })),
                    }
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(engine.snapshot(id).unwrap().responses.len(), 1);
        engine.abandon(id).unwrap();
        engine.archive(id).unwrap();
    }
}

#[test]
fn abandon_races_with_completion() {
    let engine = engine();
    let config = SessionConfig {
        min_items: 1,
        max_items: 1,
        ..SessionConfig::default()
    };

    for _ in 0..50 {
        let id = engine.start_session(config.clone()).unwrap();
        let item = pending_item(&engine, id);
        let barrier = Barrier::new(2);

        let (submitted, abandoned) = std::thread::scope(|s| {
            let submit = s.spawn(|| {
                barrier.wait();
                engine.submit_outcome(id, item.id(), false, 2_000)
            });
            let abandon = s.spawn(|| {
                barrier.wait();
                engine.abandon(id)
            });
            (submit.join().unwrap(), abandon.join().unwrap())
        });

        let status = engine.snapshot(id).unwrap().status;
        match (submitted, abandoned) {
            (Ok(outcome), Err(EngineError::InvalidSessionState { .. })) => {
                assert!(outcome.stopped);
                assert_eq!(status, SessionStatus::Completed);
                assert!(engine.get_report(id).is_ok());
            }
            (Err(EngineError::InvalidSessionState { .. }), Ok(())) => {
                assert_eq!(status, SessionStatus::Abandoned);
                assert!(engine.get_report(id).is_err());
            }
            other => panic!("both or neither operation won: {other:?}"),
        }
        engine.archive(id).unwrap();
    }
}

#[test]
fn independent_sessions_run_in_parallel() {
    let engine = engine();
    let config = SessionConfig {
        min_items: 5,
        max_items: 12,
        ..SessionConfig::default()
    };

    let completed = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for worker in 0..8u64 {
            let engine = &engine;
            let config = &config;
            let completed = &completed;
            s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(worker);
                for n in 0..10 {
                    let theta = -2.0 + 0.4 * n as f64;
                    let record = simulate_session(
                        engine,
                        &SimulatedExaminee::new(theta),
                        theta,
                        config.clone(),
                        &mut rng,
                    )
                    .unwrap();
                    assert!(record.items_administered <= 12);
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(completed.load(Ordering::Relaxed), 80);
    assert_eq!(engine.session_count(), 0);
    assert_eq!(engine.active_sessions(), 0);

    let bank = engine.current_bank();
    let issued: u64 = (0..bank.len()).map(|pos| bank.exposure(pos)).sum();
    assert!(issued >= 80 * 5);
}
