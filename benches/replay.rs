//! Benchmarks for stepping and replay verification.
//!
//! The verifier replays as fast as it can, so ticks per second here is the
//! server's verification throughput.

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use fortress_sim::{
    game::{
        arena::{simulate_battle, BattleConfig},
        config::{Loadout, SimConfig},
        engine::Engine,
        events::EventLog,
    },
    network::{autopilot, Session, SessionTicket},
    proof::{AuditTicks, ReplayVerifier, SegmentSubmission},
};

fn first_submission(seed: i32) -> SegmentSubmission {
    let mut session = Session::start(SessionTicket {
        token: "bench".into(),
        seed,
        audit_ticks: AuditTicks::derive(b"bench", seed, 3_000, 8),
        config: SimConfig::endless(),
    });
    loop {
        let commands = autopilot(session.state());
        if let Some(closed) = session.step(&commands).unwrap().closed {
            return closed;
        }
    }
}

fn bench_step(c: &mut Criterion) {
    c.bench_function("step_1800_ticks", |b| {
        b.iter(|| {
            let mut engine = Engine::new(black_box(12345), SimConfig::endless());
            let log = EventLog::from_events(vec![fortress_sim::GameEvent::new(
                1,
                fortress_sim::Command::ChooseRelic { wave: 1, option_index: 0 },
            )])
            .unwrap();
            black_box(engine.run_until(&log, 1_800).unwrap())
        });
    });
}

fn bench_verify_segment(c: &mut Criterion) {
    let submission = first_submission(42);
    let verifier = ReplayVerifier::default();
    let audit = AuditTicks::derive(b"bench", 42, 3_000, 8);
    let config = SimConfig::endless();

    c.bench_function("verify_first_segment", |b| {
        b.iter(|| {
            let verdict = verifier.verify_from_seed(
                42,
                &config,
                &audit,
                &[],
                black_box(&submission.segment),
                submission.summary.as_ref(),
            );
            black_box(verdict)
        });
    });
}

fn bench_arena(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let seeds: Vec<i32> = (0..10).map(|_| rng.gen()).collect();
    let loadout = Loadout::default();
    let config = BattleConfig::arena();

    c.bench_function("arena_10_battles", |b| {
        b.iter(|| {
            for seed in &seeds {
                black_box(simulate_battle(*seed, &loadout, &loadout, &config));
            }
        });
    });
}

criterion_group!(benches, bench_step, bench_verify_segment, bench_arena);
criterion_main!(benches);
