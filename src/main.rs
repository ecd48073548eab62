//! Fortress Sim Demo
//!
//! Plays a run against an in-process registry over a JSON loopback
//! transport, then shows arena battles and batch re-verification.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fortress_sim::{
    CHECKPOINT_INTERVAL, TICK_RATE, VERSION,
    game::{
        arena::{simulate_battle, BattleConfig},
        config::{HeroKind, HeroSlot, Loadout, SimConfig},
        engine::Engine,
        events::EventLog,
    },
    network::{
        autopilot, RegistryConfig, RetryPolicy, SegmentTransport, Session,
        SessionRegistry, TransportError, VerificationJob,
    },
    proof::{AuditTicks, SegmentSubmission, VerdictWire, VerifierConfig},
};

/// Transport that serializes through JSON into an in-process registry.
struct LocalTransport {
    registry: Arc<SessionRegistry>,
}

impl SegmentTransport for LocalTransport {
    async fn send(&self, submission: &SegmentSubmission) -> Result<VerdictWire, TransportError> {
        let body = serde_json::to_string(submission).map_err(|e| TransportError::Malformed(e.to_string()))?;
        let received: SegmentSubmission =
            serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;

        let verdict = self
            .registry
            .submit(received)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let reply = serde_json::to_string(&VerdictWire::from(&verdict))
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        serde_json::from_str(&reply).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Fortress Sim v{}", VERSION);
    info!("Tick Rate: {} Hz, checkpoint every {} ticks", TICK_RATE, CHECKPOINT_INTERVAL);

    let registry = Arc::new(SessionRegistry::new(RegistryConfig {
        verifier: VerifierConfig::from_env(),
        ..Default::default()
    }));
    let pruner = registry.spawn_pruner(std::time::Duration::from_secs(60));

    demo_determinism();
    demo_session(&registry).await?;
    demo_arena();
    demo_batch(&registry).await?;

    pruner.abort();
    Ok(())
}

/// Two engines from the same seed must agree on the chain head.
fn demo_determinism() {
    info!("=== Determinism ===");
    let run = || {
        let mut engine = Engine::new(12345, SimConfig::endless());
        let checkpoints = engine.run_until(&EventLog::new(), 300).unwrap_or_default();
        (checkpoints.len(), engine.chain_head())
    };
    let (count, a) = run();
    let (_, b) = run();
    info!("{} checkpoints in 300 ticks, chain {:08x} / {:08x}", count, a, b);
    if a == b {
        info!("DETERMINISM VERIFIED: chains match");
    } else {
        warn!("DETERMINISM FAILURE: chains differ");
    }
}

async fn demo_session(registry: &Arc<SessionRegistry>) -> Result<()> {
    info!("=== Verified Session ===");
    let mut config = SimConfig::endless();
    config.limits.max_ticks = Some(TICK_RATE * 60 * 3);

    let ticket = registry.start_session(config).await.context("starting session")?;
    let token = ticket.token.clone();
    let transport = LocalTransport { registry: Arc::clone(registry) };
    let mut session = Session::start(ticket);

    let status = session
        .play(&transport, &RetryPolicy::default(), autopilot, TICK_RATE * 60 * 4)
        .await
        .context("playing session")?;

    let totals = session.totals();
    info!(
        "Session {} finished {:?} at tick {}: {} segments, {} waves, {} kills, {} gold",
        &token[..8],
        status,
        session.tick(),
        totals.segments,
        totals.waves_cleared,
        totals.kills,
        totals.gold
    );
    if let Some(server) = registry.totals(&token).await {
        info!("Server agrees: {}", server == *totals);
    }
    Ok(())
}

fn demo_arena() {
    info!("=== Arena ===");
    let a = Loadout::default();
    let mut b = Loadout::default();
    b.heroes.push(HeroSlot { kind: HeroKind::Archer, level: 3 });

    for (name, config) in [("arena", BattleConfig::arena()), ("guild battle", BattleConfig::guild_battle())] {
        let result = simulate_battle(777, &a, &b, &config);
        info!(
            "{}: winner {:?} after {} ticks, survivors {:?}, hash {:08x}",
            name, result.winner, result.duration_ticks, result.survivors, result.final_hash
        );
    }
}

/// Re-verify a handful of independent sessions from scratch in parallel.
async fn demo_batch(registry: &Arc<SessionRegistry>) -> Result<()> {
    info!("=== Batch Re-verification ===");
    let mut jobs = Vec::new();
    for seed in 1..=4 {
        let config = SimConfig::endless();
        let audit = AuditTicks::derive(b"batch", seed, TICK_RATE * 60, 4);
        let mut session = Session::start(fortress_sim::network::SessionTicket {
            token: format!("batch-{}", seed),
            seed,
            audit_ticks: audit.clone(),
            config: config.clone(),
        });

        let mut closed = None;
        for _ in 0..TICK_RATE * 60 * 5 {
            let commands = autopilot(session.state());
            closed = session.step(&commands)?.closed;
            if closed.is_some() {
                break;
            }
        }
        let Some(submission) = closed else {
            warn!("Seed {} never reached a boundary", seed);
            continue;
        };
        jobs.push(VerificationJob {
            seed,
            config,
            audit,
            accepted: Vec::new(),
            candidate: submission.segment,
            claimed: submission.summary,
        });
    }

    let verdicts = registry.pool().verify_all(jobs).await?;
    for (i, verdict) in verdicts.iter().enumerate() {
        match verdict.summary() {
            Some(summary) => info!("Job {}: accepted, wave {} in {} ticks", i, summary.end_wave, summary.ticks),
            None => warn!("Job {}: rejected {:?}", i, verdict.reason()),
        }
    }
    Ok(())
}
