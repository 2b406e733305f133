//! tests/common/harness.rs
#![allow(dead_code)]

use async_trait::async_trait;
use iab_scheduler::{
    central::{NodeSummary, SchedulingHint},
    config::{Config, LinkQualityConfig},
    error::Result,
    identity::{ConnectionInfo, Imsi, Rnti, SfnSf},
    runtime::NodeEndpoint,
    sched::{NodeScheduler, SubframeAllocation},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, Once,
};
use std::time::Duration;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "iab_scheduler=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Default configuration with the downlink pinned to MCS 5.
pub fn fixed_mcs_config() -> Config {
    Config {
        link_quality: LinkQualityConfig {
            fixed_mcs_dl: Some(5),
            fixed_mcs_ul: Some(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn connection(rnti: u16, imsi: u64, relay: bool) -> ConnectionInfo {
    ConnectionInfo {
        rnti: Rnti(rnti),
        imsi: Imsi(imsi),
        relay,
    }
}

/// Checks the invariants every grant map must satisfy.
pub fn assert_valid_allocation(alloc: &SubframeAllocation, config: &Config) {
    let total = config.frame.symbols_per_subframe;
    assert!(
        alloc.is_consistent(total),
        "overlapping or out-of-range grants at {}: {:?}",
        alloc.sfn,
        alloc.grants
    );
    assert!(alloc.symbols_used() <= total);
    for grant in alloc.data_grants() {
        assert!(grant.sym_start >= config.frame.data_start());
        assert!(grant.sym_start + grant.num_sym <= config.frame.data_end());
        assert!(grant.attempt <= 3);
        assert!(grant.num_sym > 0);
    }
}

/// An endpoint wrapping a scheduler directly, with an adjustable summary delay.
///
/// Used to simulate a node that answers the summary or hint exchange too late.
pub struct SlowEndpoint {
    scheduler: Mutex<NodeScheduler>,
    node: Imsi,
    delay: Duration,
    slow: AtomicBool,
    stall_hints: AtomicBool,
    hints: Mutex<Vec<SchedulingHint>>,
}

impl SlowEndpoint {
    pub fn new(node: Imsi, config: Config, delay: Duration) -> Self {
        Self {
            scheduler: Mutex::new(NodeScheduler::new(node, config).unwrap()),
            node,
            delay,
            slow: AtomicBool::new(true),
            stall_hints: AtomicBool::new(false),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    /// Makes hint delivery wait `delay` before it is applied.
    pub fn set_stall_hints(&self, stall: bool) {
        self.stall_hints.store(stall, Ordering::SeqCst);
    }

    pub fn hints(&self) -> Vec<SchedulingHint> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeEndpoint for SlowEndpoint {
    fn node(&self) -> Imsi {
        self.node
    }

    async fn collect_summary(&self) -> Result<NodeSummary> {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.scheduler.lock().unwrap().summary())
    }

    async fn deliver_hint(&self, hint: SchedulingHint) -> Result<()> {
        if self.stall_hints.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.hints.lock().unwrap().push(hint);
        self.scheduler.lock().unwrap().apply_hint(hint);
        Ok(())
    }

    async fn trigger(&self, sfn: SfnSf) -> Result<SubframeAllocation> {
        self.scheduler.lock().unwrap().schedule(sfn)
    }
}
