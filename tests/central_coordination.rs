//! Coordination rounds between node schedulers and the central coordinator,
//! without the async runtime.

mod common;

use common::harness::{connection, fixed_mcs_config, init_tracing};
use iab_scheduler::{
    central::{CentralCoordinator, Edge, HintTarget, NodeKey},
    config::{Config, PolicyKind},
    identity::{Direction, Imsi, Rnti, SfnSf},
    sched::{DlBufferReport, Indicator, NodeScheduler, QualityReport},
};

fn dl(rnti: u16, new_bytes: u32) -> DlBufferReport {
    DlBufferReport {
        rnti: Rnti(rnti),
        lcid: 3,
        new_bytes,
        retx_bytes: 0,
        status_bytes: 0,
    }
}

fn cqi(rnti: u16, value: u8) -> QualityReport {
    QualityReport {
        rnti: Rnti(rnti),
        direction: Direction::Downlink,
        indicator: Indicator::Cqi(value),
    }
}

/// Donor serving relays 1 and 2 plus one terminal.
fn create_test_donor(config: Config) -> NodeScheduler {
    let mut donor = NodeScheduler::new(Imsi::DONOR, config).unwrap();
    donor.configure_connection(connection(1, 1, true));
    donor.configure_connection(connection(2, 2, true));
    donor.configure_connection(connection(3, 103, false));
    donor
}

#[test]
fn test_hint_reorders_donor_service() {
    init_tracing();
    let mut donor = create_test_donor(Config::default());
    donor.on_quality_report(cqi(1, 4));
    donor.on_quality_report(cqi(2, 15));
    for rnti in 1..=3 {
        donor.on_dl_buffer_report(dl(rnti, 20_000));
    }

    let mut coordinator = CentralCoordinator::new(Config::default().coordinator);
    coordinator.register_relay(Imsi(1), Imsi::DONOR).unwrap();
    coordinator.register_relay(Imsi(2), Imsi::DONOR).unwrap();
    assert!(coordinator.ingest(donor.summary()));

    let decision = coordinator.decide();
    // 中继2的信道最好，容量最大
    assert_eq!(
        decision.active_edges,
        vec![Edge {
            parent: Imsi::DONOR,
            child: NodeKey::Node(Imsi(2)),
        }]
    );
    donor.apply_hint(coordinator.hint_for(Imsi::DONOR));

    let alloc = donor.schedule(SfnSf::new(0, 0)).unwrap();
    let first = alloc.data_grants().next().unwrap();
    assert_eq!(first.rnti, Some(Rnti(2)));
    assert_eq!(first.sym_start, 1);
}

#[test]
fn test_three_relays_no_terminals() {
    init_tracing();
    let config = fixed_mcs_config();
    let mut donor = NodeScheduler::new(Imsi::DONOR, config.clone()).unwrap();
    let mut coordinator = CentralCoordinator::new(config.coordinator.clone());
    for relay in 1..=3u16 {
        donor.configure_connection(connection(relay, u64::from(relay), true));
        coordinator.register_relay(Imsi(u64::from(relay)), Imsi::DONOR).unwrap();
    }

    let summary = donor.summary();
    assert!(!summary.has_terminals());
    coordinator.ingest(summary);
    // 固定MCS下三个中继容量相同：打平 -> 无偏好
    let decision = coordinator.decide();
    assert!(decision.active_edges.is_empty());
    assert_eq!(coordinator.hint_for(Imsi::DONOR).target, HintTarget::NoPreference);

    // 缓冲策略下积压最多的中继胜出
    let mut config = config;
    config.coordinator.policy = PolicyKind::MinMaxBuffer;
    let mut coordinator = CentralCoordinator::new(config.coordinator);
    for relay in 1..=3u64 {
        coordinator.register_relay(Imsi(relay), Imsi::DONOR).unwrap();
    }
    donor.on_dl_buffer_report(dl(1, 100));
    donor.on_dl_buffer_report(dl(3, 900));
    coordinator.ingest(donor.summary());
    coordinator.decide();
    assert_eq!(coordinator.hint_for(Imsi::DONOR).target, HintTarget::Node(Imsi(3)));
}

#[test]
fn test_relay_terminals_join_the_tree() {
    init_tracing();
    let config = fixed_mcs_config();
    let mut coordinator = CentralCoordinator::new(config.coordinator.clone());
    coordinator.register_relay(Imsi(1), Imsi::DONOR).unwrap();

    // 中继1服务两个终端，其中一个有积压
    let mut relay = NodeScheduler::new(Imsi(1), config.clone()).unwrap();
    relay.configure_connection(connection(1, 11, false));
    relay.configure_connection(connection(2, 12, false));
    relay.on_dl_buffer_report(dl(2, 700));

    let donor = {
        let mut donor = NodeScheduler::new(Imsi::DONOR, config).unwrap();
        donor.configure_connection(connection(1, 1, true));
        donor
    };
    coordinator.ingest(donor.summary());
    coordinator.ingest(relay.summary());

    let bucket = NodeKey::Terminals { serving: Imsi(1) };
    assert!(coordinator.topology().contains(bucket));
    assert_eq!(coordinator.topology().depth(bucket), Some(2));

    let decision = coordinator.decide();
    assert!(decision.active_edges.contains(&Edge {
        parent: Imsi(1),
        child: bucket,
    }));
    assert_eq!(coordinator.hint_for(Imsi(1)).target, HintTarget::Terminals);
}
