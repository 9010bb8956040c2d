mod common;

use std::path::Path;

use common::{Reply, TestHost, flag_of, spawn_peer, values_of, write_variables};
use cosim_bridge::config::CosimConfig;
use cosim_bridge::error::{CosimError, SocketError};
use cosim_bridge::host::HostPhase;
use cosim_bridge::socket::codec;
use cosim_bridge::stepper::{CoSimulationContext, StepperState};

const ZONE_TEMP: &str = "Zone Mean Air Temperature";
const OUTDOOR_TEMP: &str = "Site Outdoor Air Drybulb Temperature";

fn socket_config(mode: &str, socket_cfg: &Path, variables_cfg: &Path) -> CosimConfig {
    let toml = format!(
        r#"
[interface]
modes = ["{mode}"]
socket_config = '{}'
variables_config = '{}'
trace_exchanges = true
"#,
        socket_cfg.display(),
        variables_cfg.display()
    );
    CosimConfig::from_toml_str(&toml).expect("valid config")
}

fn host() -> TestHost {
    let mut host = TestHost::new(HostPhase::RunPeriod, 1.0 / 6.0);
    host.table.add_output("ZONE 1", ZONE_TEMP, 21.0);
    host.table.add_output("Environment", OUTDOOR_TEMP, 5.0);
    host.table.add_schedule("TSetHea", 20.0);
    host.table.add_rule_variable("yValve", 0.0, true);
    host
}

fn context(config: CosimConfig) -> CoSimulationContext {
    CoSimulationContext::new(config, common::MockProvider::new(&[], &[]).boxed()).expect("context")
}

fn data_lines(log: &[String]) -> Vec<&String> {
    log.iter().filter(|l| flag_of(l) == Some(0)).collect()
}

#[test]
fn values_travel_in_declaration_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |n, _| {
        Reply::Values(vec![10.0 + n as f64, 0.5 * n as f64])
    });
    let vars = write_variables(
        dir.path(),
        &[("ZONE 1", ZONE_TEMP), ("Environment", OUTDOOR_TEMP)],
        &[("schedule", "TSetHea"), ("actuator", "yValve")],
    );
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();

    ctx.exchange(&mut host).expect("first exchange");
    assert_eq!(host.table.schedule_named("TSetHea"), Some(11.0));
    assert_eq!(host.table.rule_named("yValve"), Some(0.5));

    host.elapsed = 600.0;
    ctx.exchange(&mut host).expect("second exchange");
    assert_eq!(host.table.schedule_named("TSetHea"), Some(12.0));
    assert_eq!(host.table.rule_named("yValve"), Some(1.0));
    assert_eq!(host.refreshes, 2);
    assert_eq!(ctx.records().len(), 8);

    ctx.finish().expect("finish");
    assert_eq!(ctx.state(), StepperState::Terminated);
    drop(ctx);

    let log = peer.join().expect("peer thread");
    assert_eq!(log.len(), 3);
    assert_eq!(values_of(&log[0]), vec![21.0, 5.0]);
    let first = codec::decode(&log[0]).expect("decodes");
    let second = codec::decode(&log[1]).expect("decodes");
    assert_eq!(first.time, 0.0);
    assert_eq!(second.time, 600.0);
    assert_eq!(flag_of(&log[2]), Some(1));
}

#[test]
fn transport_failure_stops_exchanges_and_reports_while_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |n, _| match n {
        3 => Reply::Raw("7 0 1 0 0 0.0 1.0\n".to_string()),
        _ => Reply::Values(vec![n as f64]),
    });
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("schedule", "TSetHea")]);
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();

    for tick in 1..=10 {
        let result = ctx.exchange(&mut host);
        match tick {
            1 | 2 => assert!(result.is_ok(), "tick {tick}: {result:?}"),
            3 => assert!(matches!(
                result,
                Err(CosimError::Exchange {
                    source: SocketError::Version { found: 7, .. },
                    ..
                })
            )),
            _ => assert!(matches!(result, Err(CosimError::Stopped))),
        }
        host.elapsed += 600.0;
    }
    assert_eq!(ctx.state(), StepperState::FatalStop);
    assert_eq!(host.table.schedule_named("TSetHea"), Some(2.0));
    drop(ctx);

    let log = peer.join().expect("peer thread");
    assert_eq!(data_lines(&log).len(), 3);
    assert_eq!(log.last().and_then(|l| flag_of(l)), Some(-20));
}

#[test]
fn peer_end_flag_freezes_host_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |n, _| match n {
        1 => Reply::Values(vec![7.0]),
        _ => Reply::Flag(1),
    });
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("schedule", "TSetHea")]);
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();

    for _ in 0..5 {
        ctx.exchange(&mut host).expect("exchange never fails after the peer ends");
        host.elapsed += 600.0;
    }
    assert!(ctx.peer_finished());
    assert_eq!(host.table.schedule_named("TSetHea"), Some(7.0));
    assert_eq!(ctx.ticks(), 5);

    ctx.finish().expect("finish");
    drop(ctx);
    let log = peer.join().expect("peer thread");
    assert_eq!(data_lines(&log).len(), 2);
    assert_eq!(log.last().and_then(|l| flag_of(l)), Some(1));
}

#[test]
fn export_mode_exchanges_only_in_run_period() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |_, msg| Reply::Values(vec![msg.values[0] - 1.0]));
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("variable", "yValve")]);
    let mut ctx = context(socket_config("package-export", &cfg, &vars));
    let mut host = host();

    host.phase = HostPhase::Warmup;
    for _ in 0..3 {
        ctx.exchange(&mut host).expect("warm-up tick");
    }
    assert_eq!(ctx.state(), StepperState::Configured);

    host.phase = HostPhase::RunPeriod;
    host.elapsed = 3600.0;
    ctx.exchange(&mut host).expect("first run-period exchange");
    assert_eq!(host.table.rule_named("yValve"), Some(20.0));
    host.elapsed = 4200.0;
    ctx.exchange(&mut host).expect("second exchange");

    ctx.finish().expect("finish");
    drop(ctx);
    let log = peer.join().expect("peer thread");
    let data = data_lines(&log);
    assert_eq!(data.len(), 2);
    assert_eq!(codec::decode(data[0]).map(|m| m.time).ok(), Some(0.0));
    assert_eq!(codec::decode(data[1]).map(|m| m.time).ok(), Some(4200.0));
}

#[test]
fn wrong_value_count_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |_, _| Reply::Values(vec![1.0, 2.0]));
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("schedule", "TSetHea")]);
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();

    let err = ctx.exchange(&mut host).expect_err("mismatch");
    assert!(matches!(
        err,
        CosimError::LengthMismatch {
            received: 2,
            expected: 1
        }
    ));
    assert_eq!(host.table.schedule_named("TSetHea"), Some(20.0));
    drop(ctx);
    let log = peer.join().expect("peer thread");
    assert_eq!(log.last().and_then(|l| flag_of(l)), Some(-20));
}

#[test]
fn missing_connection_descriptor_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = dir.path().join("socket.cfg");
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("schedule", "TSetHea")]);
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();

    let err = ctx.exchange(&mut host).expect_err("no descriptor");
    assert!(matches!(
        err,
        CosimError::Socket(SocketError::DescriptorNotFound(ref p)) if *p == cfg
    ));
    assert_eq!(ctx.state(), StepperState::FatalStop);
}

#[test]
fn ordinary_rule_variable_cannot_be_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, peer) = spawn_peer(dir.path(), |_, _| Reply::Values(vec![1.0]));
    let vars = write_variables(dir.path(), &[("ZONE 1", ZONE_TEMP)], &[("variable", "cycles")]);
    let mut ctx = context(socket_config("socket-master", &cfg, &vars));
    let mut host = host();
    host.table.add_rule_variable("cycles", 0.0, false);

    let err = ctx.exchange(&mut host).expect_err("not writable");
    match err {
        CosimError::Config(errors) => {
            assert!(errors.iter().any(|e| e.message.contains("externally writable")));
        }
        other => panic!("unexpected error: {other}"),
    }
    drop(ctx);
    let log = peer.join().expect("peer thread");
    assert_eq!(log.len(), 1);
    assert_eq!(flag_of(&log[0]), Some(-10));
}
