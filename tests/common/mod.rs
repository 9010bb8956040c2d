//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread::{self, JoinHandle};

use cosim_bridge::error::SlaveError;
use cosim_bridge::fmi::{
    Causality, CoSimSlave, InstantiateParams, ModelDescription, ScalarVariable, SlaveProvider,
    Status,
};
use cosim_bridge::host::{
    CalendarPosition, EntityTable, HostModel, HostPhase, RuleVariable,
};
use cosim_bridge::marshal::RealBuffer;
use cosim_bridge::socket::codec::{self, Message};

/// One call made on a mock artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Unpack { dir: PathBuf },
    Instantiate { instance: String, dir: PathBuf },
    Initialize { instance: String, t_start: f64, t_stop: f64 },
    GetReal { instance: String, refs: Vec<u32> },
    SetReal { instance: String, refs: Vec<u32>, values: Vec<f64> },
    DoStep { instance: String, t: f64, h: f64 },
    Free { instance: String, end: bool },
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Output value of reference `vr` after `steps` steps since instantiation.
pub type OutputFn = fn(u32, usize) -> f64;

/// Scriptable stand-in for the native artifact loader.
#[derive(Clone)]
pub struct MockProvider {
    pub calls: CallLog,
    pub description: ModelDescription,
    pub outputs: OutputFn,
    /// Fail `fmiDoStep` on this step (1-based, counted per instance).
    pub fail_step: Option<usize>,
    /// Keep the handle after free.
    pub leak_on_free: bool,
}

impl MockProvider {
    pub fn new(inputs: &[(&str, u32)], outputs: &[(&str, u32)]) -> Self {
        let mut variables = Vec::new();
        for (name, vr) in inputs {
            variables.push(ScalarVariable {
                name: name.to_string(),
                value_reference: *vr,
                causality: Causality::Input,
            });
        }
        for (name, vr) in outputs {
            variables.push(ScalarVariable {
                name: name.to_string(),
                value_reference: *vr,
                causality: Causality::Output,
            });
        }
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            description: ModelDescription {
                fmi_version: "1.0".to_string(),
                model_name: "mock".to_string(),
                model_identifier: "mock".to_string(),
                guid: "{00000000-0000-0000-0000-000000000000}".to_string(),
                variables,
            },
            outputs: |vr, steps| f64::from(vr) * 100.0 + steps as f64,
            fail_step: None,
            leak_on_free: false,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn boxed(&self) -> Box<dyn SlaveProvider> {
        Box::new(self.clone())
    }
}

impl SlaveProvider for MockProvider {
    fn unpack(&self, _archive: &Path, dir: &Path) -> Result<(), SlaveError> {
        self.calls.borrow_mut().push(Call::Unpack {
            dir: dir.to_path_buf(),
        });
        Ok(())
    }

    fn load(&self, _dir: &Path) -> Result<Box<dyn CoSimSlave>, SlaveError> {
        Ok(Box::new(MockSlave {
            provider: self.clone(),
            handle: None,
            steps: 0,
        }))
    }
}

pub struct MockSlave {
    provider: MockProvider,
    handle: Option<String>,
    steps: usize,
}

impl MockSlave {
    fn instance(&self, call: &'static str) -> Result<String, SlaveError> {
        self.handle
            .clone()
            .ok_or(SlaveError::NotInstantiated { call })
    }

    fn log(&self, call: Call) {
        self.provider.calls.borrow_mut().push(call);
    }
}

impl CoSimSlave for MockSlave {
    fn description(&self) -> &ModelDescription {
        &self.provider.description
    }

    fn instantiate(&mut self, params: &InstantiateParams) -> Result<(), SlaveError> {
        self.handle = Some(params.instance_name.clone());
        self.steps = 0;
        self.log(Call::Instantiate {
            instance: params.instance_name.clone(),
            dir: params.working_dir.clone(),
        });
        Ok(())
    }

    fn initialize(&mut self, t_start: f64, t_stop: f64) -> Result<(), SlaveError> {
        let instance = self.instance("fmiInitializeSlave")?;
        self.log(Call::Initialize {
            instance,
            t_start,
            t_stop,
        });
        Ok(())
    }

    fn get_real(&mut self, buf: &mut RealBuffer) -> Result<(), SlaveError> {
        let instance = self.instance("fmiGetReal")?;
        let refs = buf.refs().to_vec();
        for (v, vr) in buf.values_mut().iter_mut().zip(&refs) {
            *v = (self.provider.outputs)(*vr, self.steps);
        }
        self.log(Call::GetReal { instance, refs });
        Ok(())
    }

    fn set_real(&mut self, buf: &RealBuffer) -> Result<(), SlaveError> {
        let instance = self.instance("fmiSetReal")?;
        self.log(Call::SetReal {
            instance,
            refs: buf.refs().to_vec(),
            values: buf.values().to_vec(),
        });
        Ok(())
    }

    fn do_step(&mut self, t: f64, h: f64) -> Result<(), SlaveError> {
        let instance = self.instance("fmiDoStep")?;
        self.steps += 1;
        self.log(Call::DoStep { instance, t, h });
        if self.provider.fail_step == Some(self.steps) {
            return Status::Error.check("fmiDoStep");
        }
        Ok(())
    }

    fn free(&mut self, end_of_simulation: bool) -> Result<(), SlaveError> {
        let Some(instance) = self.handle.clone() else {
            return Ok(());
        };
        self.log(Call::Free {
            instance,
            end: end_of_simulation,
        });
        if !self.provider.leak_on_free {
            self.handle = None;
        }
        Ok(())
    }

    fn is_instantiated(&self) -> bool {
        self.handle.is_some()
    }
}

/// In-memory host whose phase and calendar the test drives directly.
#[derive(Debug, Clone)]
pub struct TestHost {
    pub table: EntityTable,
    pub phase: HostPhase,
    pub timestep_hours: f64,
    pub calendar: CalendarPosition,
    pub run_days: u32,
    pub elapsed: f64,
    pub weather_run_period: bool,
    pub refreshes: usize,
}

impl TestHost {
    pub fn new(phase: HostPhase, timestep_hours: f64) -> Self {
        Self {
            table: EntityTable::new(),
            phase,
            timestep_hours,
            calendar: CalendarPosition {
                month: 1,
                day_of_month: 1,
                hour_of_day: 1,
                leap_year: false,
            },
            run_days: 1,
            elapsed: 0.0,
            weather_run_period: true,
            refreshes: 0,
        }
    }
}

impl HostModel for TestHost {
    fn phase(&self) -> HostPhase {
        self.phase
    }

    fn zone_timestep_hours(&self) -> f64 {
        self.timestep_hours
    }

    fn calendar(&self) -> CalendarPosition {
        self.calendar
    }

    fn run_period_days(&self) -> u32 {
        self.run_days
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }

    fn has_weather_run_period(&self) -> bool {
        self.weather_run_period
    }

    fn output_keys(&self, name: &str) -> Vec<(String, usize)> {
        self.table.output_keys(name)
    }

    fn output_value(&self, handle: usize) -> f64 {
        self.table.output_value(handle)
    }

    fn find_schedule(&self, name: &str) -> Option<usize> {
        self.table.find_schedule(name)
    }

    fn find_rule_variable(&self, name: &str) -> Option<RuleVariable> {
        self.table.find_rule_variable(name)
    }

    fn set_schedule_value(&mut self, handle: usize, value: f64) {
        self.table.set_schedule_value(handle, value);
    }

    fn set_rule_variable(&mut self, handle: usize, value: f64) {
        self.table.set_rule_variable(handle, value);
    }

    fn refresh_rules(&mut self) {
        self.refreshes += 1;
    }
}

/// What a scripted peer answers to the n-th data message (1-based).
pub enum Reply {
    Values(Vec<f64>),
    Flag(i32),
    /// Send this line verbatim.
    Raw(String),
    /// Drop the connection without answering.
    Hangup,
}

/// Lines received by a scripted peer, in order.
pub type PeerLog = Vec<String>;

/// Starts a one-connection peer on a free local port.
///
/// Returns the descriptor path written into `dir` and the peer thread, which
/// yields every line it received once the host closes the connection.
pub fn spawn_peer(
    dir: &Path,
    script: impl Fn(usize, &Message) -> Reply + Send + 'static,
) -> (PathBuf, JoinHandle<PeerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    let cfg = dir.join("socket.cfg");
    std::fs::write(
        &cfg,
        format!(
            "<?xml version=\"1.0\"?>\n<BCVTB-client>\n  <ipc>\n    \
             <socket port=\"{port}\" hostname=\"127.0.0.1\"/>\n  </ipc>\n</BCVTB-client>\n"
        ),
    )
    .expect("write socket.cfg");

    let handle = thread::spawn(move || {
        let mut log = Vec::new();
        let Ok((stream, _)) = listener.accept() else {
            return log;
        };
        let mut writer = stream.try_clone().expect("clone stream");
        let mut reader = BufReader::new(stream);
        let mut data_messages = 0;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            log.push(line.trim_end().to_string());
            let Ok(msg) = codec::decode(&line) else { break };
            if msg.flag != 0 {
                continue;
            }
            data_messages += 1;
            let answer = match script(data_messages, &msg) {
                Reply::Values(values) => codec::encode(&Message::data(msg.time, values)),
                Reply::Flag(flag) => codec::encode(&Message::control(flag)),
                Reply::Raw(line) => line,
                Reply::Hangup => break,
            };
            if writer.write_all(answer.as_bytes()).is_err() {
                break;
            }
        }
        log
    });
    (cfg, handle)
}

/// Writes a variable map declaring `sent` (key, name) and `received`
/// (kind tag, name) entries in that order.
pub fn write_variables(dir: &Path, sent: &[(&str, &str)], received: &[(&str, &str)]) -> PathBuf {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<BCVTB-variables>\n");
    for (tag, name) in received {
        xml.push_str(&format!(
            "  <variable source=\"Ptolemy\"><EnergyPlus {tag}=\"{name}\"/></variable>\n"
        ));
    }
    for (key, name) in sent {
        xml.push_str(&format!(
            "  <variable source=\"EnergyPlus\"><EnergyPlus name=\"{key}\" type=\"{name}\"/></variable>\n"
        ));
    }
    xml.push_str("</BCVTB-variables>\n");
    let path = dir.join("variables.cfg");
    std::fs::write(&path, xml).expect("write variables.cfg");
    path
}

/// Parses the flag of a received line.
pub fn flag_of(line: &str) -> Option<i32> {
    line.split_whitespace().nth(1).and_then(|f| f.parse().ok())
}

/// Parses the double payload of a received line.
pub fn values_of(line: &str) -> Vec<f64> {
    codec::decode(line).map(|m| m.values).unwrap_or_default()
}
