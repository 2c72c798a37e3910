//! Fake processes and sensor factories for driving the session machine

use cranio::backend::{
    create_dummy_sensor, shared, AcquisitionProcess, MeasurementSink, Packet, ProcessFactory,
    ProcessMonitor, ProcessState, Producer, SensorHandle, Store,
};
use cranio::config::SensorConfig;
use cranio::error::{CranioError, Result};
use cranio::session::SensorFactory;
use cranio::types::{ChannelInfo, SensorInfo};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::builders::SensorBuilder;

/// Test-side view of a process created by [`FakeProcessFactory`]
#[derive(Clone)]
pub struct FakeProcessHandle {
    pub name: String,
    pub monitor: ProcessMonitor,
    producer: Arc<Mutex<Producer>>,
    store: Arc<Store>,
}

impl FakeProcessHandle {
    /// Poll once if the process is running, as one worker tick would
    pub fn poll(&self) -> bool {
        if self.monitor.state() != ProcessState::Running {
            return false;
        }
        match self.producer.lock().unwrap().read_all() {
            Some(packet) => {
                self.store.write(packet).unwrap();
                true
            }
            None => false,
        }
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }
}

/// Process without a thread; the test polls it through its handle
pub struct FakeProcess {
    state: Arc<Mutex<ProcessState>>,
    producer: Arc<Mutex<Producer>>,
    store: Arc<Store>,
}

impl FakeProcess {
    fn set(&self, state: ProcessState) {
        *self.state.lock().unwrap() = state;
    }
}

impl AcquisitionProcess for FakeProcess {
    fn start(&mut self) -> Result<()> {
        match self.state() {
            ProcessState::Joined => Err(CranioError::InvalidState("joined".to_string())),
            _ => {
                self.set(ProcessState::Running);
                Ok(())
            }
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.state() {
            ProcessState::Running | ProcessState::Paused => {
                self.set(ProcessState::Paused);
                Ok(())
            }
            state => Err(CranioError::InvalidState(format!("{}", state))),
        }
    }

    fn join(&mut self) -> Result<()> {
        self.set(ProcessState::Joined);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.monitor().is_alive()
    }

    fn state(&self) -> ProcessState {
        self.monitor().state()
    }

    fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    fn register_sensor(&mut self, sensor: SensorHandle) -> Result<bool> {
        Ok(self.producer.lock().unwrap().register_sensor(sensor))
    }

    fn monitor(&self) -> ProcessMonitor {
        ProcessMonitor::new(self.state.clone())
    }
}

/// Factory recording every process it creates
#[derive(Clone, Default)]
pub struct FakeProcessFactory {
    created: Arc<Mutex<Vec<FakeProcessHandle>>>,
}

impl FakeProcessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<FakeProcessHandle> {
        self.created.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Option<FakeProcessHandle> {
        self.created.lock().unwrap().last().cloned()
    }
}

impl ProcessFactory for FakeProcessFactory {
    fn create(
        &self,
        name: &str,
        sink: Box<dyn MeasurementSink>,
    ) -> Result<Box<dyn AcquisitionProcess>> {
        let process = FakeProcess {
            state: Arc::new(Mutex::new(ProcessState::Created)),
            producer: Arc::new(Mutex::new(Producer::new())),
            store: Arc::new(Store::new(sink)),
        };
        let mut created = self.created.lock().unwrap();
        // A process must not be created while another one is alive
        for previous in created.iter() {
            assert!(
                !previous.monitor.is_alive(),
                "{} still alive when creating a new process",
                previous.name
            );
        }
        let number = created.len() + 1;
        created.push(FakeProcessHandle {
            name: format!("{} #{}", name, number),
            monitor: process.monitor(),
            producer: process.producer.clone(),
            store: process.store.clone(),
        });
        Ok(Box::new(process))
    }
}

/// Sensor whose self test result is fixed
pub struct StubSensor {
    pub passes_self_test: bool,
    pub info: SensorInfo,
}

impl cranio::backend::Sensor for StubSensor {
    fn self_test(&mut self) -> bool {
        self.passes_self_test
    }

    fn register_channel(&mut self, info: ChannelInfo) -> Result<()> {
        Err(CranioError::DuplicateChannel(info.to_string()))
    }

    fn unregister_channel(&mut self, _info: &ChannelInfo) -> bool {
        false
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        vec![cranio::backend::torque_channel()]
    }

    fn read(&mut self) -> Result<Option<Packet>> {
        Err(CranioError::SensorRead("stub".to_string()))
    }

    fn sensor_info(&self) -> SensorInfo {
        self.info.clone()
    }
}

/// What the hardware side of [`TestSensorFactory`] returns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hardware {
    Missing,
    Healthy,
    FailingSelfTest,
    /// Working sensor whose reads take 80 ms
    Slow,
}

/// Sensor factory with scripted hardware and a real dummy sensor
pub struct TestSensorFactory {
    pub hardware: Hardware,
}

impl TestSensorFactory {
    pub fn new(hardware: Hardware) -> Self {
        Self { hardware }
    }
}

impl SensorFactory for TestSensorFactory {
    fn connect_hardware(&self, config: &SensorConfig) -> Result<SensorHandle> {
        let info = SensorInfo::new(
            config.imada_serial_number.clone(),
            config.turns_in_full_turn,
        );
        match self.hardware {
            Hardware::Missing => Err(CranioError::DeviceDetection(
                "no device with serial number".to_string(),
            )),
            Hardware::Healthy => Ok(shared(StubSensor {
                passes_self_test: true,
                info,
            })),
            Hardware::FailingSelfTest => Ok(shared(StubSensor {
                passes_self_test: false,
                info,
            })),
            Hardware::Slow => Ok(shared(
                SensorBuilder::new(&info.sensor_serial_number)
                    .channel("torque", "Nm")
                    .turns(info.turns_in_full_turn)
                    .read_delay(Duration::from_millis(80))
                    .build(),
            )),
        }
    }

    fn connect_dummy(&self, config: &SensorConfig) -> Result<SensorHandle> {
        Ok(shared(create_dummy_sensor(config.turns_in_full_turn)?))
    }
}
