//! Imada digital torque gauge over a USB serial (RS232) link
//!
//! The gauge answers a `D\r` request with one telegram terminated by `\r`.
//! A telegram carries the display value followed by three status
//! characters: unit, mode and condition, e.g. `+0.153NPO`.
//!
//! The gauge is located by the serial number of its USB adapter, so it
//! does not matter which port name the operating system assigned.

use crate::backend::channel::ChannelRegistry;
use crate::backend::packet::Packet;
use crate::backend::sensor_trait::Sensor;
use crate::config::SensorConfig;
use crate::error::{CranioError, Result};
use crate::types::{ChannelInfo, SensorInfo};
use chrono::Utc;
use serialport::{DataBits, Parity, SerialPortType, StopBits};
use std::io::{Read, Write};

/// Telegram terminator
pub const IMADA_EOL: u8 = b'\r';

/// Request for the current display value
pub const DISPLAY_REQUEST: &[u8] = b"D\r";

/// Longest telegram accepted before giving up on finding the terminator
const MAX_TELEGRAM_LEN: usize = 64;

/// Byte stream the gauge is reached through
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}

/// Decoded gauge telegram
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    pub value: f64,
    pub unit: char,
    pub mode: char,
    pub condition: char,
}

/// Decode a telegram such as `+0.153NPO` (the terminator may be included)
pub fn decode_telegram(telegram: &str) -> Result<Telegram> {
    let text: String = telegram.chars().filter(|c| *c != IMADA_EOL as char).collect();
    let invalid = || CranioError::Telegram(format!("Invalid telegram: {:?}", text));

    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 4 {
        return Err(invalid());
    }
    let (head, tail) = chars.split_at(chars.len() - 3);
    let head: String = head.iter().collect();
    let value = parse_first_number(&head).ok_or_else(invalid)?;

    Ok(Telegram {
        value,
        unit: tail[0],
        mode: tail[1],
        condition: tail[2],
    })
}

/// First signed decimal number in `s`
fn parse_first_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    for start in 0..bytes.len() {
        let mut end = start;
        if matches!(bytes[end], b'+' | b'-') {
            end += 1;
        }
        let digits_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let int_digits = end - digits_start;

        let mut frac_digits = 0;
        if end < bytes.len() && bytes[end] == b'.' {
            let mut j = end + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            frac_digits = j - end - 1;
            if frac_digits > 0 {
                end = j;
            }
        }

        if int_digits + frac_digits > 0 {
            return s[start..end].parse().ok();
        }
    }
    None
}

/// Find the port name of the USB serial device with the given serial number
pub fn find_serial_device(serial_number: &str) -> Result<String> {
    let ports = serialport::available_ports()?;
    ports
        .into_iter()
        .find(|port| match &port.port_type {
            SerialPortType::UsbPort(usb) => usb.serial_number.as_deref() == Some(serial_number),
            _ => false,
        })
        .map(|port| port.port_name)
        .ok_or_else(|| {
            CranioError::DeviceDetection(format!(
                "No device detected with serial number {}",
                serial_number
            ))
        })
}

/// Imada torque gauge
pub struct ImadaSensor {
    info: SensorInfo,
    channels: ChannelRegistry,
    config: SensorConfig,
    port_name: Option<String>,
    link: Option<Box<dyn SerialLink>>,
}

impl ImadaSensor {
    /// Locate the gauge by its configured serial number
    ///
    /// The port is not opened until the first self test or read.
    pub fn detect(config: &SensorConfig) -> Result<Self> {
        let port_name = find_serial_device(&config.imada_serial_number)?;
        tracing::info!(
            "Detected Imada {} on {}",
            config.imada_serial_number,
            port_name
        );
        let mut sensor = Self::new(config.clone(), None);
        sensor.port_name = Some(port_name);
        Ok(sensor)
    }

    /// Create a gauge that talks over an already open link
    pub fn with_link(config: SensorConfig, link: Box<dyn SerialLink>) -> Self {
        Self::new(config, Some(link))
    }

    fn new(config: SensorConfig, link: Option<Box<dyn SerialLink>>) -> Self {
        let mut channels = ChannelRegistry::new();
        // A fresh registry cannot hold a duplicate
        let _ = channels.register(crate::backend::torque_channel());
        Self {
            info: SensorInfo::new(
                config.imada_serial_number.clone(),
                config.turns_in_full_turn,
            ),
            channels,
            config,
            port_name: None,
            link,
        }
    }

    /// Open the serial port if it is not open yet
    pub fn open(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }
        let port_name = self.port_name.clone().ok_or_else(|| {
            CranioError::DeviceDetection("Imada port has not been detected".to_string())
        })?;
        let port = serialport::new(&port_name, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.config.read_timeout())
            .open()?;
        tracing::info!("Opened {} at {} baud", port_name, self.config.baud_rate);
        self.link = Some(Box::new(port));
        Ok(())
    }

    /// Close the serial port
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            tracing::info!("Closed Imada port");
        }
    }

    /// Request the display value and return the raw telegram
    pub fn poll(&mut self) -> Result<String> {
        self.open()?;
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| CranioError::SensorRead("Imada port is not open".to_string()))?;
        link.write_all(DISPLAY_REQUEST)?;
        link.flush()?;

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = link.read(&mut byte).map_err(|e| {
                CranioError::SensorRead(format!("Imada read failed: {}", e))
            })?;
            if n == 0 {
                return Err(CranioError::SensorRead(
                    "Imada link closed before end of telegram".to_string(),
                ));
            }
            if byte[0] == IMADA_EOL {
                break;
            }
            line.push(byte[0]);
            if line.len() > MAX_TELEGRAM_LEN {
                return Err(CranioError::Telegram(format!(
                    "No terminator within {} bytes",
                    MAX_TELEGRAM_LEN
                )));
            }
        }

        String::from_utf8(line)
            .map_err(|e| CranioError::Telegram(format!("Telegram is not UTF-8: {}", e)))
    }
}

impl Sensor for ImadaSensor {
    fn self_test(&mut self) -> bool {
        match self.poll().and_then(|t| decode_telegram(&t)) {
            Ok(telegram) => {
                tracing::debug!("Imada self test ok: {:?}", telegram);
                true
            }
            Err(e) => {
                tracing::warn!("Imada self test failed: {}", e);
                false
            }
        }
    }

    fn register_channel(&mut self, info: ChannelInfo) -> Result<()> {
        self.channels.register(info)
    }

    fn unregister_channel(&mut self, info: &ChannelInfo) -> bool {
        self.channels.unregister(info)
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        self.channels.to_vec()
    }

    fn read(&mut self) -> Result<Option<Packet>> {
        if self.channels.is_empty() {
            return Ok(None);
        }
        let telegram = self.poll()?;
        let decoded = decode_telegram(&telegram).map_err(|e| {
            tracing::error!("Decode telegram failed! {}", e);
            e
        })?;
        let timestamp = Utc::now();
        // The gauge reports one value; every registered channel carries it
        let values = self
            .channels
            .iter()
            .map(|c| (c.column_name(), Some(decoded.value)));
        Packet::single(timestamp, values).map(Some)
    }

    fn sensor_info(&self) -> SensorInfo {
        self.info.clone()
    }
}

impl Drop for ImadaSensor {
    fn drop(&mut self) {
        self.close();
    }
}
