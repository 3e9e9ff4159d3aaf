//! libpcap capture adapter: opens the device, checks the link type,
//! installs the filter and hands each frame to the [`Monitor`].

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use pcap::{Active, Capture, Device, Linktype, PacketHeader};

use crate::config::Config;
use crate::db::EventSink;
use crate::error::CaptureError;
use crate::monitor::Monitor;

/// An open capture whose link type has been checked to be Ethernet, with
/// the configured filter installed. The frame decoder relies on both.
pub struct EthernetCapture {
    cap: Capture<Active>,
    device: Device,
}

impl EthernetCapture {
    pub fn device_name(&self) -> &str {
        &self.device.name
    }

    pub fn description(&self) -> &str {
        self.device.desc.as_deref().unwrap_or(&self.device.name)
    }
}

pub fn list_devices() -> Result<Vec<Device>, CaptureError> {
    Ok(Device::list()?)
}

pub fn open(config: &Config) -> Result<EthernetCapture, CaptureError> {
    let device = find_device(config.interface.as_deref())?;
    let mut cap = create_capture(device.clone(), config)?;
    check_link_type(&cap)?;
    configure_capture(&mut cap, &config.filter)?;
    Ok(EthernetCapture { cap, device })
}

fn find_device(interface: Option<&str>) -> Result<Device, CaptureError> {
    match interface {
        Some(name) => Ok(Device::list()?
            .into_iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| Device::from(name))),
        None => Device::lookup()?.ok_or(CaptureError::NoDevice),
    }
}

fn create_capture(device: Device, config: &Config) -> Result<Capture<Active>, CaptureError> {
    let cap = Capture::from_device(device)?
        .promisc(true)
        .snaplen(config.snaplen)
        .timeout(config.timeout_ms)
        .open()?;
    Ok(cap)
}

fn check_link_type(cap: &Capture<Active>) -> Result<(), CaptureError> {
    let link = cap.get_datalink();
    if link == Linktype::ETHERNET {
        return Ok(());
    }
    let name = link.get_name().unwrap_or_else(|_| link.0.to_string());
    Err(CaptureError::UnsupportedLinkType(name))
}

fn configure_capture(cap: &mut Capture<Active>, filter: &str) -> Result<(), CaptureError> {
    cap.filter(filter, true)?;
    tracing::info!(%filter, "capture filter installed");
    Ok(())
}

/// Feeds frames to `monitor` until `running` is cleared or pcap fails.
/// Read timeouts only re-check the flag.
pub fn run<S: EventSink>(
    capture: &mut EthernetCapture,
    monitor: &mut Monitor<S>,
    running: &AtomicBool,
) -> Result<(), CaptureError> {
    while running.load(Ordering::SeqCst) {
        let packet = match capture.cap.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => return Err(e.into()),
        };

        let timestamp = capture_time(packet.header);
        let caplen = packet.header.caplen as usize;
        if let Ok(output) = monitor.process_frame(timestamp, caplen, packet.data) {
            if let Some(report) = output.report {
                tracing::debug!(
                    received = report.received_bytes,
                    sent = report.sent_bytes,
                    "minute report"
                );
                println!("{}", report);
            }
        }
    }
    Ok(())
}

fn capture_time(header: &PacketHeader) -> DateTime<Utc> {
    let secs = header.ts.tv_sec as i64;
    let nanos = (header.ts.tv_usec as u32).saturating_mul(1000);
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}
