use crate::devices::SharedDevices;
use crate::toaster::SharedToaster;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub toaster_status: String,
    pub devices_registered: u32,
    pub devices_claimed: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, toaster: &SharedToaster, devices: &SharedDevices) -> KernelHealth {
        let (registered, claimed) = devices.counts();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            toaster_status: toaster.query().status.as_str().to_string(),
            devices_registered: registered as u32,
            devices_claimed: claimed as u32,
        }
    }
}
