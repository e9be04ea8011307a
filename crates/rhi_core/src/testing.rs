//! Shared fixtures for unit tests
//!
//! Only one instance may be alive per process, so every test that creates one holds the
//! [`serial`] guard for its whole duration.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::headless::HeadlessBackend;
use crate::device::{Device, DeviceCreateInfo};
use crate::foundation::logging;
use crate::foundation::sync::lock;
use crate::instance::{Instance, InstanceCreateInfo};
use crate::types::Api;

static INSTANCE_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that create an instance
pub fn serial() -> MutexGuard<'static, ()> {
    logging::init_for_tests();
    lock(&INSTANCE_LOCK)
}

/// Headless instance with one device
pub struct Fixture {
    pub backend: HeadlessBackend,
    pub device: Arc<Device>,
    pub instance: Arc<Instance>,
    _guard: MutexGuard<'static, ()>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_device_info(&DeviceCreateInfo::default())
    }

    pub fn with_device_info(info: &DeviceCreateInfo) -> Self {
        let guard = serial();
        let backend = HeadlessBackend::new();
        let instance_info = InstanceCreateInfo::default()
            .with_api(Api::Headless)
            .with_application_name("fixture");
        let instance = Instance::create(&instance_info, Arc::new(backend.clone())).unwrap();
        let handle = instance.create_device(info).unwrap();
        let device = instance.device(handle).unwrap();
        Self {
            backend,
            device,
            instance,
            _guard: guard,
        }
    }
}
