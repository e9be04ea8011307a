//! Top-level context
//!
//! At most one [`Instance`] is alive per process. It holds the backend and the devices created
//! through it; dropping it tears every device down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::Backend;
use crate::config::{Config, ConfigError, Deserialize, Serialize};
use crate::device::{Device, DeviceCreateInfo};
use crate::error::{RhiError, RhiResult};
use crate::foundation::collections::DeviceHandle;
use crate::registry::Registry;
use crate::types::Api;

// Process-wide: the backend allows one live instance per process
static INSTANCE_ALIVE: AtomicBool = AtomicBool::new(false);

/// Instance configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceCreateInfo {
    /// Reported to the driver
    pub application_name: String,
    /// API the backend must implement
    pub api: Api,
    /// Enable validation layers where the backend has them
    pub enable_debug: bool,
}

impl Default for InstanceCreateInfo {
    fn default() -> Self {
        Self {
            application_name: "rhi".to_string(),
            api: Api::default(),
            enable_debug: cfg!(debug_assertions),
        }
    }
}

impl Config for InstanceCreateInfo {}

impl InstanceCreateInfo {
    /// Set the application name
    #[must_use]
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the API
    #[must_use]
    pub const fn with_api(mut self, api: Api) -> Self {
        self.api = api;
        self
    }

    /// Enable or disable validation
    #[must_use]
    pub const fn with_debug(mut self, enable_debug: bool) -> Self {
        self.enable_debug = enable_debug;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::Invalid("application name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// The process-wide GPU context
pub struct Instance {
    create_info: InstanceCreateInfo,
    backend: Arc<dyn Backend>,
    devices: Registry<DeviceHandle, Device>,
    weak_self: Weak<Instance>,
}

impl Instance {
    /// Create the instance
    ///
    /// Fails with [`RhiError::SingleInstance`] while another instance is alive.
    pub fn create(info: &InstanceCreateInfo, backend: Arc<dyn Backend>) -> RhiResult<Arc<Self>> {
        info.validate()?;
        if backend.api() != info.api {
            return Err(RhiError::invalid_create_argument(format!(
                "backend implements {:?} but {:?} was requested",
                backend.api(),
                info.api
            )));
        }
        if INSTANCE_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::error!("An instance is already alive");
            return Err(RhiError::SingleInstance);
        }

        log::info!(
            "Created {:?} instance for '{}' (debug: {})",
            info.api,
            info.application_name,
            info.enable_debug
        );
        Ok(Arc::new_cyclic(|weak_self| Self {
            create_info: info.clone(),
            backend,
            devices: Registry::new(),
            weak_self: weak_self.clone(),
        }))
    }

    /// True while some instance is alive in this process
    pub fn is_alive() -> bool {
        INSTANCE_ALIVE.load(Ordering::Acquire)
    }

    /// Configuration the instance was created with
    pub const fn create_info(&self) -> &InstanceCreateInfo {
        &self.create_info
    }

    /// API of the backend
    pub fn api(&self) -> Api {
        self.backend.api()
    }

    /// Create a device and its queues
    pub fn create_device(&self, info: &DeviceCreateInfo) -> RhiResult<DeviceHandle> {
        let device = Device::create(self.weak_self.clone(), Arc::clone(&self.backend), info)?;
        Ok(self.devices.insert(device))
    }

    /// Tear down a device and everything created through it
    pub fn destroy_device(&self, handle: DeviceHandle) {
        match self.devices.remove(handle) {
            Some(device) => {
                device.destroy_all();
                log::info!("Destroyed device '{}'", device.name());
            }
            None => log::warn!("Ignoring destroy of stale device handle {handle:?}"),
        }
    }

    /// Device by handle
    pub fn device(&self, handle: DeviceHandle) -> Option<Arc<Device>> {
        self.devices.get(handle)
    }

    /// Number of live devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        for (_, device) in self.devices.drain() {
            device.destroy_all();
        }
        INSTANCE_ALIVE.store(false, Ordering::Release);
        log::info!("Destroyed instance '{}'", self.create_info.application_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::resources::buffer::BufferCreateInfo;
    use crate::testing::serial;
    use crate::types::{BufferUsageFlags, CommandType};

    fn headless_info() -> InstanceCreateInfo {
        InstanceCreateInfo::default().with_api(Api::Headless).with_application_name("instance tests")
    }

    #[test]
    fn test_single_instance() {
        let _guard = serial();
        let backend = HeadlessBackend::new();
        let first = Instance::create(&headless_info(), Arc::new(backend.clone())).unwrap();
        assert!(Instance::is_alive());
        assert!(matches!(
            Instance::create(&headless_info(), Arc::new(backend.clone())),
            Err(RhiError::SingleInstance)
        ));

        drop(first);
        assert!(!Instance::is_alive());
        let second = Instance::create(&headless_info(), Arc::new(backend)).unwrap();
        assert_eq!(second.api(), Api::Headless);
    }

    #[test]
    fn test_api_mismatch_releases_nothing() {
        let _guard = serial();
        let info = headless_info().with_api(Api::Vulkan);
        assert!(matches!(
            Instance::create(&info, Arc::new(HeadlessBackend::new())),
            Err(RhiError::InvalidCreateArgument { .. })
        ));
        assert!(!Instance::is_alive());
    }

    #[test]
    fn test_drop_tears_down_devices() {
        let _guard = serial();
        let backend = HeadlessBackend::new();
        let instance = Instance::create(&headless_info(), Arc::new(backend.clone())).unwrap();
        let info = DeviceCreateInfo::default().with_queue_count(CommandType::Transfer, 1);
        let handle = instance.create_device(&info).unwrap();
        let device = instance.device(handle).unwrap();
        device
            .create_buffer(&BufferCreateInfo::new(64, BufferUsageFlags::VERTEX_BUFFER))
            .unwrap();
        assert_eq!(instance.device_count(), 1);
        assert!(backend.live_total() > 0);

        drop(instance);
        assert_eq!(backend.live_total(), 0);
        assert_eq!(device.object_count(), 0);
    }

    #[test]
    fn test_destroy_device_twice() {
        let _guard = serial();
        let backend = HeadlessBackend::new();
        let instance = Instance::create(&headless_info(), Arc::new(backend.clone())).unwrap();
        let handle = instance.create_device(&DeviceCreateInfo::default()).unwrap();

        instance.destroy_device(handle);
        instance.destroy_device(handle);
        assert_eq!(instance.device_count(), 0);
        assert_eq!(backend.live_total(), 0);
    }

    #[test]
    fn test_invalid_device_info_rejected() {
        let _guard = serial();
        let instance = Instance::create(&headless_info(), Arc::new(HeadlessBackend::new())).unwrap();
        let info = DeviceCreateInfo::default().with_queue_count(CommandType::Graphics, 0);
        assert!(matches!(instance.create_device(&info), Err(RhiError::Config(_))));
        assert_eq!(instance.device_count(), 0);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = std::env::temp_dir().join(format!("rhi_instance_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("instance.toml");

        let info = headless_info().with_debug(true);
        info.save_to_file(&path).unwrap();
        assert_eq!(InstanceCreateInfo::load_from_file(&path).unwrap(), info);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
