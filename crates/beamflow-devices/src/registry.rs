/*!
 * Device registry for beamflow.
 *
 * Devices are registered under their name. The registry can stop every
 * registered device at once, which is what an operator abort does.
 */
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::device::{Device, DeviceError, DeviceInfo, Result};

/// Device registry
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, Arc<dyn Device>>>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under its name
    pub fn register<D: Device + 'static>(&self, device: D) -> Result<Arc<D>> {
        let device = Arc::new(device);
        self.register_shared(device.clone())?;
        Ok(device)
    }

    /// Register an already shared device
    pub fn register_shared(&self, device: Arc<dyn Device>) -> Result<()> {
        let name = device.name().to_string();
        let mut devices = self.devices.write().map_err(|_| {
            DeviceError::other("Failed to acquire write lock on device registry")
        })?;

        if devices.contains_key(&name) {
            return Err(DeviceError::AlreadyRegistered(name));
        }

        devices.insert(name.clone(), device);
        debug!("Registered device {}", name);
        Ok(())
    }

    /// Unregister a device
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut devices = self.devices.write().map_err(|_| {
            DeviceError::other("Failed to acquire write lock on device registry")
        })?;

        if devices.remove(name).is_none() {
            return Err(DeviceError::NotFound(name.to_string()));
        }
        debug!("Unregistered device {}", name);
        Ok(())
    }

    /// Get a device by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Device>> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::other("Failed to acquire read lock on device registry")
        })?;

        devices
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }

    /// Names of all registered devices, sorted
    pub fn names(&self) -> Result<Vec<String>> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::other("Failed to acquire read lock on device registry")
        })?;
        Ok(devices.keys().cloned().collect())
    }

    /// Information about all registered devices
    pub fn infos(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::other("Failed to acquire read lock on device registry")
        })?;
        Ok(devices.values().map(|d| d.info().clone()).collect())
    }

    /// Stop every device; failures are logged and the first one returned
    pub async fn stop_all(&self) -> Result<()> {
        let devices: Vec<Arc<dyn Device>> = {
            let devices = self.devices.read().map_err(|_| {
                DeviceError::other("Failed to acquire read lock on device registry")
            })?;
            devices.values().cloned().collect()
        };

        let mut first_error = None;
        for device in devices {
            if let Err(e) = device.stop().await {
                warn!("Failed to stop {}: {}", device.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A registry shared between tasks
pub type SharedDeviceRegistry = Arc<DeviceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Table;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Dummy {
        info: DeviceInfo,
        stops: AtomicUsize,
        fail: bool,
    }

    impl Dummy {
        fn new(name: &str, fail: bool) -> Self {
            Self {
                info: DeviceInfo::new(name, "TST", "dummy"),
                stops: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Device for Dummy {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DeviceError::other("controller offline"));
            }
            Ok(())
        }

        async fn status(&self) -> Result<Table> {
            Ok(Table::new(["Motor"]))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DeviceRegistry::new();
        registry.register(Dummy::new("ladm", false)).unwrap();
        registry.register(Dummy::new("dccm", false)).unwrap();

        assert_eq!(registry.names().unwrap(), vec!["dccm", "ladm"]);
        assert_eq!(registry.get("ladm").unwrap().device_type(), "dummy");
        assert!(matches!(
            registry.register(Dummy::new("ladm", false)),
            Err(DeviceError::AlreadyRegistered(_))
        ));

        registry.unregister("ladm").unwrap();
        assert!(matches!(registry.get("ladm"), Err(DeviceError::NotFound(_))));
        assert!(registry.unregister("ladm").is_err());
    }

    #[tokio::test]
    async fn test_stop_all_reaches_every_device() {
        let registry = DeviceRegistry::new();
        let bad = registry.register(Dummy::new("a", true)).unwrap();
        let good = registry.register(Dummy::new("b", false)).unwrap();

        assert!(registry.stop_all().await.is_err());
        assert_eq!(bad.stops.load(Ordering::SeqCst), 1);
        assert_eq!(good.stops.load(Ordering::SeqCst), 1);
    }
}
