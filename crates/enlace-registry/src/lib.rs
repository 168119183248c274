//! Component driver registry for the enlace pipeline.
//!
//! The topology builder instantiates components by algorithm identifier;
//! this crate provides the lookup table it consults. A [`DriverRegistry`]
//! is an explicit object handed to the system at initialization — there
//! is no process-wide global — and it synchronizes its table internally,
//! so registration and creation may race freely.
//!
//! # Example
//!
//! ```rust
//! use enlace_core::AdapterConfig;
//! use enlace_registry::DriverRegistry;
//!
//! let registry = DriverRegistry::with_builtin_drivers();
//! let adapter = registry
//!     .create("volume", AdapterConfig::default())
//!     .expect("volume ships with the registry");
//! ```

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use enlace_core::{AdapterConfig, ModuleAdapter};
use enlace_modules::{Rechunker, StreamCopier, Volume};

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No driver registered under the requested identifier.
    #[error("no driver registered for '{0}'")]
    NotFound(String),

    /// A driver with this identifier is already registered.
    #[error("driver '{0}' is already registered")]
    DuplicateId(&'static str),
}

/// One registered component driver.
#[derive(Clone)]
pub struct ComponentDriver {
    /// Unique algorithm identifier (lowercase, no spaces).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Instantiates a fresh adapter hosting this driver's module.
    pub create: fn(AdapterConfig) -> ModuleAdapter,
}

/// Lookup table from algorithm identifier to component driver.
///
/// Internally synchronized; lifetime is tied to system startup and
/// shutdown by whoever owns it.
pub struct DriverRegistry {
    drivers: Mutex<Vec<ComponentDriver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: Mutex::new(Vec::new()),
        }
    }

    /// A registry preloaded with the reference module drivers.
    pub fn with_builtin_drivers() -> Self {
        let registry = Self::new();
        for driver in builtin_drivers() {
            // Builtin ids are distinct by construction.
            let _ = registry.register(driver);
        }
        registry
    }

    /// Add a driver. Fails if the identifier is already taken.
    pub fn register(&self, driver: ComponentDriver) -> Result<(), RegistryError> {
        let mut drivers = self.lock();
        if drivers.iter().any(|d| d.id == driver.id) {
            return Err(RegistryError::DuplicateId(driver.id));
        }
        debug!(id = driver.id, "driver registered");
        drivers.push(driver);
        Ok(())
    }

    /// Remove a driver by identifier. Returns whether one was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut drivers = self.lock();
        let before = drivers.len();
        drivers.retain(|d| d.id != id);
        before != drivers.len()
    }

    /// Instantiate a component by algorithm identifier.
    pub fn create(&self, id: &str, config: AdapterConfig) -> Result<ModuleAdapter, RegistryError> {
        let create = {
            let drivers = self.lock();
            drivers
                .iter()
                .find(|d| d.id == id)
                .map(|d| d.create)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?
        };
        debug!(id, "component created");
        Ok(create(config))
    }

    /// Identifiers of every registered driver.
    pub fn ids(&self) -> Vec<&'static str> {
        self.lock().iter().map(|d| d.id).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ComponentDriver>> {
        self.drivers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

/// The drivers shipped with the reference modules.
pub fn builtin_drivers() -> Vec<ComponentDriver> {
    vec![
        ComponentDriver {
            id: "volume",
            name: "Volume",
            create: |config| ModuleAdapter::new(Box::new(Volume::new()), config),
        },
        ComponentDriver {
            id: "rechunk",
            name: "Rechunker",
            // 1536-byte blocks: a deliberately period-misaligned default
            // so deep buffering engages out of the box.
            create: |config| ModuleAdapter::new(Box::new(Rechunker::new(1536)), config),
        },
        ComponentDriver {
            id: "copier",
            name: "Stream Copier",
            create: |config| ModuleAdapter::new(Box::new(StreamCopier::new()), config),
        },
    ]
}
