//! ScannerReset - Scanner Microcontroller Reset Line
//!
//! The scanner is power-cycled through a GPIO line before the serial
//! port is opened: drive low, hold, drive high, wait for it to boot.
//! Called from the blocking serial thread, so implementations block.

use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Reset capability the serial ingest depends on
pub trait ScannerReset: Send + Sync {
    /// Returns once the scanner is ready for the port to be opened
    fn reset_scanner(&self) -> Result<()>;
}

/// No reset line wired
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScannerReset;

impl ScannerReset for NoopScannerReset {
    fn reset_scanner(&self) -> Result<()> {
        tracing::debug!("No scanner reset line configured, skipping pulse");
        Ok(())
    }
}

/// Reset through a sysfs GPIO line (`/sys/class/gpio/gpioN`)
#[derive(Debug, Clone)]
pub struct GpioScannerReset {
    pin: u32,
    low_time: Duration,
    settle_time: Duration,
    gpio_root: PathBuf,
}

impl GpioScannerReset {
    pub fn new(pin: u32, low_time: Duration, settle_time: Duration) -> Self {
        Self {
            pin,
            low_time,
            settle_time,
            gpio_root: PathBuf::from("/sys/class/gpio"),
        }
    }

    /// Use a different sysfs root (tests)
    pub fn with_gpio_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.gpio_root = root.into();
        self
    }

    fn pin_dir(&self) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", self.pin))
    }

    /// Export the pin and configure it as an output
    pub fn export(&self) -> Result<()> {
        if !self.pin_dir().exists() {
            self.write(self.gpio_root.join("export"), &self.pin.to_string())?;
        }
        self.write(self.pin_dir().join("direction"), "out")?;
        tracing::info!(pin = self.pin, "Scanner reset GPIO exported");
        Ok(())
    }

    fn set_level(&self, high: bool) -> Result<()> {
        self.write(self.pin_dir().join("value"), if high { "1" } else { "0" })
    }

    fn write(&self, path: PathBuf, value: &str) -> Result<()> {
        fs::write(&path, value)
            .map_err(|e| Error::Scanner(format!("{}: {}", path.display(), e)))
    }
}

impl ScannerReset for GpioScannerReset {
    fn reset_scanner(&self) -> Result<()> {
        tracing::info!(pin = self.pin, "Restarting scanner");
        self.set_level(false)?;
        std::thread::sleep(self.low_time);
        self.set_level(true)?;
        std::thread::sleep(self.settle_time);
        tracing::info!(pin = self.pin, "Scanner restart complete");
        Ok(())
    }
}
