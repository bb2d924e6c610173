//! Core logic for transitioning the machine into and out of low power
//! states (suspend, hibernate, hybrid sleep, suspend-then-hibernate)
//! through the kernel power management interfaces, running hook programs
//! around the transition.

pub mod alarm;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod fiemap;
pub mod hooks;
pub mod resume;
pub mod sleep;
pub mod swap;
pub mod sysfs;

pub use config::{SleepConfig, SleepSettings, Verb};
pub use error::SleepError;
pub use sleep::{execute, execute_suspend_then_hibernate, SleepEnv};
