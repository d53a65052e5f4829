mod scheduler;

pub use scheduler::{CycleReport, MonitorScheduler, MonitorSettings, MAX_DESCRIPTION_CHARS};
