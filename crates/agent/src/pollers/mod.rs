mod calendar;

pub use calendar::{CalendarMonitor, MonitorConfig, TickReport};
