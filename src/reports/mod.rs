pub mod generator;
pub mod html;
pub mod models;
pub mod pdf;
pub mod scheduler;
pub mod text;

pub use models::{AlertEntry, DeviceReport, ReportData, ReportPeriod, ZfsPoolReport};
pub use scheduler::ReportScheduler;
