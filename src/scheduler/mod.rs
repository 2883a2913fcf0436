pub mod controller;
pub mod state;

pub use controller::{Scheduler, SchedulerEvent};
pub use state::SchedulerState;
