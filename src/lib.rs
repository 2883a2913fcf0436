pub mod import;
pub mod scheduler;
pub mod settings;
pub mod shell;
pub mod slots;
pub mod stale;
pub mod store;
mod utils;

pub use import::ImportResult;
pub use scheduler::{Scheduler, SchedulerEvent};
pub use settings::Settings;
pub use shell::{LogShell, Shell, SlotNotification};
pub use stale::{compute_stale_slot, StaleSlot};
pub use store::{Entry, EntryStore};
