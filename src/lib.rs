pub mod catalog;
pub mod error;
pub mod faults;
pub mod gateway;
pub mod injector;
pub mod ledger;
pub mod report;
pub mod selector;
pub mod write_thread;

pub mod prelude {
    pub use crate::catalog::ImageCatalog;
    pub use crate::error::InjectionError;
    pub use crate::faults::{FaultKind, FaultSpec};
    pub use crate::gateway::{FaultGateway, ImageGateway, Pass};
    pub use crate::injector::{FaultInjector, RunRequest};
    pub use crate::ledger::{SessionLedger, SessionState, DEFAULT_LOG_DIR};
    pub use crate::report::RunReport;
    pub use crate::selector::{InjectionMode, InjectionSelector, SelectionStrategy};
}
