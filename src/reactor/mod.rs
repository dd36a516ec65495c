pub mod config;
pub mod executor;
pub mod policy;
pub mod report;
pub mod scheduler;

pub use config::{BuildConfig, FailurePolicy, Parallelism};
pub use executor::{BuildContext, ModuleBuilder, Reactor};
pub use policy::{FailureCoordinator, FailureDirective};
pub use report::{BuildOutcome, BuildReport, BuildStatus, ModuleState};
pub use scheduler::Scheduler;
