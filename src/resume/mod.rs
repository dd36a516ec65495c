pub mod store;

pub use store::{ResumptionSelector, ResumptionStateStore};
