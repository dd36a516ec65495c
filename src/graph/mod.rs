pub mod project_graph;
pub mod weight;

pub use project_graph::{ModuleDescriptor, ModuleId, ProjectGraph};
pub use weight::{PriorityKey, WeightCalculator};
