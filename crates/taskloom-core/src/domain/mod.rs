//! Task graph domain model: tasks, content-addressed identity and the DAG.

pub mod digest;
pub mod error;
pub mod graph;
pub mod task;

pub use error::{GraphError, GraphResult};
pub use graph::TaskGraph;
pub use task::{ArtifactDescriptor, ArtifactKind, Task, TaskType};
