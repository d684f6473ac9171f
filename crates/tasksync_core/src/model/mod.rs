mod task;
pub mod timestamp;

pub use task::{NewTask, Task, TaskPatch, describe_due};
