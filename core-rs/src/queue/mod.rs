// queue/mod.rs - Label resolution queue

pub mod resolution_queue;
pub mod timer;

pub use resolution_queue::{validate_instance_id, QueuePhase, ResolutionQueue};
pub use timer::{ManualTimer, Sleep, Timer, TokioTimer};
