// Pulselink - Heart-Rate Device Link and Streaming Pipeline

pub mod classify;
pub mod decode;
pub mod link;
pub mod status;
pub mod supervisor;
pub mod window;

pub use supervisor::{MonitorEvent, SessionState, Supervisor, SupervisorConfig};
pub use window::WINDOW_SIZE;
