//! Request handlers.

pub mod health;
pub mod jobs;
pub mod queue;
pub mod uploads;
pub mod videos;

pub use health::*;
pub use jobs::*;
pub use queue::*;
pub use uploads::*;
pub use videos::*;
