//! Business services used by handlers.

pub mod probe;
pub mod submission;

pub use probe::{SourceProber, YtDlpProber};
pub use submission::submit_trim;
