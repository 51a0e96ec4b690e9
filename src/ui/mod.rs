pub mod progress;

pub use progress::ProgressLine;
