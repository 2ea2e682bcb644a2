pub mod process;

pub use process::{ExternalCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
