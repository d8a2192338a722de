//! Public types for the genexec API.

mod request;
mod result;

pub use request::{GenerationRequest, ParamValue};
pub use result::{GenerationOutcome, GenerationResult};
