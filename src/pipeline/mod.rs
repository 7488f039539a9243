// Data-integrity rules shared by the handler and the producer

pub mod envelope;
pub mod normalize;
pub mod partition;
pub mod sanitize;
pub mod source;
pub mod telemetry;

pub use normalize::{normalize, CanonicalMessage, CanonicalValue, ExactDecimal};
pub use sanitize::sanitize;
