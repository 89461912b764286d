pub mod gate;

pub use gate::{RejectionReason, RiskConfig, RiskGate, DEFAULT_MIN_CONFIDENCE};
