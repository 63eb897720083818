//! Shared services: the payment verification protocol, forged-callback
//! tracking, the session gate and telemetry wiring.

pub mod fraud;
pub mod payment;
pub mod session;
pub mod telemetry;

pub use fraud::*;
pub use payment::*;
pub use session::*;
pub use telemetry::*;
