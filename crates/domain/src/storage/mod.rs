//! Storage contracts implemented by the SeaORM adapters.

mod traits;

pub use traits::*;
