//! FxCache Common Types
//!
//! Value types shared by the exchange-rate cache: currencies, directional
//! rate keys, positive decimal rates, monetary amounts and the clock used
//! for expiration decisions.

pub mod error;
pub mod monetary;
pub mod time;

pub use error::*;
pub use monetary::*;
pub use time::*;
