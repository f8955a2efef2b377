//! Type definitions

pub mod messages;
pub mod region;
pub mod roster;

pub use messages::*;
pub use region::*;
pub use roster::*;
