pub mod credential;
pub mod region;
pub mod roster;
