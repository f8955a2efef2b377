pub mod area_resolver;
pub mod headers;
pub mod identity;
pub mod memory;
pub mod normalize;
pub mod provisioning;
pub mod quota;
pub mod roster_import;
pub mod store;
