pub mod role_capabilities;

pub use role_capabilities::RoleCapabilities;
