pub mod capability;
pub mod lending_store;
pub mod policy_source;

pub use capability::*;
pub use lending_store::*;
pub use policy_source::*;
