pub mod lending_store;
pub mod policy_source;

pub use lending_store::LendingStore as InMemoryLendingStore;
pub use policy_source::FixedPolicySource;
