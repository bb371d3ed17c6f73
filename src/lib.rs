pub mod enforce;
pub mod errors;
pub mod events;
pub mod models;
pub mod resolver;
pub mod service;
pub mod store;

// Re-export the pieces callers wire together.
pub use enforce::Enforcer;
pub use resolver::{Action, Decision, Predicate, Resolver};
pub use service::AccessControl;
