pub mod actor;
pub mod entry;
pub mod grant;
pub mod membership;
pub mod project;
pub mod resource;

pub use actor::{Actor, GlobalRole};
pub use entry::TimeEntry;
pub use grant::{Grant, GrantCapabilities};
pub use membership::{Membership, ProjectRole};
pub use project::Project;
pub use resource::{ProfileField, Resource, ResourceKind};
