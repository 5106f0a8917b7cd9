//! Public metadata types.

mod artifact;
mod entity;
mod role;

pub use artifact::{Artifact, SOURCE_ID_LEN};
pub use entity::{Endpoint, EntityDescriptor, RoleDescriptor};
pub use role::{EndpointType, RoleType};
