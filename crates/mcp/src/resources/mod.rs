mod registry;
pub mod template;
pub mod users;

pub use registry::{Resource, ResourceRegistry, ResourceTemplate};
pub use template::{TemplateError, UriTemplate};
pub use users::{AllUsersResource, UserProfileResource};
