mod registry;
pub mod users;

pub use registry::{json_schema_integer, json_schema_object, json_schema_string, Tool, ToolRegistry};
pub use users::CreateUserTool;
