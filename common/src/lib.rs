//! Shared module archive types: module names, submitter identities, module
//! description files and HTML escaping of tool output.

pub mod html;
pub mod identity;
pub mod info;
pub mod module_name;

pub use identity::{Identity, IdentityError, Submitter};
pub use info::{InfoError, ModuleInfo};
pub use module_name::{ModuleName, NamingError};
