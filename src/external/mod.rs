//! External collaborator contracts.
//!
//! Repository cloning, process invocation and template rendering are
//! invoked through narrow traits so the provisioning engine never depends
//! on their internals and orchestration tests can substitute recorders.

pub mod cloner;
pub mod runner;
pub mod template;

pub use cloner::{CloneError, GitCloner, RepositoryCloner};
pub use runner::{BuildError, ProcessOutput, ProcessRunner, ShellRunner};
pub use template::{TemplateContext, TemplateError, TemplateRenderer, VarRenderer};
