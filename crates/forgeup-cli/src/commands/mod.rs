//! Subcommand implementations.

pub mod env;
pub mod install;

use forgeup::ActivationDescriptor;
use serde_json::{Value, json};

/// The activation document both subcommands print.
///
/// Shape consumed by build backends: `env` holds the variables to set,
/// `bin_dir` and `install_dir` locate the toolchain on disk.
pub(crate) fn info_document(descriptor: &ActivationDescriptor) -> Value {
    json!({
        "env": &descriptor.env,
        "bin_dir": &descriptor.bin_dir,
        "install_dir": &descriptor.toolchain_dir,
    })
}
