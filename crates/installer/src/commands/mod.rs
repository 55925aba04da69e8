//! Subcommands of `og-install`.

pub mod check;
pub mod install;
pub mod post_install;
pub mod status;
