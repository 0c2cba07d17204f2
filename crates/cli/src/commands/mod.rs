//! Command implementations.

mod list;
mod run;
mod validate;

pub use list::run_list;
pub use run::run_pipeline;
pub use validate::run_validate;
