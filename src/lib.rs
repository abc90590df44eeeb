pub mod database_ops;
pub mod import;
pub mod normalization;

pub mod util {
    pub mod env;
    pub mod tracing;
}
