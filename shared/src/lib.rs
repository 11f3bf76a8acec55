pub mod env;
pub mod metrics_defs;
