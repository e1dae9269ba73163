pub mod apply;
pub mod common;
pub mod get;
pub mod purge;
