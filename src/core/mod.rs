//! Core business logic modules.

pub mod associated;
pub mod context;
pub mod decision;
pub mod duplicates;
pub mod executor;
pub mod filters;
pub mod hash_cache;
pub mod planner;
pub mod scanner;
