//! Configuration module for the coordination plane
//!
//! Each binary (`manager`, `general-worker`, `product-worker`) loads an
//! [`AppConfig`] from environment-style variables at startup. There is no
//! config file and no typestate builder: every field has a documented
//! default, and the only hard requirement is the worker identity for the
//! two worker binaries.

pub mod builder;
pub mod types;

pub use builder::load_from_env;
pub use types::{AppConfig, ProxyConfig, RotationConfig, TabOpenStrategy, WorkerRole};
