//! Configuration schema and loading for rotakey.
//!
//! The configuration is a JSON document holding failover groups, named
//! credentials and engine tunables. Scalar tunables can be overridden from
//! `ROTAKEY_*` environment variables through figment.

pub mod paths;
pub mod schema;
pub mod store;

pub use schema::{
    ClassifierConfig, Config, CooldownScope, EndpointEntry, Group, RuleCategory, RuleConfig,
};
pub use store::ConfigStore;
