//! Configuration module for hostprep.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `hostprep.yaml`
//! - Validation of configuration values
//! - Computing configuration fingerprints

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_TARGET_HOST, ENV_TARGET_IDENTITY_FILE, ENV_TARGET_PORT,
    ENV_TARGET_USER, apply_env_overrides_from, expand_home, find_config_file,
};
pub use spec::{ActionConfig, ActionKind, CommandList, ProvisionConfig, StepConfig, TargetConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
