//! Shared helpers for the integration tests

#![allow(dead_code)]

use prism_host::{EngineConfig, EngineKind, Prism};

/// Text of the miniature engine used by the integration tests
pub const MINI_ENGINE_WAT: &str = include_str!("../fixtures/mini_engine.wat");

/// The miniature engine assembled to a binary module
pub fn mini_engine() -> Vec<u8> {
    wat::parse_str(MINI_ENGINE_WAT).expect("fixture assembles")
}

/// Every back end compiled into this build
pub fn available_kinds() -> Vec<EngineKind> {
    [EngineKind::Interpreted, EngineKind::Compiled]
        .into_iter()
        .filter(|kind| kind.is_available())
        .collect()
}

/// Load the miniature engine with `config`
pub fn load(config: EngineConfig) -> Prism {
    Prism::with_config(&mini_engine(), config).expect("fixture loads")
}

/// Load the miniature engine on one back end with default settings
pub fn load_kind(kind: EngineKind) -> Prism {
    load(EngineConfig::new().with_kind(kind))
}
