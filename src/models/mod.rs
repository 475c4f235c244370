mod normalization_config;

pub use normalization_config::{NormalizationConfig, ReplacementRule};
