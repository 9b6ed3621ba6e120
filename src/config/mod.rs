//! Configuration module for Job-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use job_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Fetch attempts per page: {}", config.crawler.fetch_attempts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BlueprintConfig, Config, CrawlerConfig, EnrichmentRetryConfig, FieldConfig, FieldKind,
    OutputConfig, OverflowPolicy, PagingConfig, PagingMode, ParserConfig, PoolConfig,
    SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
