use crate::config::types::{
    BlueprintConfig, Config, CrawlerConfig, EnrichmentRetryConfig, PagingMode, PoolConfig,
    SourceConfig, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_pool_config(&config.pool)?;
    validate_enrichment_retry_config(&config.enrichment_retry)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.output.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    let mut codes = HashSet::new();
    for blueprint in &config.blueprints {
        validate_blueprint(blueprint)?;
        if !codes.insert(blueprint.code.trim()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate blueprint code '{}'",
                blueprint.code
            )));
        }
    }

    for source in &config.sources {
        validate_source(source, config)?;
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.navigation_timeout_ms == 0 || config.default_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "navigation and default timeouts must be > 0".to_string(),
        ));
    }

    if config.fetch_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_attempts must be >= 1, got {}",
            config.fetch_attempts
        )));
    }

    if config.max_backoff_ms < config.retry_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "max_backoff_ms ({}) must be >= retry_backoff_ms ({})",
            config.max_backoff_ms, config.retry_backoff_ms
        )));
    }

    if config.run_budget_ms == Some(0) {
        return Err(ConfigError::Validation(
            "run_budget_ms must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "pool workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "pool queue_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_enrichment_retry_config(config: &EnrichmentRetryConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "enrichment batch_size must be >= 1".to_string(),
        ));
    }

    if config.scheduler_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "enrichment scheduler_interval_ms must be > 0".to_string(),
        ));
    }

    if crate::enrichment::EnrichmentKey::from_db_string(&config.enrichment_key).is_none() {
        return Err(ConfigError::Validation(format!(
            "Unknown enrichment key '{}'",
            config.enrichment_key
        )));
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_blueprint(blueprint: &BlueprintConfig) -> Result<(), ConfigError> {
    if blueprint.code.trim().is_empty() {
        return Err(ConfigError::Validation(
            "blueprint code cannot be empty".to_string(),
        ));
    }

    // A blank entry URL is legal; such blueprints are skipped at run time.
    if !blueprint.entry_url.trim().is_empty() {
        Url::parse(blueprint.entry_url.trim()).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid entry_url for blueprint '{}': {}",
                blueprint.code, e
            ))
        })?;
    }

    let paging = &blueprint.paging;
    if paging.max_pages < 1 || paging.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "Blueprint '{}' must have max_pages >= 1 and page_size >= 1",
            blueprint.code
        )));
    }

    if paging.mode == PagingMode::CursorToken && paging.token_selector.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "Blueprint '{}' uses cursor-token paging without a token_selector",
            blueprint.code
        )));
    }

    for field in &blueprint.parser.fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Blueprint '{}' has a parser field without a name",
                blueprint.code
            )));
        }
    }

    Ok(())
}

fn validate_source(source: &SourceConfig, config: &Config) -> Result<(), ConfigError> {
    if source.code.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source code cannot be empty".to_string(),
        ));
    }

    if config.blueprint(&source.blueprint).is_none() {
        return Err(ConfigError::UnknownBlueprint {
            source_code: source.code.clone(),
            blueprint: source.blueprint.clone(),
        });
    }

    let override_url = source.entry_url_override.trim();
    if !override_url.is_empty() {
        Url::parse(override_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid entry_url_override for source '{}': {}",
                source.code, e
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    #[test]
    fn test_fetch_attempts_must_be_positive() {
        let config = CrawlerConfig {
            fetch_attempts: 0,
            ..crawler()
        };
        assert!(validate_crawler_config(&config).is_err());
        assert!(validate_crawler_config(&crawler()).is_ok());
    }

    #[test]
    fn test_zero_run_budget_rejected() {
        let config = CrawlerConfig {
            run_budget_ms: Some(0),
            ..crawler()
        };
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_pool_bounds() {
        let mut pool = PoolConfig::default();
        assert!(validate_pool_config(&pool).is_ok());

        pool.workers = 0;
        assert!(validate_pool_config(&pool).is_err());

        pool.workers = 65;
        assert!(validate_pool_config(&pool).is_err());

        pool.workers = 4;
        pool.queue_capacity = 0;
        assert!(validate_pool_config(&pool).is_err());
    }

    #[test]
    fn test_unknown_enrichment_key_rejected() {
        let config = EnrichmentRetryConfig {
            enrichment_key: "horoscope".to_string(),
            ..EnrichmentRetryConfig::default()
        };
        assert!(validate_enrichment_retry_config(&config).is_err());
        assert!(validate_enrichment_retry_config(&EnrichmentRetryConfig::default()).is_ok());
    }

    #[test]
    fn test_crawler_name_characters() {
        let mut agent = UserAgentConfig {
            crawler_name: "Job-Crawler2".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/bot".to_string(),
        };
        assert!(validate_user_agent_config(&agent).is_ok());

        agent.crawler_name = "job crawler".to_string();
        assert!(validate_user_agent_config(&agent).is_err());
    }
}
