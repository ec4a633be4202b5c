use crate::config::types::{
    AiConfig, Config, EnrichmentConfig, FeedEntry, OutputConfig, SchedulerConfig, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_enrichment_config(&config.enrichment)?;
    validate_ai_config(&config.ai)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_feeds(&config.feeds)?;
    Ok(())
}

/// Validates fetch scheduler configuration
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.global_concurrency < 1 || config.global_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "global_concurrency must be between 1 and 100, got {}",
            config.global_concurrency
        )));
    }

    if config.per_domain_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "per_domain_concurrency must be >= 1, got {}",
            config.per_domain_concurrency
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "scheduler base_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates enrichment configuration
fn validate_enrichment_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "enrichment workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if !config.budget_ceiling_usd.is_finite() || config.budget_ceiling_usd < 0.0 {
        return Err(ConfigError::Validation(format!(
            "budget_ceiling_usd must be a non-negative amount, got {}",
            config.budget_ceiling_usd
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "enrichment base_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if config.batch_limit == Some(0) {
        return Err(ConfigError::Validation(
            "batch_limit must be >= 1 when set".to_string(),
        ));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "enrichment progress_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates AI API configuration
fn validate_ai_config(config: &AiConfig) -> Result<(), ConfigError> {
    Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api_url: {}", e)))?;

    if config.model.is_empty() {
        return Err(ConfigError::Validation("model cannot be empty".to_string()));
    }

    if config.api_key_env.is_empty() {
        return Err(ConfigError::Validation(
            "api_key_env cannot be empty".to_string(),
        ));
    }

    if config.max_tokens < 1 {
        return Err(ConfigError::Validation(
            "max_tokens must be >= 1".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::Validation(format!(
            "temperature must be between 0.0 and 2.0, got {}",
            config.temperature
        )));
    }

    for (name, price) in [
        ("input_cost_per_million", config.input_cost_per_million),
        ("output_cost_per_million", config.output_cost_per_million),
    ] {
        if !price.is_finite() || price < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a finite, non-negative price, got {}",
                name, price
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
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

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates the feed catalog
fn validate_feeds(feeds: &[FeedEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for feed in feeds {
        let url = Url::parse(&feed.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid feed URL '{}': {}", feed.url, e)))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Feed URL '{}' must use HTTP or HTTPS",
                feed.url
            )));
        }

        if !seen.insert(feed.url.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Feed URL '{}' is listed more than once",
                feed.url
            )));
        }

        if let Some(domain) = &feed.domain {
            validate_domain_string(domain)?;
        }

        if feed.theme.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Feed '{}' must have a theme",
                feed.url
            )));
        }
    }

    Ok(())
}

/// Validates a domain string
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'tagesschau.de')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
