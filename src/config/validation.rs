use crate::config::types::{Config, OutputConfig, ParserConfig, SpiderConfig, UserAgentConfig};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_spider_config(&config.spider)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_parser_config(&config.parser)?;
    Ok(())
}

/// Splits a field rule into its selector and optional attribute name
///
/// `"a.title@href"` reads the `href` attribute of `a.title`; `"span.price"`
/// reads the element text.
pub fn split_field_selector(rule: &str) -> (&str, Option<&str>) {
    match rule.rsplit_once('@') {
        Some((selector, attr)) if !attr.is_empty() && !attr.contains(char::is_whitespace) => {
            (selector.trim(), Some(attr))
        }
        _ => (rule.trim(), None),
    }
}

/// Validates spider configuration
fn validate_spider_config(config: &SpiderConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.request_timeout_secs
    {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and request_timeout_secs, got {}",
            config.connect_timeout_secs
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.max_concurrent_spiders < 1 || config.max_concurrent_spiders > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_spiders must be between 1 and 32, got {}",
            config.max_concurrent_spiders
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
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

    if matches!(config.snapshot_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "snapshot_dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates that every selector in the parser section compiles
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    validate_selector("item-selector", &config.item_selector)?;
    validate_selector("next-selector", &config.next_selector)?;

    for (name, rule) in &config.fields {
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "parser field names cannot be empty".to_string(),
            ));
        }
        let (selector, _) = split_field_selector(rule);
        validate_selector(name, selector)?;
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    if selector.trim().is_empty() {
        return Err(ConfigError::InvalidSelector(format!(
            "{} cannot be empty",
            name
        )));
    }

    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", name, selector, e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

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
