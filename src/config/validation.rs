use crate::config::types::{Config, CrawlerConfig, FacetConfig, FacetValueConfig, SiteConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    validate_facets(&config.facets)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    if config.jitter_min_ms > config.jitter_max_ms {
        return Err(ConfigError::Validation(format!(
            "jitter-min-ms ({}) must not exceed jitter-max-ms ({})",
            config.jitter_min_ms, config.jitter_max_ms
        )));
    }

    if config.retry_budget < 1 {
        return Err(ConfigError::Validation(
            "retry-budget must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.stall_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "stall-interval-ms must be >= 100ms, got {}ms",
            config.stall_interval_ms
        )));
    }

    if config.stall_samples < 1 {
        return Err(ConfigError::Validation(
            "stall-samples must be >= 1".to_string(),
        ));
    }

    if config.progress_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "progress-interval-ms must be >= 100ms, got {}ms",
            config.progress_interval_ms
        )));
    }

    Ok(())
}

/// Validates site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.kind.is_empty() {
        return Err(ConfigError::Validation(
            "site kind cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;
    }

    Ok(())
}

/// Validates the facet ladder
///
/// Level names must be unique. An enumerated level needs at least one value;
/// a refining level must point at an earlier enumerated level and carry no
/// values of its own.
fn validate_facets(facets: &[FacetConfig]) -> Result<(), ConfigError> {
    let mut seen: HashSet<&str> = HashSet::new();

    for facet in facets {
        if facet.name.trim().is_empty() {
            return Err(ConfigError::InvalidFacet(
                "facet name cannot be empty".to_string(),
            ));
        }

        match &facet.refines {
            Some(parent) => {
                if !facet.values.is_empty() {
                    return Err(ConfigError::InvalidFacet(format!(
                        "refining facet '{}' cannot declare its own values",
                        facet.name
                    )));
                }

                let parent_level = facets
                    .iter()
                    .take_while(|f| f.name != facet.name)
                    .find(|f| &f.name == parent);

                match parent_level {
                    Some(p) if p.refines.is_none() => {}
                    Some(_) => {
                        return Err(ConfigError::InvalidFacet(format!(
                            "facet '{}' refines '{}', which is itself a refining level",
                            facet.name, parent
                        )));
                    }
                    None => {
                        return Err(ConfigError::InvalidFacet(format!(
                            "facet '{}' refines unknown or later level '{}'",
                            facet.name, parent
                        )));
                    }
                }
            }
            None => {
                if facet.values.is_empty() {
                    return Err(ConfigError::InvalidFacet(format!(
                        "facet '{}' must declare at least one value",
                        facet.name
                    )));
                }
                ensure_unique_labels(&facet.name, &facet.values)?;
                for value in &facet.values {
                    validate_facet_value(&facet.name, value)?;
                }
            }
        }

        if !seen.insert(facet.name.as_str()) {
            return Err(ConfigError::InvalidFacet(format!(
                "duplicate facet name '{}'",
                facet.name
            )));
        }
    }

    Ok(())
}

fn validate_facet_value(facet: &str, value: &FacetValueConfig) -> Result<(), ConfigError> {
    if value.label.trim().is_empty() {
        return Err(ConfigError::InvalidFacet(format!(
            "facet '{}' has a value with an empty label",
            facet
        )));
    }

    if value.params.is_empty() {
        return Err(ConfigError::InvalidFacet(format!(
            "facet '{}' value '{}' sets no parameters",
            facet, value.label
        )));
    }

    ensure_unique_labels(facet, &value.children)?;
    for child in &value.children {
        validate_facet_value(facet, child)?;
    }

    Ok(())
}

/// Sibling values must be distinguishable in provenance labels
fn ensure_unique_labels(facet: &str, values: &[FacetValueConfig]) -> Result<(), ConfigError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for value in values {
        if !seen.insert(value.label.as_str()) {
            return Err(ConfigError::InvalidFacet(format!(
                "facet '{}' declares value '{}' more than once",
                facet, value.label
            )));
        }
    }
    Ok(())
}
