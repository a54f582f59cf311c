//! Configuration validation.

use super::{Config, ConnectionDescriptor};
use crate::core::identifier::{validate_identifier, validate_source_name};
use crate::error::{EtlError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let wh = &config.warehouse;
    if wh.host.is_empty() {
        return Err(EtlError::Config("warehouse.host is required".into()));
    }
    if wh.database.is_empty() {
        return Err(EtlError::Config("warehouse.database is required".into()));
    }
    if wh.user.is_empty() {
        return Err(EtlError::Config("warehouse.user is required".into()));
    }
    if wh.pool_size == 0 {
        return Err(EtlError::Config("warehouse.pool_size must be at least 1".into()));
    }
    validate_identifier(&wh.schema)
        .map_err(|e| EtlError::Config(format!("warehouse.schema: {}", e)))?;
    validate_identifier(&config.metadata.schema)
        .map_err(|e| EtlError::Config(format!("metadata.schema: {}", e)))?;

    if config.etl.chunk_size == Some(0) {
        return Err(EtlError::Config("etl.chunk_size must be greater than 0".into()));
    }
    if config.etl.batch_size == Some(0) {
        return Err(EtlError::Config("etl.batch_size must be greater than 0".into()));
    }
    if config.etl.actor.trim().is_empty() {
        return Err(EtlError::Config("etl.actor cannot be empty".into()));
    }

    for (name, descriptor) in &config.sources {
        validate_source_name(name)
            .map_err(|e| EtlError::Config(format!("sources.{}: {}", name, e)))?;
        validate_descriptor(descriptor)
            .map_err(|e| EtlError::Config(format!("sources.{}: {}", name, e)))?;
    }

    Ok(())
}

/// Check the required fields of a source descriptor.
pub fn validate_descriptor(d: &ConnectionDescriptor) -> Result<()> {
    let missing: Vec<&str> = [
        ("host", d.host.trim().is_empty()),
        ("database", d.database.trim().is_empty()),
        ("username", d.username.trim().is_empty()),
        ("password", d.password.is_empty()),
    ]
    .into_iter()
    .filter(|(_, empty)| *empty)
    .map(|(field, _)| field)
    .collect();

    if !missing.is_empty() {
        return Err(EtlError::Validation(format!(
            "missing required connection fields: {}",
            missing.join(", ")
        )));
    }
    if d.port == Some(0) {
        return Err(EtlError::Validation("port must be between 1 and 65535".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    fn config_with(extra: &str) -> String {
        format!(
            "warehouse:\n  host: localhost\n  database: wh\n  user: etl\n{}",
            extra
        )
    }

    #[test]
    fn test_missing_warehouse_host() {
        let err = Config::from_yaml("warehouse:\n  host: ''\n  database: wh\n  user: u\n")
            .unwrap_err();
        assert!(err.to_string().contains("warehouse.host"));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = Config::from_yaml(&config_with("etl:\n  chunk_size: 0\n")).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_bad_source_name_rejected() {
        let yaml = config_with(
            "sources:\n  shop-1:\n    driver: mysql\n    host: h\n    database: d\n    username: u\n    password: p\n",
        );
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("sources.shop-1"));
    }

    #[test]
    fn test_source_missing_fields_listed() {
        let yaml = config_with(
            "sources:\n  shop1:\n    driver: mysql\n    host: h\n    database: ''\n    username: u\n    password: ''\n",
        );
        let err = Config::from_yaml(&yaml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("database"));
        assert!(msg.contains("password"));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let yaml = config_with(
            "sources:\n  shop1:\n    driver: oracle\n    host: h\n    database: d\n    username: u\n    password: p\n",
        );
        assert!(Config::from_yaml(&yaml).is_err());
    }
}
