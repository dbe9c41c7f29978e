//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`service`].

use serde::Deserialize;

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"census"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// US Census Bureau batch geographies geocoder.
    Census {
        /// API base URL (e.g., `"https://geocoding.geo.census.gov/geocoder"`).
        base_url: String,
        /// Benchmark name (e.g., `"Public_AR_Current"`).
        benchmark: String,
        /// Geography vintage (e.g., `"Current_Current"`).
        vintage: String,
        /// Maximum addresses per batch request.
        max_batch_size: usize,
        /// Retries after the first attempt on transient failures.
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_timeout_secs() -> u64 {
    600
}

impl GeocodingService {
    /// Returns the provider's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Census { base_url, .. } => base_url,
        }
    }

    /// Returns the provider's per-call batch limit.
    #[must_use]
    pub const fn max_batch_size(&self) -> usize {
        match &self.provider {
            ProviderConfig::Census { max_batch_size, .. } => *max_batch_size,
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[("census", include_str!("../services/census.toml"))];

/// Returns all geocoding service configurations.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns the service with the given id, if configured.
#[must_use]
pub fn service(id: &str) -> Option<GeocodingService> {
    all_services().into_iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn census_service_is_configured() {
        let census = service("census").unwrap();
        assert!(!census.name.is_empty());
        assert!(census.base_url().starts_with("https://"));
        assert_eq!(census.max_batch_size(), 5000);
    }

    #[test]
    fn missing_retry_fields_use_defaults() {
        let svc: GeocodingService = toml::de::from_str(
            r#"
            id = "local"
            name = "Local mirror"

            [provider]
            type = "census"
            base_url = "http://localhost:8080/geocoder"
            benchmark = "Public_AR_Current"
            vintage = "Current_Current"
            max_batch_size = 100
            "#,
        )
        .unwrap();
        let ProviderConfig::Census {
            max_retries,
            timeout_secs,
            ..
        } = svc.provider;
        assert_eq!(max_retries, 3);
        assert_eq!(timeout_secs, 600);
    }
}
