//! Engine version detection and capability adapter.
//!
//! Wire strings that differ between engine major versions are gathered in
//! [`QueryAdapter`], selected once from the engine's reported version.

use std::fmt;

use tracing::debug;

use crate::errors::IndexError;
use crate::interfaces::SearchTransport;
use crate::types::{EngineRequest, HttpMethod, RootInfo};

/// Oldest engine version that supports point-in-time searches.
pub const MIN_PIT_VERSION: (u32, u32) = (7, 10);

const SUPPORTED_VERSIONS: &str = "7.x, 8.x";

/// Supported engine major versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineFamily {
    V7,
    V8,
}

/// Version reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    family: EngineFamily,
    major: u32,
    minor: u32,
    patch: u32,
    raw: String,
}

impl EngineVersion {
    /// Parse a version such as `7.16.1` or `8.0.0-rc2`.
    pub fn parse(version: &str) -> Result<Self, IndexError> {
        let unsupported = || IndexError::UnsupportedVersion {
            version: version.to_string(),
            supported: SUPPORTED_VERSIONS.to_string(),
        };

        let numeric = version.split('-').next().unwrap_or_default();
        let mut parts = numeric.split('.').map(str::parse::<u32>);
        let major = match parts.next() {
            Some(Ok(major)) => major,
            _ => return Err(unsupported()),
        };
        let minor = match parts.next() {
            Some(Ok(minor)) => minor,
            None => 0,
            Some(Err(_)) => return Err(unsupported()),
        };
        let patch = match parts.next() {
            Some(Ok(patch)) => patch,
            None => 0,
            Some(Err(_)) => return Err(unsupported()),
        };
        let family = match major {
            7 => EngineFamily::V7,
            8 => EngineFamily::V8,
            _ => return Err(unsupported()),
        };

        Ok(Self {
            family,
            major,
            minor,
            patch,
            raw: version.to_string(),
        })
    }

    /// Ask the engine for its version via `GET /`.
    pub async fn discover(transport: &dyn SearchTransport) -> Result<Self, IndexError> {
        let response = transport
            .perform(EngineRequest::new(HttpMethod::Get, "/"))
            .await?;
        if !response.is_success() {
            return Err(IndexError::config(format!(
                "Failed to get engine version: {}",
                response.status_line()
            )));
        }
        let info: RootInfo = response.json()?;
        debug!(version = %info.version.number, "Discovered engine version");
        Self::parse(&info.version.number)
    }

    pub fn family(&self) -> EngineFamily {
        self.family
    }

    /// Whether point-in-time searches are available on this version.
    pub fn supports_point_in_time(&self) -> bool {
        (self.major, self.minor) >= MIN_PIT_VERSION
    }

    /// Capability adapter for this version.
    pub fn adapter(&self) -> QueryAdapter {
        QueryAdapter::for_family(self.family)
    }

    /// `(major, minor, patch)` triple.
    pub fn numbers(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Version-dependent wire strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAdapter {
    exact_field_type: &'static str,
    string_field_type: &'static str,
    index_property: &'static str,
    raw_fields_key: &'static str,
    indices_exist_params: &'static [(&'static str, &'static str)],
}

impl QueryAdapter {
    pub fn for_family(family: EngineFamily) -> Self {
        match family {
            EngineFamily::V7 | EngineFamily::V8 => Self {
                exact_field_type: "keyword",
                string_field_type: "text",
                index_property: "true",
                raw_fields_key: "_source",
                indices_exist_params: &[("allow_no_indices", "false")],
            },
        }
    }

    /// Mapping type of exact-match fields.
    pub fn exact_field_type(&self) -> &'static str {
        self.exact_field_type
    }

    /// Mapping type of analyzed string fields.
    pub fn string_field_type(&self) -> &'static str {
        self.string_field_type
    }

    /// Value of the `index` property on exact-match sub-fields.
    pub fn index_property(&self) -> &'static str {
        self.index_property
    }

    /// Key of a hit under which field values are returned.
    pub fn raw_fields_key(&self) -> &'static str {
        self.raw_fields_key
    }

    /// Query parameters for the index existence check.
    pub fn indices_exist_params(&self) -> &'static [(&'static str, &'static str)] {
        self.indices_exist_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_versions() {
        for v in ["7.0.0-alpha1", "7.0.0-rc2", "7.0.10", "7.16.1", "7.17.0"] {
            assert_eq!(EngineVersion::parse(v).unwrap().family(), EngineFamily::V7, "{}", v);
        }
        for v in ["8.0.0-beta1", "8.9.2", "8.15.0"] {
            assert_eq!(EngineVersion::parse(v).unwrap().family(), EngineFamily::V8, "{}", v);
        }
    }

    #[test]
    fn test_unsupported_version() {
        let err = EngineVersion::parse("4.0.0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported version: [4.0.0]. Supported versions: 7.x, 8.x"
        );
        assert!(EngineVersion::parse("garbage").is_err());
        assert!(EngineVersion::parse("7.x").is_err());
    }

    #[test]
    fn test_point_in_time_support() {
        assert!(!EngineVersion::parse("7.9.3").unwrap().supports_point_in_time());
        assert!(EngineVersion::parse("7.10.0").unwrap().supports_point_in_time());
        assert!(EngineVersion::parse("7.17.1").unwrap().supports_point_in_time());
        assert!(EngineVersion::parse("8.0.0").unwrap().supports_point_in_time());
    }

    #[test]
    fn test_numbers_and_display() {
        let version = EngineVersion::parse("8.9.2-SNAPSHOT").unwrap();
        assert_eq!(version.numbers(), (8, 9, 2));
        assert_eq!(version.to_string(), "8.9.2-SNAPSHOT");
    }

    #[test]
    fn test_adapter_strings() {
        let adapter = EngineVersion::parse("7.17.0").unwrap().adapter();
        assert_eq!(adapter.exact_field_type(), "keyword");
        assert_eq!(adapter.string_field_type(), "text");
        assert_eq!(adapter.raw_fields_key(), "_source");
    }
}
