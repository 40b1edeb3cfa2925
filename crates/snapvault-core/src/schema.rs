//! Recognised pool and filesystem properties.
//!
//! Each schema is built once per process and never mutated afterwards. Reads
//! and writes are validated here before any external command is issued.

use crate::error::{SnapvaultError, SnapvaultResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Sentinel the external tools print for an unset value.
const UNSET_SENTINEL: &str = "-";

/// How a property may be read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Readonly,
    Boolean,
    String,
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => Some(value),
            PropertyValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(true) => f.write_str("on"),
            PropertyValue::Bool(false) => f.write_str("off"),
            PropertyValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

/// Predicate over candidate values.
pub type Validator = fn(&PropertyValue) -> bool;

/// One recognised property.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: PropertyKind,
    /// External `-` maps to "no value" instead of being returned verbatim.
    pub optional: bool,
    /// Checked on every write; readonly properties may also be checked on read.
    pub validator: Option<Validator>,
    /// Readonly value reported as `on`/`off` and decoded to a boolean.
    pub flag: bool,
}

/// Immutable table of property specs.
#[derive(Debug)]
pub struct PropertySchema {
    scope: &'static str,
    entries: HashMap<&'static str, PropertySpec>,
}

impl PropertySchema {
    fn new(scope: &'static str, specs: Vec<PropertySpec>) -> Self {
        let entries = specs.into_iter().map(|spec| (spec.name, spec)).collect();
        Self { scope, entries }
    }

    /// Which subsystem this schema describes (`zpool` or `zfs`).
    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn spec(&self, name: &str) -> SnapvaultResult<&PropertySpec> {
        self.entries
            .get(name)
            .ok_or_else(|| SnapvaultError::InvalidProperty(name.to_string()))
    }

    pub fn kind_of(&self, name: &str) -> SnapvaultResult<PropertyKind> {
        self.spec(name).map(|spec| spec.kind)
    }

    /// Names of every property, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Check that `value` may be written to `name`.
    pub fn validate_for_set(&self, name: &str, value: &PropertyValue) -> SnapvaultResult<()> {
        let spec = self.spec(name)?;
        match spec.kind {
            PropertyKind::Readonly => {
                return Err(SnapvaultError::ReadonlyProperty(name.to_string()));
            }
            PropertyKind::Boolean => {
                if value.as_bool().is_none() {
                    return Err(invalid_value(name, value));
                }
            }
            PropertyKind::String => {
                if value.as_str().is_none() {
                    return Err(invalid_value(name, value));
                }
            }
        }

        if let Some(validator) = spec.validator {
            if !validator(value) {
                return Err(invalid_value(name, value));
            }
        }
        Ok(())
    }

    /// Validate and render `value` in the external representation.
    pub fn encode(&self, name: &str, value: &PropertyValue) -> SnapvaultResult<String> {
        self.validate_for_set(name, value)?;
        Ok(value.to_string())
    }

    /// Interpret the raw external value of `name`.
    ///
    /// Returns `None` when an optional property reports the unset sentinel.
    pub fn decode(&self, name: &str, raw: &str) -> SnapvaultResult<Option<PropertyValue>> {
        let spec = self.spec(name)?;
        let raw = raw.trim();

        if spec.optional && raw == UNSET_SENTINEL {
            return Ok(None);
        }

        let value = if spec.kind == PropertyKind::Boolean || spec.flag {
            decode_flag(name, raw)?
        } else {
            PropertyValue::from(raw)
        };

        if spec.kind == PropertyKind::Readonly {
            if let Some(validator) = spec.validator {
                if !validator(&value) {
                    return Err(invalid_value(name, &value));
                }
            }
        }

        Ok(Some(value))
    }
}

fn invalid_value(name: &str, value: &PropertyValue) -> SnapvaultError {
    SnapvaultError::InvalidPropertyValue {
        property: name.to_string(),
        value: value.to_string(),
    }
}

/// Health states a pool may report.
pub const POOL_HEALTH_STATES: &[&str] = &[
    "DEGRADED", "FAULTED", "OFFLINE", "ONLINE", "REMOVED", "UNAVAIL",
];

fn text_in(value: &PropertyValue, allowed: &[&str]) -> bool {
    value.as_str().is_some_and(|text| allowed.contains(&text))
}

fn is_integer(value: &PropertyValue) -> bool {
    value.as_str().is_some_and(|text| text.parse::<u64>().is_ok())
}

fn is_health(value: &PropertyValue) -> bool {
    text_in(value, POOL_HEALTH_STATES)
}

fn is_failmode(value: &PropertyValue) -> bool {
    text_in(value, &["wait", "continue", "panic"])
}

fn is_bootfs(value: &PropertyValue) -> bool {
    value.as_str().is_some_and(|text| text.contains('/'))
}

fn is_cachefile(value: &PropertyValue) -> bool {
    value
        .as_str()
        .is_some_and(|text| text == "none" || text.starts_with('/'))
}

fn is_absolute_or_none(value: &PropertyValue) -> bool {
    value
        .as_str()
        .is_some_and(|text| matches!(text, "none" | "legacy") || text.starts_with('/'))
}

fn is_compression(value: &PropertyValue) -> bool {
    value.as_str().is_some_and(|text| {
        matches!(text, "on" | "off" | "lzjb" | "lz4" | "zle" | "zstd" | "zstd-fast")
            || text
                .strip_prefix("gzip")
                .is_some_and(|level| level.is_empty() || level.trim_start_matches('-').parse::<u8>().is_ok())
            || text
                .strip_prefix("zstd-")
                .is_some_and(|level| level.parse::<u8>().is_ok())
    })
}

fn is_size_or_none(value: &PropertyValue) -> bool {
    value.as_str().is_some_and(|text| {
        if text == "none" {
            return true;
        }
        let digits = text.trim_end_matches(|ch: char| "KMGTPEkmgtpe".contains(ch));
        !digits.is_empty() && digits.parse::<f64>().is_ok()
    })
}

fn is_power_of_two_size(value: &PropertyValue) -> bool {
    value.as_str().is_some_and(|text| {
        let (digits, multiplier) = match text.chars().last() {
            Some('K') | Some('k') => (&text[..text.len() - 1], 1u64 << 10),
            Some('M') | Some('m') => (&text[..text.len() - 1], 1u64 << 20),
            _ => (text, 1u64),
        };
        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .is_some_and(|bytes| bytes >= 512 && bytes.is_power_of_two())
    })
}

fn decode_flag(name: &str, raw: &str) -> SnapvaultResult<PropertyValue> {
    match raw {
        "on" => Ok(PropertyValue::Bool(true)),
        "off" => Ok(PropertyValue::Bool(false)),
        other => Err(invalid_value(name, &PropertyValue::from(other))),
    }
}

fn spec(name: &'static str, kind: PropertyKind) -> PropertySpec {
    PropertySpec {
        name,
        kind,
        optional: false,
        validator: None,
        flag: false,
    }
}

fn readonly(name: &'static str) -> PropertySpec {
    spec(name, PropertyKind::Readonly)
}

fn readonly_flag(name: &'static str) -> PropertySpec {
    PropertySpec {
        flag: true,
        ..readonly(name)
    }
}

fn boolean(name: &'static str) -> PropertySpec {
    spec(name, PropertyKind::Boolean)
}

fn string(name: &'static str) -> PropertySpec {
    spec(name, PropertyKind::String)
}

fn optional(mut spec: PropertySpec) -> PropertySpec {
    spec.optional = true;
    spec
}

fn validated(mut spec: PropertySpec, validator: Validator) -> PropertySpec {
    spec.validator = Some(validator);
    spec
}

/// Schema for `zpool` properties.
pub fn pool_schema() -> &'static PropertySchema {
    static SCHEMA: OnceLock<PropertySchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        PropertySchema::new(
            "zpool",
            vec![
                readonly("allocated"),
                readonly("capacity"),
                readonly("dedupratio"),
                optional(readonly("expandsize")),
                readonly("free"),
                readonly("guid"),
                validated(readonly("health"), is_health),
                readonly("size"),
                readonly_flag("readonly"),
                boolean("autoexpand"),
                boolean("autoreplace"),
                boolean("delegation"),
                boolean("listsnapshots"),
                optional(string("altroot")),
                optional(validated(string("bootfs"), is_bootfs)),
                optional(validated(string("cachefile"), is_cachefile)),
                optional(string("comment")),
                validated(string("dedupditto"), is_integer),
                validated(string("failmode"), is_failmode),
                validated(string("version"), is_integer),
            ],
        )
    })
}

/// Schema for `zfs` filesystem properties.
pub fn filesystem_schema() -> &'static PropertySchema {
    static SCHEMA: OnceLock<PropertySchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        PropertySchema::new(
            "zfs",
            vec![
                readonly("available"),
                readonly("compressratio"),
                readonly("creation"),
                readonly("mounted"),
                readonly("refcompressratio"),
                readonly("referenced"),
                readonly("type"),
                readonly("used"),
                readonly("usedbychildren"),
                readonly("usedbydataset"),
                readonly("usedbyrefreservation"),
                readonly("usedbysnapshots"),
                readonly("written"),
                boolean("atime"),
                boolean("dedup"),
                boolean("devices"),
                boolean("exec"),
                boolean("jailed"),
                boolean("nbmand"),
                boolean("readonly"),
                boolean("setuid"),
                boolean("utf8only"),
                boolean("vscan"),
                boolean("xattr"),
                string("aclinherit"),
                string("aclmode"),
                string("canmount"),
                string("casesensitivity"),
                string("checksum"),
                validated(string("compression"), is_compression),
                string("copies"),
                string("logbias"),
                optional(string("mlslabel")),
                optional(validated(string("mountpoint"), is_absolute_or_none)),
                string("normalization"),
                string("primarycache"),
                validated(string("quota"), is_size_or_none),
                validated(string("recordsize"), is_power_of_two_size),
                validated(string("refquota"), is_size_or_none),
                validated(string("refreservation"), is_size_or_none),
                validated(string("reservation"), is_size_or_none),
                string("secondarycache"),
                string("sharenfs"),
                string("sharesmb"),
                string("snapdir"),
                string("sync"),
            ],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean_names(schema: &PropertySchema) -> Vec<&'static str> {
        schema
            .names()
            .into_iter()
            .filter(|name| schema.kind_of(name).unwrap() == PropertyKind::Boolean)
            .collect()
    }

    #[test]
    fn unknown_property_is_rejected() {
        for schema in [pool_schema(), filesystem_schema()] {
            assert!(matches!(
                schema.kind_of("flux-capacitor"),
                Err(SnapvaultError::InvalidProperty(name)) if name == "flux-capacitor"
            ));
            assert!(matches!(
                schema.validate_for_set("flux-capacitor", &PropertyValue::Bool(true)),
                Err(SnapvaultError::InvalidProperty(_))
            ));
            assert!(matches!(
                schema.decode("flux-capacitor", "on"),
                Err(SnapvaultError::InvalidProperty(_))
            ));
        }
    }

    #[test]
    fn readonly_properties_reject_every_candidate() {
        let candidates = [
            PropertyValue::Bool(true),
            PropertyValue::Bool(false),
            PropertyValue::from("ONLINE"),
            PropertyValue::from(""),
        ];
        for schema in [pool_schema(), filesystem_schema()] {
            for name in schema.names() {
                if schema.kind_of(name).unwrap() != PropertyKind::Readonly {
                    continue;
                }
                for candidate in &candidates {
                    assert!(
                        matches!(
                            schema.validate_for_set(name, candidate),
                            Err(SnapvaultError::ReadonlyProperty(_))
                        ),
                        "{} {name} accepted {candidate:?}",
                        schema.scope()
                    );
                }
            }
        }
    }

    #[test]
    fn booleans_round_trip_through_on_off() {
        for schema in [pool_schema(), filesystem_schema()] {
            for name in boolean_names(schema) {
                for value in [true, false] {
                    let raw = schema.encode(name, &PropertyValue::Bool(value)).unwrap();
                    assert_eq!(raw, if value { "on" } else { "off" });
                    assert_eq!(
                        schema.decode(name, &raw).unwrap(),
                        Some(PropertyValue::Bool(value))
                    );
                }
            }
        }
    }

    #[test]
    fn boolean_property_rejects_text() {
        let err = filesystem_schema()
            .validate_for_set("atime", &PropertyValue::from("yes"))
            .unwrap_err();
        assert!(matches!(err, SnapvaultError::InvalidPropertyValue { .. }));
    }

    #[test]
    fn optional_sentinel_maps_to_none() {
        assert_eq!(pool_schema().decode("altroot", "-").unwrap(), None);
        assert_eq!(filesystem_schema().decode("mlslabel", "-").unwrap(), None);
        assert_eq!(
            pool_schema().decode("failmode", "-").unwrap(),
            Some(PropertyValue::from("-"))
        );
    }

    #[test]
    fn validators_gate_writes() {
        let pool = pool_schema();
        assert!(pool
            .validate_for_set("failmode", &PropertyValue::from("continue"))
            .is_ok());
        assert!(matches!(
            pool.validate_for_set("failmode", &PropertyValue::from("explode")),
            Err(SnapvaultError::InvalidPropertyValue { .. })
        ));
        assert!(pool
            .validate_for_set("bootfs", &PropertyValue::from("tank/ROOT/default"))
            .is_ok());
        assert!(pool
            .validate_for_set("bootfs", &PropertyValue::from("tank"))
            .is_err());
        assert!(pool.validate_for_set("version", &PropertyValue::from("28")).is_ok());
        assert!(pool.validate_for_set("version", &PropertyValue::from("v28")).is_err());

        let fs = filesystem_schema();
        assert!(fs.validate_for_set("compression", &PropertyValue::from("gzip-9")).is_ok());
        assert!(fs.validate_for_set("compression", &PropertyValue::from("zstd-3")).is_ok());
        assert!(fs.validate_for_set("compression", &PropertyValue::from("brotli")).is_err());
        assert!(fs.validate_for_set("recordsize", &PropertyValue::from("128K")).is_ok());
        assert!(fs.validate_for_set("recordsize", &PropertyValue::from("100K")).is_err());
        assert!(fs.validate_for_set("quota", &PropertyValue::from("10G")).is_ok());
        assert!(fs.validate_for_set("quota", &PropertyValue::from("lots")).is_err());
    }

    #[test]
    fn health_is_checked_on_read() {
        assert_eq!(
            pool_schema().decode("health", "ONLINE").unwrap(),
            Some(PropertyValue::from("ONLINE"))
        );
        assert!(matches!(
            pool_schema().decode("health", "SPARKLING"),
            Err(SnapvaultError::InvalidPropertyValue { .. })
        ));
    }
}
