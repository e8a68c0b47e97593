//! Per-domain operator-set versions

use crate::ir::normalize_domain;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Mapping from operator domain to a single opset version
///
/// The ONNX domain alias `"ai.onnx"` and the empty domain name are the same
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, i64>", into = "BTreeMap<String, i64>")]
pub struct OpsetRegistry {
    versions: BTreeMap<String, i64>,
}

impl OpsetRegistry {
    /// Build a registry from `(domain, version)` pairs
    ///
    /// Fails with `DuplicateName` if a domain is listed twice.
    pub fn new<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut versions = BTreeMap::new();
        for (domain, version) in pairs {
            check_version(domain, version)?;
            let domain = normalize_domain(domain);
            if versions.insert(domain.to_string(), version).is_some() {
                return Err(GraphError::DuplicateName(format!(
                    "opset domain '{}' listed twice",
                    domain
                )));
            }
        }
        Ok(Self { versions })
    }

    /// Version registered for `domain`
    pub fn version(&self, domain: &str) -> Option<i64> {
        self.versions.get(normalize_domain(domain)).copied()
    }

    /// Check whether `domain` has a version
    pub fn contains(&self, domain: &str) -> bool {
        self.versions.contains_key(normalize_domain(domain))
    }

    /// Add the entries a later augmentation requires
    ///
    /// A domain already present at the same version is accepted as-is. A
    /// domain present at a different version fails with `VersionConflict`
    /// and leaves the registry untouched.
    pub fn merge<'a, I>(&mut self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut pending: BTreeMap<String, i64> = BTreeMap::new();
        for (domain, version) in pairs {
            check_version(domain, version)?;
            let domain = normalize_domain(domain);
            let existing = self
                .versions
                .get(domain)
                .or_else(|| pending.get(domain))
                .copied();
            match existing {
                Some(existing) if existing != version => {
                    return Err(GraphError::VersionConflict {
                        domain: domain.to_string(),
                        existing,
                        requested: version,
                    });
                }
                Some(_) => {}
                None => {
                    pending.insert(domain.to_string(), version);
                }
            }
        }

        let added = pending.len();
        for (domain, version) in pending {
            debug!(domain = %domain, version, "registered opset");
            self.versions.insert(domain, version);
        }
        Ok(added)
    }

    /// Iterate `(domain, version)` pairs in domain order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.versions.iter().map(|(d, &v)| (d.as_str(), v))
    }

    /// Number of registered domains
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check if no domain is registered
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

fn check_version(domain: &str, version: i64) -> Result<()> {
    if version < 1 {
        return Err(GraphError::InvalidArgument(format!(
            "opset version for domain '{}' must be positive, got {}",
            domain, version
        )));
    }
    Ok(())
}

impl TryFrom<BTreeMap<String, i64>> for OpsetRegistry {
    type Error = GraphError;

    fn try_from(map: BTreeMap<String, i64>) -> Result<Self> {
        Self::new(map.iter().map(|(d, &v)| (d.as_str(), v)))
    }
}

impl From<OpsetRegistry> for BTreeMap<String, i64> {
    fn from(registry: OpsetRegistry) -> Self {
        registry.versions
    }
}
