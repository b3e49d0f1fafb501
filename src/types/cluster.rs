// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use zeroize::Zeroizing;

/// Cluster metadata as returned by the cloud's container API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterMetadata {
    pub name: String,
    pub zone: String,
    /// API server endpoint, usually a bare IP address
    pub endpoint: String,
    /// Base64 encoded cluster CA certificate
    pub ca_certificate: String,
}

/// Short-lived bearer token for the cluster API.
///
/// The value is wiped from memory on drop and never shows up in `Debug` output.
#[derive(Clone)]
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Everything needed to reach one cluster for the duration of one deployment
#[derive(Clone, Debug)]
pub struct ClusterCredentials {
    /// Fully qualified server URL
    pub server: url::Url,
    /// Base64 encoded cluster CA certificate
    pub ca_data: String,
    pub token: AccessToken,
}
