//! Synchronous credential sources.
//!
//! The identity SDK pattern these model (Azure Instance Metadata Service
//! for managed identity, the Azure CLI for a developer's local token, Key
//! Vault's REST API for the secret-store mode) is synchronous end to end,
//! so every fetcher here runs on a blocking thread — callers always go
//! through `spawn_blocking`, never call `fetch` directly from an async
//! context.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A synchronous source of a bearer token for a given audience.
///
/// Implementors run arbitrary blocking I/O in `fetch`; callers are
/// responsible for offloading the call to a blocking thread and applying
/// a timeout.
pub trait CredentialFetcher: Send + Sync {
    /// Returns the token value and the delta-seconds TTL the source
    /// reports (or [`crate::token::FAR_FUTURE_TTL`] for non-expiring
    /// sources).
    fn fetch(&self) -> Result<(String, Duration)>;
}

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";

#[derive(Debug, Deserialize)]
struct ImdsResponse {
    access_token: String,
    expires_in: String,
}

/// Fetches a token from the Azure Instance Metadata Service — the
/// managed-identity credential source.
pub struct ImdsFetcher {
    pub audience: String,
    pub client_id: Option<String>,
}

impl CredentialFetcher for ImdsFetcher {
    fn fetch(&self) -> Result<(String, Duration)> {
        fetch_imds_token(&self.audience, self.client_id.as_deref())
    }
}

fn fetch_imds_token(audience: &str, client_id: Option<&str>) -> Result<(String, Duration)> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::IdentityUnavailable(format!("building IMDS client: {e}")))?;

    let mut url = format!(
        "{IMDS_ENDPOINT}?api-version={IMDS_API_VERSION}&resource={}",
        urlencode(audience)
    );
    if let Some(client_id) = client_id {
        url.push_str(&format!("&client_id={}", urlencode(client_id)));
    }

    let response = client
        .get(&url)
        .header("Metadata", "true")
        .send()
        .map_err(|e| Error::IdentityUnavailable(format!("IMDS request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(Error::IdentityUnauthorized(format!(
            "IMDS rejected the request ({status})"
        )));
    }
    if !status.is_success() {
        return Err(Error::IdentityUnavailable(format!(
            "IMDS returned {status}"
        )));
    }

    let body: ImdsResponse = response
        .json()
        .map_err(|e| Error::IdentityMalformedToken(format!("invalid IMDS response: {e}")))?;

    let ttl_secs: u64 = body
        .expires_in
        .parse()
        .map_err(|e| Error::IdentityMalformedToken(format!("invalid expires_in: {e}")))?;

    Ok((body.access_token, Duration::from_secs(ttl_secs)))
}

/// Fetches a token via the Azure CLI (`az account get-access-token`) — the
/// developer-cli credential source, used when running outside the cloud.
pub struct DevCliFetcher {
    pub audience: String,
}

#[derive(Debug, Deserialize)]
struct AzCliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresOn")]
    expires_on: String,
}

impl CredentialFetcher for DevCliFetcher {
    fn fetch(&self) -> Result<(String, Duration)> {
        let output = std::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.audience,
                "--output",
                "json",
            ])
            .output()
            .map_err(|e| Error::IdentityUnavailable(format!("invoking az cli: {e}")))?;

        if !output.status.success() {
            return Err(Error::IdentityUnauthorized(format!(
                "az cli exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let parsed: AzCliToken = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::IdentityMalformedToken(format!("invalid az cli output: {e}")))?;

        // `expiresOn` is a local "YYYY-MM-DD HH:MM:SS.ffffff" timestamp; the
        // CLI doesn't report a delta, so fall back to a conservative
        // assumed lifetime rather than parsing a locale-dependent format.
        let _ = parsed.expires_on;
        Ok((parsed.access_token, Duration::from_secs(3600)))
    }
}

/// Fetches a secret value from Azure Key Vault, authenticating to Key
/// Vault itself via managed identity. Used for the external-secret-store
/// database credential mode.
pub struct VaultFetcher {
    pub vault_name: String,
    pub secret_name: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

impl CredentialFetcher for VaultFetcher {
    fn fetch(&self) -> Result<(String, Duration)> {
        let (vault_token, _) = fetch_imds_token("https://vault.azure.net", None)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::IdentityUnavailable(format!("building Key Vault client: {e}")))?;

        let url = format!(
            "https://{}.vault.azure.net/secrets/{}?api-version=7.4",
            self.vault_name, self.secret_name
        );

        let response = client
            .get(&url)
            .bearer_auth(vault_token)
            .send()
            .map_err(|e| Error::IdentityUnavailable(format!("Key Vault request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::IdentityUnauthorized(format!(
                "Key Vault rejected the request ({status})"
            )));
        }
        if !status.is_success() {
            return Err(Error::IdentityUnavailable(format!(
                "Key Vault returned {status}"
            )));
        }

        let bundle: SecretBundle = response
            .json()
            .map_err(|e| Error::IdentityMalformedToken(format!("invalid secret bundle: {e}")))?;

        Ok((bundle.value, crate::token::FAR_FUTURE_TTL))
    }
}

/// Returns a fixed value configured at startup — the static-password
/// database credential mode. Never fails and never expires.
pub struct StaticFetcher {
    pub value: String,
}

impl CredentialFetcher for StaticFetcher {
    fn fetch(&self) -> Result<(String, Duration)> {
        Ok((self.value.clone(), crate::token::FAR_FUTURE_TTL))
    }
}

fn urlencode(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetcher_never_fails() {
        let fetcher = StaticFetcher {
            value: "static-pw".into(),
        };
        let (value, ttl) = fetcher.fetch().unwrap();
        assert_eq!(value, "static-pw");
        assert_eq!(ttl, crate::token::FAR_FUTURE_TTL);
    }

    #[test]
    fn imds_fetcher_fails_fast_without_metadata_service() {
        // No IMDS endpoint is reachable in a non-cloud test environment;
        // this exercises the unavailable/timeout error path rather than a
        // successful fetch, the same way the upstream pkce/token tests hit
        // a real endpoint expecting rejection.
        let fetcher = ImdsFetcher {
            audience: "https://storage.azure.com".into(),
            client_id: None,
        };
        assert!(fetcher.fetch().is_err());
    }
}
