//! Identity provider codes for linkable auth methods.

use serde::{Deserialize, Serialize};

/// An external identity or credential mechanism usable to log in to an
/// account. `ApiKey` is a secondary credential: it can authenticate API
/// calls but never counts as a login method on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderId {
    Lightning,
    Email,
    Nostr,
    Github,
    Twitter,
    ApiKey,
}

/// Providers that count toward the "last remaining login method" check.
pub const LOGIN_PROVIDERS: [ProviderId; 5] = [
    ProviderId::Lightning,
    ProviderId::Email,
    ProviderId::Nostr,
    ProviderId::Github,
    ProviderId::Twitter,
];

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Lightning => "lightning",
            ProviderId::Email => "email",
            ProviderId::Nostr => "nostr",
            ProviderId::Github => "github",
            ProviderId::Twitter => "twitter",
            ProviderId::ApiKey => "apiKey",
        }
    }

    /// Whether this provider is sufficient to log in by itself.
    pub fn is_login_method(&self) -> bool {
        !matches!(self, ProviderId::ApiKey)
    }

    /// Whether linking goes through a signed-challenge proof (lightning and
    /// nostr keypairs sign a server-issued nonce).
    pub fn uses_signed_challenge(&self) -> bool {
        matches!(self, ProviderId::Lightning | ProviderId::Nostr)
    }

    /// OAuth-style providers whose identity arrives as an external assertion.
    pub fn uses_external_assertion(&self) -> bool {
        matches!(self, ProviderId::Github | ProviderId::Twitter)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightning" => Ok(ProviderId::Lightning),
            "email" => Ok(ProviderId::Email),
            "nostr" => Ok(ProviderId::Nostr),
            "github" => Ok(ProviderId::Github),
            "twitter" => Ok(ProviderId::Twitter),
            "apiKey" | "api_key" => Ok(ProviderId::ApiKey),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}
