use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use common::{
    env_config::IdentityConfig,
    error::{AppError, Res},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation,
    jwk::{Jwk, JwkSet},
};
use serde::Deserialize;
use tokio::sync::RwLock;

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const KEYS_TTL: Duration = Duration::from_secs(3600);

/// Identity asserted by a third-party ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture_url: Option<String>,
    pub email_verified: bool,
}

impl VerifiedIdentity {
    /// Name to store for the account: the provider's, else the email local part, else "User".
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "User".to_string(),
        }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with [`AppError::InvalidCredential`] when the credential is not accepted.
    async fn verify(&self, credential: &str) -> Res<VerifiedIdentity>;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

impl TryFrom<IdTokenClaims> for VerifiedIdentity {
    type Error = AppError;

    fn try_from(claims: IdTokenClaims) -> Res<Self> {
        let email = claims
            .email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AppError::InvalidCredential("Token carries no email".to_string()))?;
        Ok(VerifiedIdentity {
            external_id: claims.sub,
            email,
            name: claims.name,
            picture_url: claims.picture,
            email_verified: claims.email_verified,
        })
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies RS256 ID tokens against the signing keys published by the issuer.
pub struct JwksVerifier {
    provider: &'static str,
    jwks_url: String,
    issuers: Vec<String>,
    audience: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(
        provider: &'static str,
        jwks_url: impl Into<String>,
        issuers: Vec<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            jwks_url: jwks_url.into(),
            issuers,
            audience: audience.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// ID tokens minted by Firebase Authentication for the given project.
    pub fn firebase(project_id: &str) -> Self {
        Self::new(
            "firebase",
            FIREBASE_JWKS_URL,
            vec![format!("https://securetoken.google.com/{}", project_id)],
            project_id,
        )
    }

    /// Google Sign-In ID tokens issued to the given OAuth client.
    pub fn google(client_id: &str) -> Self {
        Self::new(
            "google",
            GOOGLE_JWKS_URL,
            vec![
                "accounts.google.com".to_string(),
                "https://accounts.google.com".to_string(),
            ],
            client_id,
        )
    }

    async fn key_for(&self, kid: &str) -> Res<Jwk> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < KEYS_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return Ok(jwk.clone());
                    }
                }
            }
        }

        // unknown kid or stale set: keys were rotated
        let keys = self.fetch_keys().await?;
        let jwk = keys.find(kid).cloned();
        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        jwk.ok_or_else(|| {
            AppError::InvalidCredential(format!("Unknown {} signing key", self.provider))
        })
    }

    async fn fetch_keys(&self) -> Res<JwkSet> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("{} keys: {}", self.provider, e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "{} keys: status {}",
                self.provider,
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("{} keys: {}", self.provider, e)))
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, credential: &str) -> Res<VerifiedIdentity> {
        if self.audience.is_empty() {
            return Err(AppError::InvalidCredential(format!(
                "{} sign-in is not configured",
                self.provider
            )));
        }

        let header = jsonwebtoken::decode_header(credential)
            .map_err(|e| AppError::InvalidCredential(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::InvalidCredential("Token has no key id".to_string()))?;

        let jwk = self.key_for(&kid).await?;
        let key =
            DecodingKey::from_jwk(&jwk).map_err(|e| AppError::InvalidCredential(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&self.issuers);

        let data = jsonwebtoken::decode::<IdTokenClaims>(credential, &key, &validation)
            .map_err(|e| AppError::InvalidCredential(e.to_string()))?;
        VerifiedIdentity::try_from(data.claims)
    }
}

/// Tries each verifier in order and returns the first accepted identity.
pub struct ChainedVerifier {
    verifiers: Vec<Arc<dyn IdentityVerifier>>,
}

impl ChainedVerifier {
    pub fn new(verifiers: Vec<Arc<dyn IdentityVerifier>>) -> Self {
        Self { verifiers }
    }

    /// Firebase first (mobile app), then Google Sign-In (web).
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(vec![
            Arc::new(JwksVerifier::firebase(&config.firebase_project_id)),
            Arc::new(JwksVerifier::google(&config.google_client_id)),
        ])
    }
}

#[async_trait]
impl IdentityVerifier for ChainedVerifier {
    async fn verify(&self, credential: &str) -> Res<VerifiedIdentity> {
        let mut last_error =
            AppError::InvalidCredential("No identity provider configured".to_string());

        for verifier in &self.verifiers {
            match verifier.verify(credential).await {
                Ok(identity) => return Ok(identity),
                Err(error) => {
                    log::debug!("Credential rejected: {}", error);
                    last_error = error;
                }
            }
        }

        match last_error {
            AppError::UpstreamUnavailable(_) => Err(last_error),
            _ => Err(AppError::InvalidCredential(
                "Invalid Google or Firebase token".to_string(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts exactly one credential.
    pub(crate) struct FakeVerifier {
        pub credential: String,
        pub identity: VerifiedIdentity,
        pub calls: AtomicUsize,
    }

    impl FakeVerifier {
        pub(crate) fn accepting(credential: &str, identity: VerifiedIdentity) -> Self {
            Self {
                credential: credential.to_string(),
                identity,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityVerifier for FakeVerifier {
        async fn verify(&self, credential: &str) -> Res<VerifiedIdentity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if credential == self.credential {
                Ok(self.identity.clone())
            } else {
                Err(AppError::InvalidCredential("unknown".to_string()))
            }
        }
    }

    pub(crate) fn identity(email: &str, name: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            external_id: format!("sub-{}", email),
            email: email.to_string(),
            name: name.map(str::to_string),
            picture_url: None,
            email_verified: true,
        }
    }

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        assert_eq!(identity("ana@example.com", Some("Ana P")).display_name(), "Ana P");
        assert_eq!(identity("ana@example.com", Some("  ")).display_name(), "ana");
        assert_eq!(identity("@example.com", None).display_name(), "User");
    }

    #[test]
    fn claims_without_email_are_rejected() {
        let claims = IdTokenClaims {
            sub: "123".to_string(),
            email: None,
            name: None,
            picture: None,
            email_verified: false,
        };
        assert!(matches!(
            VerifiedIdentity::try_from(claims),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn chain_falls_through_to_second_provider() {
        let firebase = Arc::new(FakeVerifier::accepting("fb", identity("a@x.io", None)));
        let google = Arc::new(FakeVerifier::accepting("gg", identity("b@x.io", None)));
        let chain = ChainedVerifier::new(vec![firebase.clone(), google.clone()]);

        let verified = chain.verify("gg").await.unwrap();
        assert_eq!(verified.email, "b@x.io");
        assert_eq!(firebase.calls.load(Ordering::SeqCst), 1);

        chain.verify("fb").await.unwrap();
        assert_eq!(google.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chain_rejects_unknown_credential() {
        let chain = ChainedVerifier::new(vec![Arc::new(FakeVerifier::accepting(
            "fb",
            identity("a@x.io", None),
        ))]);
        assert!(matches!(
            chain.verify("nope").await,
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_before_fetching_keys() {
        let verifier = JwksVerifier::new(
            "google",
            "http://127.0.0.1:9/unreachable",
            vec!["accounts.google.com".to_string()],
            "client-id",
        );
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_provider_rejects() {
        let verifier = JwksVerifier::firebase("");
        assert!(matches!(
            verifier.verify("whatever").await,
            Err(AppError::InvalidCredential(_))
        ));
    }
}
