//! HS256 JSON Web Tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use schoolgate_core_types::{PrincipalId, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{JwtSettings, TokenVerifier, VerifiedClaims};
use crate::errors::AuthnError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// `aud` may be a single string or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(list) => list.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: i64,
    pub role: String,
    pub username: String,
    pub iss: String,
    pub aud: Audience,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies tokens with a shared HMAC secret.
pub struct JwtCodec {
    key: Vec<u8>,
    settings: JwtSettings,
}

impl JwtCodec {
    pub fn new(settings: JwtSettings) -> Result<Self, AuthnError> {
        if settings.secret.is_empty() {
            return Err(AuthnError::Signing("empty signing secret".into()));
        }
        Ok(Self {
            key: settings.secret.as_bytes().to_vec(),
            settings,
        })
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Issues a token valid for the configured lifetime starting now.
    pub fn issue(&self, id: PrincipalId, role: Role, username: &str) -> Result<String, AuthnError> {
        self.issue_at(id, role, username, Utc::now())
    }

    pub fn issue_at(
        &self,
        id: PrincipalId,
        role: Role,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthnError> {
        let lifetime = chrono::Duration::from_std(self.settings.token_ttl)
            .map_err(|err| AuthnError::Signing(err.to_string()))?;
        let claims = TokenClaims {
            id: id.0,
            role: role.as_str().to_string(),
            username: username.to_string(),
            iss: self.settings.issuer.clone(),
            aud: Audience::One(self.settings.audience.clone()),
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
        };
        self.encode(&claims)
    }

    /// Signs arbitrary claims. Exposed so callers can mint tokens for other
    /// issuers or audiences, e.g. in tests.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, AuthnError> {
        let header = JwtHeader {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = encode_segment(&header)?;
        let payload = encode_segment(claims)?;
        let signature = self.sign(&header, &payload)?;
        Ok(format!(
            "{header}.{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn sign(&self, header: &str, payload: &str) -> Result<Vec<u8>, AuthnError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| AuthnError::Signing(err.to_string()))?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl TokenVerifier for JwtCodec {
    fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthnError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthnError::Malformed("expected three segments"));
        };

        let header: JwtHeader = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(AuthnError::UnsupportedAlgorithm(header.alg));
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthnError::Malformed("invalid signature encoding"))?;
        let expected = self.sign(header_b64, payload_b64)?;
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(AuthnError::BadSignature);
        }

        let claims: TokenClaims = decode_segment(payload_b64)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthnError::Expired);
        }
        if claims.iss != self.settings.issuer {
            return Err(AuthnError::IssuerMismatch);
        }
        if !claims.aud.contains(&self.settings.audience) {
            return Err(AuthnError::AudienceMismatch);
        }
        let role: Role = claims
            .role
            .parse()
            .map_err(|err| AuthnError::InvalidClaims(format!("{err}")))?;
        if claims.username.trim().is_empty() {
            return Err(AuthnError::InvalidClaims("empty username".into()));
        }

        Ok(VerifiedClaims {
            id: PrincipalId(claims.id),
            role,
            username: claims.username,
        })
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthnError> {
    let json = serde_json::to_vec(value).map_err(|err| AuthnError::Signing(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthnError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthnError::Malformed("invalid base64 segment"))?;
    serde_json::from_slice(&raw).map_err(|err| AuthnError::InvalidClaims(err.to_string()))
}
