use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::ops::Add;

use crate::config::Config;
use crate::models::AdminSession;
use crate::{breaks, proceeds, Error, Payload};
use sqlx::PgPool;

#[derive(Debug, Clone, Eq, Ord, PartialOrd, PartialEq)]
pub enum AuthResult {
    Success,
    SessionExpired,
    InvalidSession,
}

impl Serialize for AuthResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:?}", self))
    }
}

/// Checks the caller's session id against the `admin_sessions` table.
/// Expired sessions are purged on first sight.
pub async fn ensure_authenticated(
    session_id: Option<String>,
    pg: &PgPool,
) -> anyhow::Result<AuthResult, Error> {
    let ssid = match session_id {
        Some(ssid) if !ssid.is_empty() => ssid,
        _ => return Ok(AuthResult::InvalidSession),
    };

    let session = sqlx::query_as::<_, AdminSession>(
        "SELECT * FROM admin_sessions WHERE ssid = $1 LIMIT 1",
    )
    .bind(&ssid)
    .fetch_optional(pg)
    .await
    .map_err(Error::from)?;

    if let Some(session) = session {
        if Utc::now().gt(&session.expires_at) {
            sqlx::query("DELETE FROM admin_sessions WHERE ssid = $1")
                .bind(&ssid)
                .execute(pg)
                .await
                .map_err(Error::from)?;
            return Ok(AuthResult::SessionExpired);
        }
        Ok(AuthResult::Success)
    } else {
        Ok(AuthResult::InvalidSession)
    }
}

pub async fn login_admin(
    Json(login): Json<LoginAdmin>,
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<Config>,
) -> Payload<LoggedInAdmin> {
    if login.password.is_empty() {
        return breaks(Error::MissingCredentials {
            message: "`password` parameter was empty".to_string(),
        });
    }

    if login.username != config.admin_username {
        return breaks(Error::AuthenticationFailure {
            message: "Unknown administrator account!".to_string(),
        });
    }

    let hash = PasswordHash::new(&config.admin_password_hash).map_err(Error::from)?;
    let matches = Pbkdf2
        .verify_password(login.password.as_bytes(), &hash)
        .is_ok();
    if !matches {
        return breaks(Error::AuthenticationFailure {
            message: "Passwords do not match!".to_string(),
        });
    }

    sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= $1")
        .bind(Utc::now())
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    let existing_session =
        sqlx::query_as::<_, AdminSession>("SELECT * FROM admin_sessions LIMIT 1")
            .fetch_optional(&pg)
            .await
            .map_err(Error::from)?;

    if let Some(existing) = existing_session {
        // already authenticated
        return proceeds(LoggedInAdmin {
            session_id: existing.ssid,
            expires_at: existing.expires_at,
        });
    }

    let ssid = nouveau_ssid();
    let expires_at = Utc::now().add(Duration::days(1));
    let res = sqlx::query("INSERT INTO admin_sessions VALUES($1, $2)")
        .bind(&ssid)
        .bind(&expires_at)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    if res.rows_affected() < 1 {
        return breaks(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not store session id!".to_string(),
        });
    }

    proceeds(LoggedInAdmin {
        session_id: ssid,
        expires_at,
    })
}

pub async fn logout_admin(
    Json(SessionOnly { ssid }): Json<SessionOnly>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<SessionDropped>> {
    let auth_result = ensure_authenticated(Some(ssid.clone()), &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let affected = sqlx::query("DELETE FROM admin_sessions WHERE ssid = $1")
        .bind(&ssid)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(SessionDropped {
            drop_success: affected.rows_affected() >= 1,
        }),
    })
}

fn nouveau_ssid() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(ssid_bytes);
    hex::encode(hasher.finalize())
}

/// One-off helper to provision the configured admin credential.
pub fn hash_mot_de_passe(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    Ok(hash.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub drop_success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionBasedResponse<V> {
    pub auth_result: AuthResult,
    #[serde(flatten)]
    pub value: Option<V>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsureSession<V> {
    pub ssid: String,
    #[serde(flatten)]
    pub value: V,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionOnly {
    pub ssid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionQuery {
    pub ssid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedInAdmin {
    session_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAdmin {
    username: String,
    password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_fait_64_caracteres_hexadecimaux() {
        let ssid = nouveau_ssid();
        assert_eq!(ssid.len(), 64);
        assert!(ssid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deux_ssid_differents() {
        assert_ne!(nouveau_ssid(), nouveau_ssid());
    }

    #[test]
    fn le_hachage_du_mot_de_passe_se_verifie() {
        let hash = hash_mot_de_passe("admin123").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Pbkdf2.verify_password(b"admin123", &parsed).is_ok());
        assert!(Pbkdf2.verify_password(b"autre", &parsed).is_err());
    }
}
