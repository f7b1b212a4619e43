use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EleveData {
    pub nom: String,
    pub photo: Option<String>,
    pub emploi_du_temps: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminSession {
    pub ssid: String,
    pub expires_at: DateTime<Utc>,
}
