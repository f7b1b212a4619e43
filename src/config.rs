use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::Deserialize;

/// Runtime configuration, merged from an optional `config.json` and
/// `SORTIE_`-prefixed environment variables (the latter win).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub admin_username: String,
    /// PHC-formatted pbkdf2 hash of the admin password.
    pub admin_password_hash: String,
}

fn default_port() -> u16 {
    5000
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        let config = Figment::new()
            .merge(Json::file("config.json"))
            .merge(Env::prefixed("SORTIE_"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn les_valeurs_par_defaut_s_appliquent() {
        let config: Config = Figment::new()
            .merge(Json::string(
                r#"{
                    "database_url": "postgres://localhost/sorties",
                    "admin_username": "admin",
                    "admin_password_hash": "$pbkdf2-sha256$..."
                }"#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.base_url, "http://localhost:5000");
    }

    #[test]
    fn le_fichier_peut_tout_fournir() {
        let config: Config = Figment::new()
            .merge(Json::string(
                r#"{
                    "database_url": "postgres://localhost/sorties",
                    "base_url": "https://sorties.example.org",
                    "port": 8080,
                    "admin_username": "vie-scolaire",
                    "admin_password_hash": "$pbkdf2-sha256$..."
                }"#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.base_url, "https://sorties.example.org");
    }
}
