use std::collections::HashMap;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::{Datelike, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::{
    ensure_authenticated, AuthResult, EnsureSession, SessionBasedResponse, SessionOnly,
    SessionQuery,
};
use crate::config::Config;
use crate::models::EleveData;
use crate::schedule::{
    arrondi_minute, decode_emploi, encode_emploi, jour_en_francais, peut_sortir, EmploiForm,
};
use crate::{breaks, proceeds, Error, Payload};

pub async fn list_eleves(
    Query(session): Query<SessionQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<ListeEleves>> {
    let auth_result = ensure_authenticated(session.ssid, &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let eleves =
        sqlx::query_as::<_, EleveData>("SELECT nom, photo, emploi_du_temps FROM eleves ORDER BY nom")
            .fetch_all(&pg)
            .await
            .map_err(Error::from)?;

    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(ListeEleves { eleves }),
    })
}

pub async fn create_eleve(
    Json(EnsureSession { ssid, value }): Json<EnsureSession<CreateEleve>>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<EleveData>> {
    let auth_result = ensure_authenticated(Some(ssid), &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    if value.nom.trim().is_empty() {
        return breaks(Error::InvalidPayload {
            message: "`nom` parameter was empty".to_string(),
        });
    }

    let eleve = EleveData {
        nom: value.nom,
        photo: value.photo,
        emploi_du_temps: encode_emploi(&value.emploi),
    };

    // the conflict clause makes concurrent creates of the same name lose
    // cleanly instead of tripping the primary-key violation
    let res = sqlx::query("INSERT INTO eleves VALUES ($1, $2, $3) ON CONFLICT (nom) DO NOTHING")
        .bind(&eleve.nom)
        .bind(&eleve.photo)
        .bind(&eleve.emploi_du_temps)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    if let Err(err) = resultat_insertion(res.rows_affected(), &eleve.nom) {
        return breaks(err);
    }

    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(eleve),
    })
}

/// Zero affected rows means the conflict clause swallowed the insert: the
/// name is already taken.
fn resultat_insertion(rows_affected: u64, nom: &str) -> Result<(), Error> {
    if rows_affected < 1 {
        return Err(Error::EleveAlreadyExists {
            message: format!("Eleve with name `{}` already exists!", nom),
        });
    }
    Ok(())
}

/// Returns the student together with the decoded per-day map, ready to
/// pre-populate the edit form.
pub async fn read_eleve(
    Path(nom): Path<String>,
    Query(session): Query<SessionQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<EleveFiche>> {
    let auth_result = ensure_authenticated(session.ssid, &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let eleve = match fetch_eleve(&nom, &pg).await? {
        Some(eleve) => eleve,
        None => {
            return breaks(Error::EleveNotFound {
                message: format!("Eleve with name `{}` does not exist!", nom),
            })
        }
    };

    let emploi_par_jour = decode_emploi(&eleve.emploi_du_temps);
    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(EleveFiche {
            eleve,
            emploi_par_jour,
        }),
    })
}

/// Only the schedule is mutable; name and photo are fixed at creation.
pub async fn update_eleve(
    Json(EnsureSession { ssid, value }): Json<EnsureSession<EmploiForm>>,
    Path(nom): Path<String>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<EleveData>> {
    let auth_result = ensure_authenticated(Some(ssid), &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let updated = sqlx::query_as::<_, EleveData>(
        "UPDATE eleves SET emploi_du_temps = $1 WHERE nom = $2
         RETURNING nom, photo, emploi_du_temps",
    )
    .bind(encode_emploi(&value))
    .bind(&nom)
    .fetch_optional(&pg)
    .await
    .map_err(Error::from)?;

    match updated {
        Some(eleve) => proceeds(SessionBasedResponse {
            auth_result,
            value: Some(eleve),
        }),
        None => breaks(Error::EleveNotFound {
            message: format!("Eleve with name `{}` does not exist!", nom),
        }),
    }
}

pub async fn delete_eleve(
    Json(SessionOnly { ssid }): Json<SessionOnly>,
    Path(nom): Path<String>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionBasedResponse<EleveSupprime>> {
    let auth_result = ensure_authenticated(Some(ssid), &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let affected = sqlx::query("DELETE FROM eleves WHERE nom = $1")
        .bind(&nom)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    if affected.rows_affected() < 1 {
        return breaks(Error::EleveNotFound {
            message: format!("Eleve with name `{}` does not exist!", nom),
        });
    }

    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(EleveSupprime { nom }),
    })
}

/// Builds the shareable link a QR code would carry. Rendering the image
/// itself is left to whatever generates the printout.
pub async fn qr_eleve(
    Path(nom): Path<String>,
    Query(session): Query<SessionQuery>,
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<Config>,
) -> Payload<SessionBasedResponse<LienSortie>> {
    let auth_result = ensure_authenticated(session.ssid, &pg).await?;
    if auth_result != AuthResult::Success {
        return proceeds(SessionBasedResponse {
            auth_result,
            value: None,
        });
    }

    let eleve = match fetch_eleve(&nom, &pg).await? {
        Some(eleve) => eleve,
        None => {
            return breaks(Error::EleveNotFound {
                message: format!("Eleve with name `{}` does not exist!", nom),
            })
        }
    };

    let url = lien_sortie(&config.base_url, &eleve.nom, &eleve.emploi_du_temps);
    proceeds(SessionBasedResponse {
        auth_result,
        value: Some(LienSortie {
            nom: eleve.nom,
            url,
        }),
    })
}

/// Public page behind the QR code: evaluates the schedule carried in the
/// URL against the current Paris weekday and minute.
pub async fn afficher_sortie(
    Path((nom, emploi_du_temps)): Path<(String, String)>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SortieStatus> {
    let eleve = match fetch_eleve(&nom, &pg).await? {
        Some(eleve) => eleve,
        None => {
            return breaks(Error::EleveNotFound {
                message: format!("Eleve with name `{}` does not exist!", nom),
            })
        }
    };

    let maintenant = Utc::now().with_timezone(&chrono_tz::Europe::Paris);
    let jour = jour_en_francais(maintenant.weekday());
    let heure = arrondi_minute(maintenant.time());

    proceeds(SortieStatus {
        nom: eleve.nom,
        photo: eleve.photo,
        peut_sortir: peut_sortir(&emploi_du_temps, jour, heure),
        emploi_du_temps,
        jour: jour.to_string(),
        heure: heure.format("%H:%M").to_string(),
    })
}

async fn fetch_eleve(nom: &str, pg: &PgPool) -> Result<Option<EleveData>, Error> {
    sqlx::query_as::<_, EleveData>(
        "SELECT nom, photo, emploi_du_temps FROM eleves WHERE nom = $1 LIMIT 1",
    )
    .bind(nom)
    .fetch_optional(pg)
    .await
    .map_err(Error::from)
}

// everything a path segment may not contain, on top of controls
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b':')
    .add(b',')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn lien_sortie(base_url: &str, nom: &str, emploi_du_temps: &str) -> String {
    format!(
        "{}/sortie/{}/{}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(nom, SEGMENT),
        utf8_percent_encode(emploi_du_temps, SEGMENT)
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ListeEleves {
    pub eleves: Vec<EleveData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEleve {
    pub nom: String,
    pub photo: Option<String>,
    #[serde(flatten)]
    pub emploi: EmploiForm,
}

#[derive(Debug, Clone, Serialize)]
pub struct EleveFiche {
    #[serde(flatten)]
    pub eleve: EleveData,
    pub emploi_par_jour: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EleveSupprime {
    pub nom: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LienSortie {
    pub nom: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortieStatus {
    pub nom: String,
    pub photo: Option<String>,
    pub emploi_du_temps: String,
    pub jour: String,
    pub heure: String,
    pub peut_sortir: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_lien_encode_les_segments() {
        let url = lien_sortie(
            "https://sorties.example.org/",
            "Jean Dupont",
            "Lundi: 8h-12h, Mardi: 9h-17h",
        );
        assert_eq!(
            url,
            "https://sorties.example.org/sortie/Jean%20Dupont/Lundi%3A%208h-12h%2C%20Mardi%3A%209h-17h"
        );
    }

    #[test]
    fn le_lien_ne_double_pas_la_barre_oblique() {
        let url = lien_sortie("http://localhost:5000", "Ana", "");
        assert_eq!(url, "http://localhost:5000/sortie/Ana/");
    }

    #[test]
    fn un_nom_deja_pris_est_un_conflit() {
        assert!(matches!(
            resultat_insertion(0, "Ana"),
            Err(Error::EleveAlreadyExists { .. })
        ));
    }

    #[test]
    fn une_ligne_inseree_est_un_succes() {
        assert!(resultat_insertion(1, "Ana").is_ok());
    }
}
