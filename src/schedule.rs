use std::collections::HashMap;

use chrono::{NaiveTime, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

pub const JOURS_SEMAINE: [&str; 5] = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi"];

lazy_static! {
    static ref PLAGE_HORAIRE: Regex =
        Regex::new(r"(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})").unwrap();
    static ref HEURE_COURTE: Regex = Regex::new(r"(\d{1,2}):(\d{2})?").unwrap();
}

/// The five per-day schedule fields as submitted by the admin form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmploiForm {
    pub lundi: String,
    pub mardi: String,
    pub mercredi: String,
    pub jeudi: String,
    pub vendredi: String,
}

impl EmploiForm {
    fn jours(&self) -> [&String; 5] {
        [
            &self.lundi,
            &self.mardi,
            &self.mercredi,
            &self.jeudi,
            &self.vendredi,
        ]
    }
}

/// Joins the five day entries into the stored `"Lundi: ..., Mardi: ..."` form.
/// The day texts are not escaped; a `:` or `,` inside one shifts the split
/// point at decode time.
pub fn encode_emploi(form: &EmploiForm) -> String {
    JOURS_SEMAINE
        .iter()
        .zip(form.jours())
        .map(|(jour, texte)| format!("{}: {}", jour, texte))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits the stored text back into a day -> hours map. A day's hours may
/// themselves be a comma-separated list ("8h-12h, 13h30-17h"), so a segment
/// without a `:` is re-attached to the most recent day instead of being
/// lost. Leading segments with no day yet are dropped. Decoding never fails.
pub fn decode_emploi(texte: &str) -> HashMap<String, String> {
    let mut jours: HashMap<String, String> = HashMap::new();
    let mut dernier_jour: Option<String> = None;
    for segment in texte.split(',') {
        if let Some((jour, horaires)) = segment.split_once(':') {
            let jour = jour.trim().to_string();
            jours.insert(jour.clone(), horaires.trim().to_string());
            dernier_jour = Some(jour);
        } else {
            let suite = segment.trim();
            if suite.is_empty() {
                continue;
            }
            if let Some(horaires) = dernier_jour.as_ref().and_then(|j| jours.get_mut(j)) {
                if horaires.is_empty() {
                    horaires.push_str(suite);
                } else {
                    horaires.push_str(", ");
                    horaires.push_str(suite);
                }
            }
        }
    }
    jours
}

/// Whether the student may leave at `heure` on `jour` given the encoded
/// schedule text. A missing day entry means no restriction, and any parse
/// failure degrades to "may leave" on purpose: the schedule is free-form
/// human input and the public page must keep answering.
pub fn peut_sortir(emploi_du_temps: &str, jour: &str, heure: NaiveTime) -> bool {
    let jours = decode_emploi(emploi_du_temps);
    let horaires = match jours.get(jour) {
        Some(h) if !h.is_empty() => h,
        _ => return true,
    };
    match heure_dans_une_plage(horaires, heure) {
        Ok(occupe) => !occupe,
        Err(err) => {
            log::debug!("horaires illisibles pour {}: {}", jour, err);
            true
        }
    }
}

fn heure_dans_une_plage(horaires: &str, heure: NaiveTime) -> Result<bool, chrono::ParseError> {
    let texte = normalise_horaires(horaires);
    for plage in PLAGE_HORAIRE.captures_iter(&texte) {
        let debut = NaiveTime::parse_from_str(&plage[1], "%H:%M")?;
        let fin = NaiveTime::parse_from_str(&plage[2], "%H:%M")?;
        // bounds are inclusive: at exactly 12:00 the student is still in class
        if debut <= heure && heure <= fin {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Canonicalizes free-form hour text toward `HH:MM-HH:MM` tokens: dash and
/// "à"/"a" variants become `-`, the hour marker `h`/`H` becomes `:`, and
/// hours written without minutes ("17h") get `:00` appended.
fn normalise_horaires(texte: &str) -> String {
    let texte = texte
        .replace('–', "-")
        .replace('—', "-")
        .replace('à', "-")
        .replace('a', "-")
        .replace('h', ":")
        .replace('H', ":");
    HEURE_COURTE
        .replace_all(&texte, |plage: &regex::Captures| match plage.get(2) {
            Some(minutes) => format!("{}:{}", &plage[1], minutes.as_str()),
            None => format!("{}:00", &plage[1]),
        })
        .into_owned()
}

pub fn jour_en_francais(jour: Weekday) -> &'static str {
    match jour {
        Weekday::Mon => "Lundi",
        Weekday::Tue => "Mardi",
        Weekday::Wed => "Mercredi",
        Weekday::Thu => "Jeudi",
        Weekday::Fri => "Vendredi",
        Weekday::Sat => "Samedi",
        Weekday::Sun => "Dimanche",
    }
}

/// Drops seconds so that the inclusive upper bound of an interval holds for
/// the whole closing minute, like the original `%H:%M` comparison did.
pub fn arrondi_minute(heure: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    NaiveTime::from_hms_opt(heure.hour(), heure.minute(), 0).unwrap_or(heure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heure(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn formulaire() -> EmploiForm {
        EmploiForm {
            lundi: "8h-12h".to_string(),
            mardi: "9h-17h".to_string(),
            mercredi: "".to_string(),
            jeudi: "8h-12h".to_string(),
            vendredi: "14h-16h".to_string(),
        }
    }

    #[test]
    fn encode_joint_les_cinq_jours() {
        assert_eq!(
            encode_emploi(&formulaire()),
            "Lundi: 8h-12h, Mardi: 9h-17h, Mercredi: , Jeudi: 8h-12h, Vendredi: 14h-16h"
        );
    }

    #[test]
    fn decode_retrouve_les_entrees_encodees() {
        let jours = decode_emploi(&encode_emploi(&formulaire()));
        assert_eq!(jours.len(), 5);
        assert_eq!(jours["Lundi"], "8h-12h");
        assert_eq!(jours["Mercredi"], "");
        assert_eq!(jours["Vendredi"], "14h-16h");
    }

    #[test]
    fn decode_rattache_les_segments_sans_deux_points_au_jour_precedent() {
        let jours = decode_emploi("Lundi: 8h-12h, 13h30-17h, Mardi: 9h-10h");
        assert_eq!(jours.len(), 2);
        assert_eq!(jours["Lundi"], "8h-12h, 13h30-17h");
        assert_eq!(jours["Mardi"], "9h-10h");
    }

    #[test]
    fn decode_abandonne_un_segment_orphelin_en_tete() {
        let jours = decode_emploi("8h-12h, Lundi: 9h-10h");
        assert_eq!(jours.len(), 1);
        assert_eq!(jours["Lundi"], "9h-10h");
    }

    #[test]
    fn decode_coupe_au_premier_deux_points() {
        let jours = decode_emploi("Lundi: 8:30-12:00");
        assert_eq!(jours["Lundi"], "8:30-12:00");
    }

    #[test]
    fn pendant_les_cours_la_sortie_est_refusee() {
        let edt = "Lundi: 8h-12h, 13h30-17h, Mardi: 8h-12h";
        assert!(!peut_sortir(edt, "Lundi", heure(10, 0)));
    }

    #[test]
    fn entre_deux_plages_la_sortie_est_permise() {
        let edt = "Lundi: 8h-12h, 13h30-17h, Mardi: 8h-12h";
        assert!(peut_sortir(edt, "Lundi", heure(12, 30)));
    }

    #[test]
    fn une_plage_orpheline_compte_pour_le_jour_precedent() {
        // "13h30-17h" has no day label, so it stays attached to Lundi
        let edt = "Lundi: 8h-12h, 13h30-17h, Mardi: 8h-12h";
        assert!(!peut_sortir(edt, "Lundi", heure(13, 30)));
    }

    #[test]
    fn les_bornes_sont_incluses() {
        let edt = "Lundi: 8h-12h";
        assert!(!peut_sortir(edt, "Lundi", heure(8, 0)));
        assert!(!peut_sortir(edt, "Lundi", heure(12, 0)));
        assert!(peut_sortir(edt, "Lundi", heure(12, 1)));
        assert!(peut_sortir(edt, "Lundi", heure(7, 59)));
    }

    #[test]
    fn jour_absent_signifie_aucune_restriction() {
        let edt = "Lundi: 8h-12h, Mardi: 8h-12h";
        assert!(peut_sortir(edt, "Mercredi", heure(10, 0)));
        assert!(peut_sortir("", "Lundi", heure(10, 0)));
    }

    #[test]
    fn texte_illisible_autorise_la_sortie() {
        assert!(peut_sortir("Lundi: n'importe quoi", "Lundi", heure(10, 0)));
    }

    #[test]
    fn heure_invalide_autorise_la_sortie() {
        // matches the range pattern but does not parse as a time of day
        assert!(peut_sortir("Lundi: 25:99-26:99", "Lundi", heure(10, 0)));
    }

    #[test]
    fn les_tirets_typographiques_sont_normalises() {
        assert!(!peut_sortir("Lundi: 8h–12h", "Lundi", heure(9, 0)));
        assert!(!peut_sortir("Lundi: 8h—12h", "Lundi", heure(9, 0)));
        assert!(!peut_sortir("Lundi: 8h à 12h", "Lundi", heure(9, 0)));
    }

    #[test]
    fn l_heure_peut_s_ecrire_avec_minutes() {
        assert!(!peut_sortir("Lundi: 8h30-12h15", "Lundi", heure(12, 15)));
        assert!(peut_sortir("Lundi: 8h30-12h15", "Lundi", heure(8, 29)));
    }

    #[test]
    fn jours_en_francais() {
        assert_eq!(jour_en_francais(Weekday::Mon), "Lundi");
        assert_eq!(jour_en_francais(Weekday::Sun), "Dimanche");
    }

    #[test]
    fn arrondi_a_la_minute() {
        let t = NaiveTime::from_hms_opt(12, 0, 45).unwrap();
        assert_eq!(arrondi_minute(t), heure(12, 0));
    }
}
