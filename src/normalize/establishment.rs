use itertools::Itertools;
use serde_json::Value;

use super::{effectif_label, flatten, parse_date, project};
use crate::db::EstablishmentRow;

/// SIRENE field path → `sirene` column.
pub const SIRENE_COLUMNS: [(&str, &str); 9] = [
    ("siret", "siret"),
    ("siren", "siren"),
    ("uniteLegale.denominationUniteLegale", "denomination"),
    ("uniteLegale.activitePrincipaleUniteLegale", "naf_code"),
    ("uniteLegale.dateCreationUniteLegale", "date_creation"),
    ("uniteLegale.trancheEffectifsUniteLegale", "effectif"),
    ("adresseEtablissement.libelleVoieEtablissement", "adresse"),
    ("adresseEtablissement.codePostalEtablissement", "code_postal"),
    ("adresseEtablissement.libelleCommuneEtablissement", "ville"),
];

pub fn to_row(record: &Value) -> EstablishmentRow {
    let flat = flatten(record, ".");
    let mut cols = project(&flat, &SIRENE_COLUMNS);
    EstablishmentRow {
        siret: cols.remove("siret"),
        siren: cols.remove("siren"),
        denomination: cols.remove("denomination"),
        naf_code: cols.remove("naf_code"),
        date_creation: cols.remove("date_creation").as_deref().and_then(parse_date),
        effectif: effectif_label(cols.remove("effectif").as_deref()).map(str::to_string),
        adresse: cols.remove("adresse"),
        code_postal: cols.remove("code_postal"),
        ville: cols.remove("ville"),
    }
}

/// One row per `etablissement`, first occurrence of each SIRET kept.
pub fn normalize_establishments(records: &[Value]) -> Vec<EstablishmentRow> {
    records
        .iter()
        .map(to_row)
        .unique_by(|r| r.siret.clone())
        .collect()
}
