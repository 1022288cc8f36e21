use thiserror::Error;

use super::model::Table;

/// Host country of the mobility.
pub const COUNTRY: &str = "pays_accueil";
/// Participant status.
pub const STATUS: &str = "statut_participant";
/// Preferred establishment column.
pub const EPLEFPA: &str = "EPLEFPA";
/// Fallback establishment column.
pub const ESTABLISHMENT: &str = "etablissement";
/// SIRET number of the applicant.
pub const SIRET: &str = "demandeur_siret";

/// Establishment column candidates, most preferred first.
pub const ESTABLISHMENT_CANDIDATES: &[&str] = &[EPLEFPA, ESTABLISHMENT];

/// One or more required columns are absent. Names keep the requested order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("missing required columns: {}", .0.join(", "))]
pub struct MissingColumns(pub Vec<String>);

/// Return the first candidate column present in `table`.
pub fn resolve_column<'a>(table: &Table, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|name| table.has_column(name))
}

/// Check that every name in `required` is a column of `table`.
pub fn require_columns(table: &Table, required: &[&str]) -> Result<(), MissingColumns> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !table.has_column(name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingColumns(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;

    fn table_with(names: &[&str]) -> Table {
        Table::new(names.iter().map(|n| Column::new(*n, Vec::new())).collect()).unwrap()
    }

    #[test]
    fn eplefpa_wins_over_etablissement() {
        let both = table_with(&[ESTABLISHMENT, EPLEFPA]);
        assert_eq!(resolve_column(&both, ESTABLISHMENT_CANDIDATES), Some(EPLEFPA));

        let fallback = table_with(&[ESTABLISHMENT]);
        assert_eq!(
            resolve_column(&fallback, ESTABLISHMENT_CANDIDATES),
            Some(ESTABLISHMENT)
        );

        let neither = table_with(&[COUNTRY]);
        assert_eq!(resolve_column(&neither, ESTABLISHMENT_CANDIDATES), None);
    }

    #[test]
    fn every_missing_column_is_listed() {
        let table = table_with(&[STATUS]);
        let err = require_columns(&table, &[COUNTRY, EPLEFPA, SIRET, STATUS]).unwrap_err();
        assert_eq!(err.0, vec![COUNTRY, EPLEFPA, SIRET]);
        assert_eq!(
            err.to_string(),
            "missing required columns: pays_accueil, EPLEFPA, demandeur_siret"
        );
    }

    #[test]
    fn names_are_matched_exactly() {
        let table = table_with(&["Pays_Accueil ", STATUS]);
        assert!(require_columns(&table, &[COUNTRY]).is_err());
        assert!(require_columns(&table, &[STATUS]).is_ok());
    }
}
