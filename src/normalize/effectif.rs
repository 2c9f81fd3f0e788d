//! INSEE employee-count brackets ("tranche d'effectifs").

/// Known tranche codes and their readable ranges. `NN` (non-employer unit)
/// has no entry and maps to no value, like any unknown code.
pub const TRANCHES: [(&str, &str); 15] = [
    ("00", "0 salarié"),
    ("01", "1-2"),
    ("02", "3-5"),
    ("03", "6-9"),
    ("11", "10-19"),
    ("12", "20-49"),
    ("21", "50-99"),
    ("22", "100-199"),
    ("31", "200-249"),
    ("32", "250-499"),
    ("41", "500-999"),
    ("42", "1000-1999"),
    ("51", "2000-4999"),
    ("52", "5000-9999"),
    ("53", "10000+"),
];

pub fn effectif_label(code: Option<&str>) -> Option<&'static str> {
    let code = code?.trim();
    TRANCHES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}
