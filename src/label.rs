//! Rendering of device account comments and initial passwords.

use crate::types::Occupant;

/// Date layout used in account comments, e.g. `Jan-05-2024`.
pub const LABEL_DATE_FORMAT: &str = "%b-%d-%Y";

/// Comment stored on the device account for an occupant.
pub fn account_label(occupant: &Occupant, transliterate_text: bool) -> String {
    let label = format!(
        "{} Check in & out date: {} - {}",
        occupant.name,
        occupant.check_in.format(LABEL_DATE_FORMAT),
        occupant.check_out.format(LABEL_DATE_FORMAT)
    );

    if transliterate_text {
        transliterate(&label)
    } else {
        label
    }
}

/// Initial account password derived from the occupant's birth year.
pub fn initial_password(birth_year: i32) -> String {
    birth_year.to_string()
}

/// Replace Turkish letters with their closest ASCII equivalents.
pub fn transliterate(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'İ' => 'I',
            'Ü' => 'U',
            'Ğ' => 'G',
            'Ş' => 'S',
            'Ö' => 'O',
            'Ç' => 'C',
            'ı' => 'i',
            'ü' => 'u',
            'ğ' => 'g',
            'ş' => 's',
            'ö' => 'o',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
