//! Long-form, locale-aware date rendering.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateLocale {
    #[default]
    Es,
    En,
}

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn weekday_name(day: Weekday, locale: DateLocale) -> &'static str {
    match (locale, day) {
        (DateLocale::Es, Weekday::Mon) => "lunes",
        (DateLocale::Es, Weekday::Tue) => "martes",
        (DateLocale::Es, Weekday::Wed) => "miércoles",
        (DateLocale::Es, Weekday::Thu) => "jueves",
        (DateLocale::Es, Weekday::Fri) => "viernes",
        (DateLocale::Es, Weekday::Sat) => "sábado",
        (DateLocale::Es, Weekday::Sun) => "domingo",
        (DateLocale::En, Weekday::Mon) => "Monday",
        (DateLocale::En, Weekday::Tue) => "Tuesday",
        (DateLocale::En, Weekday::Wed) => "Wednesday",
        (DateLocale::En, Weekday::Thu) => "Thursday",
        (DateLocale::En, Weekday::Fri) => "Friday",
        (DateLocale::En, Weekday::Sat) => "Saturday",
        (DateLocale::En, Weekday::Sun) => "Sunday",
    }
}

/// Parse the leading `YYYY-MM-DD` of a form value (time parts are ignored)
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let head = value.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn long_date(date: NaiveDate, locale: DateLocale) -> String {
    let weekday = weekday_name(date.weekday(), locale);
    let month = date.month0() as usize;
    match locale {
        DateLocale::Es => format!(
            "{}, {} de {} de {}",
            weekday,
            date.day(),
            MONTHS_ES[month],
            date.year()
        ),
        DateLocale::En => format!(
            "{}, {} {}, {}",
            weekday,
            MONTHS_EN[month],
            date.day(),
            date.year()
        ),
    }
}

/// Render a date field value for the certificate.
///
/// Values that are not ISO dates were typed by hand and are kept as typed.
pub fn format_long_date(value: &str, locale: DateLocale) -> String {
    match parse_iso_date(value) {
        Some(date) => long_date(date, locale),
        None => {
            warn!(value, "date field is not an ISO date, rendering as typed");
            value.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spanish_long_form() {
        assert_eq!(
            format_long_date("2025-09-20", DateLocale::Es),
            "sábado, 20 de septiembre de 2025"
        );
    }

    #[test]
    fn test_english_long_form() {
        assert_eq!(
            format_long_date("2025-09-20", DateLocale::En),
            "Saturday, September 20, 2025"
        );
    }

    #[test]
    fn test_datetime_input_uses_date_part() {
        assert_eq!(
            format_long_date("2025-01-01T10:30", DateLocale::Es),
            "miércoles, 1 de enero de 2025"
        );
    }

    #[test]
    fn test_free_text_passes_through() {
        assert_eq!(format_long_date(" fin de mes ", DateLocale::Es), "fin de mes");
        assert_eq!(format_long_date("2025-13-01", DateLocale::En), "2025-13-01");
    }
}
