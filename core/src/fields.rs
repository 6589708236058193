//! `name | value` field extraction for one module section.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::FieldMap;

/// A field line: one or more name tokens, a pipe, then the value.
///
/// Name tokens may carry parentheses, brackets, `/` and `.` so that
/// `Input Power (DC)` and `Temperature 1` both match. Separator rows such as
/// `----  |  -----` do not.
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>[\w()\[\]/.]+(?:[ \t]+[\w()\[\]/.]+)*)[ \t]*\|(?P<value>.*)$")
        .expect("static regex must compile")
});

/// Extracts all fields of a module section body.
///
/// Lines that are not fields are skipped, as is the `Item | Value` column
/// header. When a name repeats, the later value wins.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_core::extract_fields;
///
/// let body = "
///  Item                 |        Value
///  ----                 |        -----
///  Status               |  [STATUS OK](00h)
///  Input Power (DC)     |        198 W
/// ";
/// let fields = extract_fields(body);
///
/// assert_eq!(fields.get("Status"), Some("[STATUS OK](00h)"));
/// assert_eq!(fields.get("Input Power (DC)"), Some("198 W"));
/// assert!(!fields.contains("----"));
/// assert!(!fields.contains("Item"));
/// ```
pub fn extract_fields(body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for line in body.lines() {
        let Some(caps) = FIELD_LINE.captures(line) else {
            continue;
        };
        let (Some(name), Some(value)) = (caps.name("name"), caps.name("value")) else {
            continue;
        };
        let (name, value) = (name.as_str().trim(), value.as_str().trim());
        if is_column_header(name, value) {
            continue;
        }
        fields.insert(name, value);
    }
    fields
}

fn is_column_header(name: &str, value: &str) -> bool {
    name.eq_ignore_ascii_case("Item") && value.eq_ignore_ascii_case("Value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_surrounding_whitespace() {
        let fields = extract_fields("   Input Power      |         42 W    \n");
        assert_eq!(fields.get("Input Power"), Some("42 W"));
    }

    #[test]
    fn test_tabs_and_tight_pipes() {
        let fields = extract_fields("Status|OK\n\tFan 1\t|\t3328 RPM\n");
        assert_eq!(fields.get("Status"), Some("OK"));
        assert_eq!(fields.get("Fan 1"), Some("3328 RPM"));
    }

    #[test]
    fn test_value_keeps_inner_pipes_and_brackets() {
        let fields = extract_fields("Status | [IOUT_OC_FAULT][UNIT IS OFF] (50h) | extra\n");
        assert_eq!(fields.get("Status"), Some("[IOUT_OC_FAULT][UNIT IS OFF] (50h) | extra"));
    }

    #[test]
    fn test_parenthesized_and_bracketed_names() {
        let body = "Input Power (DC) | 120 W\n[PS] Status | OK\nTemp/Hum | 1\n";
        let fields = extract_fields(body);
        assert_eq!(fields.get("Input Power (DC)"), Some("120 W"));
        assert_eq!(fields.get("[PS] Status"), Some("OK"));
        assert_eq!(fields.get("Temp/Hum"), Some("1"));
    }

    #[test]
    fn test_skips_noise_lines() {
        let body = "\n ----  |  -----\nno pipe here\n   \n| orphan value\nStatus | OK\n";
        let fields = extract_fields(body);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("Status"), Some("OK"));
    }

    #[test]
    fn test_skips_column_header_row() {
        let body = " Item    |    Value
 ----    |    -----
 Status  |    OK
";
        let fields = extract_fields(body);
        assert_eq!(fields.names().collect::<Vec<_>>(), ["Status"]);

        assert!(extract_fields(" Item | Value
 ---- | -----
").is_empty());
        // Only the exact header pair is dropped.
        assert_eq!(extract_fields("Item | 3
").get("Item"), Some("3"));
    }

    #[test]
    fn test_empty_value_is_kept() {
        let fields = extract_fields("PWS Serial Number |   \n");
        assert_eq!(fields.get("PWS Serial Number"), Some(""));
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let fields = extract_fields("Status | OK\nStatus | [UNIT IS OFF]\n");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("Status"), Some("[UNIT IS OFF]"));
    }

    #[test]
    fn test_recovers_names_regardless_of_padding() {
        let names = ["Status", "Input Power", "Main Output Power", "Input Power (DC)"];
        let values = ["[STATUS OK](00h)", "42 W", "1 W", "0 W"];
        for (name, value) in names.iter().zip(values) {
            for (lead, mid, tail) in [("", " ", ""), ("   ", "\t\t", "  "), (" ", "      ", "\t")] {
                let line = format!("{lead}{name}{mid}|{mid}{value}{tail}");
                let fields = extract_fields(&line);
                assert_eq!(fields.get(name), Some(value), "{line:?}");
            }
        }
    }
}
