//! `application/x-www-form-urlencoded` bodies.

use std::collections::HashMap;

/// Decoded form fields. The first occurrence of a repeated key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: HashMap<String, String>,
}

impl Form {
    pub fn parse(body: &str) -> Self {
        let mut fields = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            fields
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        Self { fields }
    }

    /// Trimmed value, empty when absent.
    pub fn text(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    /// Integer id; absent or malformed values read as 0.
    pub fn id(&self, name: &str) -> i64 {
        self.text(name).parse().unwrap_or(0)
    }

    /// Unit count; absent or malformed values read as 0.
    pub fn units(&self, name: &str) -> i32 {
        self.text(name).parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_plus_decoding() {
        let form = Form::parse("name=Ada+Lovelace&blood_type=O%2B&city=S%C3%A3o+Paulo");
        assert_eq!(form.text("name"), "Ada Lovelace");
        assert_eq!(form.text("blood_type"), "O+");
        assert_eq!(form.text("city"), "São Paulo");
    }

    #[test]
    fn test_missing_numbers_read_as_zero() {
        let form = Form::parse("units=&id=abc");
        assert_eq!(form.units("units"), 0);
        assert_eq!(form.id("id"), 0);
        assert_eq!(form.id("donor_id"), 0);
        assert_eq!(form.text("phone"), "");
    }

    #[test]
    fn test_values_are_trimmed_and_first_wins() {
        let form = Form::parse("units=+4+&units=9");
        assert_eq!(form.units("units"), 4);
    }
}
