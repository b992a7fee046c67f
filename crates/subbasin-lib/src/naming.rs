//! Display names for rivers

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rules mapping a raw river name to its display form
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NamingRules {
    /// Prefix prepended to plain river names
    pub prefix: String,
    /// Substrings marking canals and other artificial watercourses (lowercase)
    pub canal_indicators: Vec<String>,
    /// Substrings marking branches, estuaries and reservoirs (lowercase)
    pub no_prefix_indicators: Vec<String>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            prefix: "р. ".to_string(),
            canal_indicators: ["канал", "магістральний", "рч-2", "чорноморський", "роздольненська"]
                .into_iter()
                .map(String::from)
                .collect(),
            no_prefix_indicators: ["рук.", "гирло", "лиман", "рукав", "водосховище"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl NamingRules {
    /// Display form of a river name, or `None` for a missing name.
    ///
    /// Names matching either indicator list (case-insensitive substring) or already carrying
    /// the prefix are returned unchanged; every other name gets the prefix.
    /// The prefix check makes the rule idempotent: a display name maps to itself.
    pub fn display_name(&self, river_name: Option<&str>) -> Option<String> {
        let name = match river_name {
            None | Some("") | Some("None") => return None,
            Some(name) => name,
        };

        if name.starts_with(&self.prefix) {
            return Some(name.to_string());
        }

        let lower = name.to_lowercase();
        let exempt = self
            .canal_indicators
            .iter()
            .chain(&self.no_prefix_indicators)
            .any(|indicator| lower.contains(&indicator.to_lowercase()));

        if exempt {
            Some(name.to_string())
        } else {
            Some(format!("{}{}", self.prefix, name))
        }
    }
}

/// Replace ASCII apostrophes with the typographic one (U+2019).
///
/// River names arrive from different sources with either form (`Прип'ять` / `Прип’ять`);
/// lookups compare the normalized form.
pub fn normalize_apostrophes(name: &str) -> String {
    name.replace('\'', "\u{2019}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_gets_prefix() {
        let rules = NamingRules::default();
        assert_eq!(
            rules.display_name(Some("Рось")).as_deref(),
            Some("р. Рось")
        );
    }

    #[test]
    fn test_missing_names() {
        let rules = NamingRules::default();
        assert_eq!(rules.display_name(None), None);
        assert_eq!(rules.display_name(Some("")), None);
        assert_eq!(rules.display_name(Some("None")), None);
    }

    #[test]
    fn test_exempt_names_unchanged() {
        let rules = NamingRules::default();
        for name in [
            "Північно-Кримський канал",
            "Магістральний канал",
            "РЧ-2",
            "рук. Старий Дніпро",
            "Дністровський лиман",
            "Каховське водосховище",
        ] {
            assert_eq!(rules.display_name(Some(name)).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_display_name_idempotent() {
        let rules = NamingRules::default();
        for name in ["Рось", "Гирло Дунаю", "р. Десна"] {
            let once = rules.display_name(Some(name)).unwrap();
            let twice = rules.display_name(Some(&once)).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_custom_rules() {
        let rules = NamingRules {
            prefix: "river ".to_string(),
            canal_indicators: vec!["canal".to_string()],
            no_prefix_indicators: Vec::new(),
        };
        assert_eq!(
            rules.display_name(Some("Thames")).as_deref(),
            Some("river Thames")
        );
        assert_eq!(
            rules.display_name(Some("Grand Canal")).as_deref(),
            Some("Grand Canal")
        );
    }

    #[test]
    fn test_normalize_apostrophes() {
        assert_eq!(normalize_apostrophes("Прип'ять"), "Прип’ять");
        assert_eq!(normalize_apostrophes("Прип’ять"), "Прип’ять");
    }
}
