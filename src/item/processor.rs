//! Field normalization pipeline
//!
//! Every value written to a record runs through the same chain: unwrap the
//! tree-selector result to plain text, apply the field-specific transforms
//! left to right, then trim whitespace. Multi-valued extractions are
//! normalized element-wise and collapsed to their first value on read.

/// A single field transform applied during normalization.
pub type Transform = fn(&str) -> String;

/// Output step applied when a field is read.
///
/// The default is [`take_first`]; a field may declare a different one in its
/// spec-table entry.
pub type OutputStep = for<'a> fn(&'a [String]) -> Option<&'a str>;

/// A raw extracted value on its way into a record field.
///
/// Tree-selector handles are unwrapped to their textual content at the
/// extraction boundary, so by the time a value reaches the pipeline it is
/// either plain text, a sequence of texts, or absent. Absence is a normal
/// condition, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// A single already-collapsed value
    Text(String),
    /// A multi-valued extraction (one entry per matched node)
    Many(Vec<String>),
    /// No value was extracted
    Absent,
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Option<String>> for RawValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => Self::Text(v),
            None => Self::Absent,
        }
    }
}

impl From<Vec<String>> for RawValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// Runs the input chain over a raw value.
///
/// Each element passes through `transforms` left to right and is trimmed
/// afterwards. Elements that end up empty are dropped, so an empty or absent
/// input collapses to an empty sequence rather than an error.
pub fn normalize(raw: RawValue, transforms: &[Transform]) -> Vec<String> {
    let values = match raw {
        RawValue::Text(v) => vec![v],
        RawValue::Many(v) => v,
        RawValue::Absent => Vec::new(),
    };

    values
        .into_iter()
        .map(|mut value| {
            for transform in transforms {
                value = transform(&value);
            }
            value.trim().to_string()
        })
        .filter(|value| !value.is_empty())
        .collect()
}

/// Default output step: the first stored value, or `None` when the field is
/// empty. Idempotent on repeated reads.
pub fn take_first(values: &[String]) -> Option<&str> {
    values.first().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_single_value() {
        let out = normalize(RawValue::from("  hello  "), &[]);
        assert_eq!(out, vec!["hello".to_string()]);
    }

    #[test]
    fn test_normalize_absent_is_empty() {
        assert!(normalize(RawValue::Absent, &[]).is_empty());
        assert!(normalize(RawValue::from(Option::<String>::None), &[]).is_empty());
    }

    #[test]
    fn test_normalize_drops_whitespace_only_values() {
        let out = normalize(
            RawValue::Many(vec!["  ".into(), "keep".into(), "".into()]),
            &[],
        );
        assert_eq!(out, vec!["keep".to_string()]);
    }

    #[test]
    fn test_normalize_applies_transforms_in_order() {
        fn upper(s: &str) -> String {
            s.to_uppercase()
        }
        fn exclaim(s: &str) -> String {
            format!("{}!", s)
        }
        let out = normalize(RawValue::from(" hi "), &[upper, exclaim]);
        // trim runs last, after the transforms
        assert_eq!(out, vec!["HI !".to_string()]);
    }

    #[test]
    fn test_take_first() {
        let values = vec!["a".to_string(), "b".to_string()];
        assert_eq!(take_first(&values), Some("a"));
        assert_eq!(take_first(&[]), None);
    }

    #[test]
    fn test_take_first_is_idempotent() {
        let values = vec!["a".to_string()];
        assert_eq!(take_first(&values), take_first(&values));
    }
}
