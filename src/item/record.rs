//! Schema-constrained record types
//!
//! `Subject` and `Book` are the two record shapes produced by extraction.
//! Each type declares its legal fields in a fixed table built at definition
//! time; writing an undeclared field is a [`ItemError::SchemaViolation`],
//! never silently ignored. Values written through [`set`](Subject::set) run
//! the normalization pipeline from [`processor`](super::processor), and reads
//! collapse multi-valued extractions through the field's output step.

use crate::item::processor::{normalize, take_first, OutputStep, RawValue, Transform};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// A persisted field mapping, as stored in a sync slot.
pub type RawRecord = Map<String, Value>;

/// Errors raised by the record model
#[derive(Debug, Error)]
pub enum ItemError {
    /// An undeclared field was written or read. Programmer/config error,
    /// fatal and never recovered.
    #[error("schema violation: {record} has no field `{field}`")]
    SchemaViolation {
        record: &'static str,
        field: String,
    },

    #[error("persisted {record} is missing field `{field}`")]
    MissingField {
        record: &'static str,
        field: String,
    },

    #[error("persisted {record} field `{field}` has an unexpected shape")]
    Malformed {
        record: &'static str,
        field: String,
    },
}

/// Per-field configuration: the input transforms and the output step.
///
/// One entry per declared field, populated at record-type definition time.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub input: &'static [Transform],
    pub output: OutputStep,
}

/// Field storage shared by the concrete record types.
///
/// Holds the normalized (possibly multi-valued) data for each declared field,
/// indexed in parallel with the type's spec table.
#[derive(Debug, Clone)]
struct FieldTable {
    record: &'static str,
    specs: &'static [FieldSpec],
    values: Vec<Vec<String>>,
}

impl FieldTable {
    fn new(record: &'static str, specs: &'static [FieldSpec]) -> Self {
        Self {
            record,
            specs,
            values: vec![Vec::new(); specs.len()],
        }
    }

    fn index_of(&self, field: &str) -> Result<usize, ItemError> {
        self.specs
            .iter()
            .position(|spec| spec.name == field)
            .ok_or_else(|| ItemError::SchemaViolation {
                record: self.record,
                field: field.to_string(),
            })
    }

    fn set(&mut self, field: &str, value: RawValue) -> Result<(), ItemError> {
        let index = self.index_of(field)?;
        self.values[index] = normalize(value, self.specs[index].input);
        Ok(())
    }

    fn get(&self, field: &str) -> Result<Option<&str>, ItemError> {
        let index = self.index_of(field)?;
        Ok((self.specs[index].output)(&self.values[index]))
    }

    /// Typed accessor path: read by table index, skipping the name lookup.
    fn first(&self, index: usize) -> Option<&str> {
        (self.specs[index].output)(&self.values[index])
    }

    fn to_map(&self) -> RawRecord {
        let mut map = Map::new();
        for (spec, values) in self.specs.iter().zip(&self.values) {
            let value = match (spec.output)(values) {
                Some(v) => Value::String(v.to_string()),
                None => Value::Null,
            };
            map.insert(spec.name.to_string(), value);
        }
        map
    }
}

impl PartialEq for FieldTable {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record && self.values == other.values
    }
}

fn raw_value_from_json(
    record: &'static str,
    field: &'static str,
    value: &Value,
) -> Result<RawValue, ItemError> {
    match value {
        Value::Null => Ok(RawValue::Absent),
        Value::String(s) => Ok(RawValue::from(s.as_str())),
        _ => Err(ItemError::Malformed {
            record,
            field: field.to_string(),
        }),
    }
}

fn require<'a>(
    map: &'a RawRecord,
    record: &'static str,
    field: &'static str,
) -> Result<&'a Value, ItemError> {
    map.get(field).ok_or(ItemError::MissingField {
        record,
        field: field.to_string(),
    })
}

/// Subject-name transform: keep the last `-`-delimited segment of the raw
/// listing text (`"calc-101 - Turma A - Intro"` becomes `"Intro"` after the
/// trailing trim).
fn parse_subject_name(name: &str) -> String {
    name.split('-').last().unwrap_or(name).to_string()
}

// ===== Subject =====

const SUBJECT: &str = "Subject";

static SUBJECT_FIELDS: [FieldSpec; 2] = [
    FieldSpec {
        name: Subject::NAME,
        input: &[parse_subject_name],
        output: take_first,
    },
    FieldSpec {
        name: Subject::CLASS_ID,
        input: &[],
        output: take_first,
    },
];

/// A course session discovered by the subject phase.
///
/// `class_id` is the portal token identifying the session; `name` is the last
/// dash-delimited segment of the raw listing text.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    table: FieldTable,
}

impl Subject {
    pub const NAME: &'static str = "name";
    pub const CLASS_ID: &'static str = "class_id";

    pub fn new() -> Self {
        Self {
            table: FieldTable::new(SUBJECT, &SUBJECT_FIELDS),
        }
    }

    /// Writes a declared field through the normalization pipeline.
    pub fn set(&mut self, field: &str, value: RawValue) -> Result<(), ItemError> {
        self.table.set(field, value)
    }

    /// Reads a declared field through its output step.
    pub fn get(&self, field: &str) -> Result<Option<&str>, ItemError> {
        self.table.get(field)
    }

    pub fn name(&self) -> Option<&str> {
        self.table.first(0)
    }

    pub fn class_id(&self) -> Option<&str> {
        self.table.first(1)
    }

    pub fn to_map(&self) -> RawRecord {
        self.table.to_map()
    }

    /// Rebuilds a subject from a persisted field mapping, replaying the `set`
    /// contract field by field.
    pub fn from_map(map: &RawRecord) -> Result<Self, ItemError> {
        let mut subject = Self::new();
        for field in [Self::NAME, Self::CLASS_ID] {
            let value = require(map, SUBJECT, field)?;
            subject.set(field, raw_value_from_json(SUBJECT, field, value)?)?;
        }
        Ok(subject)
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Book =====

const BOOK: &str = "Book";

static BOOK_FIELDS: [FieldSpec; 3] = [
    FieldSpec {
        name: Book::NAME,
        input: &[],
        output: take_first,
    },
    FieldSpec {
        name: Book::DOWNLOAD_URL,
        input: &[],
        output: take_first,
    },
    FieldSpec {
        name: Book::FILENAME,
        input: &[],
        output: take_first,
    },
];

/// A downloadable course material, tagged with the subject it was listed
/// under.
///
/// `filename` is derived: every write to `download_url` recomputes it from
/// the URL's `arquivo` query parameter in the same call, and clearing the URL
/// clears the filename. The owning subject is fixed at construction and is
/// not reassignable through `set`.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    table: FieldTable,
    subject: Subject,
}

impl Book {
    pub const NAME: &'static str = "name";
    pub const DOWNLOAD_URL: &'static str = "download_url";
    pub const FILENAME: &'static str = "filename";
    pub const SUBJECT: &'static str = "subject";

    /// Query parameter carrying the destination filename on download links.
    pub const FILE_QUERY_ARG: &'static str = "arquivo";

    pub fn new(subject: Subject) -> Self {
        Self {
            table: FieldTable::new(BOOK, &BOOK_FIELDS),
            subject,
        }
    }

    /// Writes a declared field through the normalization pipeline.
    ///
    /// Writing `download_url` additionally recomputes `filename` as a side
    /// effect of the same call.
    pub fn set(&mut self, field: &str, value: RawValue) -> Result<(), ItemError> {
        self.table.set(field, value)?;
        if field == Self::DOWNLOAD_URL {
            let derived = self.table.first(1).and_then(filename_from_url);
            self.table.set(Self::FILENAME, RawValue::from(derived))?;
        }
        Ok(())
    }

    /// Reads a declared field through its output step.
    pub fn get(&self, field: &str) -> Result<Option<&str>, ItemError> {
        self.table.get(field)
    }

    pub fn name(&self) -> Option<&str> {
        self.table.first(0)
    }

    pub fn download_url(&self) -> Option<&str> {
        self.table.first(1)
    }

    pub fn filename(&self) -> Option<&str> {
        self.table.first(2)
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn to_map(&self) -> RawRecord {
        let mut map = self.table.to_map();
        map.insert(
            Self::SUBJECT.to_string(),
            Value::Object(self.subject.to_map()),
        );
        map
    }

    /// Rebuilds a book from a persisted field mapping.
    ///
    /// The fields replay in declaration order, so the persisted `filename`
    /// (always equal to the derived one) lands last and the round trip
    /// reproduces identical derived fields.
    pub fn from_map(map: &RawRecord) -> Result<Self, ItemError> {
        let subject_value = require(map, BOOK, Self::SUBJECT)?;
        let subject = match subject_value {
            Value::Object(inner) => Subject::from_map(inner)?,
            _ => {
                return Err(ItemError::Malformed {
                    record: BOOK,
                    field: Self::SUBJECT.to_string(),
                })
            }
        };

        let mut book = Self::new(subject);
        for field in [Self::NAME, Self::DOWNLOAD_URL, Self::FILENAME] {
            let value = require(map, BOOK, field)?;
            book.set(field, raw_value_from_json(BOOK, field, value)?)?;
        }
        Ok(book)
    }
}

/// Extracts the `arquivo` query parameter from a download URL, which may be
/// relative to the portal base.
fn filename_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw)
        .or_else(|_| Url::parse("http://relative.invalid/").and_then(|base| base.join(raw)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == Book::FILE_QUERY_ARG)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject_fixture() -> Subject {
        let mut subject = Subject::new();
        subject.set(Subject::NAME, RawValue::from("any - any - foo")).unwrap();
        subject.set(Subject::CLASS_ID, RawValue::from("42")).unwrap();
        subject
    }

    #[test]
    fn test_subject_name_keeps_last_dash_segment() {
        let subject = subject_fixture();
        assert_eq!(subject.name(), Some("foo"));
        assert_eq!(subject.class_id(), Some("42"));
    }

    #[test]
    fn test_undeclared_field_is_schema_violation() {
        let mut subject = Subject::new();
        let err = subject.set("bogus", RawValue::from("x")).unwrap_err();
        assert!(matches!(err, ItemError::SchemaViolation { record: "Subject", .. }));

        let mut book = Book::new(Subject::new());
        let err = book.set("bogus", RawValue::from("x")).unwrap_err();
        assert!(matches!(err, ItemError::SchemaViolation { record: "Book", .. }));
    }

    #[test]
    fn test_subject_is_not_reassignable_on_book() {
        let mut book = Book::new(Subject::new());
        let err = book.set(Book::SUBJECT, RawValue::from("x")).unwrap_err();
        assert!(matches!(err, ItemError::SchemaViolation { .. }));
    }

    #[test]
    fn test_get_is_idempotent() {
        let mut subject = Subject::new();
        subject
            .set(Subject::NAME, RawValue::Many(vec!["a - b".into(), "second".into()]))
            .unwrap();
        let first = subject.get(Subject::NAME).unwrap().map(str::to_string);
        assert_eq!(first.as_deref(), Some("b"));
        assert_eq!(subject.get(Subject::NAME).unwrap(), first.as_deref());
        assert_eq!(subject.get(Subject::NAME).unwrap(), first.as_deref());
    }

    #[test]
    fn test_filename_derived_from_download_url() {
        let mut book = Book::new(subject_fixture());
        book.set(Book::DOWNLOAD_URL, RawValue::from("/baz?arquivo=foo.txt"))
            .unwrap();
        assert_eq!(book.filename(), Some("foo.txt"));
    }

    #[test]
    fn test_filename_absent_without_query_arg() {
        let mut book = Book::new(subject_fixture());
        book.set(Book::DOWNLOAD_URL, RawValue::from("/baz?other=1"))
            .unwrap();
        assert_eq!(book.download_url(), Some("/baz?other=1"));
        assert_eq!(book.filename(), None);
    }

    #[test]
    fn test_clearing_download_url_clears_filename() {
        let mut book = Book::new(subject_fixture());
        book.set(Book::DOWNLOAD_URL, RawValue::from("/baz?arquivo=foo.txt"))
            .unwrap();
        assert_eq!(book.filename(), Some("foo.txt"));

        book.set(Book::DOWNLOAD_URL, RawValue::Absent).unwrap();
        assert_eq!(book.download_url(), None);
        assert_eq!(book.filename(), None);
    }

    #[test]
    fn test_filename_from_absolute_url() {
        let mut book = Book::new(subject_fixture());
        book.set(
            Book::DOWNLOAD_URL,
            RawValue::from("https://portal.example/baz?arquivo=apostila.pdf"),
        )
        .unwrap();
        assert_eq!(book.filename(), Some("apostila.pdf"));
    }

    #[test]
    fn test_subject_round_trip() {
        let subject = subject_fixture();
        let restored = Subject::from_map(&subject.to_map()).unwrap();
        assert_eq!(restored, subject);
    }

    #[test]
    fn test_book_round_trip() {
        let mut book = Book::new(subject_fixture());
        book.set(Book::NAME, RawValue::from("  Apostila 1  ")).unwrap();
        book.set(Book::DOWNLOAD_URL, RawValue::from("/down?arquivo=a1.pdf"))
            .unwrap();

        let restored = Book::from_map(&book.to_map()).unwrap();
        assert_eq!(restored, book);
        assert_eq!(restored.filename(), Some("a1.pdf"));
        assert_eq!(restored.subject().name(), Some("foo"));
    }

    #[test]
    fn test_book_round_trip_with_null_url() {
        let mut book = Book::new(subject_fixture());
        book.set(Book::NAME, RawValue::from("No file")).unwrap();

        let map = book.to_map();
        assert_eq!(map.get(Book::DOWNLOAD_URL), Some(&serde_json::Value::Null));

        let restored = Book::from_map(&map).unwrap();
        assert_eq!(restored, book);
        assert_eq!(restored.filename(), None);
    }

    #[test]
    fn test_from_map_missing_field() {
        let mut map = subject_fixture().to_map();
        map.remove(Subject::CLASS_ID);
        let err = Subject::from_map(&map).unwrap_err();
        assert!(matches!(err, ItemError::MissingField { .. }));
    }
}
