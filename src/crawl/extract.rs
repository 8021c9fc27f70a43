//! Record extraction from portal listing pages
//!
//! Selectors and query templates for the two listing endpoints. Extraction
//! unwraps the matched nodes to text at this boundary; everything after that
//! goes through the record model's normalization pipeline.

use crate::item::{Book, ItemError, RawValue, Subject};
use scraper::{ElementRef, Html, Selector};

/// Subject listing endpoint
pub const SUBJECT_LISTING_PATH: &str = "/eadv4/listaDisciplina.processa";

/// Per-subject book listing endpoint
pub const BOOK_LISTING_PATH: &str = "/eadv4/listaMidiatecas.processa";

/// Query template for the subject listing. Built fresh per call so request
/// parameters never leak between calls.
pub fn subject_query() -> Vec<(String, String)> {
    [
        ("turmaIdSessao", "-1"),
        ("situacao", "C"),
        ("turmaId", "-1"),
        ("disciplinaId", "-1"),
        ("confirmacao", "0"),
        ("subMenu", ""),
        ("ferramenta", ""),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

/// Query template for one subject's book listing.
pub fn book_query(class_id: &str) -> Vec<(String, String)> {
    [
        ("turmaIdSessao", class_id),
        ("situacao", "1"),
        ("tipoFiltro", "0"),
        ("filtro", ""),
        ("turmaAberta", "true"),
        ("turmaFechada", "false"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

fn select_nodes<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn texts_of(node: ElementRef<'_>, css: &str) -> RawValue {
    match Selector::parse(css) {
        Ok(selector) => RawValue::Many(
            node.select(&selector)
                .map(|element| element.text().collect::<String>())
                .collect(),
        ),
        Err(_) => RawValue::Absent,
    }
}

fn attrs_of(node: ElementRef<'_>, css: &str, attr: &str) -> RawValue {
    match Selector::parse(css) {
        Ok(selector) => RawValue::Many(
            node.select(&selector)
                .filter_map(|element| element.value().attr(attr))
                .map(str::to_string)
                .collect(),
        ),
        Err(_) => RawValue::Absent,
    }
}

/// Extracts subject records from the subject listing page.
///
/// Zero nodes is reported by returning an empty vec; the phase decides
/// whether that is fatal.
pub fn extract_subjects(html: &str) -> Result<Vec<Subject>, ItemError> {
    let document = Html::parse_document(html);
    let nodes = select_nodes(
        &document,
        "div#grad > div:first-child > div:first-child > div:first-child > div",
    );

    let mut subjects = Vec::new();
    for node in nodes {
        let mut subject = Subject::new();
        subject.set(
            Subject::CLASS_ID,
            attrs_of(node, "a[data-turma_id]", "data-turma_id"),
        )?;
        subject.set(Subject::NAME, texts_of(node, "p"))?;
        subjects.push(subject);
    }
    Ok(subjects)
}

/// Extracts book records from one subject's listing page, each tagged with a
/// copy of the owning subject.
pub fn extract_books(html: &str, subject: &Subject) -> Result<Vec<Book>, ItemError> {
    let document = Html::parse_document(html);
    let nodes = select_nodes(&document, "div#insereEspaco > div");

    let mut books = Vec::new();
    for node in nodes {
        let mut book = Book::new(subject.clone());
        book.set(Book::NAME, texts_of(node, "small"))?;
        book.set(
            Book::DOWNLOAD_URL,
            attrs_of(node, r#"a[title="Download"]"#, "href"),
        )?;
        books.push(book);
    }
    Ok(books)
}

/// Logs the count and a 1-based enumerated listing for operator visibility.
///
/// Side effect only, not part of the data contract. Runs before any failure
/// can surface so partial progress stays visible on abort.
pub fn log_listing(kind: &str, labels: &[Option<&str>]) {
    tracing::info!("number of {}(s) found: {}", kind, labels.len());

    let mut listing = format!("listing of {}(s):\n", kind);
    for (index, label) in labels.iter().enumerate() {
        listing.push_str(&format!("{} - {}\n", index + 1, label.unwrap_or("<unnamed>")));
    }
    tracing::info!("{}", listing);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECT_PAGE: &str = r#"
        <html><body><div id="grad"><div><div><div>
            <div><a data-turma_id="0"></a><p>calc-101 - Turma A - Calculus</p></div>
            <div><a data-turma_id="1"></a><p>alg-202 - Turma B - Algebra</p></div>
        </div></div></div></div></body></html>"#;

    const BOOK_PAGE: &str = r#"
        <html><body><div id="insereEspaco">
            <div><small>Apostila 1</small><a title="Download" href="/down?arquivo=a1.pdf">get</a></div>
            <div><small>Slides</small><span>no link here</span></div>
        </div></body></html>"#;

    #[test]
    fn test_extract_subjects_in_encounter_order() {
        let subjects = extract_subjects(SUBJECT_PAGE).unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].class_id(), Some("0"));
        assert_eq!(subjects[0].name(), Some("Calculus"));
        assert_eq!(subjects[1].class_id(), Some("1"));
        assert_eq!(subjects[1].name(), Some("Algebra"));
    }

    #[test]
    fn test_extract_subjects_empty_page() {
        let subjects = extract_subjects("<html><body></body></html>").unwrap();
        assert!(subjects.is_empty());
    }

    #[test]
    fn test_extract_books_tags_subject() {
        let mut subject = Subject::new();
        subject.set(Subject::NAME, RawValue::from("x - Calculus")).unwrap();
        subject.set(Subject::CLASS_ID, RawValue::from("0")).unwrap();

        let books = extract_books(BOOK_PAGE, &subject).unwrap();
        assert_eq!(books.len(), 2);

        assert_eq!(books[0].name(), Some("Apostila 1"));
        assert_eq!(books[0].download_url(), Some("/down?arquivo=a1.pdf"));
        assert_eq!(books[0].filename(), Some("a1.pdf"));
        assert_eq!(books[0].subject().name(), Some("Calculus"));

        // second node has no download link
        assert_eq!(books[1].name(), Some("Slides"));
        assert_eq!(books[1].download_url(), None);
        assert_eq!(books[1].filename(), None);
    }

    #[test]
    fn test_query_templates_are_fresh_per_call() {
        let first = book_query("0");
        let second = book_query("1");
        assert_ne!(first, second);
        assert_eq!(subject_query(), subject_query());
    }
}
