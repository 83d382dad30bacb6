//! Document field extraction and validation.
//!
//! Extraction runs regex tables over OCR text, one table per document kind,
//! dispatched through a closed match. Each extractor carries a confidence
//! weight; the per-kind divisor normalizes the summed weights and is a
//! calibration constant, not a derived quantity.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::DocumentKind;

/// Calibration divisor for passport extraction confidence.
pub const PASSPORT_DIVISOR: f64 = 4.2;
/// Calibration divisor for id-card extraction confidence.
pub const ID_CARD_DIVISOR: f64 = 3.5;
/// Calibration divisor for driving-license extraction confidence.
pub const LICENSE_DIVISOR: f64 = 1.5;

/// Field keys that must agree across all completed documents of a session.
pub const CRITICAL_FIELDS: [&str; 3] = ["surname", "givenNames", "dateOfBirth"];

const DATE_FORMAT: &str = "%d/%m/%Y";

struct FieldExtractor {
    key: &'static str,
    weight: f64,
    pattern: Regex,
}

impl FieldExtractor {
    fn new(key: &'static str, weight: f64, pattern: &str) -> Self {
        // Patterns are compile-time literals; a failure here is a programming
        // error caught by the extraction tests.
        Self {
            key,
            weight,
            pattern: Regex::new(pattern).unwrap(),
        }
    }
}

static PASSPORT_FIELDS: LazyLock<Vec<FieldExtractor>> = LazyLock::new(|| {
    vec![
        FieldExtractor::new(
            "passportNumber",
            0.9,
            r"(?im)^passport\s*(?:no|number)[.:\s]+([A-Z0-9]{6,12})\b",
        ),
        FieldExtractor::new("surname", 0.8, r"(?im)^surname[.:\s]+([A-Z][A-Z '\-]+?)\s*$"),
        FieldExtractor::new(
            "givenNames",
            0.8,
            r"(?im)^given\s*names?[.:\s]+([A-Z][A-Z '\-]+?)\s*$",
        ),
        FieldExtractor::new(
            "dateOfBirth",
            0.7,
            r"(?im)^date\s*of\s*birth[.:\s]+(\d{2}/\d{2}/\d{4})",
        ),
        FieldExtractor::new(
            "expiryDate",
            0.7,
            r"(?im)^(?:date\s*of\s*)?expiry[.:\s]+(\d{2}/\d{2}/\d{4})",
        ),
    ]
});

static ID_CARD_FIELDS: LazyLock<Vec<FieldExtractor>> = LazyLock::new(|| {
    vec![
        FieldExtractor::new(
            "idNumber",
            0.9,
            r"(?im)^(?:id|identity)\s*(?:card\s*)?(?:no|number)[.:\s]+([A-Z0-9]{6,12})\b",
        ),
        FieldExtractor::new("surname", 0.8, r"(?im)^surname[.:\s]+([A-Z][A-Z '\-]+?)\s*$"),
        FieldExtractor::new(
            "givenNames",
            0.8,
            r"(?im)^given\s*names?[.:\s]+([A-Z][A-Z '\-]+?)\s*$",
        ),
        FieldExtractor::new(
            "dateOfBirth",
            0.7,
            r"(?im)^date\s*of\s*birth[.:\s]+(\d{2}/\d{2}/\d{4})",
        ),
    ]
});

static LICENSE_FIELDS: LazyLock<Vec<FieldExtractor>> = LazyLock::new(|| {
    vec![
        FieldExtractor::new(
            "licenseNumber",
            0.9,
            r"(?im)^licen[cs]e\s*(?:no|number)[.:\s]+([A-Z0-9]{5,15})\b",
        ),
        FieldExtractor::new(
            "categories",
            0.6,
            r"(?im)^categor(?:y|ies)[.:\s]+([A-Z0-9, ]+?)\s*$",
        ),
    ]
});

static NUMBER_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{6,12}$").unwrap());

/// Structured fields pulled out of OCR text, with extraction confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedData {
    pub fields: BTreeMap<String, String>,
    pub confidence_score: f64,
}

/// Outcome of validating one document's extracted data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub confidence_score: f64,
    pub errors: Vec<String>,
}

/// The field that must be present for a kind to be considered readable.
fn required_field(kind: DocumentKind) -> &'static str {
    match kind.base() {
        DocumentKind::Passport => "passportNumber",
        DocumentKind::DrivingLicense => "licenseNumber",
        // `Other` falls back to the id-card extractor, so it shares the key.
        _ => "idNumber",
    }
}

fn extractor_table(kind: DocumentKind) -> (&'static [FieldExtractor], f64) {
    match kind.base() {
        DocumentKind::Passport => (PASSPORT_FIELDS.as_slice(), PASSPORT_DIVISOR),
        DocumentKind::DrivingLicense => (LICENSE_FIELDS.as_slice(), LICENSE_DIVISOR),
        _ => (ID_CARD_FIELDS.as_slice(), ID_CARD_DIVISOR),
    }
}

/// Extract structured fields from OCR text for the given document kind.
///
/// Confidence is the sum of the weights of the fields that matched, divided
/// by the kind's calibration divisor, clamped to [0, 1].
pub fn extract(kind: DocumentKind, text: &str) -> ExtractedData {
    let (table, divisor) = extractor_table(kind);
    let mut fields = BTreeMap::new();
    let mut weight_sum = 0.0;
    for extractor in table {
        if let Some(captures) = extractor.pattern.captures(text) {
            if let Some(value) = captures.get(1) {
                fields.insert(extractor.key.to_string(), value.as_str().trim().to_string());
                weight_sum += extractor.weight;
            }
        }
    }
    ExtractedData {
        fields,
        confidence_score: (weight_sum / divisor).min(1.0),
    }
}

/// Validate extracted data against format rules and the OCR confidence floor.
///
/// Fails closed: any rule violation produces `valid = false`, and every
/// violation is reported, not just the first.
pub fn validate(kind: DocumentKind, data: &ExtractedData, ocr_threshold: f64) -> ValidationResult {
    let mut errors = Vec::new();

    if data.confidence_score < ocr_threshold {
        errors.push(format!(
            "extraction confidence {:.2} below threshold {:.2}",
            data.confidence_score, ocr_threshold
        ));
    }

    let required = required_field(kind);
    match data.fields.get(required) {
        None => errors.push(format!("required field '{required}' not found")),
        Some(value) if !NUMBER_FORMAT.is_match(value) => {
            errors.push(format!("field '{required}' has invalid format"));
        }
        Some(_) => {}
    }

    if let Some(dob) = data.fields.get("dateOfBirth") {
        match NaiveDate::parse_from_str(dob, DATE_FORMAT) {
            Ok(date) if date >= Utc::now().date_naive() => {
                errors.push("date of birth is not in the past".to_string());
            }
            Ok(_) => {}
            Err(_) => errors.push("date of birth is not a valid dd/mm/yyyy date".to_string()),
        }
    }

    if let Some(expiry) = data.fields.get("expiryDate") {
        match NaiveDate::parse_from_str(expiry, DATE_FORMAT) {
            Ok(date) if date < Utc::now().date_naive() => {
                errors.push("document has expired".to_string());
            }
            Ok(_) => {}
            Err(_) => errors.push("expiry date is not a valid dd/mm/yyyy date".to_string()),
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        confidence_score: data.confidence_score,
        errors,
    }
}

/// Check that critical identity fields agree across a session's documents.
///
/// Returns one error per critical field that carries more than one distinct
/// value. Documents that never extracted a field don't count against it.
pub fn cross_document_consistency<'a, I>(extracted: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ExtractedData>,
{
    let mut values_by_field: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for data in extracted {
        for field in CRITICAL_FIELDS {
            if let Some(value) = data.fields.get(field) {
                let values = values_by_field.entry(field).or_default();
                if !values.contains(&value.as_str()) {
                    values.push(value);
                }
            }
        }
    }

    values_by_field
        .into_iter()
        .filter(|(_, values)| values.len() > 1)
        .map(|(field, values)| {
            format!(
                "inconsistent values for '{field}' across documents: {}",
                values.join(" vs ")
            )
        })
        .collect()
}
