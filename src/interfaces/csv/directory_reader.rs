use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Read;

/// One line of a grade price list: `school, grade, monthly_payment`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct GradeRow {
    pub school: String,
    pub grade: String,
    pub monthly_payment: Decimal,
}

/// One line of a parent list. School and grade are referenced by name.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ParentRow {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub child_name: String,
    pub school: String,
    pub grade: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub chat_address: Option<String>,
}

/// Reads directory rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, so trailing optional columns may be left out.
pub struct DirectoryReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DirectoryReader<R> {
    /// Creates a new `DirectoryReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows of type `T`.
    pub fn rows<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }

    pub fn grades(self) -> impl Iterator<Item = Result<GradeRow>> {
        self.rows()
    }

    pub fn parents(self) -> impl Iterator<Item = Result<ParentRow>> {
        self.rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_grades() {
        let data = "school, grade, monthly_payment\nШкола №5, 1 класс, 3400\nШкола №26, 2 класс, 3800";
        let rows: Vec<Result<GradeRow>> = DirectoryReader::new(data.as_bytes()).grades().collect();

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.school, "Школа №5");
        assert_eq!(first.monthly_payment, dec!(3400));
    }

    #[test]
    fn test_reader_parents_optional_columns() {
        let data = "first_name,last_name,child_name,school,grade,phone_number,chat_address\n\
                    Анна,,Маша,Школа №5,1 класс,,1001\n\
                    Олег,Петров,Петя,Школа №5,1 класс,+79990000000,";
        let rows: Vec<ParentRow> = DirectoryReader::new(data.as_bytes())
            .parents()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows[0].last_name, None);
        assert_eq!(rows[0].chat_address.as_deref(), Some("1001"));
        assert_eq!(rows[1].last_name.as_deref(), Some("Петров"));
        assert_eq!(rows[1].chat_address, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "school, grade, monthly_payment\nШкола №5, 1 класс, много";
        let rows: Vec<Result<GradeRow>> = DirectoryReader::new(data.as_bytes()).grades().collect();

        assert!(matches!(rows[0], Err(PaymentError::CsvError(_))));
    }
}
