use std::fmt;

use jiff::civil::Date;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("duplicate column label: {0}")]
    DuplicateColumn(String),
    #[error("can't stack tables with headers [{0}] and [{1}]")]
    HeaderMismatch(String, String),
}

/// A column header.  Most headers have one level, some provider layouts come
/// with two, e.g. `("Close", "CL=F")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub Vec<String>);

impl Label {
    pub fn single(name: &str) -> Label {
        Label(vec![name.to_string()])
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            write!(f, "{}", self.0[0])
        } else {
            write!(f, "({})", self.0.join(", "))
        }
    }
}

/// Fail if two labels are the same.
fn check_unique(labels: &[Label]) -> Result<(), TableError> {
    for (i, label) in labels.iter().enumerate() {
        if labels[..i].contains(label) {
            return Err(TableError::DuplicateColumn(label.to_string()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub date: Date,
    pub close: f64,
    pub symbol: String,
}

/// Daily closes plus the labels of the date, close and symbol columns, in
/// that order.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    header: [Label; 3],
    rows: Vec<PriceRow>,
}

impl PriceTable {
    pub fn new(rows: Vec<PriceRow>) -> PriceTable {
        PriceTable {
            header: [
                Label::single("Date"),
                Label::single("Close"),
                Label::single("Symbol"),
            ],
            rows,
        }
    }

    pub fn header(&self) -> &[Label; 3] {
        &self.header
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same rows under a new header.
    pub fn with_header(self, header: [Label; 3]) -> Result<PriceTable, TableError> {
        check_unique(&header)?;
        Ok(PriceTable {
            header,
            rows: self.rows,
        })
    }

    /// Stack tables on top of each other, in order.  All of them must have
    /// the same header.
    pub fn concat(tables: Vec<PriceTable>) -> Result<PriceTable, TableError> {
        let mut iter = tables.into_iter();
        let mut out = match iter.next() {
            Some(t) => t,
            None => return Ok(PriceTable::new(vec![])),
        };
        for t in iter {
            if t.header != out.header {
                return Err(TableError::HeaderMismatch(
                    out.header.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", "),
                    t.header.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", "),
                ));
            }
            out.rows.extend(t.rows);
        }
        Ok(out)
    }

    /// Render as an ASCII table for the console.
    pub fn to_ascii(&self) -> tabled::Table {
        let mut builder = tabled::builder::Builder::new();
        builder.push_record(self.header.iter().map(|l| l.to_string()));
        for row in &self.rows {
            builder.push_record(vec![
                row.date.to_string(),
                row.close.to_string(),
                row.symbol.clone(),
            ]);
        }
        let mut table = builder.build();
        table.with(tabled::settings::Style::sharp());
        table
    }
}
