use crate::table::{Label, PriceTable, TableError};

/// Collapse a header to one level by joining the non-empty parts with `_`.
pub fn flatten_label(label: &Label) -> String {
    label
        .0
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<String>>()
        .join("_")
}

/// Trim, lowercase, and replace spaces and `=` with `_`.
pub fn sanitize(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '='], "_")
}

/// Single-level, database friendly label.
/// `("Close", "CL=F")` becomes `close_cl_f`, `("Date", "")` becomes `date`.
pub fn normalize_label(label: &Label) -> Label {
    Label::single(&sanitize(&flatten_label(label)))
}

/// Normalize every label of the header.  Labels that end up the same are an
/// error.
pub fn normalize(table: PriceTable) -> Result<PriceTable, TableError> {
    let header = table.header().clone().map(|label| normalize_label(&label));
    table.with_header(header)
}
