//! Row normalization: one raw spreadsheet row in, one typed record (or a named
//! validation failure) out. Pure; never touches a store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::RowError;

/// Fixed header set of the product import template.
pub mod headers {
    pub const PRODUCT_NAME: &str = "Product Name";
    pub const CATEGORY: &str = "Category";
    pub const OUR_PRICE: &str = "Our Price";
    pub const ORIGINAL_PRICE: &str = "Original Price";
    pub const MEASUREMENT_UNIT: &str = "Measurement Unit";
    pub const STOCK_UNIT: &str = "Stock Unit";
    pub const STOCK_QUANTITY: &str = "Stock Quantity";
    pub const DESCRIPTION: &str = "Description";
    pub const BADGE: &str = "Badge";
    pub const RATING: &str = "Rating";
    pub const REVIEWS: &str = "Reviews";

    pub const ALL: [&str; 11] = [
        PRODUCT_NAME,
        CATEGORY,
        OUR_PRICE,
        ORIGINAL_PRICE,
        MEASUREMENT_UNIT,
        STOCK_UNIT,
        STOCK_QUANTITY,
        DESCRIPTION,
        BADGE,
        RATING,
        REVIEWS,
    ];
}

/// A single spreadsheet cell. Spreadsheet readers hand back either typed numbers or
/// text, so both are accepted wherever a number is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Trimmed text content; `None` when the cell is blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Cell::Number(n) => Some(n.to_string()),
        }
    }

    /// `Ok(None)` for blank cells, `Err(())` for non-numeric content.
    fn as_number(&self) -> Result<Option<f64>, ()> {
        let n = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(None);
                }
                t.parse::<f64>().map_err(|_| ())?
            }
        };
        if n.is_finite() { Ok(Some(n)) } else { Err(()) }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

/// Header → cell mapping for one input row. Missing headers read as empty cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    cells: HashMap<String, Option<Cell>>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, header: &str, cell: impl Into<Cell>) -> Self {
        self.set(header, Some(cell.into()));
        self
    }

    pub fn set(&mut self, header: &str, cell: Option<Cell>) {
        self.cells.insert(header.to_string(), cell);
    }

    pub fn get(&self, header: &str) -> Option<&Cell> {
        self.cells.get(header).and_then(Option::as_ref)
    }

    fn text(&self, header: &str) -> Option<String> {
        self.get(header).and_then(Cell::as_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Kilograms,
    Pieces,
    Liters,
    Grams,
}

impl Unit {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Unit::Kilograms),
            1 => Some(Unit::Pieces),
            2 => Some(Unit::Liters),
            3 => Some(Unit::Grams),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kilograms => "kilograms",
            Unit::Pieces => "pieces",
            Unit::Liters => "liters",
            Unit::Grams => "grams",
        }
    }

    /// Lenient cell mapping: anything that is not a known whole-number code reads
    /// as kilograms.
    fn from_cell(cell: Option<&Cell>, header: &'static str) -> Self {
        let code = cell
            .and_then(|c| c.as_number().ok().flatten())
            .filter(|n| n.fract() == 0.0)
            .and_then(|n| Unit::from_code(n as i64));
        match code {
            Some(unit) => unit,
            None => {
                if cell.and_then(Cell::as_text).is_some() {
                    debug!(field = header, ?cell, "unrecognized unit code; using kilograms");
                }
                Unit::Kilograms
            }
        }
    }
}

/// Validated, typed product row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub name: String,
    pub category_text: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub measurement_unit: Unit,
    pub stock_unit: Unit,
    pub stock_quantity: i64,
    pub description: Option<String>,
    pub badge_text: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
}

pub fn normalize_row(row: &RawRow) -> Result<NormalizedRow, RowError> {
    let name = row
        .text(headers::PRODUCT_NAME)
        .ok_or_else(|| RowError::validation(headers::PRODUCT_NAME, "missing product name"))?;
    let category_text = row
        .text(headers::CATEGORY)
        .ok_or_else(|| RowError::validation(headers::CATEGORY, "missing category"))?;

    let price = optional_number(row, headers::OUR_PRICE)?
        .ok_or_else(|| RowError::validation(headers::OUR_PRICE, "missing price"))?;
    non_negative(headers::OUR_PRICE, price)?;

    let original_price = optional_number(row, headers::ORIGINAL_PRICE)?;
    if let Some(p) = original_price {
        non_negative(headers::ORIGINAL_PRICE, p)?;
    }

    let rating = optional_number(row, headers::RATING)?;
    if let Some(r) = rating {
        if !(0.0..=5.0).contains(&r) {
            return Err(RowError::validation(
                headers::RATING,
                format!("rating {r} outside 0-5"),
            ));
        }
    }

    let reviews = optional_count(row, headers::REVIEWS)?;
    let stock_quantity = optional_count(row, headers::STOCK_QUANTITY)?.unwrap_or(0);

    Ok(NormalizedRow {
        name,
        category_text,
        price,
        original_price,
        measurement_unit: Unit::from_cell(
            row.get(headers::MEASUREMENT_UNIT),
            headers::MEASUREMENT_UNIT,
        ),
        stock_unit: Unit::from_cell(row.get(headers::STOCK_UNIT), headers::STOCK_UNIT),
        stock_quantity,
        description: row.text(headers::DESCRIPTION),
        badge_text: row.text(headers::BADGE),
        rating,
        reviews,
    })
}

fn optional_number(row: &RawRow, field: &'static str) -> Result<Option<f64>, RowError> {
    match row.get(field) {
        None => Ok(None),
        Some(cell) => cell
            .as_number()
            .map_err(|_| {
                let shown = cell.as_text().unwrap_or_default();
                RowError::validation(field, format!("not a number: \"{shown}\""))
            }),
    }
}

fn optional_count(row: &RawRow, field: &'static str) -> Result<Option<i64>, RowError> {
    match optional_number(row, field)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as i64)),
        Some(n) => Err(RowError::validation(
            field,
            format!("expected a non-negative whole number, got {n}"),
        )),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), RowError> {
    if value < 0.0 {
        return Err(RowError::validation(field, format!("negative value {value}")));
    }
    Ok(())
}
