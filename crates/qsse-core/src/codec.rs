//! Row codec: `BundledRows` on the wire to typed argument rows and back
//!
//! Inbound batches of one call are concatenated before decoding, so a row set
//! the host fragments across several messages decodes exactly like one batch.
//! Results always go out as a single batch of single-cell rows.

use qsse_proto::{BundledRows, DataType, Dual, Row};

use crate::error::CodecError;
use crate::registry::ParamSpec;

/// A decoded cell, or a result scalar to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Dual(f64, String),
    Null,
}

impl Value {
    fn to_dual(&self, return_type: DataType) -> Dual {
        let (num, text) = match self {
            Value::Str(s) => (s.trim().parse::<f64>().unwrap_or(f64::NAN), s.clone()),
            Value::Num(n) => (*n, format_number(*n)),
            Value::Dual(n, s) => (*n, s.clone()),
            Value::Null => (f64::NAN, String::new()),
        };
        match return_type {
            DataType::String => Dual {
                num_data: 0.0,
                str_data: text,
            },
            DataType::Numeric => Dual {
                num_data: num,
                str_data: String::new(),
            },
            DataType::Dual => Dual {
                num_data: num,
                str_data: text,
            },
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

// NaN is the wire encoding of a null number; it has no text form.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        String::new()
    } else {
        n.to_string()
    }
}

/// One decoded input row, in declared parameter order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgRow {
    index: usize,
    values: Vec<Value>,
}

impl ArgRow {
    pub fn new(index: usize, values: Vec<Value>) -> Self {
        Self { index, values }
    }

    /// Position of this row in the call's concatenated input.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Text of column `column`; dual cells yield their string half.
    pub fn str_at(&self, column: usize) -> Result<&str, CodecError> {
        match self.cell(column)? {
            Value::Str(s) | Value::Dual(_, s) => Ok(s.as_str()),
            Value::Null => Ok(""),
            Value::Num(_) => Err(self.mismatch(column, DataType::String)),
        }
    }

    /// Number in column `column`; `None` for a null cell.
    pub fn num_at(&self, column: usize) -> Result<Option<f64>, CodecError> {
        match self.cell(column)? {
            Value::Num(n) | Value::Dual(n, _) => Ok(Some(*n)),
            Value::Null => Ok(None),
            Value::Str(_) => Err(self.mismatch(column, DataType::Numeric)),
        }
    }

    fn cell(&self, column: usize) -> Result<&Value, CodecError> {
        self.values.get(column).ok_or(CodecError::MissingColumn {
            row: self.index,
            column,
        })
    }

    fn mismatch(&self, column: usize, expected: DataType) -> CodecError {
        CodecError::TypeMismatch {
            row: self.index,
            column,
            expected,
        }
    }
}

/// Decode every row of every batch against the declared parameters.
///
/// Fails on the first row with the wrong number of cells or a cell of the
/// wrong kind; nothing is returned for the rows before it.
pub fn decode_rows<I>(batches: I, params: &[ParamSpec]) -> Result<Vec<ArgRow>, CodecError>
where
    I: IntoIterator<Item = BundledRows>,
{
    let rows: Vec<Row> = batches.into_iter().flat_map(|b| b.rows).collect();

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| decode_row(index, row, params))
        .collect()
}

fn decode_row(index: usize, row: Row, params: &[ParamSpec]) -> Result<ArgRow, CodecError> {
    if row.duals.len() != params.len() {
        return Err(CodecError::Arity {
            row: index,
            expected: params.len(),
            actual: row.duals.len(),
        });
    }

    let values = row
        .duals
        .into_iter()
        .zip(params)
        .enumerate()
        .map(|(column, (dual, param))| {
            decode_cell(dual, param.data_type).ok_or(CodecError::TypeMismatch {
                row: index,
                column,
                expected: param.data_type,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ArgRow::new(index, values))
}

fn decode_cell(dual: Dual, data_type: DataType) -> Option<Value> {
    let Dual { num_data, str_data } = dual;
    match data_type {
        DataType::String => {
            // A bare number where text was declared
            if str_data.is_empty() && num_data != 0.0 && !num_data.is_nan() {
                None
            } else {
                Some(Value::Str(str_data))
            }
        }
        DataType::Numeric => {
            if num_data.is_nan() {
                if str_data.is_empty() {
                    Some(Value::Null)
                } else {
                    None
                }
            } else if num_data == 0.0
                && !str_data.is_empty()
                && str_data.trim().parse::<f64>().is_err()
            {
                None
            } else {
                Some(Value::Num(num_data))
            }
        }
        DataType::Dual => Some(Value::Dual(num_data, str_data)),
    }
}

/// Encode result scalars as one batch of single-cell rows.
pub fn encode_values(values: &[Value], return_type: DataType) -> BundledRows {
    BundledRows {
        rows: values
            .iter()
            .map(|v| Row {
                duals: vec![v.to_dual(return_type)],
            })
            .collect(),
    }
}
