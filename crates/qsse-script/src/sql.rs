//! SQL script evaluator built on DataFusion

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType as ArrowType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use qsse_core::{decode_rows, encode_values, ArgRow, ParamSpec, Value};
use qsse_proto::{BundledRows, DataType, FunctionType, ScriptRequestHeader};
use tracing::debug;

use crate::error::ScriptError;
use crate::evaluator::ScriptEvaluator;

/// Name of the table the call's rows are exposed as.
pub const ARGS_TABLE: &str = "args";

/// Evaluates the script as a SQL select-list expression over table `args`.
///
/// Each call gets a fresh `SessionContext`, so calls share no state.
#[derive(Debug, Default, Clone)]
pub struct SqlScriptEvaluator;

impl SqlScriptEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn context() -> SessionContext {
        // Parameter names keep their case
        let config =
            SessionConfig::new().set_bool("datafusion.sql_parser.enable_ident_normalization", false);
        SessionContext::new_with_config(config)
    }
}

#[async_trait]
impl ScriptEvaluator for SqlScriptEvaluator {
    async fn evaluate(
        &self,
        header: &ScriptRequestHeader,
        rows: Vec<BundledRows>,
        kind: FunctionType,
    ) -> Result<BundledRows, ScriptError> {
        let kind_name = match kind {
            FunctionType::Aggregation => "aggregation",
            FunctionType::Tensor => "tensor",
            FunctionType::Scalar => return Err(ScriptError::UnsupportedKind("scalar")),
        };
        let return_type = DataType::try_from(header.return_type).map_err(|_| {
            ScriptError::Header(format!("unrecognized return type {}", header.return_type))
        })?;
        let params = header_params(header)?;
        let args = decode_rows(rows, &params)?;
        let input_rows = args.len();

        let ctx = Self::context();
        let query = if params.is_empty() {
            format!("SELECT {}", header.script)
        } else {
            let table = MemTable::try_new(
                args_schema(&params),
                vec![vec![args_batch(&params, &args)?]],
            )?;
            ctx.register_table(ARGS_TABLE, Arc::new(table))?;
            format!("SELECT {} FROM {}", header.script, ARGS_TABLE)
        };
        debug!(kind = kind_name, rows = input_rows, "Evaluating script: {}", query);

        let batches = ctx.sql(&query).await?.collect().await?;
        let values = result_values(&batches, return_type)?;

        let expected = match kind {
            FunctionType::Aggregation => 1,
            _ => input_rows,
        };
        if values.len() != expected {
            return Err(ScriptError::RowCount {
                kind: kind_name,
                expected,
                actual: values.len(),
            });
        }

        Ok(encode_values(&values, return_type))
    }
}

fn header_params(header: &ScriptRequestHeader) -> Result<Vec<ParamSpec>, ScriptError> {
    header
        .params
        .iter()
        .map(|p| {
            let data_type = DataType::try_from(p.data_type).map_err(|_| {
                ScriptError::Header(format!(
                    "parameter '{}' has unrecognized type {}",
                    p.name, p.data_type
                ))
            })?;
            Ok(ParamSpec {
                name: p.name.clone(),
                data_type,
            })
        })
        .collect()
}

fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Numeric => ArrowType::Float64,
        DataType::String | DataType::Dual => ArrowType::Utf8,
    }
}

fn args_schema(params: &[ParamSpec]) -> Arc<Schema> {
    Arc::new(Schema::new(
        params
            .iter()
            .map(|p| Field::new(&p.name, arrow_type(p.data_type), true))
            .collect::<Vec<_>>(),
    ))
}

fn args_batch(params: &[ParamSpec], args: &[ArgRow]) -> Result<RecordBatch, ScriptError> {
    let columns = params
        .iter()
        .enumerate()
        .map(|(column, param)| -> Result<ArrayRef, ScriptError> {
            Ok(match param.data_type {
                DataType::Numeric => Arc::new(Float64Array::from(
                    args.iter()
                        .map(|row| row.num_at(column))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                DataType::String | DataType::Dual => Arc::new(StringArray::from(
                    args.iter()
                        .map(|row| row.str_at(column).map(str::to_string))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordBatch::try_new(args_schema(params), columns)?)
}

/// Flatten the single result column, cast to what the call returns.
fn result_values(batches: &[RecordBatch], return_type: DataType) -> Result<Vec<Value>, ScriptError> {
    let mut values = Vec::new();
    for batch in batches {
        if batch.num_columns() != 1 {
            return Err(ScriptError::ColumnCount(batch.num_columns()));
        }
        let column = batch.column(0);
        match return_type {
            DataType::Numeric => {
                let nums = as_f64(column)?;
                values.extend(
                    (0..nums.len()).map(|i| num_value(&nums, i).map_or(Value::Null, Value::Num)),
                );
            }
            DataType::String => {
                let text = as_utf8(column)?;
                values.extend((0..text.len()).map(|i| str_value(&text, i).map_or(Value::Null, Value::Str)));
            }
            DataType::Dual => {
                let nums = as_f64(column)?;
                let text = as_utf8(column)?;
                values.extend((0..text.len()).map(|i| {
                    match (num_value(&nums, i), str_value(&text, i)) {
                        (None, None) => Value::Null,
                        (n, s) => Value::Dual(n.unwrap_or(f64::NAN), s.unwrap_or_default()),
                    }
                }));
            }
        }
    }
    Ok(values)
}

fn as_f64(column: &ArrayRef) -> Result<Float64Array, ScriptError> {
    let casted = cast(column, &ArrowType::Float64)?;
    Ok(casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .unwrap_or_else(|| Float64Array::new_null(casted.len())))
}

fn as_utf8(column: &ArrayRef) -> Result<StringArray, ScriptError> {
    let casted = cast(column, &ArrowType::Utf8)?;
    Ok(casted
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .unwrap_or_else(|| StringArray::new_null(casted.len())))
}

fn num_value(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

fn str_value(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsse_proto::{Dual, Parameter, Row};

    fn header(script: &str, kind: FunctionType, ret: DataType, params: &[(&str, DataType)]) -> ScriptRequestHeader {
        ScriptRequestHeader {
            script: script.to_string(),
            function_type: kind as i32,
            return_type: ret as i32,
            params: params
                .iter()
                .map(|(name, t)| Parameter {
                    name: name.to_string(),
                    data_type: *t as i32,
                })
                .collect(),
        }
    }

    fn num_rows(values: &[f64]) -> BundledRows {
        BundledRows {
            rows: values
                .iter()
                .map(|n| Row {
                    duals: vec![Dual {
                        num_data: *n,
                        str_data: String::new(),
                    }],
                })
                .collect(),
        }
    }

    fn cells(result: &BundledRows) -> Vec<&Dual> {
        result.rows.iter().map(|r| &r.duals[0]).collect()
    }

    #[tokio::test]
    async fn test_aggregation_sums_across_batches() {
        let h = header(
            "sum(Amount)",
            FunctionType::Aggregation,
            DataType::Numeric,
            &[("Amount", DataType::Numeric)],
        );
        let result = SqlScriptEvaluator::new()
            .evaluate(&h, vec![num_rows(&[1.0, 2.0]), num_rows(&[4.5])], FunctionType::Aggregation)
            .await
            .unwrap();

        let out = cells(&result);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].num_data, 7.5);
    }

    #[tokio::test]
    async fn test_tensor_returns_row_per_input() {
        let h = header(
            "upper(name)",
            FunctionType::Tensor,
            DataType::String,
            &[("name", DataType::String)],
        );
        let rows = BundledRows {
            rows: ["a", "b", "c"]
                .iter()
                .map(|s| Row {
                    duals: vec![Dual {
                        num_data: 0.0,
                        str_data: s.to_string(),
                    }],
                })
                .collect(),
        };
        let result = SqlScriptEvaluator::new()
            .evaluate(&h, vec![rows], FunctionType::Tensor)
            .await
            .unwrap();

        let text: Vec<&str> = cells(&result).iter().map(|d| d.str_data.as_str()).collect();
        assert_eq!(text, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_script_without_params() {
        let h = header("40 + 2", FunctionType::Aggregation, DataType::Dual, &[]);
        let result = SqlScriptEvaluator::new()
            .evaluate(&h, vec![], FunctionType::Aggregation)
            .await
            .unwrap();

        let out = cells(&result);
        assert_eq!(out[0].num_data, 42.0);
        assert_eq!(out[0].str_data, "42");
    }

    #[tokio::test]
    async fn test_aggregation_with_many_rows_fails() {
        let h = header(
            "v",
            FunctionType::Aggregation,
            DataType::Numeric,
            &[("v", DataType::Numeric)],
        );
        let err = SqlScriptEvaluator::new()
            .evaluate(&h, vec![num_rows(&[1.0, 2.0])], FunctionType::Aggregation)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::RowCount {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bad_sql_is_script_error() {
        let h = header(
            "sum(",
            FunctionType::Aggregation,
            DataType::Numeric,
            &[("v", DataType::Numeric)],
        );
        let err = SqlScriptEvaluator::new()
            .evaluate(&h, vec![num_rows(&[1.0])], FunctionType::Aggregation)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Sql(_)));
        assert!(!err.is_internal());
    }

    #[tokio::test]
    async fn test_scalar_kind_is_refused() {
        let h = header("1", FunctionType::Scalar, DataType::Numeric, &[]);
        let err = SqlScriptEvaluator::new()
            .evaluate(&h, vec![], FunctionType::Scalar)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::UnsupportedKind("scalar")));
    }

    #[tokio::test]
    async fn test_row_with_wrong_arity_is_codec_error() {
        let h = header(
            "sum(a)",
            FunctionType::Aggregation,
            DataType::Numeric,
            &[("a", DataType::Numeric), ("b", DataType::Numeric)],
        );
        let err = SqlScriptEvaluator::new()
            .evaluate(&h, vec![num_rows(&[1.0])], FunctionType::Aggregation)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Codec(_)));
    }
}
