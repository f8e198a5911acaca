//! SeaQuery `Values` to `may_postgres` parameters.
//!
//! Two passes: the first copies every value into a typed vector, the second
//! borrows from those vectors. The borrowed slice is only valid inside the
//! closure, which is where the query runs.

use crate::executor::DbError;
use may_postgres::types::ToSql;
use sea_query::{Value, Values};

/// Convert `values` and run `f` with the resulting parameter slice.
///
/// # Errors
///
/// Returns `DbError::Query` for value kinds the contract queries never bind
/// (floats, bytes, dates) or for unsigned values beyond `i64::MAX`, and
/// whatever `f` returns.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();

    for value in values.iter() {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::Int(Some(i)) => ints.push(*i),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::Unsigned(Some(u)) => big_ints.push(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => {
                let v = i64::try_from(*u).map_err(|_| {
                    DbError::Query(format!("unsigned value {u} exceeds i64::MAX"))
                })?;
                big_ints.push(v);
            }
            Value::String(Some(s)) => strings.push(s.clone()),
            Value::Bool(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::String(None) => nulls.push(None),
            other => {
                return Err(DbError::Query(format!(
                    "unsupported value type in query: {other:?}"
                )));
            }
        }
    }

    let (mut bool_idx, mut int_idx, mut big_int_idx, mut string_idx, mut null_idx) =
        (0, 0, 0, 0, 0);
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.iter().count());

    for value in values.iter() {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx]);
                bool_idx += 1;
            }
            Value::Int(Some(_)) => {
                params.push(&ints[int_idx]);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) | Value::Unsigned(Some(_)) | Value::BigUnsigned(Some(_)) => {
                params.push(&big_ints[big_int_idx]);
                big_int_idx += 1;
            }
            Value::String(Some(_)) => {
                params.push(&strings[string_idx]);
                string_idx += 1;
            }
            _ => {
                params.push(&nulls[null_idx]);
                null_idx += 1;
            }
        }
    }

    f(&params)
}
