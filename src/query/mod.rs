//! Row mapping and SeaQuery parameter binding for the PostgreSQL gateway.

use crate::executor::DbError;
use may_postgres::Row;

pub(crate) mod value_conversion;

pub use value_conversion::with_converted_params;

/// Build a value from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, DbError>;
}
