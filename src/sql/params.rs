//! Bind values for the document tables. Everything travels as text; the SQL casts.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    /// Plain text: paths, uuids, regex patterns.
    Text(String),
    /// Serialized to JSON text and cast with `::jsonb` in the statement.
    Json(Value),
}

impl PgBindValue {
    pub fn text(s: impl Into<String>) -> Self {
        PgBindValue::Text(s.into())
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<String> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
            PgBindValue::Json(v) => {
                let text = v.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&text.as_str(), buf)?
            }
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
