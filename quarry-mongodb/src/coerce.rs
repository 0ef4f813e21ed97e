//! Conversion of stored BSON values into entity field types and back.
//!
//! Every field type that can appear in an [`Entity`](crate::entity::Entity)
//! implements [`Coerce`]. The [`Coercer`] drives it and owns the policy:
//!
//! - an absent or `null` value yields the type's null value: zero for the
//!   numeric, boolean and character primitives, `None` (leave unset) for
//!   everything else;
//! - a value already of the target type is returned as is;
//! - strings are parsed into primitives and primitives are rendered as
//!   strings;
//! - stored timestamps become local date-times in the configured zone and
//!   local date-times go back through the same zone;
//! - a failed conversion is logged with `warn!` and never propagated.
//!
//! ```rust
//! use bson::Bson;
//! use quarry_mongodb::coerce::Coercer;
//!
//! let coercer = Coercer::default();
//! assert_eq!(coercer.coerce::<i64>(Some(&Bson::String("42".into()))), Some(42));
//! assert_eq!(coercer.coerce::<i32>(None), Some(0));
//! assert_eq!(coercer.coerce::<String>(None), None);
//! ```

use bson::{Binary, Bson, Document, oid::ObjectId, spec::BinarySubtype};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::utc_zone;

/// A single value could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} to {to}: {reason}")]
pub struct CoercionError {
    /// BSON type of the source value.
    pub from: &'static str,
    /// Name of the target type.
    pub to: &'static str,
    /// Why the conversion failed.
    pub reason: String,
}

impl CoercionError {
    fn new(value: &Bson, to: &'static str, reason: impl ToString) -> Self {
        Self {
            from: bson_type_name(value),
            to,
            reason: reason.to_string(),
        }
    }

    fn unsupported(value: &Bson, to: &'static str) -> Self {
        Self::new(value, to, "unsupported source type")
    }
}

/// A field type the entity mapper can read from and write to a document.
pub trait Coerce: Sized {
    /// Name used in log lines.
    const TYPE_NAME: &'static str;

    /// Value produced for an absent or `null` source. `None` leaves the
    /// target untouched.
    fn null_value() -> Option<Self> {
        None
    }

    /// Value produced when conversion fails. `None` leaves the target
    /// untouched.
    fn failure_value() -> Option<Self> {
        None
    }

    /// Convert a non-null stored value.
    fn from_stored(value: &Bson, coercer: &Coercer) -> Result<Self, CoercionError>;

    /// Convert back to a stored value. `None` means the field is null and is
    /// omitted from the document.
    fn to_stored(&self, coercer: &Coercer) -> Option<Bson>;
}

/// Applies [`Coerce`] with a fixed default zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coercer {
    zone: FixedOffset,
}

impl Default for Coercer {
    fn default() -> Self {
        Self::new(utc_zone())
    }
}

impl Coercer {
    /// Create a coercer converting timestamps through `zone`.
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }

    /// The zone used for timestamp conversions.
    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    /// Convert a stored value (or its absence) to `T`.
    ///
    /// Returns `None` when the target should be left as it is.
    pub fn coerce<T: Coerce>(&self, value: Option<&Bson>) -> Option<T> {
        let value = match value {
            None | Some(Bson::Null) => return T::null_value(),
            Some(value) => value,
        };

        match T::from_stored(value, self) {
            Ok(converted) => Some(converted),
            Err(err) => {
                warn!(
                    source_type = err.from,
                    target_type = err.to,
                    value = %value,
                    reason = %err.reason,
                    "type coercion failed, leaving field unset"
                );
                T::failure_value()
            }
        }
    }

    /// Convert a field value to its stored form, `None` when it is null.
    pub fn store<T: Coerce>(&self, value: &T) -> Option<Bson> {
        value.to_stored(self)
    }

    fn offset(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.zone.local_minus_utc()))
    }

    /// Stored timestamp to local date-time in the configured zone, `None`
    /// when the shifted value leaves the representable range.
    pub fn to_local(&self, timestamp: bson::DateTime) -> Option<NaiveDateTime> {
        timestamp
            .to_chrono()
            .naive_utc()
            .checked_add_signed(self.offset())
    }

    /// Local date-time in the configured zone to stored timestamp, `None`
    /// when the shifted value leaves the representable range.
    pub fn to_timestamp(&self, local: NaiveDateTime) -> Option<bson::DateTime> {
        local
            .checked_sub_signed(self.offset())
            .map(|utc| bson::DateTime::from_chrono(Utc.from_utc_datetime(&utc)))
    }
}

/// BSON type name of a value, as the shell reports it.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

/// Textual form of a scalar, used for string targets and string parsing.
fn textual(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => v.to_string(),
        Bson::Boolean(v) => v.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

macro_rules! coerce_integer {
    ($($ty:ty => $name:literal, $variant:ident($wide:ty);)*) => {
        $(
            impl Coerce for $ty {
                const TYPE_NAME: &'static str = $name;

                fn null_value() -> Option<Self> {
                    Some(0)
                }

                fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
                    match value {
                        Bson::Int32(v) => {
                            <$ty>::try_from(*v).map_err(|e| CoercionError::new(value, $name, e))
                        }
                        Bson::Int64(v) => {
                            <$ty>::try_from(*v).map_err(|e| CoercionError::new(value, $name, e))
                        }
                        Bson::String(s) => {
                            s.parse::<$ty>().map_err(|e| CoercionError::new(value, $name, e))
                        }
                        other => Err(CoercionError::unsupported(other, $name)),
                    }
                }

                fn to_stored(&self, _: &Coercer) -> Option<Bson> {
                    Some(Bson::$variant(<$wide>::from(*self)))
                }
            }
        )*
    };
}

coerce_integer! {
    i8 => "i8", Int32(i32);
    i16 => "i16", Int32(i32);
    i32 => "i32", Int32(i32);
    i64 => "i64", Int64(i64);
}

impl Coerce for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn null_value() -> Option<Self> {
        Some(0.0)
    }

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Double(v) => Ok(*v),
            Bson::Int32(v) => Ok(f64::from(*v)),
            Bson::Int64(v) => Ok(*v as f64),
            Bson::String(s) => s.parse::<f64>().map_err(|e| CoercionError::new(value, "f64", e)),
            other => Err(CoercionError::unsupported(other, "f64")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::Double(*self))
    }
}

impl Coerce for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn null_value() -> Option<Self> {
        Some(0.0)
    }

    fn from_stored(value: &Bson, coercer: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::String(s) => s.parse::<f32>().map_err(|e| CoercionError::new(value, "f32", e)),
            _ => f64::from_stored(value, coercer)
                .map(|v| v as f32)
                .map_err(|e| CoercionError { to: "f32", ..e }),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::Double(f64::from(*self)))
    }
}

impl Coerce for bool {
    const TYPE_NAME: &'static str = "bool";

    fn null_value() -> Option<Self> {
        Some(false)
    }

    // Anything other than a case-insensitive "true" reads as false.
    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Boolean(v) => Ok(*v),
            other => Ok(textual(other).eq_ignore_ascii_case("true")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::Boolean(*self))
    }
}

impl Coerce for char {
    const TYPE_NAME: &'static str = "char";

    fn null_value() -> Option<Self> {
        Some('\0')
    }

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        let Bson::String(s) = value else {
            return Err(CoercionError::unsupported(value, "char"));
        };
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(CoercionError::new(value, "char", "expected exactly one character")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::String(self.to_string()))
    }
}

impl Coerce for String {
    const TYPE_NAME: &'static str = "String";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        Ok(textual(value))
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::String(self.clone()))
    }
}

impl Coerce for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_stored(value: &Bson, coercer: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::DateTime(dt) => coercer
                .to_local(*dt)
                .ok_or_else(|| CoercionError::new(value, "NaiveDateTime", "out of range in zone")),
            Bson::String(s) => s
                .parse::<NaiveDateTime>()
                .map_err(|e| CoercionError::new(value, "NaiveDateTime", e)),
            other => Err(CoercionError::unsupported(other, "NaiveDateTime")),
        }
    }

    fn to_stored(&self, coercer: &Coercer) -> Option<Bson> {
        match coercer.to_timestamp(*self) {
            Some(timestamp) => Some(Bson::DateTime(timestamp)),
            None => {
                warn!(
                    value = %self,
                    zone = %coercer.zone(),
                    "local date-time out of range in zone, omitting field"
                );
                None
            }
        }
    }
}

impl Coerce for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::DateTime(dt) => Ok(dt.to_chrono()),
            Bson::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| CoercionError::new(value, "DateTime<Utc>", e)),
            other => Err(CoercionError::unsupported(other, "DateTime<Utc>")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::DateTime(bson::DateTime::from_chrono(*self)))
    }
}

impl Coerce for bson::DateTime {
    const TYPE_NAME: &'static str = "bson::DateTime";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::DateTime(dt) => Ok(*dt),
            Bson::String(s) => bson::DateTime::parse_rfc3339_str(s)
                .map_err(|e| CoercionError::new(value, "bson::DateTime", e)),
            other => Err(CoercionError::unsupported(other, "bson::DateTime")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::DateTime(*self))
    }
}

impl Coerce for ObjectId {
    const TYPE_NAME: &'static str = "ObjectId";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::ObjectId(oid) => Ok(*oid),
            Bson::String(s) => {
                ObjectId::parse_str(s).map_err(|e| CoercionError::new(value, "ObjectId", e))
            }
            other => Err(CoercionError::unsupported(other, "ObjectId")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::ObjectId(*self))
    }
}

impl Coerce for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => {
                Uuid::from_slice(&binary.bytes).map_err(|e| CoercionError::new(value, "Uuid", e))
            }
            Bson::String(s) => Uuid::parse_str(s).map_err(|e| CoercionError::new(value, "Uuid", e)),
            other => Err(CoercionError::unsupported(other, "Uuid")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: self.as_bytes().to_vec(),
        }))
    }
}

impl Coerce for Document {
    const TYPE_NAME: &'static str = "Document";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Document(doc) => Ok(doc.clone()),
            other => Err(CoercionError::unsupported(other, "Document")),
        }
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        Some(Bson::Document(self.clone()))
    }
}

/// Untyped target: every value passes through unchanged.
impl Coerce for Bson {
    const TYPE_NAME: &'static str = "Bson";

    fn from_stored(value: &Bson, _: &Coercer) -> Result<Self, CoercionError> {
        Ok(value.clone())
    }

    fn to_stored(&self, _: &Coercer) -> Option<Bson> {
        match self {
            Bson::Null => None,
            other => Some(other.clone()),
        }
    }
}

impl<T: Coerce> Coerce for Vec<T> {
    const TYPE_NAME: &'static str = "Vec";

    fn from_stored(value: &Bson, coercer: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Array(items) => items
                .iter()
                .map(|item| T::from_stored(item, coercer))
                .collect(),
            other => Err(CoercionError::unsupported(other, "Vec")),
        }
    }

    fn to_stored(&self, coercer: &Coercer) -> Option<Bson> {
        Some(Bson::Array(
            self.iter()
                .map(|item| item.to_stored(coercer).unwrap_or(Bson::Null))
                .collect(),
        ))
    }
}

/// Nullable field: `null` and failed conversions both assign `None`.
impl<T: Coerce> Coerce for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn null_value() -> Option<Self> {
        Some(None)
    }

    fn failure_value() -> Option<Self> {
        Some(None)
    }

    fn from_stored(value: &Bson, coercer: &Coercer) -> Result<Self, CoercionError> {
        match value {
            Bson::Null => Ok(None),
            other => T::from_stored(other, coercer).map(Some),
        }
    }

    fn to_stored(&self, coercer: &Coercer) -> Option<Bson> {
        self.as_ref().and_then(|value| value.to_stored(coercer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn shanghai() -> Coercer {
        Coercer::new(FixedOffset::east_opt(8 * 3600).unwrap())
    }

    #[test]
    fn test_null_into_primitives_yields_zero() {
        let c = Coercer::default();
        assert_eq!(c.coerce::<i8>(None), Some(0));
        assert_eq!(c.coerce::<i16>(Some(&Bson::Null)), Some(0));
        assert_eq!(c.coerce::<i32>(None), Some(0));
        assert_eq!(c.coerce::<i64>(Some(&Bson::Null)), Some(0));
        assert_eq!(c.coerce::<f32>(None), Some(0.0));
        assert_eq!(c.coerce::<f64>(None), Some(0.0));
        assert_eq!(c.coerce::<bool>(None), Some(false));
        assert_eq!(c.coerce::<char>(None), Some('\0'));
    }

    #[test]
    fn test_null_into_reference_types_is_null() {
        let c = Coercer::default();
        assert_eq!(c.coerce::<String>(None), None);
        assert_eq!(c.coerce::<ObjectId>(Some(&Bson::Null)), None);
        assert_eq!(c.coerce::<Option<i32>>(Some(&Bson::Null)), Some(None));
    }

    #[test]
    fn test_same_type_is_returned_unchanged() {
        let c = Coercer::default();
        let oid = ObjectId::new();
        assert_eq!(c.coerce::<ObjectId>(Some(&Bson::ObjectId(oid))), Some(oid));
        assert_eq!(c.coerce::<i32>(Some(&Bson::Int32(-7))), Some(-7));
        assert_eq!(c.coerce::<f64>(Some(&Bson::Double(2.5))), Some(2.5));
        assert_eq!(
            c.coerce::<String>(Some(&Bson::String("abc".into()))),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_string_parsing_into_primitives() {
        let c = Coercer::default();
        assert_eq!(c.coerce::<i32>(Some(&Bson::String("12".into()))), Some(12));
        assert_eq!(c.coerce::<f64>(Some(&Bson::String("1.5".into()))), Some(1.5));
        assert_eq!(c.coerce::<bool>(Some(&Bson::String("TRUE".into()))), Some(true));
        assert_eq!(c.coerce::<bool>(Some(&Bson::String("yes".into()))), Some(false));
        assert_eq!(c.coerce::<char>(Some(&Bson::String("x".into()))), Some('x'));
    }

    #[test]
    fn test_primitives_render_as_strings() {
        let c = Coercer::default();
        let oid = ObjectId::new();
        assert_eq!(c.coerce::<String>(Some(&Bson::Int64(9))), Some("9".to_string()));
        assert_eq!(
            c.coerce::<String>(Some(&Bson::Boolean(true))),
            Some("true".to_string())
        );
        assert_eq!(c.coerce::<String>(Some(&Bson::ObjectId(oid))), Some(oid.to_hex()));
    }

    #[test]
    fn test_widening_and_narrowing_integers() {
        let c = Coercer::default();
        assert_eq!(c.coerce::<i64>(Some(&Bson::Int32(5))), Some(5));
        assert_eq!(c.coerce::<i32>(Some(&Bson::Int64(5))), Some(5));
        assert_eq!(c.coerce::<i32>(Some(&Bson::Int64(i64::MAX))), None);
        assert_eq!(c.coerce::<f64>(Some(&Bson::Int32(3))), Some(3.0));
    }

    #[test]
    fn test_failure_is_swallowed() {
        let c = Coercer::default();
        assert_eq!(c.coerce::<i32>(Some(&Bson::String("abc".into()))), None);
        assert_eq!(c.coerce::<i32>(Some(&Bson::Double(3.5))), None);
        assert_eq!(
            c.coerce::<Option<i32>>(Some(&Bson::String("abc".into()))),
            Some(None)
        );
        assert_eq!(c.coerce::<ObjectId>(Some(&Bson::String("zz".into()))), None);
    }

    #[test]
    fn test_timestamp_to_local_uses_zone() {
        let c = shanghai();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        let stored = Bson::DateTime(bson::DateTime::from_chrono(utc));

        let local = c.coerce::<NaiveDateTime>(Some(&stored)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(local, expected);

        assert_eq!(local.to_stored(&c), Some(stored));
    }

    #[test]
    fn test_default_zone_is_utc() {
        let c = Coercer::default();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        let local = c.to_local(bson::DateTime::from_chrono(utc));
        assert_eq!(local, Some(utc.naive_utc()));
    }

    #[test]
    fn test_extreme_local_times_do_not_panic() {
        let east = shanghai();
        assert_eq!(east.to_timestamp(NaiveDateTime::MIN), None);
        assert_eq!(NaiveDateTime::MIN.to_stored(&east), None);
        assert_eq!(Some(NaiveDateTime::MIN).to_stored(&east), None);

        let west = Coercer::new(FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(west.to_timestamp(NaiveDateTime::MAX), None);
        assert!(Coercer::default().to_timestamp(NaiveDateTime::MIN).is_some());
    }

    #[test]
    fn test_extreme_stored_times_do_not_panic() {
        let east = shanghai();
        let latest = Bson::DateTime(bson::DateTime::MAX);
        assert_eq!(east.coerce::<NaiveDateTime>(Some(&latest)), None);
        assert_eq!(east.coerce::<Option<NaiveDateTime>>(Some(&latest)), Some(None));
    }

    #[test]
    fn test_local_date_time_from_string() {
        let c = Coercer::default();
        let parsed = c.coerce::<NaiveDateTime>(Some(&Bson::String("2024-01-02T03:04:05".into())));
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
        );
    }

    #[test]
    fn test_uuid_round_trip() {
        let c = Coercer::default();
        let id = Uuid::new_v4();
        let stored = id.to_stored(&c).unwrap();
        assert_eq!(c.coerce::<Uuid>(Some(&stored)), Some(id));
        assert_eq!(
            c.coerce::<Uuid>(Some(&Bson::String(id.to_string()))),
            Some(id)
        );
    }

    #[test]
    fn test_untyped_target_passes_through() {
        let c = Coercer::default();
        let value = Bson::Document(bson::doc! { "nested": [1, 2] });
        assert_eq!(c.coerce::<Bson>(Some(&value)), Some(value));
    }

    #[test]
    fn test_vec_and_option_storage() {
        let c = Coercer::default();
        let tags = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            tags.to_stored(&c),
            Some(Bson::Array(vec![Bson::String("a".into()), Bson::String("b".into())]))
        );
        assert_eq!(None::<String>.to_stored(&c), None);
        assert_eq!(Some(3_i64).to_stored(&c), Some(Bson::Int64(3)));
    }
}
