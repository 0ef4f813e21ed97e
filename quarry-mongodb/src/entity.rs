//! Mapping between documents and typed entities.
//!
//! An [`Entity`] declares a static table of [`Column`]s, one per mapped
//! field, usually through `#[derive(Entity)]`. Both directions read the same
//! table:
//!
//! - [`to_entity`] starts from `Default`, skips columns that are absent or
//!   `null` in the document and coerces the rest into their fields;
//! - [`to_document`] writes every non-null field under its column name and
//!   leaves null fields out of the document entirely.
//!
//! Reading cannot tell an absent column from a stored `null`: both leave the
//! field at its default. Writing drops nulls instead of storing them, so a
//! sparse entity only updates the columns it carries.

use bson::{Bson, Document};

use crate::coerce::{Coerce, Coercer};
use crate::error::{MongoError, MongoResult};

/// One mapped field of an entity.
pub struct Column<E: 'static> {
    /// Rust field name.
    pub field: &'static str,
    /// Stored column (document key).
    pub column: &'static str,
    /// Human-readable description.
    pub desc: &'static str,
    /// Coerce a present stored value into the field.
    pub assign: fn(&mut E, &Bson, &Coercer),
    /// Read the field in stored form, `None` when it is null.
    pub read: fn(&E, &Coercer) -> Option<Bson>,
}

impl<E: 'static> std::fmt::Debug for Column<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("field", &self.field)
            .field("column", &self.column)
            .field("desc", &self.desc)
            .finish()
    }
}

/// A record type with a declared field-to-column mapping.
pub trait Entity: Default + Sized + 'static {
    /// The mapping table, in declaration order.
    fn columns() -> &'static [Column<Self>];

    /// Name used in errors and logs.
    fn entity_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Build an entity from a document.
    fn from_document(document: &Document, coercer: &Coercer) -> MongoResult<Self> {
        to_entity(document, coercer)
    }

    /// Convert this entity to a sparse document.
    fn to_document(&self, coercer: &Coercer) -> MongoResult<Document> {
        to_document(self, coercer)
    }
}

/// Coerce `value` and store it into `slot`, leaving `slot` alone when the
/// coercion yields nothing.
pub fn assign<T: Coerce>(slot: &mut T, value: &Bson, coercer: &Coercer) {
    if let Some(converted) = coercer.coerce::<T>(Some(value)) {
        *slot = converted;
    }
}

/// Stored form of a field value.
pub fn read<T: Coerce>(value: &T, coercer: &Coercer) -> Option<Bson> {
    coercer.store(value)
}

/// Stored column name for a Rust field, if the field is mapped.
pub fn column_name<E: Entity>(field: &str) -> Option<&'static str> {
    E::columns()
        .iter()
        .find(|column| column.field == field)
        .map(|column| column.column)
}

/// Stored column names of an entity, in declaration order.
pub fn column_names<E: Entity>() -> Vec<&'static str> {
    E::columns().iter().map(|column| column.column).collect()
}

fn checked_columns<E: Entity>() -> MongoResult<&'static [Column<E>]> {
    let columns = E::columns();
    if columns.is_empty() {
        return Err(MongoError::conversion(format!(
            "{} declares no mapped columns",
            E::entity_name()
        )));
    }
    Ok(columns)
}

/// Build an `E` from `document`.
///
/// Fails only when the entity declares no columns; per-field coercion
/// failures are logged and leave the field as it was.
pub fn to_entity<E: Entity>(document: &Document, coercer: &Coercer) -> MongoResult<E> {
    let columns = checked_columns::<E>()?;
    let mut entity = E::default();
    for column in columns {
        match document.get(column.column) {
            None | Some(Bson::Null) => continue,
            Some(value) => (column.assign)(&mut entity, value, coercer),
        }
    }
    Ok(entity)
}

/// Convert `entity` to a document holding only its non-null fields.
pub fn to_document<E: Entity>(entity: &E, coercer: &Coercer) -> MongoResult<Document> {
    let columns = checked_columns::<E>()?;
    let mut document = Document::new();
    for column in columns {
        if let Some(value) = (column.read)(entity, coercer) {
            document.insert(column.column, value);
        }
    }
    Ok(document)
}

/// Map every document, failing on the first fatal conversion error.
pub fn to_entities<E: Entity>(documents: &[Document], coercer: &Coercer) -> MongoResult<Vec<E>> {
    documents
        .iter()
        .map(|document| to_entity(document, coercer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, PartialEq)]
    struct Device {
        id: Option<String>,
        name: Option<String>,
        port: i32,
        seen_at: Option<NaiveDateTime>,
    }

    static DEVICE_COLUMNS: &[Column<Device>] = &[
        Column {
            field: "id",
            column: "_id",
            desc: "Identifier",
            assign: |e, v, c| assign(&mut e.id, v, c),
            read: |e, c| read(&e.id, c),
        },
        Column {
            field: "name",
            column: "device_name",
            desc: "Name",
            assign: |e, v, c| assign(&mut e.name, v, c),
            read: |e, c| read(&e.name, c),
        },
        Column {
            field: "port",
            column: "device_port",
            desc: "Port",
            assign: |e, v, c| assign(&mut e.port, v, c),
            read: |e, c| read(&e.port, c),
        },
        Column {
            field: "seen_at",
            column: "seen_at",
            desc: "Last seen",
            assign: |e, v, c| assign(&mut e.seen_at, v, c),
            read: |e, c| read(&e.seen_at, c),
        },
    ];

    impl Entity for Device {
        fn columns() -> &'static [Column<Self>] {
            DEVICE_COLUMNS
        }
    }

    #[derive(Debug, Default)]
    struct Unmapped;

    impl Entity for Unmapped {
        fn columns() -> &'static [Column<Self>] {
            &[]
        }
    }

    #[test]
    fn test_to_entity_maps_columns() {
        let c = Coercer::default();
        let device: Device =
            to_entity(&doc! { "_id": "d1", "device_name": "gw", "device_port": "8080" }, &c)
                .unwrap();
        assert_eq!(
            device,
            Device {
                id: Some("d1".into()),
                name: Some("gw".into()),
                port: 8080,
                seen_at: None,
            }
        );
    }

    #[test]
    fn test_absent_and_null_columns_keep_defaults() {
        let c = Coercer::default();
        let device: Device = to_entity(&doc! {}, &c).unwrap();
        assert_eq!(device, Device::default());

        let device: Device =
            to_entity(&doc! { "device_port": null, "device_name": null }, &c).unwrap();
        assert_eq!(device, Device::default());
    }

    #[test]
    fn test_failed_coercion_is_not_fatal() {
        let c = Coercer::default();
        let device: Device =
            to_entity(&doc! { "device_name": "gw", "device_port": "http" }, &c).unwrap();
        assert_eq!(device.name.as_deref(), Some("gw"));
        assert_eq!(device.port, 0);
    }

    #[test]
    fn test_to_document_omits_null_fields() {
        let c = Coercer::default();
        let device = Device {
            id: None,
            name: Some("gw".into()),
            port: 22,
            seen_at: None,
        };
        assert_eq!(
            to_document(&device, &c).unwrap(),
            doc! { "device_name": "gw", "device_port": 22 }
        );
    }

    #[test]
    fn test_dates_go_through_zone() {
        let c = Coercer::new(FixedOffset::east_opt(8 * 3600).unwrap());
        let local = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let device = Device {
            seen_at: Some(local),
            ..Device::default()
        };
        let stored = device.to_document(&c).unwrap();
        let timestamp = stored.get_datetime("seen_at").unwrap();
        assert_eq!(
            timestamp.to_chrono().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );

        let back = Device::from_document(&stored, &c).unwrap();
        assert_eq!(back.seen_at, Some(local));
    }

    #[test]
    fn test_round_trip_reproduces_document() {
        let c = Coercer::default();
        let original = doc! { "_id": "d9", "device_name": "edge", "device_port": 443 };
        let device: Device = to_entity(&original, &c).unwrap();
        assert_eq!(to_document(&device, &c).unwrap(), original);
    }

    #[test]
    fn test_unmapped_entity_is_a_conversion_error() {
        let c = Coercer::default();
        let err = to_entity::<Unmapped>(&doc! {}, &c).unwrap_err();
        assert!(err.is_conversion_error());
        assert!(to_document(&Unmapped, &c).unwrap_err().is_conversion_error());
    }

    #[test]
    fn test_column_lookup() {
        assert_eq!(column_name::<Device>("name"), Some("device_name"));
        assert_eq!(column_name::<Device>("missing"), None);
        assert_eq!(
            column_names::<Device>(),
            vec!["_id", "device_name", "device_port", "seen_at"]
        );
    }

    #[test]
    fn test_to_entities() {
        let c = Coercer::default();
        let devices: Vec<Device> =
            to_entities(&[doc! { "device_port": 1 }, doc! { "device_port": 2 }], &c).unwrap();
        assert_eq!(devices.iter().map(|d| d.port).collect::<Vec<_>>(), vec![1, 2]);
    }
}
