//! Pipeline rendering for debugging.
//!
//! Stages are rendered in the shell dialect, so the output can be pasted
//! into a query console: `ObjectId("..")`, `ISODate("..")`,
//! `NumberLong(..)`, `/pattern/flags` and so on. The text is for people; it
//! is never parsed back.

use std::fmt::{self, Write};

use bson::{Bson, Document};

use crate::stage::Pipeline;

/// Render a pipeline as `[stage,stage,...]`.
pub fn render(pipeline: &Pipeline) -> String {
    render_stages(&pipeline.to_documents())
}

/// Render already lowered stage documents as `[stage,stage,...]`.
pub fn render_stages(stages: &[Document]) -> String {
    let rendered: Vec<String> = stages.iter().map(render_document).collect();
    format!("[{}]", rendered.join(","))
}

/// Render one document.
pub fn render_document(document: &Document) -> String {
    let mut out = String::new();
    write_document(&mut out, document);
    out
}

/// Render one value.
pub fn render_value(value: &Bson) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_document(out: &mut String, document: &Document) {
    out.push('{');
    for (index, (key, value)) in document.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        write_string(out, key);
        out.push_str(": ");
        write_value(out, value);
    }
    out.push('}');
}

fn write_string(out: &mut String, text: &str) {
    match serde_json::to_string(text) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            let _ = write!(out, "{text:?}");
        }
    }
}

fn write_double(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str("NaN");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        let _ = write!(out, "{value:.1}");
    } else {
        let _ = write!(out, "{value}");
    }
}

fn write_value(out: &mut String, value: &Bson) {
    match value {
        Bson::Document(document) => write_document(out, document),
        Bson::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Bson::String(text) => write_string(out, text),
        Bson::Int32(v) => {
            let _ = write!(out, "{v}");
        }
        Bson::Int64(v) => {
            if i32::try_from(*v).is_ok() {
                let _ = write!(out, "NumberLong({v})");
            } else {
                let _ = write!(out, "NumberLong(\"{v}\")");
            }
        }
        Bson::Double(v) => write_double(out, *v),
        Bson::Boolean(v) => {
            let _ = write!(out, "{v}");
        }
        Bson::Null => out.push_str("null"),
        Bson::Undefined => out.push_str("undefined"),
        Bson::MinKey => out.push_str("MinKey"),
        Bson::MaxKey => out.push_str("MaxKey"),
        Bson::ObjectId(oid) => {
            let _ = write!(out, "ObjectId(\"{}\")", oid.to_hex());
        }
        Bson::DateTime(dt) => {
            let iso = dt.to_chrono().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            let _ = write!(out, "ISODate(\"{iso}\")");
        }
        Bson::Timestamp(ts) => {
            let _ = write!(out, "Timestamp({}, {})", ts.time, ts.increment);
        }
        Bson::RegularExpression(regex) => {
            let _ = write!(out, "/{}/{}", regex.pattern, regex.options);
        }
        Bson::Binary(binary) => {
            let subtype: u8 = binary.subtype.into();
            let _ = write!(
                out,
                "HexData({}, \"{}\")",
                subtype,
                hex::encode(&binary.bytes)
            );
        }
        other => {
            let extended = other.clone().into_relaxed_extjson();
            out.push_str(&extended.to_string());
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::projection::Sort;
    use crate::stage::Stage;
    use bson::{Regex, Timestamp, doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_joins_stages() {
        let pipeline = Pipeline::new()
            .with(Stage::matching(Filter::eq("status", "A")))
            .with(Stage::sort(Sort::descending("n")))
            .with(Stage::limit(5));
        assert_eq!(
            render(&pipeline),
            r#"[{"$match": {"status": "A"}},{"$sort": {"n": -1}},{"$limit": 5}]"#
        );
        assert_eq!(pipeline.to_string(), render(&pipeline));
    }

    #[test]
    fn test_render_empty_pipeline() {
        assert_eq!(render(&Pipeline::new()), "[]");
    }

    #[test]
    fn test_shell_wrappers() {
        let oid = ObjectId::parse_str("65f1a2b3c4d5e6f708192a3b").unwrap();
        assert_eq!(
            render_value(&Bson::ObjectId(oid)),
            r#"ObjectId("65f1a2b3c4d5e6f708192a3b")"#
        );
        assert_eq!(
            render_value(&Bson::DateTime(bson::DateTime::from_millis(0))),
            r#"ISODate("1970-01-01T00:00:00.000Z")"#
        );
        assert_eq!(
            render_value(&Bson::Int64(5_000_000_000)),
            r#"NumberLong("5000000000")"#
        );
        assert_eq!(
            render_value(&Bson::RegularExpression(Regex {
                pattern: "^10".into(),
                options: "i".into(),
            })),
            "/^10/i"
        );
        assert_eq!(
            render_value(&Bson::Timestamp(Timestamp {
                time: 7,
                increment: 2
            })),
            "Timestamp(7, 2)"
        );
        assert_eq!(
            render_value(&Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: vec![0xde, 0xad],
            })),
            r#"HexData(0, "dead")"#
        );
    }

    #[test]
    fn test_numbers_and_escaping() {
        assert_eq!(render_value(&Bson::Double(2.0)), "2.0");
        assert_eq!(render_value(&Bson::Double(0.25)), "0.25");
        assert_eq!(render_value(&Bson::Double(f64::NAN)), "NaN");
        assert_eq!(
            render_document(&doc! { "q\"uote": "line\nbreak" }),
            r#"{"q\"uote": "line\nbreak"}"#
        );
    }

    #[test]
    fn test_render_keeps_operators_and_nesting() {
        let stage = doc! { "$lookup": {
            "from": "device",
            "let": { "left_join_value": "$sim_iccid" },
            "pipeline": [ { "$limit": 1 } ],
            "as": "device__datas",
        } };
        assert_eq!(
            render_stages(&[stage]),
            concat!(
                r#"[{"$lookup": {"from": "device", "let": {"left_join_value": "$sim_iccid"}, "#,
                r#""pipeline": [{"$limit": 1}], "as": "device__datas"}}]"#
            )
        );
    }
}
