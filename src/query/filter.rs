//! Filter term parsing
//!
//! Terms arrive as `attribute.operator=value` pairs; a missing operator means
//! `eq`. Each term is resolved against the schema's definitions and its value
//! is cast to the attribute kind before any SQL is built.

use crate::error::AppError;
use crate::models::AttrDef;
use crate::registry::{AttrKind, FilterOp, Scalar};
use serde_json::Value as Json;

/// What a filter term is applied to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// The built-in entity name
    Name,
    Attr(&'a AttrDef),
}

#[derive(Debug, Clone)]
pub struct Term<'a> {
    pub target: Target<'a>,
    pub op: FilterOp,
    pub value: Scalar,
}

/// Operators usable on the built-in `name` field
pub fn name_operators() -> &'static [FilterOp] {
    AttrKind::Str.operators(false)
}

/// Names that accept at least one operator
pub fn filterable(defs: &[AttrDef]) -> Vec<String> {
    std::iter::once("name".to_string())
        .chain(
            defs.iter()
                .filter(|d| !d.kind.operators(d.list).is_empty())
                .map(|d| d.name.clone()),
        )
        .collect()
}

pub fn parse_term<'a>(key: &str, raw: &str, defs: &'a [AttrDef]) -> Result<Term<'a>, AppError> {
    let (attr, op_name) = key.split_once('.').unwrap_or((key, "eq"));

    let (target, kind, operators) = if attr == "name" {
        (Target::Name, AttrKind::Str, name_operators())
    } else {
        let def = defs.iter().find(|d| d.name == attr);
        match def {
            Some(def) if !def.kind.operators(def.list).is_empty() => {
                (Target::Attr(def), def.kind, def.kind.operators(def.list))
            }
            _ => {
                return Err(AppError::InvalidFilterAttribute {
                    attr: attr.to_string(),
                    allowed: filterable(defs),
                })
            }
        }
    };

    let op = FilterOp::parse(op_name)
        .filter(|op| operators.contains(op))
        .ok_or_else(|| AppError::InvalidFilterOperator {
            attr: attr.to_string(),
            op: op_name.to_string(),
        })?;

    let value = kind
        .cast(&Json::String(raw.to_string()))
        .map_err(|message| AppError::ValueCast {
            attr: attr.to_string(),
            kind,
            message,
        })?;

    Ok(Term { target, op, value })
}

pub fn parse_terms<'a>(
    raw: &[(String, String)],
    defs: &'a [AttrDef],
) -> Result<Vec<Term<'a>>, AppError> {
    raw.iter()
        .map(|(key, value)| parse_term(key, value, defs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, kind: AttrKind, list: bool) -> AttrDef {
        AttrDef {
            id: 1,
            schema_id: 1,
            attribute_id: 1,
            name: name.into(),
            kind,
            required: false,
            unique: false,
            list,
            key: false,
            description: None,
            bound_schema_id: Some(1),
        }
    }

    #[test]
    fn test_missing_operator_means_eq() {
        let defs = vec![def("age", AttrKind::Int, false)];
        let term = parse_term("age", "10", &defs).unwrap();
        assert_eq!(term.op, FilterOp::Eq);
        assert_eq!(term.value, Scalar::Int(10));
        assert!(matches!(term.target, Target::Attr(d) if d.name == "age"));
    }

    #[test]
    fn test_name_is_filtered_as_string() {
        let term = parse_term("name.starts", "Ja", &[]).unwrap();
        assert!(matches!(term.target, Target::Name));
        assert_eq!(term.op, FilterOp::Starts);
        assert!(matches!(
            parse_term("name.gt", "Ja", &[]),
            Err(AppError::InvalidFilterOperator { .. })
        ));
    }

    #[test]
    fn test_operator_must_fit_kind() {
        let defs = vec![def("active", AttrKind::Bool, false)];
        assert!(matches!(
            parse_term("active.lt", "true", &defs),
            Err(AppError::InvalidFilterOperator { .. })
        ));
        assert!(matches!(
            parse_term("active.nope", "true", &defs),
            Err(AppError::InvalidFilterOperator { .. })
        ));
    }

    #[test]
    fn test_listed_fk_is_not_filterable() {
        let defs = vec![
            def("friends", AttrKind::Fk, true),
            def("age", AttrKind::Int, false),
        ];
        let err = parse_term("friends", "1", &defs).unwrap_err();
        let AppError::InvalidFilterAttribute { allowed, .. } = err else {
            panic!("expected InvalidFilterAttribute");
        };
        assert_eq!(allowed, vec!["name".to_string(), "age".to_string()]);

        assert!(matches!(
            parse_term("height.gt", "1", &defs),
            Err(AppError::InvalidFilterAttribute { .. })
        ));
    }

    #[test]
    fn test_value_is_cast_to_kind() {
        let defs = vec![def("age", AttrKind::Int, false)];
        assert!(matches!(
            parse_term("age.gt", "ten", &defs),
            Err(AppError::ValueCast { .. })
        ));
    }
}
