//! Write-path validation shared by direct mutations and staging
//!
//! Everything here is pure: name and slug rules, shaping submitted JSON into
//! typed values for one definition, and classifying a schema update.

use crate::error::AppError;
use crate::models::{AttrDef, AttrDefInput, RESERVED_FIELDS};
use crate::query::CONTROL_KEYS;
use crate::registry::{AttrKind, Scalar};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};

/// Slugs that would shadow top-level routes
pub const RESERVED_SCHEMA_SLUGS: [&str; 5] = ["schemas", "attributes", "changes", "entity", "info"];

static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]+[0-9]*(-[a-zA-Z0-9]+)*$").expect("valid slug regex"));

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG.is_match(slug)
}

/// Identifier that neither starts nor ends with an underscore
pub fn is_valid_attr_name(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !name.starts_with('_') && !name.ends_with('_')
}

/// Built-in entity fields and listing parameters
pub fn reserved_attr_names() -> Vec<&'static str> {
    RESERVED_FIELDS.iter().chain(CONTROL_KEYS.iter()).copied().collect()
}

pub fn check_attr_name(name: &str) -> Result<(), AppError> {
    let reserved = reserved_attr_names();
    if reserved.contains(&name) {
        return Err(AppError::ReservedName {
            name: name.to_string(),
            reserved,
        });
    }
    if !is_valid_attr_name(name) {
        return Err(AppError::Validation(format!(
            "`{}` is not a valid attribute name",
            name
        )));
    }
    Ok(())
}

pub fn check_schema_slug(slug: &str) -> Result<(), AppError> {
    if RESERVED_SCHEMA_SLUGS.contains(&slug) {
        return Err(AppError::ReservedName {
            name: slug.to_string(),
            reserved: RESERVED_SCHEMA_SLUGS.to_vec(),
        });
    }
    check_slug(slug)
}

pub fn check_slug(slug: &str) -> Result<(), AppError> {
    if !is_valid_slug(slug) {
        return Err(AppError::Validation(format!(
            "`{}` is invalid value for slug field",
            slug
        )));
    }
    Ok(())
}

/// Coerce a non-null submitted value into the typed values stored for `def`.
///
/// A JSON list is only accepted by list definitions; a single value sent to a
/// list definition becomes a one-element list.
pub fn shape_values(def: &AttrDef, raw: &Json) -> Result<Vec<Scalar>, AppError> {
    let cast = |v: &Json| {
        def.kind.cast(v).map_err(|message| AppError::ValueCast {
            attr: def.name.clone(),
            kind: def.kind,
            message,
        })
    };
    match raw {
        Json::Array(_) if !def.list => Err(AppError::NotListed {
            attr: def.name.clone(),
            schema_id: def.schema_id,
        }),
        Json::Array(items) => items.iter().map(cast).collect(),
        single => Ok(vec![cast(single)?]),
    }
}

/// Sort values in place with a total order good enough for diffing
pub fn sort_values(values: &mut [Scalar]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

/// Outcome of comparing a submitted attribute list with the stored definitions
#[derive(Debug, Default)]
pub struct SchemaDiff<'a> {
    pub added: Vec<&'a AttrDefInput>,
    pub updated: Vec<(&'a AttrDef, AttrDefInput)>,
    pub deleted: Vec<&'a AttrDef>,
}

impl SchemaDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Classify a complete attribute submission against the stored definitions
/// of `schema_id`. Updated entries are returned normalized.
pub fn classify_attributes<'a>(
    schema_id: i32,
    existing: &'a [AttrDef],
    submitted: &'a [AttrDefInput],
) -> Result<SchemaDiff<'a>, AppError> {
    let mut seen = HashSet::new();
    for input in submitted {
        check_attr_name(&input.name)?;
        if !seen.insert(input.name.as_str()) {
            return Err(AppError::MultipleAttributeOccurrences(input.name.clone()));
        }
    }

    let by_id: HashMap<i32, &AttrDef> = existing.iter().map(|d| (d.id, d)).collect();
    let mut diff = SchemaDiff::default();
    let mut kept = HashSet::new();

    for input in submitted {
        let Some(id) = input.id else {
            diff.added.push(input);
            continue;
        };
        let current = by_id.get(&id).ok_or_else(|| AppError::AttributeNotDefined {
            attr: input.name.clone(),
            schema_id,
        })?;
        kept.insert(id);

        let wanted = input.normalized(schema_id);
        if current.list && !wanted.list {
            return Err(AppError::ListedToUnlisted(current.id));
        }
        if wanted != current.to_input() {
            diff.updated.push((current, wanted));
        }
    }

    diff.deleted = existing.iter().filter(|d| !kept.contains(&d.id)).collect();

    let deleted_names: HashSet<&str> = diff.deleted.iter().map(|d| d.name.as_str()).collect();
    let touched = diff
        .added
        .iter()
        .map(|i| i.name.as_str())
        .chain(diff.updated.iter().map(|(_, i)| i.name.as_str()));
    for name in touched {
        if deleted_names.contains(name) {
            return Err(AppError::NoOpChange(format!(
                "attribute `{}` is both deleted and submitted",
                name
            )));
        }
    }

    Ok(diff)
}

/// Foreign keys must name the schema their values point into
pub fn bound_schema_required(input: &AttrDefInput) -> Result<(), AppError> {
    if input.kind == AttrKind::Fk && input.bound_schema_id.is_none() {
        return Err(AppError::NoSchemaToBind(input.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn def(id: i32, name: &str, kind: AttrKind, list: bool) -> AttrDef {
        AttrDef {
            id,
            schema_id: 1,
            attribute_id: id * 10,
            name: name.into(),
            kind,
            required: false,
            unique: false,
            list,
            key: false,
            description: None,
            bound_schema_id: None,
        }
    }

    #[test]
    fn test_slug_rules() {
        assert!(is_valid_slug("person"));
        assert!(is_valid_slug("person2-abc"));
        assert!(!is_valid_slug("2person"));
        assert!(!is_valid_slug("person_x"));
        assert!(matches!(
            check_schema_slug("entity"),
            Err(AppError::ReservedName { .. })
        ));
    }

    #[test]
    fn test_reserved_attribute_names() {
        for name in RESERVED_FIELDS {
            assert!(matches!(
                check_attr_name(name),
                Err(AppError::ReservedName { .. })
            ));
        }
        assert!(check_attr_name("born").is_ok());
        assert!(check_attr_name("_born").is_err());
    }

    #[test]
    fn test_listing_parameters_are_reserved() {
        for name in CONTROL_KEYS {
            assert!(matches!(
                check_attr_name(name),
                Err(AppError::ReservedName { ref reserved, .. }) if reserved.contains(&"order_by")
            ));
        }
        assert!(check_attr_name("limits").is_ok());
    }

    #[test]
    fn test_shape_wraps_single_value_for_lists() {
        let friends = def(1, "friends", AttrKind::Fk, true);
        assert_eq!(
            shape_values(&friends, &json!(4)).unwrap(),
            vec![Scalar::Fk(4)]
        );
        assert_eq!(
            shape_values(&friends, &json!([4, "5"])).unwrap(),
            vec![Scalar::Fk(4), Scalar::Fk(5)]
        );
    }

    #[test]
    fn test_shape_rejects_list_for_single() {
        let age = def(2, "age", AttrKind::Int, false);
        assert!(matches!(
            shape_values(&age, &json!([1, 2])),
            Err(AppError::NotListed { .. })
        ));
        assert!(matches!(
            shape_values(&age, &json!("old")),
            Err(AppError::ValueCast { kind: AttrKind::Int, .. })
        ));
    }

    #[test]
    fn test_classify_added_updated_deleted() {
        let existing = vec![
            def(1, "age", AttrKind::Int, false),
            def(2, "nickname", AttrKind::Str, false),
        ];
        let mut age = existing[0].to_input();
        age.required = true;
        let born = AttrDefInput {
            id: None,
            ..def(0, "born", AttrKind::Date, false).to_input()
        };
        let submitted = vec![age, born];

        let diff = classify_attributes(1, &existing, &submitted).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].name, "born");
        assert_eq!(diff.updated.len(), 1);
        assert!(diff.updated[0].1.required);
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.deleted[0].name, "nickname");
    }

    #[test]
    fn test_classify_unchanged_is_empty() {
        let existing = vec![def(1, "age", AttrKind::Int, false)];
        let submitted = vec![existing[0].to_input()];
        assert!(classify_attributes(1, &existing, &submitted)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_classify_delete_and_readd_is_no_op_conflict() {
        let existing = vec![def(1, "age", AttrKind::Int, false)];
        let readded = AttrDefInput {
            id: None,
            ..existing[0].to_input()
        };
        let submitted = vec![readded];
        assert!(matches!(
            classify_attributes(1, &existing, &submitted),
            Err(AppError::NoOpChange(_))
        ));
    }

    #[test]
    fn test_classify_rejects_unlisting_and_unknown_ids() {
        let existing = vec![def(1, "tags", AttrKind::Str, true)];
        let mut tags = existing[0].to_input();
        tags.list = false;
        assert!(matches!(
            classify_attributes(1, &existing, &[tags]),
            Err(AppError::ListedToUnlisted(1))
        ));

        let mut ghost = existing[0].to_input();
        ghost.id = Some(99);
        assert!(matches!(
            classify_attributes(1, &existing, &[ghost]),
            Err(AppError::AttributeNotDefined { .. })
        ));
    }

    #[test]
    fn test_classify_rejects_duplicate_names() {
        let input = def(0, "age", AttrKind::Int, false).to_input();
        let mut first = input.clone();
        first.id = None;
        let mut second = input;
        second.id = None;
        assert!(matches!(
            classify_attributes(1, &[], &[first, second]),
            Err(AppError::MultipleAttributeOccurrences(_))
        ));
    }
}
