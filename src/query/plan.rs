//! SQL plan for entity listings
//!
//! Every filter term becomes its own sub-select of matching entity ids; the
//! sub-selects and the base predicate are combined with INTERSECT so terms on
//! different value tables never fan out into duplicate rows.

use super::filter::{Target, Term};
use crate::models::AttrDef;
use postgres_types::ToSql;

pub type Param = Box<dyn ToSql + Sync + Send>;

/// Which entities the base predicate admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    DeletedOnly,
    All,
}

impl Visibility {
    pub fn from_flags(all: bool, deleted_only: bool) -> Self {
        match (all, deleted_only) {
            (true, _) => Visibility::All,
            (false, true) => Visibility::DeletedOnly,
            (false, false) => Visibility::Live,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OrderKey<'a> {
    Column(&'static str),
    Attr(&'a AttrDef),
}

#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub limit: i64,
    pub offset: i64,
    pub ascending: bool,
}

pub struct Plan {
    pub count_sql: String,
    pub page_sql: String,
    pub params: Vec<Param>,
    /// Leading params used by `count_sql`
    pub filter_params: usize,
}

#[derive(Default)]
struct Binder {
    params: Vec<Param>,
}

impl Binder {
    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

pub fn build(
    schema_id: i32,
    terms: Vec<Term<'_>>,
    visibility: Visibility,
    order: OrderKey<'_>,
    window: Window,
) -> Plan {
    let mut binder = Binder::default();

    let mut base = format!(
        "SELECT id FROM entities WHERE schema_id = {}",
        binder.bind(Box::new(schema_id))
    );
    match visibility {
        Visibility::Live => base.push_str(&format!(" AND deleted = {}", binder.bind(Box::new(false)))),
        Visibility::DeletedOnly => {
            base.push_str(&format!(" AND deleted = {}", binder.bind(Box::new(true))))
        }
        Visibility::All => {}
    }

    let mut selects = vec![base];
    for term in terms {
        let select = match term.target {
            Target::Name => {
                let value = binder.bind(term.value.into_sql());
                format!(
                    "SELECT id FROM entities WHERE {}",
                    term.op.predicate("name", &value)
                )
            }
            Target::Attr(def) => {
                let attribute = binder.bind(Box::new(def.attribute_id));
                let value = binder.bind(term.value.into_sql());
                format!(
                    "SELECT entity_id FROM {} WHERE attribute_id = {} AND {}",
                    def.kind.value_table(),
                    attribute,
                    term.op.predicate("value", &value)
                )
            }
        };
        selects.push(select);
    }

    let cte = format!(
        "WITH matched AS (\n    {}\n)",
        selects.join("\n    INTERSECT\n    ")
    );
    let filter_params = binder.params.len();

    let order_expr = match order {
        OrderKey::Column(column) => format!("e.{}", column),
        OrderKey::Attr(def) => format!(
            "(SELECT v.value FROM {} v WHERE v.entity_id = e.id AND v.attribute_id = {} LIMIT 1)",
            def.kind.value_table(),
            binder.bind(Box::new(def.attribute_id))
        ),
    };
    let direction = if window.ascending { "ASC" } else { "DESC" };
    let limit = binder.bind(Box::new(window.limit));
    let offset = binder.bind(Box::new(window.offset));

    Plan {
        count_sql: format!("{}\nSELECT count(*) FROM matched", cte),
        page_sql: format!(
            "{}\nSELECT e.id, e.schema_id, e.name, e.slug, e.deleted\n\
             FROM entities e JOIN matched m ON m.id = e.id\n\
             ORDER BY {} {}, e.id ASC\n\
             LIMIT {} OFFSET {}",
            cte, order_expr, direction, limit, offset
        ),
        params: binder.params,
        filter_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AttrKind, FilterOp, Scalar};
    use pretty_assertions::assert_eq;

    fn age() -> AttrDef {
        AttrDef {
            id: 4,
            schema_id: 1,
            attribute_id: 9,
            name: "age".into(),
            kind: AttrKind::Int,
            required: false,
            unique: false,
            list: false,
            key: true,
            description: None,
            bound_schema_id: None,
        }
    }

    fn window() -> Window {
        Window {
            limit: 10,
            offset: 0,
            ascending: true,
        }
    }

    #[test]
    fn test_terms_are_intersected() {
        let age = age();
        let terms = vec![
            Term {
                target: Target::Attr(&age),
                op: FilterOp::Gt,
                value: Scalar::Int(9),
            },
            Term {
                target: Target::Attr(&age),
                op: FilterOp::Ne,
                value: Scalar::Int(10),
            },
        ];
        let plan = build(1, terms, Visibility::Live, OrderKey::Column("name"), window());

        assert_eq!(
            plan.count_sql,
            "WITH matched AS (\n    \
             SELECT id FROM entities WHERE schema_id = $1 AND deleted = $2\n    \
             INTERSECT\n    \
             SELECT entity_id FROM values_int WHERE attribute_id = $3 AND value > $4\n    \
             INTERSECT\n    \
             SELECT entity_id FROM values_int WHERE attribute_id = $5 AND value <> $6\n)\n\
             SELECT count(*) FROM matched"
        );
        assert_eq!(plan.filter_params, 6);
        assert_eq!(plan.params.len(), 8);
        assert!(plan.page_sql.ends_with("ORDER BY e.name ASC, e.id ASC\nLIMIT $7 OFFSET $8"));
    }

    #[test]
    fn test_all_visibility_has_no_deleted_predicate() {
        let plan = build(1, vec![], Visibility::All, OrderKey::Column("id"), window());
        assert!(plan
            .count_sql
            .contains("SELECT id FROM entities WHERE schema_id = $1\n)"));
        assert_eq!(plan.filter_params, 1);
    }

    #[test]
    fn test_name_term_targets_entities() {
        let terms = vec![Term {
            target: Target::Name,
            op: FilterOp::IEq,
            value: Scalar::Str("jack".into()),
        }];
        let plan = build(1, terms, Visibility::DeletedOnly, OrderKey::Column("name"), window());
        assert!(plan
            .count_sql
            .contains("SELECT id FROM entities WHERE lower(name) = lower($3)"));
    }

    #[test]
    fn test_order_by_attribute_uses_scalar_subquery() {
        let age = age();
        let plan = build(
            1,
            vec![],
            Visibility::Live,
            OrderKey::Attr(&age),
            Window {
                limit: 5,
                offset: 10,
                ascending: false,
            },
        );
        assert!(plan.page_sql.contains(
            "ORDER BY (SELECT v.value FROM values_int v WHERE v.entity_id = e.id AND v.attribute_id = $3 LIMIT 1) DESC, e.id ASC"
        ));
        assert_eq!(plan.filter_params, 2);
        assert_eq!(plan.params.len(), 5);
    }

    #[test]
    fn test_visibility_flags() {
        assert_eq!(Visibility::from_flags(true, true), Visibility::All);
        assert_eq!(Visibility::from_flags(false, true), Visibility::DeletedOnly);
        assert_eq!(Visibility::from_flags(false, false), Visibility::Live);
    }
}
