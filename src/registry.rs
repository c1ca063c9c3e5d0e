//! Type registry
//!
//! Every scalar attribute kind is mapped to its value table, its change-value
//! table, its cast function and the filter operators it supports. Store, query
//! and change code switch on [`AttrKind`] through this registry instead of
//! inspecting values at runtime.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::ToSql;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Row;

/// Scalar attribute kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttrKind {
    Str,
    Bool,
    Int,
    Float,
    Fk,
    Dt,
    Date,
}

/// Static description of one kind
#[derive(Debug)]
pub struct KindSpec {
    pub kind: AttrKind,
    pub value_table: &'static str,
    pub change_table: &'static str,
    pub sql_type: &'static str,
    pub operators: &'static [FilterOp],
}

const EQUALITY: &[FilterOp] = &[FilterOp::Eq, FilterOp::Ne];
const ORDERED: &[FilterOp] = &[
    FilterOp::Eq,
    FilterOp::Ne,
    FilterOp::Lt,
    FilterOp::Le,
    FilterOp::Gt,
    FilterOp::Ge,
];
const TEXT: &[FilterOp] = &[
    FilterOp::Eq,
    FilterOp::Ne,
    FilterOp::Contains,
    FilterOp::Starts,
    FilterOp::IEq,
    FilterOp::Regexp,
];

pub static REGISTRY: [KindSpec; 7] = [
    KindSpec {
        kind: AttrKind::Str,
        value_table: "values_str",
        change_table: "change_values_str",
        sql_type: "TEXT",
        operators: TEXT,
    },
    KindSpec {
        kind: AttrKind::Bool,
        value_table: "values_bool",
        change_table: "change_values_bool",
        sql_type: "BOOLEAN",
        operators: EQUALITY,
    },
    KindSpec {
        kind: AttrKind::Int,
        value_table: "values_int",
        change_table: "change_values_int",
        sql_type: "BIGINT",
        operators: ORDERED,
    },
    KindSpec {
        kind: AttrKind::Float,
        value_table: "values_float",
        change_table: "change_values_float",
        sql_type: "DOUBLE PRECISION",
        operators: ORDERED,
    },
    KindSpec {
        kind: AttrKind::Fk,
        value_table: "values_fk",
        change_table: "change_values_fk",
        sql_type: "INTEGER",
        operators: EQUALITY,
    },
    KindSpec {
        kind: AttrKind::Dt,
        value_table: "values_datetime",
        change_table: "change_values_datetime",
        sql_type: "TIMESTAMPTZ",
        operators: ORDERED,
    },
    KindSpec {
        kind: AttrKind::Date,
        value_table: "values_date",
        change_table: "change_values_date",
        sql_type: "DATE",
        operators: ORDERED,
    },
];

impl AttrKind {
    pub const ALL: [AttrKind; 7] = [
        AttrKind::Str,
        AttrKind::Bool,
        AttrKind::Int,
        AttrKind::Float,
        AttrKind::Fk,
        AttrKind::Dt,
        AttrKind::Date,
    ];

    pub fn spec(self) -> &'static KindSpec {
        &REGISTRY[self as usize]
    }

    pub fn value_table(self) -> &'static str {
        self.spec().value_table
    }

    pub fn change_table(self) -> &'static str {
        self.spec().change_table
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttrKind::Str => "STR",
            AttrKind::Bool => "BOOL",
            AttrKind::Int => "INT",
            AttrKind::Float => "FLOAT",
            AttrKind::Fk => "FK",
            AttrKind::Dt => "DT",
            AttrKind::Date => "DATE",
        }
    }

    /// Operators usable on a definition of this kind.
    /// A list-valued foreign key can't be filtered at all.
    pub fn operators(self, listed: bool) -> &'static [FilterOp] {
        if self == AttrKind::Fk && listed {
            return &[];
        }
        self.spec().operators
    }

    /// Coerces an incoming JSON scalar into this kind.
    pub fn cast(self, raw: &Json) -> Result<Scalar, String> {
        match (self, raw) {
            (AttrKind::Str, Json::String(s)) => Ok(Scalar::Str(s.clone())),
            (AttrKind::Str, Json::Number(n)) => Ok(Scalar::Str(n.to_string())),

            (AttrKind::Bool, Json::Bool(b)) => Ok(Scalar::Bool(*b)),
            (AttrKind::Bool, Json::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Scalar::Bool(true)),
                "false" | "0" | "no" => Ok(Scalar::Bool(false)),
                _ => Err(format!("`{}` is not a valid boolean", s)),
            },

            (AttrKind::Int, Json::Number(n)) => n
                .as_i64()
                .map(Scalar::Int)
                .ok_or_else(|| format!("`{}` is not a valid integer", n)),
            (AttrKind::Int, Json::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Scalar::Int)
                .map_err(|e| format!("`{}`: {}", s, e)),

            (AttrKind::Float, Json::Number(n)) => n
                .as_f64()
                .map(Scalar::Float)
                .ok_or_else(|| format!("`{}` is not a valid float", n)),
            (AttrKind::Float, Json::String(s)) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Scalar::Float(v)),
                Ok(_) => Err(format!("`{}` is not a finite float", s)),
                Err(e) => Err(format!("`{}`: {}", s, e)),
            },

            (AttrKind::Fk, Json::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Scalar::Fk)
                .ok_or_else(|| format!("`{}` is not a valid entity id", n)),
            (AttrKind::Fk, Json::String(s)) => s
                .trim()
                .parse::<i32>()
                .map(Scalar::Fk)
                .map_err(|e| format!("`{}`: {}", s, e)),

            (AttrKind::Dt, Json::String(s)) => parse_datetime(s).map(Scalar::Dt),
            (AttrKind::Date, Json::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Scalar::Date)
                .map_err(|e| format!("`{}`: {}", s, e)),

            (kind, other) => Err(format!("got {} where {} was expected", json_type(other), kind)),
        }
    }

    /// NULL parameter typed for this kind's column
    pub fn null_param(self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            AttrKind::Str => Box::new(None::<String>),
            AttrKind::Bool => Box::new(None::<bool>),
            AttrKind::Int => Box::new(None::<i64>),
            AttrKind::Float => Box::new(None::<f64>),
            AttrKind::Fk => Box::new(None::<i32>),
            AttrKind::Dt => Box::new(None::<DateTime<Utc>>),
            AttrKind::Date => Box::new(None::<NaiveDate>),
        }
    }

    /// Reads a nullable value column of this kind.
    pub fn read(self, row: &Row, column: &str) -> Option<Scalar> {
        match self {
            AttrKind::Str => row.get::<_, Option<String>>(column).map(Scalar::Str),
            AttrKind::Bool => row.get::<_, Option<bool>>(column).map(Scalar::Bool),
            AttrKind::Int => row.get::<_, Option<i64>>(column).map(Scalar::Int),
            AttrKind::Float => row.get::<_, Option<f64>>(column).map(Scalar::Float),
            AttrKind::Fk => row.get::<_, Option<i32>>(column).map(Scalar::Fk),
            AttrKind::Dt => row.get::<_, Option<DateTime<Utc>>>(column).map(Scalar::Dt),
            AttrKind::Date => row.get::<_, Option<NaiveDate>>(column).map(Scalar::Date),
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttrKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttrKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown attribute kind `{}`", s))
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // naive timestamps are taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("`{}`: {}", s, e))
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "object",
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Fk(i32),
    Dt(DateTime<Utc>),
    Date(NaiveDate),
}

impl Scalar {
    pub fn kind(&self) -> AttrKind {
        match self {
            Scalar::Str(_) => AttrKind::Str,
            Scalar::Bool(_) => AttrKind::Bool,
            Scalar::Int(_) => AttrKind::Int,
            Scalar::Float(_) => AttrKind::Float,
            Scalar::Fk(_) => AttrKind::Fk,
            Scalar::Dt(_) => AttrKind::Dt,
            Scalar::Date(_) => AttrKind::Date,
        }
    }

    /// Borrow the inner value as a query parameter
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Scalar::Str(v) => v,
            Scalar::Bool(v) => v,
            Scalar::Int(v) => v,
            Scalar::Float(v) => v,
            Scalar::Fk(v) => v,
            Scalar::Dt(v) => v,
            Scalar::Date(v) => v,
        }
    }

    /// Owned query parameter for plans that outlive the value
    pub fn into_sql(self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            Scalar::Str(v) => Box::new(v),
            Scalar::Bool(v) => Box::new(v),
            Scalar::Int(v) => Box::new(v),
            Scalar::Float(v) => Box::new(v),
            Scalar::Fk(v) => Box::new(v),
            Scalar::Dt(v) => Box::new(v),
            Scalar::Date(v) => Box::new(v),
        }
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    pub fn as_fk(&self) -> Option<i32> {
        match self {
            Scalar::Fk(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Fk(v) => write!(f, "{}", v),
            Scalar::Dt(v) => write!(f, "{}", v.to_rfc3339()),
            Scalar::Date(v) => write!(f, "{}", v),
        }
    }
}

/// Filter operators understood by the query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Starts,
    IEq,
    Regexp,
}

impl FilterOp {
    pub const ALL: [FilterOp; 10] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Le,
        FilterOp::Gt,
        FilterOp::Ge,
        FilterOp::Contains,
        FilterOp::Starts,
        FilterOp::IEq,
        FilterOp::Regexp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Lt => "lt",
            FilterOp::Le => "le",
            FilterOp::Gt => "gt",
            FilterOp::Ge => "ge",
            FilterOp::Contains => "contains",
            FilterOp::Starts => "starts",
            FilterOp::IEq => "ieq",
            FilterOp::Regexp => "regexp",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FilterOp::Eq => "equal to",
            FilterOp::Ne => "not equal to",
            FilterOp::Lt => "less than",
            FilterOp::Le => "less than or equal to",
            FilterOp::Gt => "greater than",
            FilterOp::Ge => "greater than or equal to",
            FilterOp::Contains => "contains substring",
            FilterOp::Starts => "starts with substring",
            FilterOp::IEq => "equal to, ignoring case",
            FilterOp::Regexp => "matches regular expression",
        }
    }

    pub fn parse(s: &str) -> Option<FilterOp> {
        FilterOp::ALL.into_iter().find(|op| op.name() == s)
    }

    /// SQL predicate over `column` with the bound parameter `param`
    pub fn predicate(self, column: &str, param: &str) -> String {
        match self {
            FilterOp::Eq => format!("{} = {}", column, param),
            FilterOp::Ne => format!("{} <> {}", column, param),
            FilterOp::Lt => format!("{} < {}", column, param),
            FilterOp::Le => format!("{} <= {}", column, param),
            FilterOp::Gt => format!("{} > {}", column, param),
            FilterOp::Ge => format!("{} >= {}", column, param),
            FilterOp::Contains => format!("strpos({}, {}) > 0", column, param),
            FilterOp::Starts => format!("starts_with({}, {})", column, param),
            FilterOp::IEq => format!("lower({}) = lower({})", column, param),
            FilterOp::Regexp => format!("{} ~ {}", column, param),
        }
    }
}
