//! AG-Grid style filter models translated into SeaORM conditions.
//!
//! A filter model maps a field name to a filter item. Field names are either
//! record columns (`user_id`, `natural_id`, `org_id`, `repo_id`, `created_at`,
//! `updated_at`) or dotted paths into the JSON payload (`commit.author.name`).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use sea_orm::sea_query::{Alias, Expr, Func, FunctionCall, LikeExpr, SimpleExpr};
use sea_orm::{Condition, DbBackend};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::github_record::Column;

static FIELD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("field name pattern compiles")
});

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filterModel is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid field name '{0}'")]
    InvalidField(String),
    #[error("filter on '{field}' is missing {what}")]
    MissingValue { field: String, what: &'static str },
    #[error("filter on '{field}' has an invalid value: {message}")]
    InvalidValue { field: String, message: String },
    #[error("unsupported {filter_type} operator '{operator}' on '{field}'")]
    UnsupportedOperator {
        field: String,
        filter_type: &'static str,
        operator: String,
    },
}

/// Field name → filter item.
pub type FilterModel = BTreeMap<String, FilterItem>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Text,
    Number,
    Date,
    Boolean,
    Multi,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
    pub filter_type: FilterType,
    /// Comparison operator (`contains`, `lessThan`, `inRange`, ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub filter: Option<Value>,
    pub filter_to: Option<Value>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub operator: Option<JoinOperator>,
    pub condition1: Option<Box<FilterItem>>,
    pub condition2: Option<Box<FilterItem>>,
}

/// Where a filter or sort field lives.
#[derive(Debug, Clone)]
pub enum FieldRef {
    Column(Column),
    Payload(Vec<String>),
}

impl FieldRef {
    pub fn parse(name: &str) -> Result<Self, FilterError> {
        if !FIELD_NAME.is_match(name) {
            return Err(FilterError::InvalidField(name.to_string()));
        }

        let column = match name {
            "user_id" => Some(Column::UserId),
            "natural_id" => Some(Column::NaturalId),
            "org_id" => Some(Column::OrgId),
            "repo_id" => Some(Column::RepoId),
            "created_at" => Some(Column::CreatedAt),
            "updated_at" => Some(Column::UpdatedAt),
            _ => None,
        };

        Ok(match column {
            Some(column) => FieldRef::Column(column),
            None => FieldRef::Payload(name.split('.').map(str::to_string).collect()),
        })
    }

    fn is_timestamp_column(&self) -> bool {
        matches!(
            self,
            FieldRef::Column(Column::CreatedAt) | FieldRef::Column(Column::UpdatedAt)
        )
    }

    /// Scalar value of the field, as text for payload paths.
    fn value_expr(&self, backend: DbBackend) -> SimpleExpr {
        match self {
            FieldRef::Column(column) => Expr::col(*column).into(),
            FieldRef::Payload(path) => {
                let function = match backend {
                    DbBackend::Postgres => "jsonb_extract_path_text",
                    _ => "json_extract",
                };
                SimpleExpr::FunctionCall(payload_call(function, path, backend))
            }
        }
    }

    /// Sort key. Postgres sorts on the jsonb node so numbers order numerically.
    fn sort_expr(&self, backend: DbBackend) -> SimpleExpr {
        match (self, backend) {
            (FieldRef::Payload(path), DbBackend::Postgres) => {
                SimpleExpr::FunctionCall(payload_call("jsonb_extract_path", path, backend))
            }
            _ => self.value_expr(backend),
        }
    }
}

fn payload_call(function: &str, path: &[String], backend: DbBackend) -> FunctionCall {
    let call = Func::cust(Alias::new(function)).arg(Expr::col(Column::Payload));
    match backend {
        DbBackend::Postgres => path
            .iter()
            .fold(call, |call, segment| call.arg(Expr::val(segment.clone()))),
        _ => call.arg(Expr::val(format!("$.{}", path.join(".")))),
    }
}

fn as_text(expr: SimpleExpr) -> SimpleExpr {
    SimpleExpr::FunctionCall(Func::cast_as(expr, Alias::new("TEXT")))
}

fn lower_text(expr: SimpleExpr) -> Expr {
    Expr::expr(SimpleExpr::FunctionCall(Func::lower(as_text(expr))))
}

fn as_number(expr: SimpleExpr, backend: DbBackend) -> Expr {
    let target = match backend {
        DbBackend::Postgres => "DOUBLE PRECISION",
        _ => "REAL",
    };
    Expr::expr(SimpleExpr::FunctionCall(Func::cast_as(
        expr,
        Alias::new(target),
    )))
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn like(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape('\\')
}

/// Parse the `filterModel` query parameter.
pub fn parse_filter_model(raw: &str) -> Result<FilterModel, FilterError> {
    Ok(serde_json::from_str(raw)?)
}

/// Translate a filter model into a single AND-ed condition.
pub fn build_condition(model: &FilterModel, backend: DbBackend) -> Result<Condition, FilterError> {
    let mut condition = Condition::all();
    for (field_name, item) in model {
        let field = FieldRef::parse(field_name)?;
        if let Some(expr) = translate_item(field_name, &field, item, backend)? {
            condition = condition.add(expr);
        }
    }
    Ok(condition)
}

/// Order-by expression for a `sortColumn` value.
pub fn sort_expr(field_name: &str, backend: DbBackend) -> Result<SimpleExpr, FilterError> {
    Ok(FieldRef::parse(field_name)?.sort_expr(backend))
}

fn translate_item(
    name: &str,
    field: &FieldRef,
    item: &FilterItem,
    backend: DbBackend,
) -> Result<Option<Condition>, FilterError> {
    if let (Some(operator), Some(first), Some(second)) =
        (item.operator, item.condition1.as_deref(), item.condition2.as_deref())
    {
        let mut joined = match operator {
            JoinOperator::And => Condition::all(),
            JoinOperator::Or => Condition::any(),
        };
        for part in [first, second] {
            if let Some(cond) = translate_item(name, field, part, backend)? {
                joined = joined.add(cond);
            }
        }
        return Ok(Some(joined));
    }

    match item.filter_type {
        FilterType::Text => text_condition(name, field, item, backend).map(Some),
        FilterType::Number => number_condition(name, field, item, backend).map(Some),
        FilterType::Date => date_condition(name, field, item, backend).map(Some),
        FilterType::Boolean => boolean_condition(name, field, item, backend).map(Some),
        FilterType::Multi => Err(FilterError::MissingValue {
            field: name.to_string(),
            what: "operator, condition1 and condition2",
        }),
        FilterType::Unsupported => {
            tracing::warn!(field = name, "Unsupported filter type ignored");
            Ok(None)
        }
    }
}

fn operator<'a>(name: &str, item: &'a FilterItem) -> Result<&'a str, FilterError> {
    item.kind.as_deref().ok_or_else(|| FilterError::MissingValue {
        field: name.to_string(),
        what: "type",
    })
}

fn unsupported(name: &str, filter_type: &'static str, op: &str) -> FilterError {
    FilterError::UnsupportedOperator {
        field: name.to_string(),
        filter_type,
        operator: op.to_string(),
    }
}

fn text_condition(
    name: &str,
    field: &FieldRef,
    item: &FilterItem,
    backend: DbBackend,
) -> Result<Condition, FilterError> {
    let op = operator(name, item)?;
    let raw = match item.filter.as_ref() {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => {
            return Err(FilterError::MissingValue {
                field: name.to_string(),
                what: "filter",
            });
        }
    };
    let value = field.value_expr(backend);
    let needle = escape_like(&raw.to_lowercase());

    let expr = match op {
        "contains" => lower_text(value).like(like(format!("%{}%", needle))),
        "startsWith" => lower_text(value).like(like(format!("{}%", needle))),
        "endsWith" => lower_text(value).like(like(format!("%{}", needle))),
        "equals" => Expr::expr(as_text(value)).eq(raw),
        "notContains" => {
            return Ok(Condition::any()
                .add(Expr::expr(value.clone()).is_null())
                .add(lower_text(value).not_like(like(format!("%{}%", needle)))));
        }
        "notEqual" => {
            return Ok(Condition::any()
                .add(Expr::expr(value.clone()).is_null())
                .add(Expr::expr(as_text(value)).ne(raw)));
        }
        other => return Err(unsupported(name, "text", other)),
    };
    Ok(Condition::all().add(expr))
}

fn number_value(name: &str, value: Option<&Value>, what: &'static str) -> Result<f64, FilterError> {
    match value {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| FilterError::InvalidValue {
            field: name.to_string(),
            message: format!("{} is out of range", what),
        }),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| FilterError::InvalidValue {
            field: name.to_string(),
            message: format!("{} '{}' is not a number", what, s),
        }),
        _ => Err(FilterError::MissingValue {
            field: name.to_string(),
            what,
        }),
    }
}

fn number_condition(
    name: &str,
    field: &FieldRef,
    item: &FilterItem,
    backend: DbBackend,
) -> Result<Condition, FilterError> {
    let op = operator(name, item)?;
    let value = field.value_expr(backend);
    let number = || match field {
        FieldRef::Column(_) => Expr::expr(value.clone()),
        FieldRef::Payload(_) => as_number(value.clone(), backend),
    };
    let filter = number_value(name, item.filter.as_ref(), "filter")?;

    let expr = match op {
        "equals" => number().eq(filter),
        "lessThan" => number().lt(filter),
        "greaterThan" => number().gt(filter),
        "lessThanOrEqual" => number().lte(filter),
        "greaterThanOrEqual" => number().gte(filter),
        "inRange" => {
            let to = number_value(name, item.filter_to.as_ref(), "filterTo")?;
            number().between(filter, to)
        }
        "notEqual" => {
            return Ok(Condition::any()
                .add(Expr::expr(value.clone()).is_null())
                .add(number().ne(filter)));
        }
        other => return Err(unsupported(name, "number", other)),
    };
    Ok(Condition::all().add(expr))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (AG-Grid) and bare dates, all read as UTC unless offset.
fn parse_date(name: &str, raw: &str) -> Result<DateTime<FixedOffset>, FilterError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().fixed_offset());
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc().fixed_offset());
    }
    Err(FilterError::InvalidValue {
        field: name.to_string(),
        message: format!("'{}' is not a date", raw),
    })
}

fn date_condition(
    name: &str,
    field: &FieldRef,
    item: &FilterItem,
    backend: DbBackend,
) -> Result<Condition, FilterError> {
    let op = operator(name, item)?;
    let from_raw = item
        .date_from
        .as_deref()
        .ok_or_else(|| FilterError::MissingValue {
            field: name.to_string(),
            what: "dateFrom",
        })?;
    let from = parse_date(name, from_raw)?;
    let value = field.value_expr(backend);

    // Timestamp columns bind native values; payload dates compare as ISO-8601 UTC text.
    let bind = |dt: DateTime<FixedOffset>| -> SimpleExpr {
        if field.is_timestamp_column() {
            Expr::val(dt).into()
        } else {
            Expr::val(
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .into()
        }
    };
    let cmp = || Expr::expr(value.clone());

    let day_start = from
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc().fixed_offset())
        .unwrap_or(from);
    let next_day = day_start + Duration::days(1);

    let condition = match op {
        "equals" => Condition::all()
            .add(cmp().gte(bind(day_start)))
            .add(cmp().lt(bind(next_day))),
        "notEqual" => Condition::any()
            .add(cmp().is_null())
            .add(cmp().lt(bind(day_start)))
            .add(cmp().gte(bind(next_day))),
        "lessThan" => Condition::all().add(cmp().lt(bind(from))),
        "greaterThan" => Condition::all().add(cmp().gt(bind(from))),
        "inRange" => {
            let to_raw = item
                .date_to
                .as_deref()
                .ok_or_else(|| FilterError::MissingValue {
                    field: name.to_string(),
                    what: "dateTo",
                })?;
            let to = parse_date(name, to_raw)?;
            Condition::all()
                .add(cmp().gte(bind(from)))
                .add(cmp().lte(bind(to)))
        }
        other => return Err(unsupported(name, "date", other)),
    };
    Ok(condition)
}

fn boolean_condition(
    name: &str,
    field: &FieldRef,
    item: &FilterItem,
    backend: DbBackend,
) -> Result<Condition, FilterError> {
    if let FieldRef::Column(_) = field {
        return Err(FilterError::InvalidValue {
            field: name.to_string(),
            message: "boolean filters apply to payload fields only".to_string(),
        });
    }

    let wanted = match item.filter.as_ref() {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => {
            return Err(FilterError::MissingValue {
                field: name.to_string(),
                what: "a boolean filter",
            });
        }
    };

    // json_extract yields 1/0 for JSON booleans; jsonb text extraction yields true/false.
    let literal = match (backend, wanted) {
        (DbBackend::Postgres, true) => "true",
        (DbBackend::Postgres, false) => "false",
        (_, true) => "1",
        (_, false) => "0",
    };
    Ok(Condition::all().add(Expr::expr(as_text(field.value_expr(backend))).eq(literal)))
}

/// Case-insensitive substring match over the whole serialized payload.
pub fn text_search_condition(text: &str) -> Condition {
    let needle = escape_like(&text.trim().to_lowercase());
    Condition::all().add(lower_text(Expr::col(Column::Payload).into()).like(like(format!(
        "%{}%",
        needle
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GithubRecord;
    use sea_orm::{EntityTrait, Order, QueryFilter, QueryOrder, QueryTrait};

    fn sql(model: &str, backend: DbBackend) -> String {
        let model = parse_filter_model(model).unwrap();
        let condition = build_condition(&model, backend).unwrap();
        GithubRecord::find()
            .filter(condition)
            .build(backend)
            .to_string()
    }

    #[test]
    fn field_names_are_validated() {
        assert!(FieldRef::parse("commit.author.name").is_ok());
        assert!(matches!(
            FieldRef::parse("user_id").unwrap(),
            FieldRef::Column(Column::UserId)
        ));
        for bad in ["", "1abc", "a..b", "a;drop", "a.b-c", "payload'"] {
            assert!(
                matches!(FieldRef::parse(bad), Err(FilterError::InvalidField(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn payload_text_filter_uses_json_extract_on_sqlite() {
        let rendered = sql(
            r#"{"commit.author.name":{"filterType":"text","type":"contains","filter":"Ada"}}"#,
            DbBackend::Sqlite,
        );
        assert!(rendered.contains("json_extract"), "{rendered}");
        assert!(rendered.contains("$.commit.author.name"), "{rendered}");
        assert!(rendered.contains("%ada%"), "{rendered}");
    }

    #[test]
    fn payload_path_uses_jsonb_extraction_on_postgres() {
        let rendered = sql(
            r#"{"user.login":{"filterType":"text","type":"equals","filter":"octocat"}}"#,
            DbBackend::Postgres,
        );
        assert!(rendered.contains("jsonb_extract_path_text"), "{rendered}");
        assert!(rendered.contains("'login'"), "{rendered}");
    }

    #[test]
    fn like_wildcards_in_input_are_escaped() {
        let rendered = sql(
            r#"{"title":{"filterType":"text","type":"contains","filter":"100%_done"}}"#,
            DbBackend::Sqlite,
        );
        assert!(rendered.contains(r"100\%\_done"), "{rendered}");
    }

    #[test]
    fn multi_filter_joins_conditions_with_or() {
        let rendered = sql(
            r#"{"number":{"filterType":"number","operator":"OR",
                "condition1":{"filterType":"number","type":"lessThan","filter":3},
                "condition2":{"filterType":"number","type":"greaterThan","filter":10}}}"#,
            DbBackend::Sqlite,
        );
        assert!(rendered.contains(" OR "), "{rendered}");
    }

    #[test]
    fn unsupported_filter_type_is_ignored() {
        let model = parse_filter_model(
            r#"{"title":{"filterType":"custom","type":"custom","customProperty":1}}"#,
        )
        .unwrap();
        let field = FieldRef::parse("title").unwrap();
        let translated =
            translate_item("title", &field, &model["title"], DbBackend::Sqlite).unwrap();
        assert!(translated.is_none());
    }

    #[test]
    fn unknown_operator_and_bad_values_are_errors() {
        let model = parse_filter_model(
            r#"{"title":{"filterType":"text","type":"regex","filter":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(
            build_condition(&model, DbBackend::Sqlite),
            Err(FilterError::UnsupportedOperator { .. })
        ));

        let model = parse_filter_model(
            r#"{"created_at":{"filterType":"date","type":"equals","dateFrom":"yesterday"}}"#,
        )
        .unwrap();
        assert!(matches!(
            build_condition(&model, DbBackend::Sqlite),
            Err(FilterError::InvalidValue { .. })
        ));

        assert!(matches!(
            parse_filter_model("{not json"),
            Err(FilterError::InvalidJson(_))
        ));
    }

    #[test]
    fn ag_grid_date_format_is_accepted() {
        let parsed = parse_date("d", "2024-03-05 00:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T00:00:00+00:00");
        let parsed = parse_date("d", "2024-03-05").unwrap();
        assert_eq!(parsed.timestamp(), 1_709_596_800);
    }

    #[test]
    fn payload_sort_key_differs_by_backend() {
        let render = |backend| {
            GithubRecord::find()
                .order_by(sort_expr("commit.author.date", backend).unwrap(), Order::Desc)
                .build(backend)
                .to_string()
        };
        assert!(render(DbBackend::Sqlite).contains("json_extract"));
        assert!(render(DbBackend::Postgres).contains("jsonb_extract_path("));
        assert!(sort_expr("bad name", DbBackend::Sqlite).is_err());
    }
}
