use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Keys consumed by the pipeline itself; everything else is a filter.
const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    /// Sortable and selectable, but not filterable through query strings.
    Timestamp,
}

/// One externally visible field of a resource: the name clients use in
/// query strings and JSON, the backing column, and how values are typed.
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    /// Excluded from the default projection, like a version/metadata column.
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
}

#[derive(Debug)]
pub struct Filter {
    pub field: &'static FieldDef,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug)]
pub struct SortKey {
    pub field: &'static FieldDef,
    pub descending: bool,
}

/// The resolved filter/sort/projection/pagination parameters for one list
/// request. Parsing is pure; `apply` only writes SQL onto a builder.
#[derive(Debug)]
pub struct QuerySpec {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Vec<&'static FieldDef>>,
    pub page: i64,
    pub limit: i64,
}

fn lookup(fields: &'static [FieldDef], name: &str) -> Option<&'static FieldDef> {
    fields.iter().find(|f| f.name == name)
}

/// Splits `price[gte]` into `("price", Some("gte"))`. A stray bracket is a
/// client error, never silently treated as part of the field name.
fn split_key(raw: &str) -> ApiResult<(&str, Option<&str>)> {
    match raw.find('[') {
        None => Ok((raw, None)),
        Some(i) if i > 0 && raw.ends_with(']') => Ok((&raw[..i], Some(&raw[i + 1..raw.len() - 1]))),
        Some(_) => Err(ApiError::BadRequest(format!(
            "malformed filter parameter `{}`",
            raw
        ))),
    }
}

fn parse_filter(
    fields: &'static [FieldDef],
    raw_key: &str,
    raw_value: &str,
) -> ApiResult<Filter> {
    let (name, op_token) = split_key(raw_key)?;
    let op = match op_token {
        None => FilterOp::Eq,
        // The operator must match as a whole token: `gte` is an operator,
        // `gteful` is not.
        Some(token) => FilterOp::from_token(token).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown filter operator `{}`", token))
        })?,
    };
    let field = lookup(fields, name)
        .ok_or_else(|| ApiError::BadRequest(format!("cannot filter on `{}`", name)))?;
    let value = match field.kind {
        FieldKind::Text => FilterValue::Text(raw_value.to_string()),
        FieldKind::Number => raw_value.parse::<f64>().map(FilterValue::Number).map_err(|_| {
            ApiError::BadRequest(format!(
                "invalid numeric value `{}` for `{}`",
                raw_value, name
            ))
        })?,
        FieldKind::Timestamp => {
            return Err(ApiError::BadRequest(format!("cannot filter on `{}`", name)))
        }
    };
    Ok(Filter { field, op, value })
}

fn parse_positive(params: &HashMap<String, String>, key: &str, default: i64) -> ApiResult<i64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ApiError::BadRequest(format!("{} must be a positive integer", key))),
    }
}

impl QuerySpec {
    /// Resolves raw query parameters against a resource's field table.
    /// Order of application is fixed: filter, sort, project, paginate.
    pub fn parse(
        params: &HashMap<String, String>,
        fields: &'static [FieldDef],
        default_sort: &str,
    ) -> ApiResult<Self> {
        let mut filters = Vec::new();
        for (key, value) in params {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            filters.push(parse_filter(fields, key, value)?);
        }
        // Parameter maps are unordered; keep the compiled clause order stable.
        filters.sort_by_key(|f| (f.field.name, f.op.sql()));

        let mut sort = Vec::new();
        let sort_param = params.get("sort").map(String::as_str).unwrap_or(default_sort);
        for part in sort_param.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, descending) = match part.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            let field = lookup(fields, name)
                .ok_or_else(|| ApiError::BadRequest(format!("cannot sort on `{}`", name)))?;
            sort.push(SortKey { field, descending });
        }

        let projection = match params.get("fields") {
            None => None,
            Some(list) => {
                let mut keep = Vec::new();
                for part in list.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    let field = lookup(fields, part)
                        .ok_or_else(|| ApiError::BadRequest(format!("unknown field `{}`", part)))?;
                    keep.push(field);
                }
                Some(keep)
            }
        };

        let page = parse_positive(params, "page", 1)?;
        let limit = parse_positive(params, "limit", DEFAULT_PAGE_SIZE)?;

        Ok(Self {
            filters,
            sort,
            projection,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// Writes WHERE/ORDER BY/LIMIT/OFFSET onto a query the caller started.
    /// `has_where` says whether the base query already has a WHERE clause.
    pub fn apply(&self, qb: &mut QueryBuilder<'_, Postgres>, mut has_where: bool) {
        for filter in &self.filters {
            qb.push(if has_where { " AND " } else { " WHERE " });
            has_where = true;
            qb.push(filter.field.column)
                .push(" ")
                .push(filter.op.sql())
                .push(" ");
            match &filter.value {
                FilterValue::Text(v) => qb.push_bind(v.clone()),
                FilterValue::Number(v) => qb.push_bind(*v),
            };
        }
        if !self.sort.is_empty() {
            qb.push(" ORDER BY ");
            for (i, key) in self.sort.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(key.field.column)
                    .push(if key.descending { " DESC" } else { " ASC" });
            }
        }
        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
    }

    /// Applies this request's projection to already-fetched rows. `id` is
    /// always kept; without an explicit `fields` list, internal fields drop.
    pub fn project_rows<T: Serialize>(
        &self,
        rows: &[T],
        fields: &'static [FieldDef],
    ) -> ApiResult<Vec<Value>> {
        rows.iter()
            .map(|row| match &self.projection {
                None => project_default(row, fields),
                Some(keep) => {
                    let mut map = to_map(row)?;
                    map.retain(|k, _| k == "id" || keep.iter().any(|f| f.name == k));
                    Ok(Value::Object(map))
                }
            })
            .collect()
    }
}

fn to_map<T: Serialize>(row: &T) -> ApiResult<serde_json::Map<String, Value>> {
    match serde_json::to_value(row) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::Internal("row did not serialize to an object".into())),
        Err(e) => Err(ApiError::Internal(format!("row serialization failed: {}", e))),
    }
}

/// Default external representation of a single row: everything except
/// internal metadata fields.
pub fn project_default<T: Serialize>(row: &T, fields: &'static [FieldDef]) -> ApiResult<Value> {
    let mut map = to_map(row)?;
    map.retain(|k, _| {
        k == "id" || lookup(fields, k).map(|f| !f.internal).unwrap_or(true)
    });
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static FIELDS: [FieldDef; 6] = [
        FieldDef { name: "name", column: "name", kind: FieldKind::Text, internal: false },
        FieldDef { name: "difficulty", column: "difficulty", kind: FieldKind::Text, internal: false },
        FieldDef { name: "price", column: "price", kind: FieldKind::Number, internal: false },
        FieldDef { name: "ratingAverage", column: "rating_average", kind: FieldKind::Number, internal: false },
        FieldDef { name: "createdAt", column: "created_at", kind: FieldKind::Timestamp, internal: false },
        FieldDef { name: "updatedAt", column: "updated_at", kind: FieldKind::Timestamp, internal: true },
    ];

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> ApiResult<QuerySpec> {
        QuerySpec::parse(&params(pairs), &FIELDS, "price")
    }

    #[test]
    fn comparison_suffix_translates_and_siblings_stay_equality() {
        let spec = parse(&[("price[gte]", "100"), ("difficulty", "easy")]).unwrap();
        assert_eq!(spec.filters.len(), 2);
        let difficulty = &spec.filters[0];
        assert_eq!(difficulty.field.name, "difficulty");
        assert_eq!(difficulty.op, FilterOp::Eq);
        assert_eq!(difficulty.value, FilterValue::Text("easy".into()));
        let price = &spec.filters[1];
        assert_eq!(price.field.name, "price");
        assert_eq!(price.op, FilterOp::Gte);
        assert_eq!(price.value, FilterValue::Number(100.0));
    }

    #[test]
    fn operator_must_match_whole_token() {
        let err = parse(&[("price[gteful]", "100")]).unwrap_err();
        assert!(err.to_string().contains("unknown filter operator"));
        let err = parse(&[("price[ge]", "100")]).unwrap_err();
        assert!(err.to_string().contains("unknown filter operator"));
    }

    #[test]
    fn all_four_comparison_operators_parse() {
        for (token, op) in [
            ("gt", FilterOp::Gt),
            ("gte", FilterOp::Gte),
            ("lt", FilterOp::Lt),
            ("lte", FilterOp::Lte),
        ] {
            let key = format!("price[{}]", token);
            let spec = parse(&[(key.as_str(), "5")]).unwrap();
            assert_eq!(spec.filters[0].op, op);
        }
    }

    #[test]
    fn unterminated_bracket_is_a_client_error() {
        let err = parse(&[("price[gte", "100")]).unwrap_err();
        assert!(err.to_string().contains("malformed filter parameter"));
    }

    #[test]
    fn unknown_field_and_bad_values_are_client_errors() {
        let err = parse(&[("secret", "1")]).unwrap_err();
        assert!(err.to_string().contains("cannot filter on `secret`"));

        let err = parse(&[("price", "cheap")]).unwrap_err();
        assert!(err.to_string().contains("invalid numeric value"));

        let err = parse(&[("createdAt", "2024-01-01")]).unwrap_err();
        assert!(err.to_string().contains("cannot filter on `createdAt`"));
    }

    #[test]
    fn sort_parses_left_to_right_with_descending_prefix() {
        let spec = parse(&[("sort", "price,-ratingAverage")]).unwrap();
        assert_eq!(spec.sort.len(), 2);
        assert_eq!(spec.sort[0].field.column, "price");
        assert!(!spec.sort[0].descending);
        assert_eq!(spec.sort[1].field.column, "rating_average");
        assert!(spec.sort[1].descending);
    }

    #[test]
    fn sort_defaults_to_designated_field_ascending() {
        let spec = parse(&[]).unwrap();
        assert_eq!(spec.sort.len(), 1);
        assert_eq!(spec.sort[0].field.name, "price");
        assert!(!spec.sort[0].descending);
    }

    #[test]
    fn sort_on_unknown_field_is_a_client_error() {
        let err = parse(&[("sort", "price,-bogus")]).unwrap_err();
        assert!(err.to_string().contains("cannot sort on `bogus`"));
    }

    #[test]
    fn fields_parse_into_projection() {
        let spec = parse(&[("fields", "name,price")]).unwrap();
        let keep = spec.projection.as_ref().unwrap();
        assert_eq!(keep.len(), 2);
        assert_eq!(keep[0].name, "name");
        assert_eq!(keep[1].name, "price");

        let err = parse(&[("fields", "name,bogus")]).unwrap_err();
        assert!(err.to_string().contains("unknown field `bogus`"));
    }

    #[test]
    fn pagination_defaults_and_offset_math() {
        let spec = parse(&[]).unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(spec.offset(), 0);

        let spec = parse(&[("page", "3"), ("limit", "10")]).unwrap();
        assert_eq!(spec.offset(), 20);

        let err = parse(&[("page", "0")]).unwrap_err();
        assert!(err.to_string().contains("page must be a positive integer"));
        let err = parse(&[("limit", "nope")]).unwrap_err();
        assert!(err.to_string().contains("limit must be a positive integer"));
    }

    #[test]
    fn reserved_keys_never_become_filters() {
        let spec = parse(&[("page", "2"), ("sort", "price"), ("limit", "5"), ("fields", "name")])
            .unwrap();
        assert!(spec.filters.is_empty());
    }

    #[test]
    fn apply_compiles_filters_sort_and_pagination() {
        let spec = parse(&[("difficulty", "easy"), ("price[gte]", "100")]).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tours");
        spec.apply(&mut qb, false);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM tours WHERE difficulty = $1 AND price >= $2 \
             ORDER BY price ASC LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn apply_extends_an_existing_where_clause() {
        let spec = parse(&[("name", "x")]).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE active = TRUE");
        spec.apply(&mut qb, true);
        assert!(qb.sql().contains("WHERE active = TRUE AND name = $1"));
    }

    #[test]
    fn default_projection_drops_internal_fields_and_keeps_id() {
        let rows = vec![json!({
            "id": "t1",
            "name": "The Forest Hiker",
            "price": 397.0,
            "updatedAt": "2026-01-01T00:00:00Z"
        })];
        let spec = parse(&[]).unwrap();
        let out = spec.project_rows(&rows, &FIELDS).unwrap();
        assert_eq!(out[0]["id"], "t1");
        assert_eq!(out[0]["name"], "The Forest Hiker");
        assert!(out[0].get("updatedAt").is_none());
    }

    #[test]
    fn explicit_projection_keeps_exactly_requested_fields_plus_id() {
        let rows = vec![json!({
            "id": "t1",
            "name": "The Forest Hiker",
            "price": 397.0,
            "difficulty": "easy"
        })];
        let spec = parse(&[("fields", "name,price")]).unwrap();
        let out = spec.project_rows(&rows, &FIELDS).unwrap();
        let obj = out[0].as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("price"));
    }
}
