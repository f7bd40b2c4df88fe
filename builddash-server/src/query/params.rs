//! Named parameter binding for caller-supplied SQL
//!
//! Callers write `:name` placeholders; PostgreSQL only understands `$n`.
//! The rewrite skips string literals, quoted identifiers, dollar-quoted
//! bodies, comments, and `::` casts. A name used twice reuses its position.
//!
//! Every placeholder is rendered with an explicit cast to the type its value
//! is bound as. Strings and nulls are bound as text and, when the server
//! infers another type for their position, cast on through text input
//! (`$1::text::timestamptz`), which is how a quoted literal would behave.

use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgTypeInfo};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, TypeInfo};

use super::quote_ident;
use crate::error::{DashError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Sql(String),
    /// 1-based position
    Param(usize),
}

/// SQL with named placeholders replaced by positional ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    /// Rewritten SQL with bare `$n` placeholders
    pub sql: String,
    /// Parameter names in positional order (`names[0]` is `$1`)
    pub names: Vec<String>,
    segments: Vec<Segment>,
}

impl NamedQuery {
    pub fn parse(sql: &str) -> Self {
        let chars: Vec<char> = sql.chars().collect();
        let mut segments = Vec::new();
        let mut text = String::with_capacity(sql.len());
        let mut names: Vec<String> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = skip_quoted(&chars, i, c);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..]
                        .iter()
                        .position(|&ch| ch == '\n')
                        .map_or(chars.len(), |p| i + p);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = find_seq(&chars, i + 2, &['*', '/']).map_or(chars.len(), |p| p + 2);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                '$' => {
                    let end = skip_dollar_quoted(&chars, i).unwrap_or(i + 1);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    text.push_str("::");
                    i += 2;
                }
                // `a:b` is not a placeholder
                ':' if i > 0 && is_ident_char(chars[i - 1]) => {
                    text.push(':');
                    i += 1;
                }
                ':' if chars.get(i + 1).is_some_and(|&ch| is_ident_start(ch)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident_char(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let position = match names.iter().position(|n| *n == name) {
                        Some(p) => p + 1,
                        None => {
                            names.push(name);
                            names.len()
                        }
                    };
                    segments.push(Segment::Sql(std::mem::take(&mut text)));
                    segments.push(Segment::Param(position));
                    i = end;
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }
        segments.push(Segment::Sql(text));

        let mut query = Self {
            sql: String::new(),
            names,
            segments,
        };
        query.sql = query.render(|position| format!("${position}"));
        query
    }

    /// Rebuild the SQL, writing each placeholder with `placeholder(position)`.
    pub fn render<F>(&self, placeholder: F) -> String
    where
        F: Fn(usize) -> String,
    {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Sql(sql) => sql.clone(),
                Segment::Param(position) => placeholder(*position),
            })
            .collect()
    }

    /// Look up a value for every placeholder, in positional order.
    pub fn values<'p>(&self, params: &'p Map<String, Value>) -> Result<Vec<&'p Value>> {
        self.names
            .iter()
            .map(|name| {
                params.get(name).ok_or_else(|| {
                    DashError::QueryFailed(format!("missing value for parameter ':{}'", name))
                })
            })
            .collect()
    }
}

/// Strings and nulls carry no type of their own; the server decides.
pub fn needs_inference(value: &Value) -> bool {
    matches!(value, Value::Null | Value::String(_))
}

/// SQL type a JSON value is bound as by [`bind_json`].
pub fn declared_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "int8",
        Value::Number(_) => "float8",
        Value::Array(_) | Value::Object(_) => "jsonb",
        Value::Null | Value::String(_) => "text",
    }
}

/// Placeholder SQL for `$position`, given the type the server inferred for it.
pub fn placeholder(position: usize, value: &Value, inferred: Option<&PgTypeInfo>) -> String {
    match inferred.and_then(cast_target) {
        Some(target) if needs_inference(value) => format!("(${position}::text::{target})"),
        _ => format!("(${position}::{})", declared_type(value)),
    }
}

/// Type name to cast text into, or `None` when text already fits.
fn cast_target(ty: &PgTypeInfo) -> Option<String> {
    let name = ty.name();
    match name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => None,
        // Built-in names are upper case and valid as written
        _ if name.starts_with('"')
            || name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || "_[]".contains(c)) =>
        {
            Some(name.to_owned())
        }
        _ => Some(quote_ident(name)),
    }
}

/// Bind one JSON value as its [`declared_type`].
pub fn bind_json<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(Json(value.clone())),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// End index (exclusive) of a quoted run opening at `start`; doubled quotes escape.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// End index of a `$tag$ ... $tag$` body opening at `start`, if one opens there.
fn skip_dollar_quoted(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    if chars.get(i) != Some(&'$') {
        return None;
    }
    // `$1` is a positional placeholder, not a tag
    if chars.get(start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let tag = &chars[start..=i];
    let body_end = find_seq(chars, i + 1, tag).map_or(chars.len(), |p| p + tag.len());
    Some(body_end)
}

fn find_seq(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if from > chars.len() {
        return None;
    }
    chars[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_named_placeholders_in_order() {
        let q = NamedQuery::parse("SELECT * FROM assets WHERE site = :site AND kind = :kind");
        assert_eq!(q.sql, "SELECT * FROM assets WHERE site = $1 AND kind = $2");
        assert_eq!(q.names, ["site", "kind"]);
    }

    #[test]
    fn repeated_name_reuses_position() {
        let q = NamedQuery::parse("SELECT :a, :b, :a");
        assert_eq!(q.sql, "SELECT $1, $2, $1");
        assert_eq!(q.names, ["a", "b"]);
    }

    #[test]
    fn casts_are_untouched() {
        let q = NamedQuery::parse("SELECT created_at::date, :since::timestamptz");
        assert_eq!(q.sql, "SELECT created_at::date, $1::timestamptz");
        assert_eq!(q.names, ["since"]);
    }

    #[test]
    fn literals_identifiers_and_comments_are_untouched() {
        let sql = "SELECT ':nope', \"col:x\" -- :also_nope\nFROM t /* :skip */ WHERE id = :id";
        let q = NamedQuery::parse(sql);
        assert_eq!(
            q.sql,
            "SELECT ':nope', \"col:x\" -- :also_nope\nFROM t /* :skip */ WHERE id = $1"
        );
        assert_eq!(q.names, ["id"]);
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let q = NamedQuery::parse("SELECT 'it''s :not' WHERE x = :x");
        assert_eq!(q.sql, "SELECT 'it''s :not' WHERE x = $1");
    }

    #[test]
    fn dollar_quoted_bodies_are_untouched() {
        let q = NamedQuery::parse("SELECT $fn$ :inner $fn$, :outer");
        assert_eq!(q.sql, "SELECT $fn$ :inner $fn$, $1");
        assert_eq!(q.names, ["outer"]);
    }

    #[test]
    fn positional_placeholders_pass_through() {
        let q = NamedQuery::parse("SELECT $1");
        assert_eq!(q.sql, "SELECT $1");
        assert!(q.names.is_empty());
    }

    #[test]
    fn values_follow_positional_order() {
        let q = NamedQuery::parse("SELECT :b, :a");
        let params = json!({"a": 1, "b": "two", "unused": true});
        let values = q.values(params.as_object().unwrap()).unwrap();
        assert_eq!(values, [&json!("two"), &json!(1)]);
    }

    #[test]
    fn colon_after_identifier_is_not_a_placeholder() {
        let q = NamedQuery::parse("SELECT a:b, x = :x");
        assert_eq!(q.sql, "SELECT a:b, x = $1");
        assert_eq!(q.names, ["x"]);
    }

    #[test]
    fn render_casts_to_declared_types() {
        let q = NamedQuery::parse("SELECT * FROM t WHERE id = :id AND tags @> :tags AND ok = :ok");
        let values = [json!(7), json!(["a"]), json!(true)];
        let sql = q.render(|p| placeholder(p, &values[p - 1], None));
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE id = ($1::int8) AND tags @> ($2::jsonb) AND ok = ($3::bool)"
        );
    }

    #[test]
    fn strings_and_nulls_follow_the_inferred_type() {
        assert_eq!(
            placeholder(1, &json!("2024-01-01"), Some(&PgTypeInfo::with_name("TIMESTAMPTZ"))),
            "($1::text::TIMESTAMPTZ)"
        );
        assert_eq!(
            placeholder(2, &Value::Null, Some(&PgTypeInfo::with_name("INT4"))),
            "($2::text::INT4)"
        );
        assert_eq!(
            placeholder(1, &json!("x"), Some(&PgTypeInfo::with_name("VARCHAR"))),
            "($1::text)"
        );
        assert_eq!(placeholder(1, &json!("x"), None), "($1::text)");
    }

    #[test]
    fn inferred_type_does_not_override_typed_values() {
        assert_eq!(
            placeholder(1, &json!(3), Some(&PgTypeInfo::with_name("NUMERIC"))),
            "($1::int8)"
        );
        assert_eq!(
            placeholder(1, &json!(1.5), Some(&PgTypeInfo::with_name("NUMERIC"))),
            "($1::float8)"
        );
    }

    #[test]
    fn custom_type_names_are_quoted() {
        assert_eq!(
            placeholder(1, &json!("happy"), Some(&PgTypeInfo::with_name("Mood"))),
            "($1::text::\"Mood\")"
        );
    }

    #[test]
    fn missing_value_is_query_failure() {
        let q = NamedQuery::parse("SELECT :missing");
        let err = q.values(&Map::new()).unwrap_err();
        assert!(matches!(err, DashError::QueryFailed(ref m) if m.contains(":missing")));
    }
}
