// tests/sql/predicate_test.rs
#[path = "../common/mod.rs"]
mod common;

use common::{CARD, CLUB, MEMBER};
use quarry::prelude::*;
use quarry::sql::{compile_predicate, DbString, ParameterSet, Scope};

fn club_scope() -> Scope {
    Scope::single(&CLUB)
}

fn joined_scope() -> Scope {
    Scope::new(vec![&CLUB, &MEMBER, &CARD]).with_aliases(vec![
        "clb1".to_string(),
        "mmbr2".to_string(),
        "crd3".to_string(),
    ])
}

fn compile(expr: &Expr, scope: &Scope) -> QueryResult<(String, ParameterSet)> {
    let mut params = ParameterSet::new();
    let compiled = compile_predicate(expr, scope, &mut params)?;
    Ok((compiled.to_sql(), params))
}

#[test]
fn test_range_predicate_names_both_bounds() {
    let (sql, params) = compile(&field("Id").gt(1).and(field("Id").lt(100)), &club_scope()).unwrap();
    assert_eq!(sql, "([Id] > @Id) AND ([Id] < @Id1)");
    let names: Vec<_> = params.names().collect();
    assert_eq!(names, vec!["Id", "Id1"]);
    assert_eq!(params.value("Id"), Some(&Value::Int(1)));
    assert_eq!(params.value("Id1"), Some(&Value::Int(100)));
}

#[test]
fn test_nested_junctions_are_parenthesized() {
    let expr = field("IsActive")
        .and(field("Name").eq("Lions").or(field("Name").eq("Tigers")));
    let (sql, params) = compile(&expr, &club_scope()).unwrap();
    assert_eq!(
        sql,
        "([IsActive] = 1) AND (([Name] = @Name) OR ([Name] = @Name1))"
    );
    assert_eq!(params.value("Name1"), Some(&Value::Text("Tigers".into())));
}

#[test]
fn test_members_across_positions() {
    let expr = member(0, "Id")
        .eq(member(1, "ClubId"))
        .and(member(2, "Number").starts_with("AB"));
    let (sql, params) = compile(&expr, &joined_scope()).unwrap();
    assert_eq!(
        sql,
        r"(clb1.[Id] = mmbr2.[ClubId]) AND (crd3.[Number] LIKE @Number ESCAPE '\')"
    );
    assert_eq!(params.value("Number"), Some(&Value::Text("AB%".into())));
}

#[test]
fn test_overridden_column_name() {
    let scope = Scope::single(&MEMBER);
    let (sql, params) = compile(&field("Name").equals("Ann"), &scope).unwrap();
    assert_eq!(sql, "[FullName] = @Name");
    assert!(params.contains("Name"));
}

#[test]
fn test_restricted_scope_rejects_later_positions() {
    let scope = joined_scope().restrict(2);
    let err = compile(&member(2, "MemberId").eq(member(1, "Id")), &scope).unwrap_err();
    assert!(matches!(
        err,
        QueryError::PositionOutOfScope {
            position: 2,
            declared: 2
        }
    ));
}

#[test]
fn test_typed_string_wrapping() {
    let (_, params) = compile(&field("Name").eq("Lions"), &club_scope()).unwrap();
    let param = params.get("Name").unwrap();
    assert_eq!(
        param.db_string,
        Some(DbString {
            ansi: true,
            fixed_length: false,
            length: Some(64)
        })
    );
    assert_eq!(param.db_string.unwrap().sql_type(), "varchar(64)");

    let scope = Scope::single(&CARD);
    let (_, params) = compile(&field("Number").eq("12345678"), &scope).unwrap();
    assert_eq!(params.get("Number").unwrap().db_string.unwrap().sql_type(), "char(8)");

    // Numbers are never wrapped.
    let (_, params) = compile(&field("Id").eq(3), &club_scope()).unwrap();
    assert_eq!(params.get("Id").unwrap().db_string, None);
}

#[test]
fn test_inline_numeric_placeholders() {
    let mut params = ParameterSet::with_inline_numeric(true);
    let expr = field("Id").gte(10).and(field("Name").ne("x"));
    let sql = compile_predicate(&expr, &club_scope(), &mut params)
        .unwrap()
        .to_sql();
    assert_eq!(sql, "([Id] >= {=Id}) AND ([Name] <> @Name)");
    assert_eq!(
        params.expand_inline(&sql),
        "([Id] >= 10) AND ([Name] <> @Name)"
    );
}

#[test]
fn test_list_with_null_entry() {
    let expr = Expr::List(vec![Value::Int(4), Value::Null]).contains(field("Id"));
    let (sql, params) = compile(&expr, &club_scope()).unwrap();
    assert_eq!(sql, "([Id] = @Id OR [Id] IS NULL)");
    assert_eq!(params.len(), 1);
}

#[test]
fn test_convert_is_transparent() {
    let (sql, _) = compile(&field("Id").convert().eq(val(7).convert()), &club_scope()).unwrap();
    assert_eq!(sql, "[Id] = @Id");
}

#[test]
fn test_not_equals_method() {
    let (sql, _) = compile(&field("Name").equals("x").not(), &club_scope()).unwrap();
    assert_eq!(sql, "[Name] <> @Name");
}

#[test]
fn test_shape_errors_have_shape_category() {
    let errors = [
        compile(&field("Members").eq(1), &club_scope()).unwrap_err(),
        compile(&field("Nope").eq(1), &club_scope()).unwrap_err(),
        compile(&field("Name").eq(null()).and(field("Id").eq(1)), &club_scope()).unwrap_err(),
        compile(&count(), &club_scope()).unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.category(), quarry::ErrorCategory::Shape, "{err}");
    }
}
