// tests/sql/dml_test.rs
#[path = "../common/mod.rs"]
mod common;

use common::{club, members_of_club, Club, Visit, CLUB, MEMBER};
use quarry::config::GeneratorSettings;
use quarry::prelude::*;

fn dirty() -> SqlGenerator {
    SqlGenerator::new(GeneratorSettings {
        dirty_read: true,
        inline_numeric_parameters: false,
    })
}

#[test]
fn test_insert_skips_identity() {
    let stmt = SqlGenerator::default().insert(&club(0, "Lions")).unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO [Club] ([Name], [IsActive]) VALUES (@Name, @IsActive)"
    );
    assert_eq!(stmt.params.value("Name"), Some(&Value::Text("Lions".into())));
    assert_eq!(stmt.params.value("IsActive"), Some(&Value::Bool(true)));
    assert_eq!(stmt.params.get("Id"), None);
}

#[test]
fn test_insert_output_renders_identity_as_typed_zero() {
    let stmt = SqlGenerator::default().insert_output(&club(0, "Lions")).unwrap();
    insta::assert_snapshot!(stmt.sql, @"INSERT INTO [Club] ([Name], [IsActive]) OUTPUT CAST(0 AS INT) AS [Id], INSERTED.[Name], INSERTED.[IsActive] VALUES (@Name, @IsActive)");
}

#[test]
fn test_insert_many_reuses_one_template() {
    let stmts = SqlGenerator::default()
        .insert_many(&[club(0, "Lions"), club(0, "Tigers")])
        .unwrap();
    assert_eq!(stmts.len(), 2);
    assert_eq!(stmts[0].sql, stmts[1].sql);
    assert_eq!(stmts[1].params.value("Name"), Some(&Value::Text("Tigers".into())));
}

#[test]
fn test_insert_if_absent() {
    let stmt = dirty()
        .insert_if_absent(&club(0, "Lions"), &field("Name").eq("Lions"))
        .unwrap();
    insta::assert_snapshot!(stmt.sql, @"INSERT INTO [Club] ([Name], [IsActive]) SELECT @Name, @IsActive WHERE NOT EXISTS (SELECT 1 FROM [Club] WITH (NOLOCK) WHERE [Name] = @Name1)");
    assert_eq!(stmt.params.len(), 3);
}

#[test]
fn test_insert_template() {
    let gen = SqlGenerator::default();
    let stmt = gen
        .insert_template(&MEMBER, &Row::new().with("ClubId", 4).with("Name", "Ann"))
        .unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO [Member] ([ClubId], [FullName]) VALUES (@ClubId, @Name)"
    );

    let err = gen
        .insert_template(&MEMBER, &Row::new().with("Name", "Ann"))
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::MissingRequiredColumns { ref entity, ref columns }
            if entity == "Member" && columns == &vec!["ClubId".to_string()]
    ));
    assert_eq!(err.category(), quarry::ErrorCategory::Shape);
}

#[test]
fn test_update_never_hints_the_target() {
    let stmt = dirty()
        .update(
            &CLUB,
            &Row::new().with("Name", "Lions").with("IsActive", false),
            &field("Id").eq(7),
        )
        .unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE [Club] SET [Name] = @Name, [IsActive] = @IsActive WHERE [Id] = @Id"
    );
}

#[test]
fn test_update_rejects_unmapped_assignment() {
    let err = SqlGenerator::default()
        .update(&CLUB, &Row::new().with("Members", 1), &field("Id").eq(7))
        .unwrap_err();
    assert!(matches!(err, QueryError::NotMapped { .. }));
}

#[test]
fn test_upsert_fallback_insert_shares_assignments() {
    let stmt = SqlGenerator::default()
        .upsert(
            &CLUB,
            &Row::new().with("Name", "Lions").with("IsActive", true),
            &field("Name").eq("Lions"),
        )
        .unwrap();
    insta::assert_snapshot!(stmt.sql, @"UPDATE [Club] SET [Name] = @Name, [IsActive] = @IsActive WHERE [Name] = @Name1; IF @@ROWCOUNT = 0 INSERT INTO [Club] ([Name], [IsActive]) VALUES (@Name, @IsActive)");

    let (update, insert) = stmt.sql.split_once("; IF @@ROWCOUNT = 0 ").unwrap();
    assert!(update.contains("SET [Name] = @Name, [IsActive] = @IsActive "));
    assert!(insert.ends_with("VALUES (@Name, @IsActive)"));
    assert_eq!(stmt.params.len(), 3);
}

#[test]
fn test_bulk_insert_ships_rows_in_table_parameter() {
    let stmt = SqlGenerator::default()
        .bulk_insert(&[club(0, "Lions"), club(0, "Tigers")])
        .unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO [Club] ([Name], [IsActive]) SELECT [Name], [IsActive] FROM @ClubRows"
    );
    assert!(stmt.params.is_empty());

    let tvp = stmt.table_parameter.unwrap();
    assert_eq!(tvp.name, "ClubRows");
    assert_eq!(tvp.type_name, "dbo.ClubTableType");
    assert_eq!(tvp.columns, vec!["Name", "IsActive"]);
    assert_eq!(
        tvp.rows,
        vec![
            vec![Value::Text("Lions".into()), Value::Bool(true)],
            vec![Value::Text("Tigers".into()), Value::Bool(true)],
        ]
    );
    let json: serde_json::Value = serde_json::from_str(&tvp.to_json().unwrap()).unwrap();
    assert_eq!(json["type_name"], "dbo.ClubTableType");
    assert_eq!(json["rows"].as_array().unwrap().len(), 2);
}

#[test]
fn test_bulk_requires_table_type_and_rows() {
    let gen = SqlGenerator::default();
    assert!(matches!(
        gen.bulk_insert(&[Visit::default()]),
        Err(QueryError::MissingTableType(ref name)) if name == "Visit"
    ));
    assert!(matches!(
        gen.bulk_insert::<Club>(&[]),
        Err(QueryError::EmptyBulk(_))
    ));
}

#[test]
fn test_bulk_update_matches_on_template_members() {
    let stmt = SqlGenerator::default()
        .bulk_update(&[club(1, "Lions"), club(2, "Tigers")], &field("Id").eq(0))
        .unwrap();
    insta::assert_snapshot!(stmt.sql, @"UPDATE clb1 SET clb1.[Name] = src.[Name], clb1.[IsActive] = src.[IsActive] FROM [Club] clb1 INNER JOIN @ClubRows src ON clb1.[Id] = src.[Id]");
    let tvp = stmt.table_parameter.unwrap();
    assert_eq!(tvp.columns, vec!["Id", "Name", "IsActive"]);
    assert_eq!(tvp.rows[1][0], Value::Int(2));
}

#[test]
fn test_bulk_upsert_inserts_unmatched_rows() {
    let stmt = dirty()
        .bulk_upsert(&[club(1, "Lions")], &field("Name").eq(""))
        .unwrap();
    insta::assert_snapshot!(stmt.sql, @"UPDATE clb1 SET clb1.[IsActive] = src.[IsActive] FROM [Club] clb1 INNER JOIN @ClubRows src ON clb1.[Name] = src.[Name]; INSERT INTO [Club] ([Name], [IsActive]) SELECT src.[Name], src.[IsActive] FROM @ClubRows src WHERE NOT EXISTS (SELECT 1 FROM [Club] clb1 WITH (NOLOCK) WHERE clb1.[Name] = src.[Name])");
}

#[test]
fn test_delete() {
    let stmt = dirty()
        .delete(&CLUB, &list([17, 25]).contains(field("Id")))
        .unwrap();
    assert_eq!(stmt.sql, "DELETE FROM [Club] WHERE ([Id] = @Id OR [Id] = @Id1)");
}

#[test]
fn test_delete_joined_hints_only_joined_tables() {
    let stmt = dirty()
        .delete_joined(&CLUB, &[members_of_club()], &member(1, "Name").eq("Ann"))
        .unwrap();
    insta::assert_snapshot!(stmt.sql, @"DELETE clb1 FROM [Club] clb1 INNER JOIN [Member] mmbr2 WITH (NOLOCK) ON clb1.[Id] = mmbr2.[ClubId] WHERE mmbr2.[FullName] = @Name");
}
