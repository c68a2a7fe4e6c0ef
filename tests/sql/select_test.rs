// tests/sql/select_test.rs
#[path = "../common/mod.rs"]
mod common;

use common::{card_of_member, members_of_club, visits_of_member, widest_club_shape, Club, MEMBER};
use quarry::config::GeneratorSettings;
use quarry::prelude::*;
use quarry::sql::alias_for;

static SALES_CLUB: EntityDescriptor = EntityDescriptor::new(
    "Club",
    &[MemberDescriptor::new("Id").key(), MemberDescriptor::new("Name")],
)
.connection("sales");

static ARCHIVED_MEMBER: EntityDescriptor = EntityDescriptor::new(
    "Member",
    &[MemberDescriptor::new("Id").key(), MemberDescriptor::new("ClubId")],
)
.connection("archive");

static REMOTE_MEMBER: EntityDescriptor = EntityDescriptor::new(
    "Member",
    &[MemberDescriptor::new("Id").key(), MemberDescriptor::new("ClubId")],
)
.connection("remote");

static DEFAULT_DB_MEMBER: EntityDescriptor = EntityDescriptor::new(
    "Member",
    &[MemberDescriptor::new("Id").key(), MemberDescriptor::new("ClubId")],
)
.connection("default_db");

fn registry() -> ConnectionRegistry {
    let mut archive = ConnectionLocator::new("DB01", Some("Archive"));
    archive.default_schema = Some("hist".to_string());
    ConnectionRegistry::new()
        .with("sales", ConnectionLocator::new("db01", Some("Sales")))
        .with("archive", archive)
        .with("remote", ConnectionLocator::new("db02", Some("Sales")))
        .with("default_db", ConnectionLocator::new("db01", None))
}

fn club_to(joined: &'static EntityDescriptor) -> QueryShape {
    QueryShape::new(&SALES_CLUB)
        .join(JoinDescriptor::unbound(joined, 0).on(member(0, "Id").eq(member(1, "ClubId"))))
        .select(Selector::new().item(member(0, "Name")).item(member(1, "Id")))
}

#[test]
fn test_three_level_join_default_select() {
    let shape = QueryShape::of::<Club>()
        .join(members_of_club())
        .join(visits_of_member(1, 2))
        .filter(field("IsActive"));
    let stmt = SqlGenerator::default().select(&shape).unwrap();
    insta::assert_snapshot!(stmt.sql, @"SELECT clb1.[Id], clb1.[Name], clb1.[IsActive], mmbr2.[Id], mmbr2.[ClubId], mmbr2.[FullName] AS [Name], vst3.[Id], vst3.[MemberId], vst3.[Minutes] FROM [Club] clb1 INNER JOIN [Member] mmbr2 ON clb1.[Id] = mmbr2.[ClubId] INNER JOIN [Visit] vst3 ON mmbr2.[Id] = vst3.[MemberId] WHERE clb1.[IsActive] = 1");

    assert_eq!(stmt.split.len(), 2);
    let offsets: Vec<_> = stmt.split.points().iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![3, 6]);
    assert_eq!(stmt.split.split_on(), "Id,Id");
}

#[test]
fn test_left_join_to_schema_table() {
    let shape = QueryShape::of::<Club>()
        .join(members_of_club())
        .join(card_of_member(1, 2))
        .select(
            Selector::new()
                .item(member(0, "Id"))
                .item(member(1, "Id"))
                .item(member(2, "Id"))
                .item(member(2, "Number")),
        );
    let stmt = SqlGenerator::default().select(&shape).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT clb1.[Id], mmbr2.[Id], crd3.[Id], crd3.[Number] FROM [Club] clb1 \
         INNER JOIN [Member] mmbr2 ON clb1.[Id] = mmbr2.[ClubId] \
         LEFT JOIN [billing].[Card] crd3 ON mmbr2.[Id] = crd3.[MemberId]"
    );
}

#[test]
fn test_selector_must_cover_every_joined_table() {
    let gen = SqlGenerator::default();
    let uncovered = QueryShape::of::<Club>()
        .join(members_of_club())
        .select(Selector::new().item(member(0, "Name")));
    assert!(matches!(
        gen.select(&uncovered),
        Err(QueryError::UncoveredJoin(ref name)) if name == "Member"
    ));

    let complete = QueryShape::of::<Club>().join(members_of_club()).select(
        Selector::new()
            .item(member(1, "Name"))
            .item(member(0, "Id"))
            .item(member(0, "Name")),
    );
    let stmt = gen.select(&complete).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT clb1.[Id], clb1.[Name], mmbr2.[FullName] AS [Name] FROM [Club] clb1 \
         INNER JOIN [Member] mmbr2 ON clb1.[Id] = mmbr2.[ClubId]"
    );
    assert_eq!(stmt.split.len(), 1);
    assert_eq!(stmt.split.points()[0].offset, 2);
}

#[test]
fn test_empty_selector() {
    let shape = QueryShape::of::<Club>().select(Selector::new());
    assert!(matches!(
        SqlGenerator::default().select(&shape),
        Err(QueryError::EmptySelector)
    ));
}

#[test]
fn test_seven_table_chain() {
    let stmt = SqlGenerator::default().select(&widest_club_shape()).unwrap();
    assert_eq!(stmt.split.len(), 6);
    let offsets: Vec<_> = stmt.split.points().iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![3, 6, 9, 12, 15, 18]);
    assert!(stmt.sql.ends_with(
        "INNER JOIN [Member] mmbr5 ON clb1.[Id] = mmbr5.[ClubId] \
         LEFT JOIN [billing].[Card] crd6 ON mmbr5.[Id] = crd6.[MemberId] \
         INNER JOIN [Visit] vst7 ON mmbr5.[Id] = vst7.[MemberId]"
    ));
}

#[test]
fn test_join_chain_shape_errors() {
    let gen = SqlGenerator::default();

    let mut wide = QueryShape::of::<Club>();
    for _ in 0..7 {
        wide = wide.join(members_of_club());
    }
    assert!(matches!(gen.select(&wide), Err(QueryError::JoinFanOut(8))));

    let forward = QueryShape::of::<Club>().join(visits_of_member(2, 1));
    assert!(matches!(
        gen.select(&forward),
        Err(QueryError::InvalidNavigation { parent: 2, .. })
    ));

    let bare = QueryShape::of::<Club>().join(JoinDescriptor::unbound(&MEMBER, 0));
    assert!(matches!(
        gen.select(&bare),
        Err(QueryError::MissingJoinCondition(ref name)) if name == "Member"
    ));
}

#[test]
fn test_join_condition_sees_only_declared_positions() {
    let shape = QueryShape::of::<Club>()
        .join(members_of_club().on(member(0, "Id").eq(member(2, "MemberId"))))
        .join(visits_of_member(1, 2));
    assert!(matches!(
        SqlGenerator::default().select(&shape),
        Err(QueryError::PositionOutOfScope {
            position: 2,
            declared: 2
        })
    ));
}

#[test]
fn test_paging() {
    let gen = SqlGenerator::default();
    let ordered = QueryShape::of::<Club>()
        .select(Selector::new().item(field("Name")))
        .order_by(OrderBy::asc(field("Name")))
        .skip(3)
        .take(2);
    insta::assert_snapshot!(gen.select(&ordered).unwrap().sql, @"SELECT clb1.[Name] FROM [Club] clb1 ORDER BY clb1.[Name] ASC OFFSET 3 ROWS FETCH NEXT 2 ROWS ONLY");

    let top = QueryShape::of::<Club>()
        .select(Selector::new().item(field("Name")))
        .distinct()
        .take(2);
    assert_eq!(
        gen.select(&top).unwrap().sql,
        "SELECT DISTINCT TOP(2) clb1.[Name] FROM [Club] clb1"
    );
}

#[test]
fn test_dirty_read_on_every_read_reference() {
    let gen = SqlGenerator::new(GeneratorSettings {
        dirty_read: true,
        inline_numeric_parameters: false,
    });
    let shape = QueryShape::of::<Club>()
        .join(members_of_club())
        .select(Selector::new().item(member(0, "Id")).item(member(1, "Id")));
    assert_eq!(
        gen.select(&shape).unwrap().sql,
        "SELECT clb1.[Id], mmbr2.[Id] FROM [Club] clb1 WITH (NOLOCK) \
         INNER JOIN [Member] mmbr2 WITH (NOLOCK) ON clb1.[Id] = mmbr2.[ClubId]"
    );

    // A per-query override wins over the generator setting.
    let clean = gen.select(&shape.dirty_read(false)).unwrap();
    assert!(!clean.sql.contains("NOLOCK"));
}

#[test]
fn test_grouped_projection_over_join() {
    let shape = QueryShape::of::<Club>()
        .join(members_of_club())
        .filter(member(0, "IsActive"))
        .group_by(
            vec![member(0, "Name")],
            GroupProjection::new()
                .column("Club", member(0, "Name"))
                .column("Members", count())
                .column("AverageId", avg(member(1, "Id"))),
        )
        .order_by(OrderBy::asc(member(0, "Name")))
        .skip(10)
        .take(5);
    let stmt = SqlGenerator::default().select(&shape).unwrap();
    insta::assert_snapshot!(stmt.sql, @"SELECT * FROM (SELECT clb1.[Name] AS [Club], COUNT(*) AS [Members], AVG(CAST(mmbr2.[Id] AS DECIMAL(38, 6))) AS [AverageId] FROM [Club] clb1 INNER JOIN [Member] mmbr2 ON clb1.[Id] = mmbr2.[ClubId] WHERE clb1.[IsActive] = 1 GROUP BY clb1.[Name]) [__T__] ORDER BY [Club] ASC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY");
    assert!(stmt.split.is_empty());
}

#[test]
fn test_grouped_projection_rejects_ungrouped_member() {
    let shape = QueryShape::of::<Club>().group_by(
        vec![field("Name")],
        GroupProjection::new().column("Id", field("Id")),
    );
    assert!(matches!(
        SqlGenerator::default().select(&shape),
        Err(QueryError::UnsupportedExpression(_))
    ));
}

#[test]
fn test_cross_database_join_is_qualified() {
    let gen = SqlGenerator::default().with_registry(registry());
    let stmt = gen.select(&club_to(&ARCHIVED_MEMBER)).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT clb1.[Name], mmbr2.[Id] FROM [Club] clb1 \
         INNER JOIN [Archive].[hist].[Member] mmbr2 ON clb1.[Id] = mmbr2.[ClubId]"
    );
}

#[test]
fn test_cross_server_join_is_rejected() {
    let gen = SqlGenerator::default().with_registry(registry());
    let err = gen.select(&club_to(&REMOTE_MEMBER)).unwrap_err();
    assert!(matches!(err, QueryError::DifferentServer { .. }));
    assert_eq!(err.category(), quarry::ErrorCategory::Topology);
}

#[test]
fn test_join_into_unnamed_database_is_rejected() {
    let gen = SqlGenerator::default().with_registry(registry());
    let err = gen.select(&club_to(&DEFAULT_DB_MEMBER)).unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownDatabase { ref base, ref joined } if base == "Club" && joined == "Member"
    ));
    assert_eq!(err.category(), quarry::ErrorCategory::Topology);
}

#[test]
fn test_undeclared_and_ambiguous_connections() {
    let gen = SqlGenerator::default().with_registry(registry());
    let shape = QueryShape::of::<Club>()
        .join(members_of_club())
        .select(Selector::new().item(member(0, "Id")).item(member(1, "Id")));
    assert!(matches!(
        gen.select(&shape),
        Err(QueryError::AmbiguousConnection(_))
    ));

    let only = SqlGenerator::default().with_registry(
        ConnectionRegistry::new().with("sales", ConnectionLocator::new("db01", Some("Sales"))),
    );
    assert!(matches!(
        only.select(&club_to(&ARCHIVED_MEMBER)),
        Err(QueryError::ConnectionNotDeclared(ref name)) if name == "archive"
    ));
}

#[test]
fn test_aliases_follow_type_and_position() {
    assert_eq!(alias_for("Club", 0), "clb1");
    assert_eq!(alias_for("Member", 1), "mmbr2");
    assert_eq!(alias_for("Visit", 2), "vst3");
    assert_eq!(alias_for("Card", 2), "crd3");
}
