use streamql::streamql::sql::ast::{classify_expression, ExprKind, SortDirection};
use streamql::streamql::sql::parser::Parser;

#[test]
fn test_classify_expression() {
    let cases = [
        ("deviceId", ExprKind::Field),
        ("avg(temperature/10)", ExprKind::Func),
        (
            "format_time(window_start(),'YYYY-MM-dd HH:mm:ss')",
            ExprKind::Func,
        ),
        ("lag(temperature)OVER(PARTITION BY deviceId)", ExprKind::Func),
        ("TumblingWindow('10s')", ExprKind::Win),
        ("SlidingWindow('1m')", ExprKind::Win),
        ("SessionWindow('30s')", ExprKind::Win),
        ("temperature/10", ExprKind::Expr),
        ("a+b+c/d", ExprKind::Expr),
        ("cast(temperature,'bigint')", ExprKind::Func),
        ("not ] an expression", ExprKind::Field),
    ];
    for (expr, expected) in cases {
        assert_eq!(classify_expression(expr), expected, "expr: {}", expr);
    }
}

#[test]
fn test_projection_metadata() {
    let sql = "select deviceId, avg(temperature/10) as aa,\
               format_time(window_start(), 'YYYY-MM-dd HH:mm:ss') as start , \
               cast(temperature,  'bigint') as big_temp, \
               lag(temperature) OVER (PARTITION BY deviceId) \
               from Input where deviceId='aa' group by deviceId, TumblingWindow('10s')\
               Order By start desc,deviceId asc \
               having avg(temperature/10) > 5 ";
    let stmt = Parser::new(sql).parse().expect("query should parse");
    let projection = &stmt.context.projection;

    assert_eq!(projection.len(), 5);

    assert_eq!(projection[0].expression, "deviceId");
    assert_eq!(projection[0].name, "deviceId");
    assert_eq!(projection[0].alias, None);
    assert_eq!(projection[0].kind, ExprKind::Field);

    assert_eq!(projection[1].expression, "avg(temperature/10)");
    assert_eq!(projection[1].name, "avg(temperature/10)");
    assert_eq!(projection[1].alias.as_deref(), Some("aa"));
    assert_eq!(projection[1].kind, ExprKind::Func);
    assert_eq!(projection[1].args, vec!["temperature/10"]);

    assert_eq!(
        projection[2].expression,
        "format_time(window_start(), 'YYYY-MM-dd HH:mm:ss')"
    );
    assert_eq!(projection[2].alias.as_deref(), Some("start"));
    assert_eq!(projection[2].kind, ExprKind::Func);
    assert_eq!(
        projection[2].args,
        vec!["window_start()", "YYYY-MM-dd HH:mm:ss"]
    );

    assert_eq!(projection[3].expression, "cast(temperature, 'bigint')");
    assert_eq!(projection[3].alias.as_deref(), Some("big_temp"));
    assert_eq!(projection[3].kind, ExprKind::Func);
    assert_eq!(projection[3].args, vec!["temperature", "bigint"]);

    assert_eq!(
        projection[4].expression,
        "lag(temperature) OVER (PARTITION BY deviceId)"
    );
    assert_eq!(projection[4].name, "lag(temperature)");
    assert_eq!(projection[4].alias, None);
    assert_eq!(projection[4].kind, ExprKind::Func);
    assert_eq!(projection[4].args, vec!["temperature"]);
}

#[test]
fn test_over_clause_metadata() {
    let sql = "select lag(temperature) OVER (PARTITION BY deviceId ORDER BY ts desc) as prev \
               from Input group by deviceId, TumblingWindow('10s')";
    let stmt = Parser::new(sql).parse().expect("query should parse");
    let meta = &stmt.context.projection[0];

    assert_eq!(meta.name, "lag(temperature)");
    let over = meta.over_clause.as_ref().expect("OVER clause surfaced");
    assert_eq!(over.partition_by, vec!["deviceId"]);
    assert_eq!(
        over.order_by,
        vec![("ts".to_string(), SortDirection::Desc)]
    );
}

#[test]
fn test_window_call_metadata() {
    let sql = "select deviceId from Input group by deviceId, TumblingWindow('10s')";
    let stmt = Parser::new(sql).parse().expect("query should parse");

    let window = stmt.context.window.as_ref().expect("window call surfaced");
    assert_eq!(window.kind, ExprKind::Win);
    assert_eq!(stmt.group_by, vec!["deviceId"]);
    assert_eq!(stmt.context.group_by.len(), 1);
    assert_eq!(stmt.context.group_by[0].kind, ExprKind::Field);
}
