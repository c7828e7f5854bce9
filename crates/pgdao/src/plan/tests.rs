//! Tests for the query builder.

use super::*;
use crate::meta::{ColumnMeta, FieldType};

static ORDER_COLUMNS: [ColumnMeta; 5] = [
    ColumnMeta {
        field: "id",
        column: "id",
        kind: ColumnKind::Int,
        nullable: true,
        references: None,
    },
    ColumnMeta {
        field: "orderDate",
        column: "order_date",
        kind: <NaiveDateTime as FieldType>::KIND,
        nullable: false,
        references: None,
    },
    ColumnMeta {
        field: "status",
        column: "status",
        kind: ColumnKind::Text,
        nullable: false,
        references: None,
    },
    ColumnMeta {
        field: "total",
        column: "total",
        kind: ColumnKind::Float,
        nullable: false,
        references: None,
    },
    ColumnMeta {
        field: "customerId",
        column: "customer_id",
        kind: ColumnKind::Int,
        nullable: true,
        references: Some("Customer"),
    },
];

static ORDER: EntityMeta = EntityMeta {
    name: "Order",
    table: "orders",
    id_column: "id",
    columns: &ORDER_COLUMNS,
};

static CUSTOMER_COLUMNS: [ColumnMeta; 3] = [
    ColumnMeta {
        field: "id",
        column: "id",
        kind: ColumnKind::Int,
        nullable: true,
        references: None,
    },
    ColumnMeta {
        field: "name",
        column: "name",
        kind: ColumnKind::Text,
        nullable: false,
        references: None,
    },
    ColumnMeta {
        field: "birthDate",
        column: "birth_date",
        kind: ColumnKind::Date,
        nullable: true,
        references: None,
    },
];

static CUSTOMER: EntityMeta = EntityMeta {
    name: "Customer",
    table: "customers",
    id_column: "id",
    columns: &CUSTOMER_COLUMNS,
};

fn registry() -> Registry {
    Registry::new().with(&ORDER).with(&CUSTOMER)
}

fn build_with(config: &StoreConfig, request: PlanRequest) -> DaoResult<QueryPlan> {
    let registry = registry();
    QueryBuilder::new(config, &registry).build(&request)
}

fn build(request: PlanRequest) -> DaoResult<QueryPlan> {
    build_with(&StoreConfig::default(), request)
}

fn ts(y: i32, m: u32, d: u32) -> Value {
    Value::Timestamp(
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    )
}

#[test]
fn test_predicate_per_condition_with_distinct_slots() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::eq("status", "open"))
            .condition(Condition::ne("status", "void"))
            .condition(Condition::ge("total", 10))
            .condition(Condition::le("total", 99.5))
            .condition(Condition::is_not_null("customerId")),
    )
    .unwrap();

    assert_eq!(plan.predicates.len(), 5);
    let slots: Vec<&str> = plan.predicates.iter().flat_map(|p| p.slots()).collect();
    let unique: HashSet<&str> = slots.iter().copied().collect();
    assert_eq!(slots.len(), unique.len());
    assert_eq!(plan.binds.len(), 4);
    assert_eq!(
        plan.where_clause(),
        "status = :status AND status != :status2 AND total >= :total AND total <= :total2 \
         AND customer_id IS NOT NULL"
    );
}

#[test]
fn test_two_date_bounds_on_same_field_keep_both() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::gt("orderDate", "01-Jan-24"))
            .condition(Condition::lt("orderDate", "01-Feb-24")),
    )
    .unwrap();

    let clause = plan.where_clause();
    assert_eq!(clause, "order_date > :orderDate AND order_date < :orderDate2");
    assert_eq!(plan.bind("orderDate"), Some(&ts(2024, 1, 1)));
    assert_eq!(plan.bind("orderDate2"), Some(&ts(2024, 2, 1)));
}

#[test]
fn test_date_literal_on_date_column_binds_date() {
    let plan = build(
        PlanRequest::new("Customer").condition(Condition::ge("birthDate", "21-Nov-94")),
    )
    .unwrap();
    assert_eq!(
        plan.bind("birthDate"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(1994, 11, 21).unwrap()))
    );
}

#[test]
fn test_bad_date_literal_is_validation_error() {
    let err = build(PlanRequest::new("Order").condition(Condition::gt("orderDate", "2024-01-01")))
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("orderDate"));
}

#[test]
fn test_like_keeps_caller_wildcards() {
    let plan = build(PlanRequest::new("Order").condition(Condition::like("status", "op%"))).unwrap();
    assert_eq!(plan.where_clause(), "status LIKE :status");
    assert_eq!(plan.bind("status"), Some(&Value::Text("op%".into())));
}

#[test]
fn test_in_list_binds_each_element() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::in_list("status", vec!["open", "paid"]))
            .condition(Condition::not_in("id", vec![1, 2, 3])),
    )
    .unwrap();

    assert_eq!(
        plan.where_clause(),
        "status IN (:status_0, :status_1) AND id NOT IN (:id_0, :id_1, :id_2)"
    );
    assert_eq!(plan.binds.len(), 5);
    assert_eq!(plan.bind("id_2"), Some(&Value::Int(3)));
}

#[test]
fn test_empty_in_list() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::in_list("id", Vec::<i64>::new()))
            .condition(Condition::not_in("id", Vec::<i64>::new())),
    )
    .unwrap();
    assert_eq!(plan.where_clause(), "1=0 AND 1=1");
    assert!(plan.binds.is_empty());
}

#[test]
fn test_between_uses_lo_hi_slots() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::between("orderDate", "01-Jan-24", "31-Jan-24"))
            .condition(Condition::between("total", 1, 5)),
    )
    .unwrap();
    assert_eq!(
        plan.where_clause(),
        "order_date BETWEEN :orderDate_lo AND :orderDate_hi AND total BETWEEN :total_lo AND :total_hi"
    );
    assert_eq!(plan.bind("orderDate_hi"), Some(&ts(2024, 1, 31)));
}

#[test]
fn test_between_missing_bound_fails() {
    let broken = Condition::new("total", Operator::Between, Some(Value::Int(1)), None);
    assert!(build(PlanRequest::new("Order").condition(broken)).unwrap_err().is_validation());
}

#[test]
fn test_slot_names_never_collide() {
    // A field literally named like a generated suffix still gets its own slot.
    let config = StoreConfig::default().strict_fields(false);
    let plan = build_with(
        &config,
        PlanRequest::new("Order")
            .condition(Condition::eq("total", 1))
            .condition(Condition::eq("total", 2))
            .condition(Condition::eq("total2", 3)),
    )
    .unwrap();
    let slots: Vec<&str> = plan.binds.iter().map(|b| b.slot.as_str()).collect();
    assert_eq!(slots, vec!["total", "total2", "total2_2"]);
}

#[test]
fn test_unknown_field_rejected_when_strict() {
    let err = build(PlanRequest::new("Order").condition(Condition::eq("nmae", "x"))).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("nmae"));
}

#[test]
fn test_unknown_field_passes_when_lenient() {
    let config = StoreConfig::default().strict_fields(false);
    let plan = build_with(
        &config,
        PlanRequest::new("Order").condition(Condition::eq("legacy_flag", true)),
    )
    .unwrap();
    assert_eq!(plan.where_clause(), "legacy_flag = :legacy_flag");
}

#[test]
fn test_injection_in_field_name_rejected_even_when_lenient() {
    let config = StoreConfig::default().strict_fields(false);
    let err = build_with(
        &config,
        PlanRequest::new("Order").condition(Condition::eq("status = 'x' OR 1=1 --", 1)),
    )
    .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_values_never_reach_query_text() {
    let hostile = "'; DROP TABLE orders; --";
    let plan = build(PlanRequest::new("Order").condition(Condition::eq("status", hostile))).unwrap();
    let stmt = plan.to_sql().unwrap();
    assert!(!stmt.sql.contains("DROP"));
    assert_eq!(stmt.params, vec![Value::Text(hostile.into())]);
}

#[test]
fn test_order_by_and_pagination() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::eq("status", "open"))
            .order_by("orderDate", SortDirection::Desc)
            .offset(20)
            .limit(10),
    )
    .unwrap();

    assert_eq!(
        plan.to_named_sql().unwrap(),
        "SELECT id, order_date, status, total, customer_id FROM orders \
         WHERE status = :status ORDER BY order_date DESC"
    );

    let stmt = plan.to_sql().unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, order_date, status, total, customer_id FROM orders \
         WHERE status = $1 ORDER BY order_date DESC LIMIT $2 OFFSET $3"
    );
    assert_eq!(
        stmt.params,
        vec![Value::Text("open".into()), Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn test_empty_sort_field_means_no_ordering() {
    let plan = build(PlanRequest::new("Order").order_by("", SortDirection::Asc)).unwrap();
    assert!(plan.order.is_none());
    assert!(!plan.to_named_sql().unwrap().contains("ORDER BY"));
}

#[test]
fn test_unknown_sort_field_rejected() {
    assert!(
        build(PlanRequest::new("Order").order_by("bogus", SortDirection::Asc))
            .unwrap_err()
            .is_validation()
    );
}

#[test]
fn test_sort_direction_parse() {
    assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
    assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
    assert!("sideways".parse::<SortDirection>().is_err());
    assert_eq!(SortDirection::from_ascending(false), SortDirection::Desc);
}

#[test]
fn test_max_page_size_clamps_limit() {
    let config = StoreConfig::default().max_page_size(50);
    let plan = build_with(&config, PlanRequest::new("Order").limit(500)).unwrap();
    assert_eq!(plan.page.limit, Some(50));
}

#[test]
fn test_empty_target_has_no_source() {
    let plan = build(PlanRequest::new("").condition(Condition::eq("status", "open"))).unwrap();
    assert!(plan.root.is_none());
    assert!(plan.to_named_sql().unwrap_err().is_validation());
    assert!(plan.to_sql().unwrap_err().is_validation());
}

#[test]
fn test_unknown_target_rejected() {
    assert!(build(PlanRequest::new("Invoice")).unwrap_err().is_validation());
}

#[test]
fn test_legacy_multi_type_target_joins_through_reference() {
    let plan = build(
        PlanRequest::new("Order,Customer")
            .condition(Condition::eq("cus.name", "Ada"))
            .condition(Condition::eq("status", "open")),
    )
    .unwrap();

    assert_eq!(
        plan.to_named_sql().unwrap(),
        "SELECT ord.id, ord.order_date, ord.status, ord.total, ord.customer_id \
         FROM orders ord INNER JOIN customers cus ON ord.customer_id = cus.id \
         WHERE cus.name = :cus_name AND ord.status = :status"
    );
}

#[test]
fn test_legacy_join_can_be_disabled() {
    let config = StoreConfig::default().legacy_joins(false);
    assert!(
        build_with(&config, PlanRequest::new("Order,Customer"))
            .unwrap_err()
            .is_validation()
    );
}

#[test]
fn test_legacy_join_without_reference_fails() {
    assert!(build(PlanRequest::new("Customer,Customer")).unwrap_err().is_validation());
}

#[test]
fn test_explicit_join() {
    let plan = build(
        PlanRequest::new("Order")
            .join_as("Customer", "c", "ord.customerId", "c.id")
            .condition(Condition::like("c.name", "A%")),
    )
    .unwrap();
    let sql = plan.to_named_sql().unwrap();
    assert!(sql.contains("FROM orders ord INNER JOIN customers c ON ord.customer_id = c.id"));
    assert!(sql.ends_with("WHERE c.name LIKE :c_name"));
}

#[test]
fn test_count_sql() {
    let plan = build(
        PlanRequest::new("Order")
            .condition(Condition::gt("total", 5))
            .limit(3),
    )
    .unwrap();
    let stmt = plan.to_count_sql().unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM orders WHERE total > $1");
    assert_eq!(stmt.params, vec![Value::Int(5)]);
}
