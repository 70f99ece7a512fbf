/// Filter / order DSL tests
///
/// Traversal through Record::find, Record::find_all and the open cursor.
/// Run with: cargo test --test query_dsl_tests
use persistdb::{
    ColumnDef, EntityMeta, FieldValue, FilterSpec, LoggingConnection, MemoryConnection, OrderSpec,
    PersistConfig, Record, SchemaIntrospector, SqlValue, TableDef,
};
use std::sync::Arc;

fn database() -> LoggingConnection<MemoryConnection> {
    let conn = MemoryConnection::new()
        .with_table(
            TableDef::new("users")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("name", "varchar(50)"))
                .column(ColumnDef::new("age", "int(3)"))
                .column(ColumnDef::new("status", "varchar(10)")),
        )
        .unwrap()
        .with_table(
            TableDef::new("posts")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("title", "varchar(100)"))
                .column(ColumnDef::new("flags", "set('draft','featured','archived')")),
        )
        .unwrap()
        .with_table(
            TableDef::new("labels")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("tag", "varchar(10)"))
                .column(ColumnDef::new("tag_0", "varchar(10)")),
        )
        .unwrap()
        .with_table(
            TableDef::new("switches")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("bits", &sixty_four_labels())),
        )
        .unwrap();
    LoggingConnection::new(conn)
}

/// `set('l0',...,'l63')`
fn sixty_four_labels() -> String {
    let labels: Vec<String> = (0..64).map(|i| format!("'l{}'", i)).collect();
    format!("set({})", labels.join(","))
}

fn meta(conn: &LoggingConnection<MemoryConnection>, table: &str) -> Arc<EntityMeta> {
    let meta = SchemaIntrospector::new(conn, PersistConfig::default())
        .entity_meta(table)
        .unwrap();
    conn.clear_history();
    Arc::new(meta)
}

/// users: Ada 36 A, Bob 25 B, Cy 41 C, Dee (no age) A
fn seeded() -> (LoggingConnection<MemoryConnection>, Arc<EntityMeta>) {
    let conn = database();
    let users = meta(&conn, "users");
    for (name, age, status) in [("Ada", Some(36), "A"), ("Bob", Some(25), "B"), ("Cy", Some(41), "C"), ("Dee", None, "A")] {
        let mut user = Record::new(&conn, Arc::clone(&users));
        user.set("name", name).unwrap().set("status", status).unwrap();
        if let Some(age) = age {
            user.set("age", age).unwrap();
        }
        user.insert().unwrap();
    }
    conn.clear_history();
    (conn, users)
}

fn names(conn: &LoggingConnection<MemoryConnection>, users: &Arc<EntityMeta>, filter: FilterSpec, order: OrderSpec) -> Vec<String> {
    Record::find_all(conn, Arc::clone(users), filter, order)
        .unwrap()
        .map(|row| {
            let (_, record) = row.unwrap();
            record.get("name").unwrap().as_text().unwrap().to_string()
        })
        .collect()
}

#[test]
fn test_less_than_renders_greater_than() {
    let (conn, users) = seeded();

    let found = names(&conn, &users, FilterSpec::from([("age", "<30")]), OrderSpec::new());
    assert_eq!(found, vec!["Ada", "Cy"]);

    let select = conn.last_execution().unwrap();
    assert_eq!(
        select.sql,
        "SELECT `users`.`id`, `users`.`name`, `users`.`age`, `users`.`status` FROM `users` WHERE `age` > :age"
    );
    assert_eq!(select.param(":age"), Some(&SqlValue::Integer(30)));

    let found = names(&conn, &users, FilterSpec::from([("age", ">30")]), OrderSpec::new());
    assert_eq!(found, vec!["Bob"]);
}

#[test]
fn test_membership_binds_each_item() {
    let (conn, users) = seeded();

    let found = names(&conn, &users, FilterSpec::from([("status", "~A,C")]), OrderSpec::new());
    assert_eq!(found, vec!["Ada", "Cy", "Dee"]);

    let select = conn.last_execution().unwrap();
    assert!(select.sql.ends_with("WHERE `status` IN (:status_0,:status_1)"));
    assert_eq!(select.param(":status_0"), Some(&SqlValue::Text("A".into())));
    assert_eq!(select.param(":status_1"), Some(&SqlValue::Text("C".into())));
}

#[test]
fn test_combined_predicates_and_order() {
    let (conn, users) = seeded();

    let filter = FilterSpec::new().with("status", "!B").with("name", "*%d%");
    let order = OrderSpec::new().with("age", "DESC");
    let found = names(&conn, &users, filter, order);
    assert_eq!(found, vec!["Ada", "Dee"]);

    let select = conn.last_execution().unwrap();
    assert!(select
        .sql
        .ends_with("WHERE `status` <> :status AND `name` LIKE :name ORDER BY `age` DESC"));
}

#[test]
fn test_order_ascending_by_default() {
    let (conn, users) = seeded();
    let found = names(&conn, &users, FilterSpec::new(), OrderSpec::from([("name", "")]));
    assert_eq!(found, vec!["Ada", "Bob", "Cy", "Dee"]);

    let found = names(&conn, &users, FilterSpec::from([("status", "A")]), OrderSpec::from([("name", "desc")]));
    assert_eq!(found, vec!["Dee", "Ada"]);
}

#[test]
fn test_invalid_input_prepares_nothing() {
    let (conn, users) = seeded();

    let err = Record::find_all(&conn, Arc::clone(&users), FilterSpec::from([("shoe_size", "42")]), OrderSpec::new())
        .unwrap_err();
    assert!(err.is_validation());

    let err = Record::find_all(&conn, Arc::clone(&users), FilterSpec::from([("age", "<old")]), OrderSpec::new())
        .unwrap_err();
    assert!(err.is_validation());

    let err = Record::find(&conn, Arc::clone(&users), FilterSpec::new(), OrderSpec::from([("age", "sideways")]))
        .unwrap_err();
    assert!(err.is_validation());

    let err = Record::find(&conn, users, FilterSpec::new(), OrderSpec::from([("height", "asc")])).unwrap_err();
    assert!(err.is_validation());

    assert_eq!(conn.prepared_count(), 0);
}

#[test]
fn test_find_all_counts_and_is_not_restartable() {
    let (conn, users) = seeded();

    let empty = Record::find_all(&conn, Arc::clone(&users), FilterSpec::from([("status", "Z")]), OrderSpec::new()).unwrap();
    assert_eq!(empty.count(), 0);

    let mut all = Record::find_all(&conn, Arc::clone(&users), FilterSpec::new(), OrderSpec::new()).unwrap();
    let keys: Vec<FieldValue> = all.by_ref().map(|row| row.unwrap().0).collect();
    assert_eq!(
        keys,
        vec![FieldValue::Int(1), FieldValue::Int(2), FieldValue::Int(3), FieldValue::Int(4)]
    );
    assert!(all.next().is_none());
    assert!(all.next().is_none());
}

#[test]
fn test_find_all_yields_independent_records() {
    let (conn, users) = seeded();

    let rows: Vec<_> = Record::find_all(&conn, Arc::clone(&users), FilterSpec::from([("status", "A")]), OrderSpec::new())
        .unwrap()
        .collect::<persistdb::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(rows.len(), 2);

    let (key, mut first) = rows.into_iter().next().unwrap();
    assert_eq!(key, FieldValue::Int(1));
    assert!(first.is_record());

    first.set("age", 37).unwrap();
    first.freeze().unwrap();
    let update = conn.last_execution().unwrap();
    assert_eq!(update.sql, "UPDATE `users` SET `age` = :age WHERE `id` = :__pk");

    let ada = Record::load(&conn, users, 1).unwrap().unwrap();
    assert_eq!(ada.get("age").unwrap(), &FieldValue::Int(37));
}

#[test]
fn test_find_first_and_next() {
    let (conn, users) = seeded();

    let mut cursor = Record::with_query(&conn, users, FilterSpec::from([("status", "A")]), OrderSpec::new()).unwrap();
    assert!(cursor.find_first().unwrap());
    assert_eq!(cursor.get("name").unwrap(), &FieldValue::from("Ada"));
    assert!(cursor.find_next().unwrap());
    assert_eq!(cursor.get("name").unwrap(), &FieldValue::from("Dee"));
    assert!(!cursor.find_next().unwrap());
    assert!(!cursor.is_valid());

    assert!(cursor.find_first().unwrap());
    assert_eq!(cursor.get("name").unwrap(), &FieldValue::from("Ada"));
}

#[test]
fn test_set_where_assigns_operands() {
    let (conn, users) = seeded();

    let mut record = Record::new(&conn, users);
    record.set_where(FilterSpec::from([("age", ">30"), ("status", "~A,B")])).unwrap();
    assert_eq!(record.get("age").unwrap(), &FieldValue::Int(30));
    assert_eq!(record.dirty_fields(), vec!["age"]);
    assert_eq!(record.get("status").unwrap(), &FieldValue::Null);
}

#[test]
fn test_find_returns_first_in_order() {
    let (conn, users) = seeded();

    let oldest = Record::find(&conn, Arc::clone(&users), FilterSpec::new(), OrderSpec::from([("age", "desc")]))
        .unwrap()
        .unwrap();
    assert_eq!(oldest.get("name").unwrap(), &FieldValue::from("Cy"));

    let nobody = Record::find(&conn, users, FilterSpec::from([("name", "Zed")]), OrderSpec::new()).unwrap();
    assert!(nobody.is_none());
}

#[test]
fn test_bitmask_filters() {
    let conn = database();
    let posts = meta(&conn, "posts");

    let mut post = Record::new(&conn, Arc::clone(&posts));
    post.set("title", "Launch").unwrap();
    post.set_flags("flags", &["draft", "archived"]).unwrap();
    assert_eq!(post.get("flags").unwrap(), &FieldValue::Set(5));
    post.insert().unwrap();

    let mut post = Record::new(&conn, Arc::clone(&posts));
    post.set("title", "Roadmap").unwrap();
    post.set("flags", "featured").unwrap();
    assert_eq!(post.get("flags").unwrap(), &FieldValue::Set(2));
    post.insert().unwrap();

    assert_eq!(conn.inner().rows("posts").unwrap()[0][2], SqlValue::Integer(5));
    let launch = Record::load(&conn, Arc::clone(&posts), 1).unwrap().unwrap();
    assert_eq!(launch.get("flags").unwrap(), &FieldValue::Set(5));
    let roadmap = Record::load(&conn, Arc::clone(&posts), 2).unwrap().unwrap();
    assert_eq!(roadmap.get("flags").unwrap(), &FieldValue::Set(2));

    let titles = |filter: FilterSpec| -> Vec<String> {
        Record::find_all(&conn, Arc::clone(&posts), filter, OrderSpec::new())
            .unwrap()
            .map(|row| row.unwrap().1.get("title").unwrap().as_text().unwrap().to_string())
            .collect()
    };
    assert_eq!(titles(FilterSpec::from([("flags", "&4")])), vec!["Launch"]);
    assert_eq!(titles(FilterSpec::from([("flags", "&featured")])), vec!["Roadmap"]);
    assert_eq!(titles(FilterSpec::from([("flags", "^5")])), vec!["Roadmap"]);

    let select = conn.last_execution().unwrap();
    assert!(select.sql.ends_with("WHERE `flags` ^ :flags"));
    assert_eq!(select.param(":flags"), Some(&SqlValue::Integer(5)));

    assert!(post.set_flags("flags", &["pinned"]).unwrap_err().is_validation());
}

#[test]
fn test_membership_next_to_a_field_named_like_its_items() {
    let conn = database();
    let labels = meta(&conn, "labels");
    for (tag, tag_0) in [("a", "x"), ("b", "y"), ("c", "x"), ("b", "x")] {
        let mut label = Record::new(&conn, Arc::clone(&labels));
        label.set("tag", tag).unwrap().set("tag_0", tag_0).unwrap();
        label.insert().unwrap();
    }

    let filter = FilterSpec::new().with("tag", "~a,b").with("tag_0", "x");
    let found: Vec<FieldValue> = Record::find_all(&conn, labels, filter, OrderSpec::new())
        .unwrap()
        .map(|row| row.unwrap().0)
        .collect();
    assert_eq!(found, vec![FieldValue::Int(1), FieldValue::Int(4)]);

    let select = conn.last_execution().unwrap();
    assert!(select.sql.ends_with("WHERE `tag` IN (:tag_0,:tag_1) AND `tag_0` = :tag_0__2"));
    assert_eq!(select.param(":tag_0"), Some(&SqlValue::Text("a".into())));
    assert_eq!(select.param(":tag_0__2"), Some(&SqlValue::Text("x".into())));
}

#[test]
fn test_highest_set_label_round_trips() {
    let conn = database();
    let switches = meta(&conn, "switches");

    let mut switch = Record::new(&conn, Arc::clone(&switches));
    switch.set_flags("bits", &["l0", "l63"]).unwrap();
    assert_eq!(switch.get("bits").unwrap(), &FieldValue::Set(1 | 1 << 63));
    switch.insert().unwrap();
    assert_eq!(conn.inner().rows("switches").unwrap()[0][1], SqlValue::Integer(i64::MIN + 1));

    let loaded = Record::load(&conn, Arc::clone(&switches), 1).unwrap().unwrap();
    assert_eq!(loaded.get("bits").unwrap(), &FieldValue::Set(1 | 1 << 63));

    let found = Record::find(&conn, switches, FilterSpec::from([("bits", "&l63")]), OrderSpec::new())
        .unwrap()
        .unwrap();
    assert_eq!(found.key(), Some(&FieldValue::Int(1)));
}
