//! End-to-end integration tests for aggregation, grouping, and result ordering.
//!
//! Tests count, sum, collect, DISTINCT, ORDER BY, SKIP, LIMIT, and grouped aggregation.

use graphdb::{Graph, PropertyMap, Value};

fn setup_people() -> Graph {
    let graph = Graph::open_memory().unwrap();

    let people = [("Alice", 25), ("Bob", 30), ("Charlie", 35), ("Diana", 28), ("Eve", 22)];

    for (name, age) in &people {
        graph
            .run(&format!("CREATE (n:Person {{name: '{name}', age: {age}}})"), PropertyMap::new())
            .unwrap();
    }

    graph
}

#[test]
fn test_count_all() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN count(n)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let count: i64 = result.rows[0].get("count(n)").unwrap();
    assert_eq!(count, 5);
}

#[test]
fn test_count_with_filter() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) WHERE n.age > 27 RETURN count(n)", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let count: i64 = result.rows[0].get("count(n)").unwrap();
    // Bob(30), Charlie(35), Diana(28) = 3 people over 27
    assert_eq!(count, 3);
}

#[test]
fn test_sum_aggregate() {
    let graph = Graph::open_memory().unwrap();

    let items = [("Widget", 10), ("Gadget", 25), ("Doohickey", 15)];

    for (name, price) in &items {
        graph
            .run(&format!("CREATE (n:Item {{name: '{name}', price: {price}}})"), PropertyMap::new())
            .unwrap();
    }

    let result = graph.run("MATCH (n:Item) RETURN sum(n.price)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let total: i64 = result.rows[0].get("sum(n.price)").unwrap();
    assert_eq!(total, 50); // 10 + 25 + 15
}

#[test]
fn test_distinct_values() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Charlie'})", PropertyMap::new()).unwrap();

    let result = graph.run("MATCH (n:Person) RETURN DISTINCT n.name", PropertyMap::new()).unwrap();

    let names: Vec<String> = result.rows.iter().map(|row| row.get::<String>("n.name").unwrap()).collect();

    assert_eq!(names.len(), 3, "Expected 3 distinct names, got {:?}", names);
    assert!(names.contains(&"Alice".to_string()));
    assert!(names.contains(&"Bob".to_string()));
    assert!(names.contains(&"Charlie".to_string()));
}

#[test]
fn test_order_by_ascending() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) RETURN n.name ORDER BY n.name", PropertyMap::new())
        .unwrap();

    let names: Vec<String> = result.rows.iter().map(|row| row.get::<String>("n.name").unwrap()).collect();

    assert_eq!(names.len(), 5);
    assert_eq!(names, vec!["Alice", "Bob", "Charlie", "Diana", "Eve"]);
}

#[test]
fn test_order_by_descending() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) RETURN n.name ORDER BY n.name DESC", PropertyMap::new())
        .unwrap();

    let names: Vec<String> = result.rows.iter().map(|row| row.get::<String>("n.name").unwrap()).collect();

    assert_eq!(names.len(), 5);
    assert_eq!(names, vec!["Eve", "Diana", "Charlie", "Bob", "Alice"]);
}

#[test]
fn test_order_by_numeric() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) RETURN n.name, n.age ORDER BY n.age", PropertyMap::new())
        .unwrap();

    let ages: Vec<i64> = result.rows.iter().map(|row| row.get::<i64>("n.age").unwrap()).collect();

    assert_eq!(ages, vec![22, 25, 28, 30, 35]);
}

#[test]
fn test_skip_and_limit() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) RETURN n.name SKIP 2 LIMIT 2", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 2, "SKIP 2 LIMIT 2 on 5 rows should return exactly 2 rows");
}

#[test]
fn test_limit_alone() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN n LIMIT 3", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 3);
}

#[test]
fn test_skip_alone() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN n SKIP 3", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 2, "5 total - 3 skipped = 2 remaining");
}

#[test]
fn test_collect_aggregate() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Charlie'})", PropertyMap::new()).unwrap();

    let result = graph.run("MATCH (n:Person) RETURN collect(n.name)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);

    let collected: Vec<Value> = result.rows[0].get("collect(n.name)").unwrap();
    assert_eq!(collected.len(), 3);

    let collected_strings: Vec<&str> = collected.iter().filter_map(|v| v.as_str()).collect();

    assert!(collected_strings.contains(&"Alice"));
    assert!(collected_strings.contains(&"Bob"));
    assert!(collected_strings.contains(&"Charlie"));
}

#[test]
fn test_min_aggregate() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN min(n.age)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let min_age: i64 = result.rows[0].get("min(n.age)").unwrap();
    assert_eq!(min_age, 22); // Eve is youngest
}

#[test]
fn test_max_aggregate() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN max(n.age)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let max_age: i64 = result.rows[0].get("max(n.age)").unwrap();
    assert_eq!(max_age, 35); // Charlie is oldest
}

#[test]
fn test_avg_aggregate() {
    let graph = setup_people();

    let result = graph.run("MATCH (n:Person) RETURN avg(n.age)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let avg_age: f64 = result.rows[0].get("avg(n.age)").unwrap();
    // (25 + 30 + 35 + 28 + 22) / 5 = 140 / 5 = 28.0
    assert!((avg_age - 28.0).abs() < 0.001, "Expected avg 28.0, got {}", avg_age);
}

#[test]
fn test_count_empty_result() {
    let graph = Graph::open_memory().unwrap();

    let result = graph.run("MATCH (n:Person) RETURN count(n)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1, "count() on empty set should return 1 row");
    let count: i64 = result.rows[0].get("count(n)").unwrap();
    assert_eq!(count, 0, "count() on empty set should be 0");
}

#[test]
fn test_multiple_aggregates() {
    let graph = setup_people();

    let result = graph
        .run("MATCH (n:Person) RETURN count(n), min(n.age), max(n.age)", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 1);

    let count: i64 = result.rows[0].get("count(n)").unwrap();
    assert_eq!(count, 5);

    let min_age: i64 = result.rows[0].get("min(n.age)").unwrap();
    assert_eq!(min_age, 22);

    let max_age: i64 = result.rows[0].get("max(n.age)").unwrap();
    assert_eq!(max_age, 35);
}

#[test]
fn test_order_by_with_limit() {
    let graph = setup_people();

    // Get the 2 oldest people
    let result = graph
        .run("MATCH (n:Person) RETURN n.name, n.age ORDER BY n.age DESC LIMIT 2", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 2);

    let first_name: String = result.rows[0].get("n.name").unwrap();
    let first_age: i64 = result.rows[0].get("n.age").unwrap();
    assert_eq!(first_name, "Charlie");
    assert_eq!(first_age, 35);

    let second_name: String = result.rows[1].get("n.name").unwrap();
    let second_age: i64 = result.rows[1].get("n.age").unwrap();
    assert_eq!(second_name, "Bob");
    assert_eq!(second_age, 30);
}

#[test]
fn test_count_distinct() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Alice', dept: 'Eng'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob', dept: 'Eng'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Charlie', dept: 'Sales'})", PropertyMap::new()).unwrap();

    let result = graph
        .run("MATCH (n:Person) RETURN count(DISTINCT n.dept)", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let count: i64 = result.rows[0].get("count(distinct n.dept)").unwrap();
    assert_eq!(count, 2, "There should be 2 distinct departments");
}

#[test]
fn test_sum_empty_result() {
    let graph = Graph::open_memory().unwrap();

    let result = graph.run("MATCH (n:Item) RETURN sum(n.price)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1, "sum() on empty set should return 1 row");
    let total: i64 = result.rows[0].get("sum(n.price)").unwrap();
    assert_eq!(total, 0, "sum() on empty set should be 0");
}
