//! End-to-end integration tests for the Cypher pipeline: parse, interpret
//! directly against the AST, execute against an in-memory `Store`.

use graphdb::{Graph, Node, PropertyMap, Value};

#[test]
fn test_create_and_query_node() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person)", PropertyMap::new()).unwrap();

    let result = graph.run("MATCH (n:Person) RETURN n", PropertyMap::new()).unwrap();

    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows.len(), 1);

    let node: Node = result.rows[0].get("n").unwrap();
    assert!(node.has_label("Person"));
}

#[test]
fn test_create_with_properties() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run("CREATE (n:Person {name: 'Ada', age: 3})", PropertyMap::new())
        .unwrap();

    let result = graph.run("MATCH (n:Person) RETURN n", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let node: Node = result.rows[0].get("n").unwrap();
    assert_eq!(node.get("name"), Some(&Value::String("Ada".into())));
    assert_eq!(node.get("age"), Some(&Value::Int(3)));
}

#[test]
fn test_match_with_where_filter() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada', age: 3})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob', age: 30})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Charlie', age: 25})", PropertyMap::new()).unwrap();

    let result = graph
        .run("MATCH (n:Person) WHERE n.age > 10 RETURN n", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 2);

    let names: Vec<String> = result
        .rows
        .iter()
        .map(|row| {
            let node: Node = row.get("n").unwrap();
            node.get("name").unwrap().as_str().unwrap().to_string()
        })
        .collect();

    assert!(names.contains(&"Bob".to_string()));
    assert!(names.contains(&"Charlie".to_string()));
    assert!(!names.contains(&"Ada".to_string()));
}

#[test]
fn test_return_property_access() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada', age: 3})", PropertyMap::new()).unwrap();

    let result = graph.run("MATCH (n:Person) RETURN n.name", PropertyMap::new()).unwrap();

    assert_eq!(result.columns, vec!["n.name"]);
    assert_eq!(result.rows.len(), 1);

    let name: String = result.rows[0].get("n.name").unwrap();
    assert_eq!(name, "Ada");
}

#[test]
fn test_count_aggregate() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Charlie'})", PropertyMap::new()).unwrap();

    let result = graph.run("MATCH (n:Person) RETURN count(n)", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let count: i64 = result.rows[0].get("count(n)").unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_match_with_limit() {
    let graph = Graph::open_memory().unwrap();

    for i in 0..5 {
        graph
            .run(&format!("CREATE (n:Person {{name: 'Person{i}'}})"), PropertyMap::new())
            .unwrap();
    }

    let result = graph.run("MATCH (n:Person) RETURN n LIMIT 2", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 2);
}

#[test]
fn test_create_and_match_relationship() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Ada'})-[:KNOWS]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .run("MATCH (a:Person)-[:KNOWS]->(b:Person) RETURN a, b", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 1);

    let a_node: Node = result.rows[0].get("a").unwrap();
    let b_node: Node = result.rows[0].get("b").unwrap();
    assert!(a_node.has_label("Person"));
    assert!(b_node.has_label("Person"));

    let a_name = a_node.get("name").unwrap().as_str().unwrap();
    let b_name = b_node.get("name").unwrap().as_str().unwrap();
    assert_eq!(a_name, "Ada");
    assert_eq!(b_name, "Bob");
}

#[test]
fn test_match_set_property() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada', age: 3})", PropertyMap::new()).unwrap();

    graph
        .run("MATCH (n:Person) WHERE n.name = 'Ada' SET n.age = 4", PropertyMap::new())
        .unwrap();

    let result = graph
        .run("MATCH (n:Person) WHERE n.name = 'Ada' RETURN n.age", PropertyMap::new())
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let age: i64 = result.rows[0].get("n.age").unwrap();
    assert_eq!(age, 4);
}

#[test]
fn test_match_delete_node() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada'})", PropertyMap::new()).unwrap();
    graph.run("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).unwrap();

    graph
        .run("MATCH (n:Person) WHERE n.name = 'Ada' DETACH DELETE n", PropertyMap::new())
        .unwrap();

    let result = graph.run("MATCH (n:Person) RETURN n", PropertyMap::new()).unwrap();

    assert_eq!(result.rows.len(), 1);
    let node: Node = result.rows[0].get("n").unwrap();
    assert_eq!(node.get("name"), Some(&Value::String("Bob".into())));
}

#[test]
fn test_return_multiple_columns() {
    let graph = Graph::open_memory().unwrap();

    graph.run("CREATE (n:Person {name: 'Ada', age: 3})", PropertyMap::new()).unwrap();

    let result = graph
        .run("MATCH (n:Person) RETURN n.name, n.age", PropertyMap::new())
        .unwrap();

    assert_eq!(result.columns.len(), 2);
    assert!(result.columns.contains(&"n.name".to_string()));
    assert!(result.columns.contains(&"n.age".to_string()));

    assert_eq!(result.rows.len(), 1);

    let name: String = result.rows[0].get("n.name").unwrap();
    assert_eq!(name, "Ada");

    let age: i64 = result.rows[0].get("n.age").unwrap();
    assert_eq!(age, 3);
}
