//! End-to-end integration tests for relationship traversal patterns:
//! multi-hop chains, bidirectional matching, relationship type filtering,
//! relationship properties, and direction handling.

use graphdb::{Graph, PropertyMap, Relationship, Value};

/// Linear chain: Alice -[:KNOWS]-> Bob -[:KNOWS]-> Charlie, built in one
/// CREATE clause so both relationships exist from the start.
fn setup_linear_chain() -> Graph {
    let graph = Graph::open_memory().unwrap();
    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})-[:KNOWS]->(c:Person {name: 'Charlie'})",
            PropertyMap::new(),
        )
        .unwrap();
    graph
}

#[test]
fn test_two_hop_traversal() {
    let graph = setup_linear_chain();

    let result = graph
        .run(
            "MATCH (a:Person)-[:KNOWS]->(b:Person)-[:KNOWS]->(c:Person) RETURN c.name",
            PropertyMap::new(),
        )
        .unwrap();

    let names: Vec<String> = result.rows.iter().filter_map(|row| row.get::<String>("c.name").ok()).collect();

    assert!(
        names.contains(&"Charlie".to_string()),
        "Expected two-hop traversal to reach Charlie, got: {:?}",
        names,
    );
}

#[test]
fn test_single_hop_traversal() {
    let graph = setup_linear_chain();

    let result = graph
        .run("MATCH (a:Person)-[:KNOWS]->(b:Person) RETURN a.name, b.name", PropertyMap::new())
        .unwrap();

    assert!(!result.rows.is_empty(), "Expected at least one relationship traversal result");

    let pairs: Vec<(String, String)> = result
        .rows
        .iter()
        .map(|row| {
            let a: String = row.get("a.name").unwrap();
            let b: String = row.get("b.name").unwrap();
            (a, b)
        })
        .collect();

    assert!(
        pairs.contains(&("Alice".to_string(), "Bob".to_string())),
        "Expected Alice->Bob in results, got: {:?}",
        pairs,
    );
    assert!(
        pairs.contains(&("Bob".to_string(), "Charlie".to_string())),
        "Expected Bob->Charlie in results, got: {:?}",
        pairs,
    );
}

#[test]
fn test_bidirectional_relationship() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .run("MATCH (a:Person)-[:KNOWS]-(b:Person) RETURN a.name, b.name", PropertyMap::new())
        .unwrap();

    let pairs: Vec<(String, String)> = result
        .rows
        .iter()
        .map(|row| {
            let a: String = row.get("a.name").unwrap();
            let b: String = row.get("b.name").unwrap();
            (a, b)
        })
        .collect();

    assert!(
        pairs.contains(&("Alice".to_string(), "Bob".to_string())),
        "Expected Alice-Bob in undirected results, got: {:?}",
        pairs,
    );
    assert!(
        pairs.contains(&("Bob".to_string(), "Alice".to_string())),
        "Expected Bob-Alice in undirected results, got: {:?}",
        pairs,
    );
}

#[test]
fn test_multiple_relationship_types() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();
    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:WORKS_WITH]->(c:Person {name: 'Charlie'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .run("MATCH (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person) RETURN b.name", PropertyMap::new())
        .unwrap();

    let names: Vec<String> = result.rows.iter().map(|row| row.get::<String>("b.name").unwrap()).collect();

    assert!(names.contains(&"Bob".to_string()), "KNOWS should reach Bob");
    assert!(!names.contains(&"Charlie".to_string()), "KNOWS should NOT reach Charlie (connected via WORKS_WITH)");
}

#[test]
fn test_relationship_with_properties() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS {since: 2020}]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .run("MATCH (a:Person)-[r:KNOWS]->(b:Person) RETURN r.since", PropertyMap::new())
        .unwrap();

    assert!(!result.rows.is_empty(), "Should find the relationship");

    let since: i64 = result.rows[0].get("r.since").unwrap();
    assert_eq!(since, 2020);
}

#[test]
fn test_triangle_pattern() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})-[:KNOWS]->(c:Person {name: 'Charlie'})",
            PropertyMap::new(),
        )
        .unwrap();
    graph
        .run(
            "MATCH (c:Person {name: 'Charlie'}), (a:Person {name: 'Alice'}) WITH c, a RETURN c, a",
            PropertyMap::new(),
        )
        .unwrap();
    // Close the triangle: Charlie -[:KNOWS]-> Alice.
    let charlie_id: graphdb::NodeId = {
        let row = graph
            .run("MATCH (c:Person {name: 'Charlie'}) RETURN c", PropertyMap::new())
            .unwrap();
        row.rows[0].get::<graphdb::Node>("c").unwrap().id
    };
    let alice_id: graphdb::NodeId = {
        let row = graph
            .run("MATCH (a:Person {name: 'Alice'}) RETURN a", PropertyMap::new())
            .unwrap();
        row.rows[0].get::<graphdb::Node>("a").unwrap().id
    };
    {
        use graphdb::view::GraphView;
        let mut store = graph.store().clone();
        store.create_relationship(charlie_id, alice_id, "KNOWS".to_string(), PropertyMap::new()).unwrap();
    }

    let result = graph
        .run(
            "MATCH (a:Person)-[:KNOWS]->(b:Person)-[:KNOWS]->(c:Person) RETURN a.name, b.name, c.name",
            PropertyMap::new(),
        )
        .unwrap();

    assert!(result.rows.len() >= 3, "Triangle should produce at least 3 two-hop paths, got {}", result.rows.len());
}

#[test]
fn test_relationship_type_function() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:WORKS_WITH]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph.run("MATCH (a:Person)-[r]->(b:Person) RETURN type(r)", PropertyMap::new()).unwrap();

    assert!(!result.rows.is_empty(), "Should find the relationship");

    let rel_type: String = result.rows[0].get("type(r)").unwrap();
    assert_eq!(rel_type, "WORKS_WITH");
}

#[test]
fn test_any_relationship_type() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();
    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:WORKS_WITH]->(c:Person {name: 'Charlie'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph.run("MATCH (a:Person)-[r]->(b:Person) RETURN b.name", PropertyMap::new()).unwrap();

    let names: Vec<String> = result.rows.iter().map(|row| row.get::<String>("b.name").unwrap()).collect();

    assert_eq!(names.len(), 2, "Should find both relationships regardless of type");
    assert!(names.contains(&"Bob".to_string()));
    assert!(names.contains(&"Charlie".to_string()));
}

#[test]
fn test_incoming_relationship_direction() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .run("MATCH (b:Person)<-[:KNOWS]-(a:Person) RETURN a.name, b.name", PropertyMap::new())
        .unwrap();

    assert!(!result.rows.is_empty(), "Should find incoming relationship");

    let a_name: String = result.rows[0].get("a.name").unwrap();
    let b_name: String = result.rows[0].get("b.name").unwrap();

    assert_eq!(a_name, "Alice");
    assert_eq!(b_name, "Bob");
}

#[test]
fn test_relationship_alias_return() {
    let graph = Graph::open_memory().unwrap();

    graph
        .run(
            "CREATE (a:Person {name: 'Alice'})-[:KNOWS {since: 2015}]->(b:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph.run("MATCH (a:Person)-[r:KNOWS]->(b:Person) RETURN r", PropertyMap::new()).unwrap();

    assert!(!result.rows.is_empty(), "Should return the relationship");

    let rel: Relationship = result.rows[0].get("r").unwrap();
    assert_eq!(rel.rel_type, "KNOWS");
    assert_eq!(rel.properties.get("since"), Some(&Value::Int(2015)));
}
