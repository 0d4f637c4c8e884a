#![allow(dead_code)]

use trace_diagnosis::tree::{InvocationTree, NodeId, NodeSpec, TreeBuilder};

pub const ITEM_QUERY: &str = "select * from item where id = ?";
pub const REPORT_QUERY: &str = "select * from orders join item on order.item = item.id";

/// Request -> service -> `calls` identical 5 ms queries
pub fn create_iterative_database_trace(calls: usize) -> InvocationTree {
    let query_time = 5.0;
    let service_duration = calls as f64 * query_time + 100.0;

    let mut builder = TreeBuilder::new();
    let root = builder.root(
        NodeSpec::new(1, service_duration + 50.0)
            .with_http("/items", 50.0)
            .with_business_context(1, 1),
    );
    let service = builder
        .child(root, NodeSpec::new(2, service_duration).with_timer(100.0))
        .unwrap();
    for _ in 0..calls {
        builder
            .child(service, NodeSpec::new(9, query_time).with_sql(ITEM_QUERY, query_time))
            .unwrap();
    }
    builder.build().unwrap()
}

/// Request -> chain of `depth` nested calls of one method, 100 ms exclusive each
pub fn create_recursive_trace(depth: usize) -> InvocationTree {
    let mut builder = TreeBuilder::new();
    let mut parent = builder.root(NodeSpec::new(1, depth as f64 * 100.0).with_timer(0.0));
    for level in 0..depth {
        let duration = (depth - level) as f64 * 100.0;
        parent = builder
            .child(parent, NodeSpec::new(5, duration).with_timer(100.0))
            .unwrap();
    }
    builder.build().unwrap()
}

/// Controller issuing 15 small item queries and one expensive report query
///
/// Returns the tree, the controller and the expensive query.
pub fn create_n_plus_one_trace() -> (InvocationTree, NodeId, NodeId) {
    let mut builder = TreeBuilder::new();
    let root = builder.root(
        NodeSpec::new(1, 5000.0)
            .with_timer(0.0)
            .with_business_context(2, 7),
    );
    let controller = builder
        .child(root, NodeSpec::new(2, 4800.0).with_timer(100.0))
        .unwrap();
    for _ in 0..15 {
        builder
            .child(controller, NodeSpec::new(9, 100.0).with_sql(ITEM_QUERY, 100.0))
            .unwrap();
    }
    let report = builder
        .child(controller, NodeSpec::new(9, 2500.0).with_sql(REPORT_QUERY, 2500.0))
        .unwrap();
    (builder.build().unwrap(), controller, report)
}

/// Request taking `duration` with nothing worth diagnosing below it
pub fn create_fast_trace(duration: f64) -> InvocationTree {
    let mut builder = TreeBuilder::new();
    let root = builder.root(NodeSpec::new(1, duration).with_timer(duration / 2.0));
    builder
        .child(root, NodeSpec::new(2, duration / 2.0).with_timer(duration / 2.0))
        .unwrap();
    builder.build().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterative_trace_shape() {
        let tree = create_iterative_database_trace(40);
        assert_eq!(tree.len(), 42);
        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.duration, 350.0);
        assert!(root.has_http_data());
    }

    #[test]
    fn test_recursive_trace_shape() {
        let tree = create_recursive_trace(10);
        let depths: Vec<usize> = tree.iter_depth_first(tree.root()).map(|(_, depth)| depth).collect();
        assert_eq!(depths, (0..=10).collect::<Vec<_>>());
    }
}
