//! JSON trace files read by the `trace-diagnosis` binary
//!
//! A trace file holds one call tree plus optional display names:
//!
//! ```json
//! {
//!   "methods": { "1": "CheckoutController.submit", "9": "ItemDao.load" },
//!   "applications": { "3": "shop" },
//!   "root": {
//!     "method": 1, "duration": 5000.0, "exclusive": 100.0,
//!     "application_id": 3, "business_transaction_id": 8,
//!     "children": [ { "method": 9, "duration": 480.0, "sql": "select * from item" } ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::results::NameTable;
use crate::tree::{InvocationTree, NodeId, NodeSpec, TreeBuilder, TreeError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNodeSpec {
    pub method: u64,
    pub duration: f64,
    #[serde(default)]
    pub exclusive: Option<f64>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub http_uri: Option<String>,
    #[serde(default)]
    pub invocation_id: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub application_id: u32,
    #[serde(default)]
    pub business_transaction_id: u32,
    #[serde(default)]
    pub children: Vec<TraceNodeSpec>,
}

impl TraceNodeSpec {
    fn node_spec(&self) -> NodeSpec {
        let spec = NodeSpec::new(self.method, self.duration)
            .with_business_context(self.application_id, self.business_transaction_id);
        // SQL and HTTP nodes always carry timing; plain nodes only when measured
        let mut spec = match (&self.sql, &self.http_uri, self.exclusive) {
            (Some(sql), _, exclusive) => spec.with_sql(sql.as_str(), exclusive.unwrap_or(self.duration)),
            (None, Some(uri), exclusive) => spec.with_http(uri.as_str(), exclusive.unwrap_or(0.0)),
            (None, None, Some(exclusive)) => spec.with_timer(exclusive),
            (None, None, None) => spec,
        };
        if let Some(invocation_id) = self.invocation_id {
            spec = spec.with_invocation_id(invocation_id);
        }
        spec.timestamp = self.timestamp;
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFile {
    #[serde(default)]
    pub methods: BTreeMap<u64, String>,
    #[serde(default)]
    pub applications: BTreeMap<u32, String>,
    pub root: TraceNodeSpec,
}

impl TraceFile {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Materializes the call tree in pre-order, children in file order
    pub fn to_tree(&self) -> Result<InvocationTree, TreeError> {
        let mut builder = TreeBuilder::new();
        let root = builder.root(self.root.node_spec());

        let mut stack: Vec<(NodeId, &TraceNodeSpec)> =
            self.root.children.iter().rev().map(|child| (root, child)).collect();
        while let Some((parent, spec)) = stack.pop() {
            let id = builder.child(parent, spec.node_spec())?;
            stack.extend(spec.children.iter().rev().map(|child| (id, child)));
        }
        builder.build()
    }

    pub fn add_names(&self, names: &mut NameTable) {
        for (method_ident, name) in &self.methods {
            names.insert_method(*method_ident, name.as_str());
        }
        for (application_id, name) in &self.applications {
            names.insert_application(*application_id, name.as_str());
        }
    }
}
