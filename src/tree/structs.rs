use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a node inside an [`super::InvocationTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Plain method timer measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimerData {
    pub duration: f64,
    /// `None` when the agent did not report exclusive time for this call
    pub exclusive_duration: Option<f64>,
    pub cpu_duration: f64,
    pub count: u64,
}

impl TimerData {
    pub fn new(duration: f64, exclusive_duration: f64) -> Self {
        Self {
            duration,
            exclusive_duration: Some(exclusive_duration),
            cpu_duration: 0.0,
            count: 1,
        }
    }

    pub fn is_exclusive_time_available(&self) -> bool {
        self.exclusive_duration.is_some()
    }
}

/// Timer measurement of an executed SQL statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SqlStatementData {
    pub timer: TimerData,
    pub sql: String,
}

/// Timer measurement of an HTTP request entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HttpTimerData {
    pub timer: TimerData,
    pub uri: String,
    pub request_method: String,
}

/// Measurement attached to a call-tree node. At most one kind per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum NodeData {
    #[default]
    None,
    Timer(TimerData),
    Sql(SqlStatementData),
    Http(HttpTimerData),
}

impl NodeData {
    pub fn timer(&self) -> Option<&TimerData> {
        match self {
            NodeData::None => None,
            NodeData::Timer(timer) => Some(timer),
            NodeData::Sql(sql) => Some(&sql.timer),
            NodeData::Http(http) => Some(&http.timer),
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            NodeData::Sql(sql) => Some(sql.sql.as_str()),
            _ => None,
        }
    }

    pub fn http_uri(&self) -> Option<&str> {
        match self {
            NodeData::Http(http) => Some(http.uri.as_str()),
            _ => None,
        }
    }
}

/// One recorded invocation in the call tree
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationNode {
    pub invocation_id: u64,
    pub timestamp: DateTime<Utc>,
    pub method_ident: u64,
    pub duration: f64,
    pub application_id: u32,
    pub business_transaction_id: u32,
    pub data: NodeData,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
}

impl InvocationNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in call order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_timer_data(&self) -> bool {
        matches!(self.data, NodeData::Timer(_) | NodeData::Http(_))
    }

    pub fn has_sql_data(&self) -> bool {
        matches!(self.data, NodeData::Sql(_))
    }

    pub fn has_http_data(&self) -> bool {
        matches!(self.data, NodeData::Http(_))
    }

    /// True when the node carries timer or SQL data with exclusive time reported
    pub fn has_exclusive_time(&self) -> bool {
        self.data
            .timer()
            .map(TimerData::is_exclusive_time_available)
            .unwrap_or(false)
    }

    /// Exclusive duration, 0 when not reported
    pub fn exclusive_time(&self) -> f64 {
        self.data
            .timer()
            .and_then(|timer| timer.exclusive_duration)
            .unwrap_or(0.0)
    }
}

/// Values supplied for a new node; parent links are filled in by the builder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeSpec {
    pub invocation_id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub method_ident: u64,
    pub duration: f64,
    pub application_id: u32,
    pub business_transaction_id: u32,
    pub data: NodeData,
}

impl NodeSpec {
    pub fn new(method_ident: u64, duration: f64) -> Self {
        Self {
            method_ident,
            duration,
            ..Default::default()
        }
    }

    pub fn with_timer(mut self, exclusive_duration: f64) -> Self {
        self.data = NodeData::Timer(TimerData::new(self.duration, exclusive_duration));
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>, exclusive_duration: f64) -> Self {
        self.data = NodeData::Sql(SqlStatementData {
            timer: TimerData::new(self.duration, exclusive_duration),
            sql: sql.into(),
        });
        self
    }

    pub fn with_http(mut self, uri: impl Into<String>, exclusive_duration: f64) -> Self {
        self.data = NodeData::Http(HttpTimerData {
            timer: TimerData::new(self.duration, exclusive_duration),
            uri: uri.into(),
            request_method: "GET".to_string(),
        });
        self
    }

    pub fn with_business_context(mut self, application_id: u32, business_transaction_id: u32) -> Self {
        self.application_id = application_id;
        self.business_transaction_id = business_transaction_id;
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: u64) -> Self {
        self.invocation_id = invocation_id;
        self
    }
}
