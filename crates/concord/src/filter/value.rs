//! Uniform value model the filter engine evaluates against.
//!
//! Record types do not expose themselves through reflection. Each one lists
//! its filterable fields in an explicit accessor table, and nested records
//! are flattened into [`Value::Map`] on demand.

use concord_common::{HealthCheck, Node, NodeDumpRecord, ServiceDumpRecord, ServiceInstance};
use std::collections::BTreeMap;

/// A filterable value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Empty collections, empty strings and null are all "empty"
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Build a list value out of nested records
    pub fn records<T: Selectable>(items: &[T]) -> Self {
        Self::List(items.iter().map(T::to_value).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<&Option<String>> for Value {
    fn from(s: &Option<String>) -> Self {
        s.as_ref().map_or(Self::Null, Self::from)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Option<u16>> for Value {
    fn from(n: Option<u16>) -> Self {
        n.map_or(Self::Null, Self::from)
    }
}

impl From<&Vec<String>> for Value {
    fn from(items: &Vec<String>) -> Self {
        Self::List(items.iter().map(Self::from).collect())
    }
}

impl From<&BTreeMap<String, String>> for Value {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Self::Map(map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
    }
}

/// Field name paired with the function that reads it
pub type Accessor<T> = (&'static str, fn(&T) -> Value);

/// A record the filter engine can select fields from
pub trait Selectable: Sized + 'static {
    /// Explicit field table for this record kind
    const FIELDS: &'static [Accessor<Self>];

    /// Read one top-level field; unknown names yield `None`
    fn select(&self, field: &str) -> Option<Value> {
        Self::FIELDS
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, read)| read(self))
    }

    fn to_value(&self) -> Value {
        Value::Map(
            Self::FIELDS
                .iter()
                .map(|(name, read)| (name.to_string(), read(self)))
                .collect(),
        )
    }
}

impl Selectable for Node {
    const FIELDS: &'static [Accessor<Self>] = &[
        ("ID", |n: &Node| Value::from(&n.id)),
        ("Node", |n: &Node| Value::from(&n.name)),
        ("Address", |n: &Node| Value::from(&n.address)),
        ("Datacenter", |n: &Node| Value::from(&n.datacenter)),
        ("Meta", |n: &Node| Value::from(&n.meta)),
    ];
}

impl Selectable for ServiceInstance {
    const FIELDS: &'static [Accessor<Self>] = &[
        ("ID", |s: &ServiceInstance| Value::from(&s.id)),
        ("Service", |s: &ServiceInstance| Value::from(&s.service)),
        ("Kind", |s: &ServiceInstance| Value::from(s.kind.as_str())),
        ("Tags", |s: &ServiceInstance| Value::from(&s.tags)),
        ("Meta", |s: &ServiceInstance| Value::from(&s.meta)),
        ("Address", |s: &ServiceInstance| Value::from(&s.address)),
        ("Port", |s: &ServiceInstance| Value::from(s.port)),
    ];
}

impl Selectable for HealthCheck {
    const FIELDS: &'static [Accessor<Self>] = &[
        ("Node", |c: &HealthCheck| Value::from(&c.node)),
        ("CheckID", |c: &HealthCheck| Value::from(&c.check_id)),
        ("Name", |c: &HealthCheck| Value::from(&c.name)),
        ("Status", |c: &HealthCheck| Value::from(c.status.as_str())),
        ("ServiceID", |c: &HealthCheck| Value::from(&c.service_id)),
        ("ServiceName", |c: &HealthCheck| Value::from(&c.service_name)),
        ("Output", |c: &HealthCheck| Value::from(&c.output)),
    ];
}

impl Selectable for NodeDumpRecord {
    const FIELDS: &'static [Accessor<Self>] = &[
        ("ID", |r: &NodeDumpRecord| Value::from(&r.id)),
        ("Node", |r: &NodeDumpRecord| Value::from(&r.node)),
        ("Address", |r: &NodeDumpRecord| Value::from(&r.address)),
        ("Datacenter", |r: &NodeDumpRecord| Value::from(&r.datacenter)),
        ("Meta", |r: &NodeDumpRecord| Value::from(&r.meta)),
        ("Services", |r: &NodeDumpRecord| Value::records(&r.services)),
        ("Checks", |r: &NodeDumpRecord| Value::records(&r.checks)),
    ];
}

impl Selectable for ServiceDumpRecord {
    const FIELDS: &'static [Accessor<Self>] = &[
        ("Node", |r: &ServiceDumpRecord| r.node.to_value()),
        ("Service", |r: &ServiceDumpRecord| r.service.to_value()),
        ("Checks", |r: &ServiceDumpRecord| Value::records(&r.checks)),
    ];
}
