//! Field definitions
//!
//! A field is one requested output column. Its source key may point at the
//! resource's own data or, written as `$parent:Type.key` or
//! `$child:Type.key`, at data of a related resource.

use std::fmt;

use crate::aggregate::AggregationKind;
use crate::error::SchemaError;

/// What slot space a field occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Numeric time-series sample, one value per timestamp
    Metric,
    /// Single-value string looked up once per resource
    Property,
    /// Platform tag; stored and spliced exactly like a property
    Tag,
}

impl FieldKind {
    /// True for the kinds that occupy property slots
    pub fn is_property_like(&self) -> bool {
        matches!(self, FieldKind::Property | FieldKind::Tag)
    }
}

/// The relation kinds a field may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Data of the resource's parent
    Parent,
    /// Data of the resource's children
    Child,
}

impl RelationKind {
    /// The prefix tag used in field keys
    pub fn tag(&self) -> &'static str {
        match self {
            RelationKind::Parent => "$parent",
            RelationKind::Child => "$child",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Parent => f.write_str("parent"),
            RelationKind::Child => f.write_str("child"),
        }
    }
}

/// Where a field's data comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The resource's own stream
    Own,
    /// A related resource's stream
    Related {
        /// Parent or child
        kind: RelationKind,
        /// Resource kind of the relative (e.g. `HostSystem`)
        target: String,
        /// Traversal depth when resolving the relative
        depth: u32,
    },
}

impl Relation {
    /// True for `Own`
    pub fn is_own(&self) -> bool {
        matches!(self, Relation::Own)
    }

    /// The relation kind, if any
    pub fn kind(&self) -> Option<RelationKind> {
        match self {
            Relation::Own => None,
            Relation::Related { kind, .. } => Some(*kind),
        }
    }
}

/// One requested output column
///
/// Constructed by kind (`metric`, `property`, `tag`), then refined with the
/// `with_*` builders. The row index starts unbound and is assigned exactly
/// once when a [`Schema`](crate::model::Schema) is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// External column name
    pub alias: String,
    /// Source key with any relation prefix stripped
    pub local_name: String,
    /// Slot space the field occupies
    pub kind: FieldKind,
    /// Own or related data
    pub relation: Relation,
    /// Aggregation used when several related rows fold into one value
    pub aggregation: Option<AggregationKind>,
    /// Slot index within the field's slot space; bound at schema build
    pub row_index: usize,
}

impl Field {
    /// A metric field. The key may carry a `$parent:`/`$child:` prefix.
    pub fn metric(alias: impl Into<String>, key: &str) -> Result<Self, SchemaError> {
        Field::new(alias, key, FieldKind::Metric)
    }

    /// A property field. The key may carry a `$parent:`/`$child:` prefix.
    pub fn property(alias: impl Into<String>, key: &str) -> Result<Self, SchemaError> {
        Field::new(alias, key, FieldKind::Property)
    }

    /// A tag field; handled like a property throughout the pipeline
    pub fn tag(alias: impl Into<String>, key: &str) -> Result<Self, SchemaError> {
        Field::new(alias, key, FieldKind::Tag)
    }

    fn new(alias: impl Into<String>, key: &str, kind: FieldKind) -> Result<Self, SchemaError> {
        let (relation, local_name) = parse_relation(key)?;
        Ok(Field {
            alias: alias.into(),
            local_name,
            kind,
            relation,
            aggregation: None,
            row_index: 0,
        })
    }

    /// Set the aggregation used for one-to-many rollup
    pub fn with_aggregation(mut self, aggregation: AggregationKind) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Override the relation traversal depth (default 1)
    pub fn with_depth(mut self, depth: u32) -> Self {
        if let Relation::Related { depth: d, .. } = &mut self.relation {
            *d = depth;
        }
        self
    }

    /// The key as written in the field list, relation prefix included.
    /// Uniqueness within a schema is checked against this form, so a
    /// resource's own `cpu|usage` and a parent's `cpu|usage` can coexist.
    pub fn qualified_name(&self) -> String {
        match &self.relation {
            Relation::Own => self.local_name.clone(),
            Relation::Related { kind, target, .. } => {
                format!("{}:{}.{}", kind.tag(), target, self.local_name)
            }
        }
    }
}

/// Split `$parent:Type.key` / `$child:Type.key` into relation and key.
/// Keys without a relation prefix resolve to [`Relation::Own`].
fn parse_relation(key: &str) -> Result<(Relation, String), SchemaError> {
    let (kind, rest) = if let Some(rest) = key.strip_prefix("$parent:") {
        (RelationKind::Parent, rest)
    } else if let Some(rest) = key.strip_prefix("$child:") {
        (RelationKind::Child, rest)
    } else if key.starts_with('$') {
        return Err(SchemaError::InvalidKey {
            key: key.to_string(),
            reason: "unknown relation prefix".to_string(),
        });
    } else {
        return Ok((Relation::Own, key.to_string()));
    };

    match rest.split_once('.') {
        Some((target, local)) if !target.is_empty() && !local.is_empty() => Ok((
            Relation::Related {
                kind,
                target: target.to_string(),
                depth: 1,
            },
            local.to_string(),
        )),
        _ => Err(SchemaError::InvalidKey {
            key: key.to_string(),
            reason: "expected <Type>.<key> after the relation prefix".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_key_is_own_relation() {
        let f = Field::metric("cpu", "cpu|usage_average").unwrap();
        assert!(f.relation.is_own());
        assert_eq!(f.local_name, "cpu|usage_average");
        assert_eq!(f.qualified_name(), "cpu|usage_average");
    }

    #[test]
    fn parent_prefix_is_stripped() {
        let f = Field::metric("host_cpu", "$parent:HostSystem.cpu|demandmhz").unwrap();
        assert_eq!(f.local_name, "cpu|demandmhz");
        assert_eq!(
            f.relation,
            Relation::Related {
                kind: RelationKind::Parent,
                target: "HostSystem".to_string(),
                depth: 1,
            }
        );
        assert_eq!(f.qualified_name(), "$parent:HostSystem.cpu|demandmhz");
    }

    #[test]
    fn child_prefix_parses() {
        let f = Field::metric("vm_sum", "$child:VirtualMachine.mem|usage")
            .unwrap()
            .with_aggregation("sum".parse().unwrap());
        assert_eq!(f.relation.kind(), Some(RelationKind::Child));
        assert_eq!(f.aggregation, Some(crate::aggregate::AggregationKind::Sum));
    }

    #[test]
    fn malformed_relation_keys_are_rejected() {
        assert!(Field::metric("x", "$parent:HostSystem").is_err());
        assert!(Field::metric("x", "$parent:.key").is_err());
        assert!(Field::metric("x", "$sibling:Host.key").is_err());
    }

    #[test]
    fn depth_override_applies_to_related_only() {
        let related = Field::metric("x", "$parent:HostSystem.k")
            .unwrap()
            .with_depth(3);
        match related.relation {
            Relation::Related { depth, .. } => assert_eq!(depth, 3),
            Relation::Own => panic!("expected related"),
        }
        let own = Field::metric("y", "k").unwrap().with_depth(3);
        assert!(own.relation.is_own());
    }
}
