//! Compiled column layout
//!
//! Building a [`Schema`] binds every field to a slot index, checks the
//! field list for the errors that must surface before any network activity
//! (duplicate source keys, mixed relation target types), and prepares the
//! lookup maps the decoder and sinks resolve against.

use std::collections::{HashMap, HashSet};

use crate::error::SchemaError;
use crate::model::field::{Field, FieldKind, Relation, RelationKind};

/// Immutable column layout for one export
///
/// Metric fields and property-like fields are numbered in two independent,
/// separately-increasing sequences in field-declaration order; those
/// numbers are the slot indices of [`Row`](crate::model::Row) and determine
/// the default output column order.
///
/// For each relation kind present in the field list the schema can derive a
/// view scoped to that relative's own stream: matching fields resolve under
/// their stripped key, all other fields stay as opaque placeholders so slot
/// indices line up 1:1 and a decoded relative's row merges into the child's
/// row without re-mapping.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
    metric_index: HashMap<String, usize>,
    prop_index: HashMap<String, usize>,
    metric_aliases: HashMap<String, usize>,
    prop_aliases: HashMap<String, usize>,
    metric_keys: Vec<String>,
    num_metrics: usize,
    num_props: usize,
    parent_target: Option<String>,
    child_target: Option<String>,
}

impl Schema {
    /// Compile a schema from an ordered field list
    ///
    /// Fails on an empty list, on two fields resolving to the same source
    /// key within one slot space, and on two different target types for the
    /// same relation kind.
    pub fn build(mut fields: Vec<Field>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut metric_seq = 0usize;
        let mut prop_seq = 0usize;
        let mut metric_seen: HashSet<String> = HashSet::new();
        let mut prop_seen: HashSet<String> = HashSet::new();
        let mut parent_target: Option<String> = None;
        let mut child_target: Option<String> = None;

        for field in fields.iter_mut() {
            let qualified = field.qualified_name();
            match field.kind {
                FieldKind::Metric => {
                    if !metric_seen.insert(qualified.clone()) {
                        return Err(SchemaError::DuplicateKey { key: qualified });
                    }
                    field.row_index = metric_seq;
                    metric_seq += 1;
                }
                FieldKind::Property | FieldKind::Tag => {
                    if !prop_seen.insert(qualified.clone()) {
                        return Err(SchemaError::DuplicateKey { key: qualified });
                    }
                    field.row_index = prop_seq;
                    prop_seq += 1;
                }
            }

            if let Relation::Related { kind, target, .. } = &field.relation {
                let slot = match kind {
                    RelationKind::Parent => &mut parent_target,
                    RelationKind::Child => &mut child_target,
                };
                match slot {
                    Some(existing) if existing != target => {
                        return Err(SchemaError::MixedRelationTypes {
                            relation: kind.to_string(),
                            first: existing.clone(),
                            second: target.clone(),
                        });
                    }
                    Some(_) => {}
                    None => *slot = Some(target.clone()),
                }
            }
        }

        Ok(Schema::assemble(
            fields,
            metric_seq,
            prop_seq,
            parent_target,
            child_target,
            None,
        ))
    }

    /// Build the lookup maps. `scope` of `None` resolves the resource's own
    /// fields; `Some((kind, target))` resolves only fields of that relation.
    fn assemble(
        fields: Vec<Field>,
        num_metrics: usize,
        num_props: usize,
        parent_target: Option<String>,
        child_target: Option<String>,
        scope: Option<(RelationKind, String)>,
    ) -> Self {
        let mut metric_index = HashMap::new();
        let mut prop_index = HashMap::new();
        let mut metric_aliases = HashMap::new();
        let mut prop_aliases = HashMap::new();
        let mut metric_keys = Vec::new();

        for field in &fields {
            let in_scope = match (&scope, &field.relation) {
                (None, Relation::Own) => true,
                (None, Relation::Related { .. }) => false,
                (Some((kind, target)), Relation::Related { kind: fk, target: ft, .. }) => {
                    fk == kind && ft == target
                }
                (Some(_), Relation::Own) => false,
            };
            if !in_scope {
                continue;
            }
            match field.kind {
                FieldKind::Metric => {
                    metric_index.insert(field.local_name.clone(), field.row_index);
                    metric_aliases.insert(field.alias.clone(), field.row_index);
                    metric_keys.push(field.local_name.clone());
                }
                FieldKind::Property | FieldKind::Tag => {
                    prop_index.insert(field.local_name.clone(), field.row_index);
                    prop_aliases.insert(field.alias.clone(), field.row_index);
                }
            }
        }

        Schema {
            fields,
            metric_index,
            prop_index,
            metric_aliases,
            prop_aliases,
            metric_keys,
            num_metrics,
            num_props,
            parent_target,
            child_target,
        }
    }

    /// Derive the view scoped to this schema's relation target, if the
    /// field list references one. Slot indices are shared with `self`.
    pub fn related_schema(&self, kind: RelationKind) -> Option<Schema> {
        let target = self.related_target(kind)?.to_string();
        Some(Schema::assemble(
            self.fields.clone(),
            self.num_metrics,
            self.num_props,
            None,
            None,
            Some((kind, target)),
        ))
    }

    /// Target resource kind of the given relation, if any field uses it
    pub fn related_target(&self, kind: RelationKind) -> Option<&str> {
        match kind {
            RelationKind::Parent => self.parent_target.as_deref(),
            RelationKind::Child => self.child_target.as_deref(),
        }
    }

    /// Largest traversal depth declared among fields of the given relation
    pub fn related_depth(&self, kind: RelationKind) -> u32 {
        self.fields
            .iter()
            .filter_map(|f| match &f.relation {
                Relation::Related { kind: fk, depth, .. } if *fk == kind => Some(*depth),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }

    /// Slot index for a metric source key on this schema's stream
    pub fn metric_slot(&self, key: &str) -> Option<usize> {
        self.metric_index.get(key).copied()
    }

    /// Slot index for a property source key
    pub fn prop_slot(&self, key: &str) -> Option<usize> {
        self.prop_index.get(key).copied()
    }

    /// Slot index for a metric alias
    pub fn metric_slot_of_alias(&self, alias: &str) -> Option<usize> {
        self.metric_aliases.get(alias).copied()
    }

    /// Slot index for a property alias
    pub fn prop_slot_of_alias(&self, alias: &str) -> Option<usize> {
        self.prop_aliases.get(alias).copied()
    }

    /// Metric source keys to request for this schema's stream, in
    /// declaration order
    pub fn metric_keys(&self) -> &[String] {
        &self.metric_keys
    }

    /// Property source keys resolvable on this schema, in no defined order
    pub fn prop_keys(&self) -> impl Iterator<Item = &str> {
        self.prop_index.keys().map(|k| k.as_str())
    }

    /// All fields in declaration order; sinks derive their column order
    /// from this
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of metric slots in a row
    pub fn num_metrics(&self) -> usize {
        self.num_metrics
    }

    /// Number of property slots in a row
    pub fn num_props(&self) -> usize {
        self.num_props
    }

    /// True when any resolvable property-like field exists
    pub fn has_properties(&self) -> bool {
        !self.prop_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationKind;

    fn schema_fields() -> Vec<Field> {
        vec![
            Field::metric("cpu", "cpu|usage_average").unwrap(),
            Field::property("guest_os", "config|guest_os").unwrap(),
            Field::metric("host_cpu", "$parent:HostSystem.cpu|demandmhz").unwrap(),
            Field::metric("mem", "mem|usage_average").unwrap(),
            Field::tag("owner", "ownership|owner").unwrap(),
        ]
    }

    #[test]
    fn indices_increase_independently_per_slot_space() {
        let schema = Schema::build(schema_fields()).unwrap();
        let fields = schema.fields();
        // metrics: cpu=0, host_cpu=1, mem=2
        assert_eq!(fields[0].row_index, 0);
        assert_eq!(fields[2].row_index, 1);
        assert_eq!(fields[3].row_index, 2);
        // properties: guest_os=0, owner=1
        assert_eq!(fields[1].row_index, 0);
        assert_eq!(fields[4].row_index, 1);
        assert_eq!(schema.num_metrics(), 3);
        assert_eq!(schema.num_props(), 2);
    }

    #[test]
    fn own_keys_resolve_and_related_keys_do_not() {
        let schema = Schema::build(schema_fields()).unwrap();
        assert_eq!(schema.metric_slot("cpu|usage_average"), Some(0));
        assert_eq!(schema.metric_slot("mem|usage_average"), Some(2));
        // The parent's key is not decodable on the child's own stream.
        assert_eq!(schema.metric_slot("cpu|demandmhz"), None);
        assert_eq!(
            schema.metric_keys(),
            &["cpu|usage_average".to_string(), "mem|usage_average".to_string()]
        );
    }

    #[test]
    fn related_schema_shares_slot_indices() {
        let schema = Schema::build(schema_fields()).unwrap();
        let parent = schema.related_schema(RelationKind::Parent).unwrap();
        // Stripped key resolves to the same slot the owning schema assigned.
        assert_eq!(parent.metric_slot("cpu|demandmhz"), Some(1));
        // Child-own keys are placeholders in the derived view.
        assert_eq!(parent.metric_slot("cpu|usage_average"), None);
        assert_eq!(parent.metric_keys(), &["cpu|demandmhz".to_string()]);
        assert_eq!(parent.num_metrics(), schema.num_metrics());
    }

    #[test]
    fn duplicate_metric_key_fails_build() {
        let fields = vec![
            Field::metric("a", "cpu|usage").unwrap(),
            Field::metric("b", "cpu|usage").unwrap(),
        ];
        let err = Schema::build(fields).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateKey { key } if key == "cpu|usage"));
    }

    #[test]
    fn same_key_in_both_slot_spaces_is_allowed() {
        let fields = vec![
            Field::metric("m", "summary|x").unwrap(),
            Field::property("p", "summary|x").unwrap(),
        ];
        assert!(Schema::build(fields).is_ok());
    }

    #[test]
    fn mixed_parent_types_fail_build() {
        let fields = vec![
            Field::metric("a", "$parent:HostSystem.cpu|usage").unwrap(),
            Field::metric("b", "$parent:ClusterComputeResource.cpu|usage").unwrap(),
        ];
        let err = Schema::build(fields).unwrap_err();
        match err {
            SchemaError::MixedRelationTypes { relation, first, second } => {
                assert_eq!(relation, "parent");
                assert_eq!(first, "HostSystem");
                assert_eq!(second, "ClusterComputeResource");
            }
            other => panic!("expected mixed-type error, got {other:?}"),
        }
    }

    #[test]
    fn same_parent_type_twice_is_fine() {
        let fields = vec![
            Field::metric("a", "$parent:HostSystem.cpu|usage").unwrap(),
            Field::metric("b", "$parent:HostSystem.mem|usage").unwrap(),
        ];
        let schema = Schema::build(fields).unwrap();
        assert_eq!(schema.related_target(RelationKind::Parent), Some("HostSystem"));
    }

    #[test]
    fn empty_field_list_fails_build() {
        assert!(matches!(Schema::build(Vec::new()), Err(SchemaError::Empty)));
    }

    #[test]
    fn child_rollup_fields_keep_their_aggregation() {
        let fields = vec![
            Field::metric("own", "cpu|usage").unwrap(),
            Field::metric("vm_mem", "$child:VirtualMachine.mem|usage")
                .unwrap()
                .with_aggregation(AggregationKind::Average),
        ];
        let schema = Schema::build(fields).unwrap();
        let child = schema.related_schema(RelationKind::Child).unwrap();
        let rollup: Vec<_> = child
            .fields()
            .iter()
            .filter(|f| !f.relation.is_own())
            .collect();
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup[0].aggregation, Some(AggregationKind::Average));
    }
}
