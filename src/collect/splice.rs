//! Related-resource splicing
//!
//! After a rowset is decoded from the resource's own stream, fields that
//! point elsewhere still hold placeholders: properties live in a separate
//! endpoint, and `$parent:`/`$child:` fields belong to other resources
//! entirely. The splicer fills those in. Parent data is many-to-one and
//! merges by exact timestamp; child data is one-to-many and folds through
//! an aggregator per (timestamp, slot). Everything it looks up goes
//! through the shared caches, so children of the same parent fetch the
//! parent's stream once per window, not once per child.

use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{AggregationKind, Aggregator};
use crate::cache::{MetaCache, ParentKey, RowsetKey};
use crate::client::{MetricsApi, StatsSpec};
use crate::decode::StatsDecoder;
use crate::error::Result;
use crate::model::{FieldKind, RelationKind, Rowset, Schema};
use crate::types::ResourceId;

/// Fills property and related-resource slots of decoded rowsets
#[derive(Clone)]
pub struct Splicer {
    api: Arc<dyn MetricsApi>,
    cache: Arc<MetaCache>,
}

impl Splicer {
    /// Splicer sharing the job's API client and caches
    pub fn new(api: Arc<dyn MetricsApi>, cache: Arc<MetaCache>) -> Self {
        Splicer { api, cache }
    }

    /// Run every enrichment pass the schema asks for
    ///
    /// Children first (they may add rows), then the parent merge, then
    /// properties last so every row that exists by now gets them.
    pub async fn enrich(
        &self,
        rowset: &mut Rowset,
        schema: &Schema,
        spec: &StatsSpec,
    ) -> Result<()> {
        self.splice_children(rowset, schema, spec).await?;
        self.splice_parent(rowset, schema, spec).await?;
        self.apply_own_properties(rowset, schema).await?;
        Ok(())
    }

    /// Write the resource's own property and tag values into every row
    pub async fn apply_own_properties(&self, rowset: &mut Rowset, schema: &Schema) -> Result<()> {
        let wanted = property_slots(schema, None);
        if wanted.is_empty() {
            return Ok(());
        }
        let id = rowset.resource_id().clone();
        let props = self.properties_of(&id).await?;
        apply_properties(rowset, &wanted, &props);
        Ok(())
    }

    /// Merge the parent's metrics and properties into the rowset
    pub async fn splice_parent(
        &self,
        rowset: &mut Rowset,
        schema: &Schema,
        spec: &StatsSpec,
    ) -> Result<()> {
        let Some(target) = schema.related_target(RelationKind::Parent) else {
            return Ok(());
        };
        let child_id = rowset.resource_id().clone();
        let key = ParentKey {
            id: child_id.clone(),
            kind: target.to_string(),
        };
        let parent = match self.cache.parent(&key) {
            // A remembered "no such parent" short-circuits here too.
            Some(cached) => cached,
            None => {
                let depth = schema.related_depth(RelationKind::Parent);
                let found = self
                    .api
                    .relative_of(&child_id, RelationKind::Parent, target, depth)
                    .await?;
                self.cache.store_parent(key, found.clone());
                found
            }
        };
        let Some(parent) = parent else {
            return Ok(());
        };

        if let Some(derived) = schema.related_schema(RelationKind::Parent) {
            if derived.num_metrics() > 0 {
                let assembled = self.parent_rowset(&parent.id, &derived, spec).await?;
                for (ts, row) in rowset.rows_mut() {
                    if let Some(parent_row) = assembled.row_at(ts) {
                        row.merge(parent_row);
                    }
                }
            }
        }

        // Properties are timestamp-constant; write them into every row
        // directly instead of routing them through the merge.
        let wanted = property_slots(schema, Some(RelationKind::Parent));
        if !wanted.is_empty() {
            let props = self.properties_of(&parent.id).await?;
            apply_properties(rowset, &wanted, &props);
        }
        Ok(())
    }

    /// Fold all children's metrics into the rowset, one value per
    /// (timestamp, slot), using each field's aggregation
    pub async fn splice_children(
        &self,
        rowset: &mut Rowset,
        schema: &Schema,
        spec: &StatsSpec,
    ) -> Result<()> {
        let Some(target) = schema.related_target(RelationKind::Child) else {
            return Ok(());
        };
        let own_id = rowset.resource_id().clone();
        let depth = schema.related_depth(RelationKind::Child);
        let children = self
            .api
            .relatives_of(&own_id, RelationKind::Child, target, depth)
            .await?;
        if children.is_empty() {
            return Ok(());
        }

        let kinds: HashMap<usize, AggregationKind> = schema
            .fields()
            .iter()
            .filter(|f| {
                f.kind == FieldKind::Metric && f.relation.kind() == Some(RelationKind::Child)
            })
            .map(|f| {
                (
                    f.row_index,
                    f.aggregation.unwrap_or(AggregationKind::Average),
                )
            })
            .collect();

        if !kinds.is_empty() {
            if let Some(derived) = schema.related_schema(RelationKind::Child) {
                let ids: Vec<ResourceId> = children.iter().map(|c| c.id.clone()).collect();
                let feed = self
                    .api
                    .stats_feed(&ids, derived.metric_keys(), spec)
                    .await?;
                let mut decoder = StatsDecoder::new(feed, &derived);
                let mut folds: HashMap<(i64, usize), Box<dyn Aggregator>> = HashMap::new();
                while let Some(child) = decoder.next_rowset().await? {
                    for (ts, row) in child.rows() {
                        for (&slot, &kind) in &kinds {
                            if let Some(value) = row.metric(slot) {
                                folds
                                    .entry((ts, slot))
                                    .or_insert_with(|| kind.new_aggregator())
                                    .apply(value);
                            }
                        }
                    }
                }
                for ((ts, slot), agg) in &folds {
                    if agg.has_result() {
                        rowset.row_mut(*ts, schema).set_metric(*slot, agg.result());
                    }
                }
            }
        }

        // One-to-many property slots take the first child's value.
        let wanted = property_slots(schema, Some(RelationKind::Child));
        if !wanted.is_empty() {
            let props = self.properties_of(&children[0].id).await?;
            apply_properties(rowset, &wanted, &props);
        }
        Ok(())
    }

    async fn properties_of(&self, id: &ResourceId) -> Result<HashMap<String, String>> {
        if let Some(props) = self.cache.props(id) {
            return Ok(props);
        }
        let props = self.api.properties(id).await?;
        self.cache.store_props(id.clone(), props.clone());
        Ok(props)
    }

    /// The parent's assembled metric rowset, via the window-keyed cache
    async fn parent_rowset(
        &self,
        parent_id: &ResourceId,
        derived: &Schema,
        spec: &StatsSpec,
    ) -> Result<Arc<Rowset>> {
        let (begin, end) = match spec.window {
            Some(w) => (w.begin, w.end),
            None => (0, 0),
        };
        let key = RowsetKey {
            id: parent_id.clone(),
            begin,
            end,
        };
        if let Some(cached) = self.cache.rowset(&key) {
            return Ok(cached);
        }
        let feed = self
            .api
            .stats_feed(std::slice::from_ref(parent_id), derived.metric_keys(), spec)
            .await?;
        let mut decoder = StatsDecoder::new(feed, derived);
        let mut assembled = Rowset::new(parent_id.clone());
        while let Some(rs) = decoder.next_rowset().await? {
            if rs.resource_id() == parent_id {
                assembled = rs;
            }
        }
        let assembled = Arc::new(assembled);
        self.cache.store_rowset(key, Arc::clone(&assembled));
        Ok(assembled)
    }
}

/// (source key, prop slot) pairs for the given scope; `None` = own fields
fn property_slots<'a>(
    schema: &'a Schema,
    relation: Option<RelationKind>,
) -> Vec<(&'a str, usize)> {
    schema
        .fields()
        .iter()
        .filter(|f| f.kind.is_property_like() && f.relation.kind() == relation)
        .map(|f| (f.local_name.as_str(), f.row_index))
        .collect()
}

fn apply_properties(rowset: &mut Rowset, wanted: &[(&str, usize)], props: &HashMap<String, String>) {
    for (_ts, row) in rowset.rows_mut() {
        for (key, slot) in wanted {
            if let Some(value) = props.get(*key) {
                row.set_prop(*slot, value.clone());
            }
        }
    }
}
