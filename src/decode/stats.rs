//! Stats-document walker
//!
//! [`StatsDecoder`] drives a [`TokenCursor`] through one stats response and
//! hands back one [`Rowset`] per resource element, pull-style: the caller
//! loops `next_rowset()` and does whatever per-resource work it wants (for
//! parent splicing that includes fetching and decoding another stream with
//! a fresh decoder) while this stream stays open. No state survives across
//! instances, so recursion is plain function calls.

use std::collections::BTreeMap;

use crate::decode::cursor::{Token, TokenCursor};
use crate::decode::feed::ByteFeed;
use crate::error::{DecodeError, Result};
use crate::model::{Row, Rowset, Schema};
use crate::types::ResourceId;

enum WalkState {
    /// Before the root object / `values` array
    Start,
    /// Inside the `values` array, between resource elements
    InValues,
    /// Root object closed
    Done,
}

/// Streaming decoder for one stats response
///
/// Constructed fresh per stream; schema projection happens inline with
/// decoding, so series the schema does not know are consumed (to keep the
/// cursor synchronized) and dropped.
pub struct StatsDecoder<'s, F> {
    cursor: TokenCursor<F>,
    schema: &'s Schema,
    state: WalkState,
}

impl<'s, F: ByteFeed> StatsDecoder<'s, F> {
    /// Decode the given feed against `schema`
    pub fn new(feed: F, schema: &'s Schema) -> Self {
        StatsDecoder {
            cursor: TokenCursor::new(feed),
            schema,
            state: WalkState::Start,
        }
    }

    /// Next resource's rowset, or `None` once the document is exhausted
    ///
    /// Rows are keyed by timestamp as they are discovered, so the returned
    /// rowset is already timestamp-ordered. Any error leaves the decoder
    /// unusable; malformed input is fatal for the whole chunk.
    pub async fn next_rowset(&mut self) -> Result<Option<Rowset>> {
        loop {
            match self.state {
                WalkState::Done => return Ok(None),
                WalkState::Start => {
                    match self.cursor.next_token().await? {
                        // An empty body carries no data; not a format error.
                        None => {
                            self.state = WalkState::Done;
                            return Ok(None);
                        }
                        Some(Token::ObjectStart) => {}
                        Some(other) => return Err(self.cursor.unexpected("'{'", &other)),
                    }
                    loop {
                        match self.cursor.next_member().await? {
                            Some(name) if name == "values" => {
                                self.cursor.expect_array_start().await?;
                                self.state = WalkState::InValues;
                                break;
                            }
                            Some(_) => self.cursor.skip_value().await?,
                            None => {
                                self.state = WalkState::Done;
                                return Ok(None);
                            }
                        }
                    }
                }
                WalkState::InValues => {
                    match self.cursor.require_token("resource element or ']'").await? {
                        Token::ObjectStart => {
                            let rowset = self.decode_resource().await?;
                            return Ok(Some(rowset));
                        }
                        Token::ArrayEnd => {
                            self.finish_root().await?;
                            self.state = WalkState::Done;
                            return Ok(None);
                        }
                        other => {
                            return Err(self.cursor.unexpected("resource element or ']'", &other))
                        }
                    }
                }
            }
        }
    }

    /// Remaining root members after `values`, then the closing brace and a
    /// clean end of stream
    async fn finish_root(&mut self) -> Result<()> {
        while let Some(_name) = self.cursor.next_member().await? {
            self.cursor.skip_value().await?;
        }
        match self.cursor.next_token().await? {
            None => Ok(()),
            Some(other) => Err(self.cursor.unexpected("end of document", &other)),
        }
    }

    /// One element of `values`; its `{` is already consumed
    async fn decode_resource(&mut self) -> Result<Rowset> {
        let mut resource_id: Option<String> = None;
        let mut rows: BTreeMap<i64, Row> = BTreeMap::new();

        while let Some(member) = self.cursor.next_member().await? {
            match member.as_str() {
                "resourceId" => resource_id = Some(self.cursor.expect_string().await?),
                "stat-list" => self.decode_stat_list(&mut rows).await?,
                _ => self.cursor.skip_value().await?,
            }
        }

        let id = resource_id.ok_or_else(|| DecodeError::Unexpected {
            expected: "\"resourceId\" member in resource element".to_string(),
            found: "'}'".to_string(),
            offset: self.cursor.token_offset(),
        })?;

        let mut rowset = Rowset::new(ResourceId::from(id));
        for (timestamp, row) in rows {
            rowset.insert(timestamp, row);
        }
        Ok(rowset)
    }

    async fn decode_stat_list(&mut self, rows: &mut BTreeMap<i64, Row>) -> Result<()> {
        self.cursor.expect_object_start().await?;
        while let Some(member) = self.cursor.next_member().await? {
            match member.as_str() {
                "stat" => {
                    self.cursor.expect_array_start().await?;
                    loop {
                        match self.cursor.require_token("stat object or ']'").await? {
                            Token::ObjectStart => self.decode_stat(rows).await?,
                            Token::ArrayEnd => break,
                            other => {
                                return Err(self.cursor.unexpected("stat object or ']'", &other))
                            }
                        }
                    }
                }
                _ => self.cursor.skip_value().await?,
            }
        }
        Ok(())
    }

    /// One series: timestamps, statKey and data may appear in any order,
    /// alongside members (rollUpType, intervalUnit, …) nobody asked for
    async fn decode_stat(&mut self, rows: &mut BTreeMap<i64, Row>) -> Result<()> {
        let mut timestamps: Vec<f64> = Vec::new();
        let mut data: Vec<f64> = Vec::new();
        let mut key: Option<String> = None;

        while let Some(member) = self.cursor.next_member().await? {
            match member.as_str() {
                "timestamps" => timestamps = self.cursor.read_number_array().await?,
                "data" => data = self.cursor.read_number_array().await?,
                "statKey" => key = self.decode_stat_key().await?,
                _ => self.cursor.skip_value().await?,
            }
        }

        // timestamps and data are parallel arrays; the lengths must agree.
        if timestamps.len() != data.len() {
            return Err(DecodeError::Unexpected {
                expected: format!("\"data\" of length {}", timestamps.len()),
                found: format!("\"data\" of length {}", data.len()),
                offset: self.cursor.token_offset(),
            }
            .into());
        }

        let slot = key.and_then(|k| self.schema.metric_slot(&k));
        if let Some(index) = slot {
            let schema = self.schema;
            for (ts, value) in timestamps.iter().zip(data.iter()) {
                rows.entry(*ts as i64)
                    .or_insert_with(|| Row::new(schema))
                    .set_metric(index, *value);
            }
        }
        Ok(())
    }

    async fn decode_stat_key(&mut self) -> Result<Option<String>> {
        self.cursor.expect_object_start().await?;
        let mut key = None;
        while let Some(member) = self.cursor.next_member().await? {
            match member.as_str() {
                "key" => key = Some(self.cursor.expect_string().await?),
                _ => self.cursor.skip_value().await?,
            }
        }
        Ok(key)
    }
}
