//! REST implementation of the platform API
//!
//! Thin wrapper over `reqwest`: endpoint assembly, bearer token, status
//! checking, and the classification of connection-level failures into the
//! "no response" overload signal the bisection retry keys on. Listing and
//! lookup responses are small JSON documents parsed with `serde_json`;
//! only the stats query streams, and that one is handed back as a
//! [`BodyFeed`] without touching the body here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{MetricsApi, ResourcePage, ResourceQuery, StatsSpec};
use crate::config::ConnectionConfig;
use crate::decode::{BodyFeed, ByteFeed};
use crate::error::{ApiError, Error, Result};
use crate::model::RelationKind;
use crate::types::{Resource, ResourceId};

/// REST client for one platform endpoint
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl RestClient {
    /// Build a client from the connection settings
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().map_err(ApiError::Transport)?;

        let mut host = config.host.clone();
        if !host.ends_with('/') {
            host.push('/');
        }
        let base = Url::parse(&host).map_err(ApiError::Url)?;

        Ok(RestClient {
            http,
            base,
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path).map_err(ApiError::Url)?)
    }

    /// Map connection-level failures to the overload signal
    fn classify(e: reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() {
            ApiError::NoResponse(e.to_string()).into()
        } else {
            ApiError::Transport(e).into()
        }
    }

    fn ensure_ok(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // 503 means the backend is shedding load; treat like no response
        // so the caller retries with smaller chunks.
        if status.as_u16() == 503 {
            return Err(ApiError::NoResponse(format!("HTTP 503 from {}", context)).into());
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            context: context.to_string(),
        }
        .into())
    }

    async fn get_document<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(Self::classify)?;
        let response = Self::ensure_ok(response, context)?;
        let body = response.bytes().await.map_err(Self::classify)?;
        Ok(serde_json::from_slice(&body).map_err(ApiError::Document)?)
    }
}

#[async_trait]
impl MetricsApi for RestClient {
    async fn resource_page(&self, query: &ResourceQuery, page: usize) -> Result<ResourcePage> {
        let mut url = self.endpoint("api/resources")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("resourceKind", &query.resource_kind);
            pairs.append_pair("pageSize", &query.page_size.to_string());
            pairs.append_pair("page", &page.to_string());
            if let Some(adapter) = &query.adapter_kind {
                pairs.append_pair("adapterKind", adapter);
            }
            if let Some(name) = &query.name_filter {
                pairs.append_pair("name", name);
            }
            if let Some(parent) = &query.parent_scope {
                pairs.append_pair("parentId", parent.as_str());
            }
        }
        let doc: ResourceListDoc = self.get_document(url, "resource listing").await?;
        Ok(ResourcePage {
            total: doc
                .page_info
                .map(|p| p.total_count)
                .unwrap_or(doc.resource_list.len()),
            resources: doc.resource_list.into_iter().map(Resource::from).collect(),
        })
    }

    async fn stats_feed(
        &self,
        ids: &[ResourceId],
        keys: &[String],
        spec: &StatsSpec,
    ) -> Result<Box<dyn ByteFeed>> {
        let url = self.endpoint("api/resources/stats/query")?;
        let body = StatsRequest {
            resource_id: ids,
            stat_key: keys,
            begin: spec.window.map(|w| w.begin),
            end: spec.window.map(|w| w.end),
            roll_up_type: spec.rollup.as_str(),
            interval_type: "MINUTES",
            interval_quantifier: spec.interval_minutes,
            current_only: spec.latest_only(),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;
        let response = Self::ensure_ok(response, "stats query")?;
        Ok(Box::new(BodyFeed::new(response)))
    }

    async fn properties(&self, id: &ResourceId) -> Result<HashMap<String, String>> {
        let url = self.endpoint(&format!("api/resources/{}/properties", id))?;
        let doc: PropertiesDoc = self.get_document(url, "property lookup").await?;
        Ok(doc
            .property
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect())
    }

    async fn relatives_of(
        &self,
        id: &ResourceId,
        relation: RelationKind,
        target_kind: &str,
        depth: u32,
    ) -> Result<Vec<Resource>> {
        let mut url = self.endpoint(&format!("api/resources/{}/relationships", id))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("relationshipType", relation_param(relation));
            if depth > 1 {
                pairs.append_pair("hierarchyDepth", &depth.to_string());
            }
        }
        let doc: ResourceListDoc = self.get_document(url, "relationship lookup").await?;
        Ok(doc
            .resource_list
            .into_iter()
            .map(Resource::from)
            .filter(|r| r.resource_kind == target_kind)
            .collect())
    }
}

fn relation_param(relation: RelationKind) -> &'static str {
    match relation {
        RelationKind::Parent => "PARENT",
        RelationKind::Child => "CHILD",
    }
}

// ============================================================================
// Wire documents
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsRequest<'a> {
    resource_id: &'a [ResourceId],
    stat_key: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    begin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<i64>,
    roll_up_type: &'a str,
    interval_type: &'a str,
    interval_quantifier: u32,
    current_only: bool,
}

#[derive(Deserialize)]
struct ResourceListDoc {
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
    #[serde(rename = "resourceList", default)]
    resource_list: Vec<ResourceDoc>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "totalCount")]
    total_count: usize,
}

#[derive(Deserialize)]
struct ResourceDoc {
    identifier: String,
    #[serde(rename = "resourceKey")]
    resource_key: ResourceKeyDoc,
}

#[derive(Deserialize)]
struct ResourceKeyDoc {
    name: String,
    #[serde(rename = "resourceKindKey")]
    resource_kind_key: String,
    #[serde(rename = "adapterKindKey")]
    adapter_kind_key: String,
}

impl From<ResourceDoc> for Resource {
    fn from(doc: ResourceDoc) -> Self {
        Resource {
            id: ResourceId::from(doc.identifier),
            name: doc.resource_key.name,
            resource_kind: doc.resource_key.resource_kind_key,
            adapter_kind: doc.resource_key.adapter_kind_key,
        }
    }
}

#[derive(Deserialize)]
struct PropertiesDoc {
    #[serde(default)]
    property: Vec<PropertyDoc>,
}

#[derive(Deserialize)]
struct PropertyDoc {
    name: String,
    value: String,
}
