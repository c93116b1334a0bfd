//! Fixture seeding over the items REST API
//!
//! The backend item collection is the only state shared between scenarios.
//! Anything that needs a deterministic view resets it with
//! [`FixtureClient::delete_all_items`] first instead of relying on ordering.

use std::fmt;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{join_url, ApiConfig};
use crate::error::{E2eError, E2eResult};

/// Upper bound on list/delete rounds for one reset. Each round removes every
/// listed record, so more rounds only happen with a paginated listing.
const MAX_DELETE_ROUNDS: usize = 50;

/// Currencies the backend accepts for an item price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Bgn,
    Eur,
    Usd,
    Gbp,
    Chf,
    Ron,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::Bgn => "BGN",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Ron => "RON",
        };
        f.write_str(code)
    }
}

/// An item record as sent to the backend.
///
/// There is no id field: every create produces a new record, even for a
/// payload identical to one already sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub quantity_unit: String,
    pub catalog_number: String,
    pub price_for_quantity: f64,
    pub price: f64,
    pub currency: Currency,
}

impl Item {
    /// Item priced per one `quantity_unit`
    pub fn new(
        name: impl Into<String>,
        quantity_unit: impl Into<String>,
        catalog_number: impl Into<String>,
        price: f64,
        currency: Currency,
    ) -> Self {
        Self {
            name: name.into(),
            quantity_unit: quantity_unit.into(),
            catalog_number: catalog_number.into(),
            price_for_quantity: price,
            price,
            currency,
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::InvalidItem("name is empty".to_string()));
        }
        for (field, value) in [
            ("price", self.price),
            ("price_for_quantity", self.price_for_quantity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(E2eError::InvalidItem(format!(
                    "{} of {:?} must be a finite non-negative number, got {}",
                    field, self.name, value
                )));
            }
        }
        Ok(())
    }
}

/// What the backend reported for a created record. The harness never uses
/// it to address the record again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    pub id: Option<String>,
    pub status: u16,
}

/// REST client for seeding and resetting backend items
pub struct FixtureClient {
    client: reqwest::Client,
    items_url: String,
    token: Option<String>,
}

impl FixtureClient {
    pub fn new(config: &ApiConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            items_url: join_url(&config.base_url, "items"),
            token: config.token.clone(),
        })
    }

    /// Create one backend record from `item`
    pub async fn create_item(&self, item: &Item) -> E2eResult<RecordHandle> {
        item.validate()?;
        debug!("Creating item {:?} ({} {})", item.name, item.price, item.currency);

        let resp = self
            .authorized(self.client.post(&self.items_url))
            .json(item)
            .send()
            .await?;
        let resp = check_status("create item", resp).await?;
        let status = resp.status().as_u16();

        // Some deployments answer 201/204 with no body
        let body = resp.text().await?;
        let id = serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(record_id);

        info!("Created item {:?} (id: {})", item.name, id.as_deref().unwrap_or("-"));
        Ok(RecordHandle { id, status })
    }

    /// Seed several items in order, stopping at the first failure
    pub async fn create_items(&self, items: &[Item]) -> E2eResult<Vec<RecordHandle>> {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            handles.push(self.create_item(item).await?);
        }
        Ok(handles)
    }

    /// Remove every item owned by the test account.
    ///
    /// Calling this on an empty collection is a no-op. Every listed record is
    /// attempted even after a failure, and any failure is reported as
    /// [`E2eError::PartialDelete`]. Returns the number of records removed.
    pub async fn delete_all_items(&self) -> E2eResult<usize> {
        let mut deleted = 0;
        let mut remaining = 0;

        for round in 0..MAX_DELETE_ROUNDS {
            let ids = self.list_item_ids().await?;
            remaining = ids.len();
            if ids.is_empty() {
                info!("Item collection is empty ({} removed)", deleted);
                return Ok(deleted);
            }
            debug!("Delete round {}: {} item(s)", round + 1, ids.len());

            let total = deleted + ids.len();
            let mut failed = 0;
            for id in &ids {
                match self.delete_item(id).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        warn!("Failed to delete item {}: {}", id, e);
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                return Err(E2eError::PartialDelete {
                    deleted,
                    failed,
                    total,
                });
            }
        }

        // Deletes were acknowledged but the listing never drained
        Err(E2eError::Api {
            operation: "delete all items".to_string(),
            status: 200,
            body: format!(
                "{} item(s) still listed after {} delete rounds",
                remaining, MAX_DELETE_ROUNDS
            ),
        })
    }

    async fn list_item_ids(&self) -> E2eResult<Vec<String>> {
        let resp = self
            .authorized(self.client.get(&self.items_url))
            .send()
            .await?;
        let resp = check_status("list items", resp).await?;
        let body: Value = resp.json().await?;

        let records = match &body {
            Value::Array(records) => records,
            Value::Object(map) => match map.get("data").or_else(|| map.get("items")) {
                Some(Value::Array(records)) => records,
                _ => {
                    return Err(E2eError::Api {
                        operation: "list items".to_string(),
                        status: 200,
                        body: format!("unexpected listing shape: {}", body),
                    })
                }
            },
            _ => {
                return Err(E2eError::Api {
                    operation: "list items".to_string(),
                    status: 200,
                    body: format!("unexpected listing shape: {}", body),
                })
            }
        };

        records
            .iter()
            .map(|record| {
                record_id(record).ok_or_else(|| E2eError::Api {
                    operation: "list items".to_string(),
                    status: 200,
                    body: format!("record without id: {}", record),
                })
            })
            .collect()
    }

    async fn delete_item(&self, id: &str) -> E2eResult<()> {
        let url = format!("{}/{}", self.items_url, id);
        let resp = self.authorized(self.client.delete(&url)).send().await?;
        check_status("delete item", resp).await?;
        Ok(())
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

async fn check_status(operation: &str, resp: Response) -> E2eResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(E2eError::Api {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
