pub mod config;

use crate::types::{ColumnHint, FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use sluice::{
    ChunkPlan, PageFetcher, PageRequest, Pagination, Record, ResponseShape, RetryClient,
    RetryPolicy,
};
use tracing::debug;

use self::config::{HostawayConfig, BASE_URL, PAGE_SIZE};

/// Resources read with `limit`/`offset`, by endpoint.
const PAGED: &[(&str, &str)] = &[
    ("conversations", "/conversations"),
    ("guest_payment_charges", "/guestPayments/charges"),
    ("reservations", "/reservations"),
];

/// Resources returned whole in one response, by endpoint.
const SINGLE: &[(&str, &str)] = &[
    ("account_tax_settings", "/accountTaxSettings"),
    ("bed_types", "/bedTypes"),
    ("cancellation_policies", "/cancellationPolicies"),
    ("cancellation_policies_airbnb", "/cancellationPolicies/airbnb"),
    ("cancellation_policies_marriott", "/cancellationPolicies/marriott"),
    ("cancellation_policies_vrbo", "/cancellationPolicies/vrbo"),
    ("countries", "/countries"),
    ("coupons", "/coupons"),
    ("message_templates", "/messageTemplates"),
    ("property_types", "/propertyTypes"),
    ("reservation_payment_methods", "/reservations/paymentMethods"),
    ("tasks", "/tasks"),
    ("user_groups", "/userGroups"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    /// Listings active in the window.
    Listings,
    /// Every reservation.
    Reservations,
}

impl Parent {
    /// Field carrying the parent id on child records.
    fn key(self) -> &'static str {
        match self {
            Parent::Listings => "listingId",
            Parent::Reservations => "reservationId",
        }
    }
}

/// A resource read once per parent record.
struct PerParent {
    name: &'static str,
    parent: Parent,
    /// `{id}` is replaced by the parent id.
    endpoint: &'static str,
    paged: bool,
    primary_key: &'static [&'static str],
}

const PER_PARENT: &[PerParent] = &[
    PerParent {
        name: "finance_fields",
        parent: Parent::Reservations,
        endpoint: "/financeField/{id}",
        paged: false,
        primary_key: &["id"],
    },
    PerParent {
        name: "listing_agreements",
        parent: Parent::Listings,
        endpoint: "/listingAgreement/{id}",
        paged: true,
        primary_key: &["id"],
    },
    PerParent {
        name: "listing_calendars",
        parent: Parent::Listings,
        endpoint: "/listings/{id}/calendar",
        paged: false,
        primary_key: &["listingId", "date"],
    },
    PerParent {
        name: "listing_fee_settings",
        parent: Parent::Listings,
        endpoint: "/listingFeeSettings/{id}",
        paged: true,
        primary_key: &["id"],
    },
    PerParent {
        name: "listing_pricing_settings",
        parent: Parent::Listings,
        endpoint: "/listing/pricingSettings/{id}",
        paged: true,
        primary_key: &["listingId"],
    },
    PerParent {
        name: "reservation_rental_agreements",
        parent: Parent::Reservations,
        endpoint: "/reservations/{id}/rentalAgreement",
        paged: false,
        primary_key: &["reservationId"],
    },
];

/// Hostaway connector.
///
/// `listings` and `listing_fee_settings` are incremental. The API cannot
/// filter or sort either by time, so every page is read and records outside
/// the window are dropped.
///
/// Per-parent resources first look up their parents (the listings active in
/// the window, or every reservation), then read one sub-session per parent
/// and tag each record with the parent id. A parent the API no longer knows
/// (404) yields nothing.
pub struct HostawayConnector {
    client: RetryClient,
    base_url: String,
    access_token: String,
}

impl HostawayConnector {
    pub fn new(config: &HostawayConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(policy)?,
            base_url: BASE_URL.to_string(),
            access_token: config.access_token.clone(),
        })
    }

    /// Create a connector with a custom API base URL (for testing).
    pub fn with_base_url(base_url: String, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(config::retry_policy())?,
            base_url,
            access_token: access_token.to_string(),
        })
    }

    fn fetcher(&self) -> PageFetcher {
        PageFetcher::new(self.client.clone(), self.base_url.clone())
            .bearer_auth(self.access_token.clone())
            .shape(ResponseShape::first_of(["result"]))
    }

    fn offset_pages(fetcher: PageFetcher) -> PageFetcher {
        fetcher.pagination(Pagination::offset("offset", PAGE_SIZE).with_size_param("limit", PAGE_SIZE))
    }

    fn paged(&self, endpoint: &str) -> FetchPlan {
        FetchPlan::new(Self::offset_pages(self.fetcher()), PageRequest::new(endpoint))
    }

    fn listings(&self, window: &SyncWindow) -> FetchPlan {
        let cursor = window
            .timestamp_cursor("latestActivityOn")
            .end_inclusive(true)
            .sorted(false);
        self.paged("/listings")
            .normalize(normalize_activity)
            .cursor(cursor)
    }

    fn per_parent(&self, resource: &PerParent, window: &SyncWindow) -> FetchPlan {
        let mut fetcher = self.fetcher().not_found_as_empty(true);
        if resource.paged {
            fetcher = Self::offset_pages(fetcher);
        }
        let fee_cursor = (resource.name == "listing_fee_settings").then(|| {
            window
                .timestamp_cursor("updatedOn")
                .end_inclusive(true)
                .sorted(false)
        });
        let parents = match resource.parent {
            Parent::Listings => self.listings(window),
            Parent::Reservations => self.paged("/reservations"),
        };

        let name = resource.name;
        let endpoint = resource.endpoint;
        let key = resource.parent.key();
        parents.then(move |parents| {
            let ids: Vec<Value> = parents
                .iter()
                .filter_map(|parent| parent.get("id"))
                .filter(|id| !id.is_null())
                .cloned()
                .collect();
            debug!(resource = name, parents = ids.len(), "Collected parent ids");

            let chunks = ChunkPlan::per_parent(ids, key, move |id| {
                PageRequest::new(endpoint.replace("{id}", &id_text(id)))
            });
            let plan = FetchPlan::new(fetcher, PageRequest::default()).chunks(chunks);
            Ok(match fee_cursor {
                Some(cursor) => plan.normalize(normalize_updated).cursor(cursor),
                None => plan,
            })
        })
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Connector for HostawayConnector {
    fn name(&self) -> &str {
        "hostaway"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        let mut resources = vec![ResourceSpec::new("listings", &["id"])
            .incremental("latestActivityOn")
            .column("latestActivityOn", ColumnHint::Timestamp)];
        resources.extend(PAGED.iter().map(|(name, _)| ResourceSpec::new(name, &["id"])));
        resources.extend(SINGLE.iter().map(|(name, _)| ResourceSpec::new(name, &["id"])));
        resources.extend(PER_PARENT.iter().map(|resource| {
            let spec = ResourceSpec::new(resource.name, resource.primary_key);
            if resource.name == "listing_fee_settings" {
                spec.incremental("updatedOn")
                    .column("updatedOn", ColumnHint::Timestamp)
            } else {
                spec
            }
        }));
        resources
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        if resource == "listings" {
            return Ok(self.listings(window));
        }
        if let Some(per_parent) = PER_PARENT.iter().find(|r| r.name == resource) {
            return Ok(self.per_parent(per_parent, window));
        }
        if let Some((_, endpoint)) = PAGED.iter().find(|(name, _)| *name == resource) {
            return Ok(self.paged(endpoint));
        }
        if let Some((_, endpoint)) = SINGLE.iter().find(|(name, _)| *name == resource) {
            return Ok(FetchPlan::new(self.fetcher(), PageRequest::new(*endpoint)));
        }
        bail!("unknown Hostaway resource `{}`", resource)
    }
}

/// Rewrites `latestActivityOn` as RFC 3339. Listings that never had
/// activity, or carry an unreadable value, get the unix epoch.
fn normalize_activity(listing: Record) -> Record {
    with_epoch_fallback(listing, "latestActivityOn")
}

/// Same for the `updatedOn` of fee settings.
fn normalize_updated(fee: Record) -> Record {
    with_epoch_fallback(fee, "updatedOn")
}

fn with_epoch_fallback(mut record: Record, field: &str) -> Record {
    let at = record
        .get(field)
        .and_then(Value::as_str)
        .and_then(parse_activity)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    record.insert(
        field.to_string(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    record
}

/// `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339.
fn parse_activity(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
