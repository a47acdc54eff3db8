//! Import targets and their typed drafts.
//!
//! Each importable resource maps raw rows into a draft struct with explicit
//! optional fields, so the code names exactly what may be missing instead of
//! passing loose maps around. Drafts are built at the mapping stage,
//! validated, and only then flattened into backend records.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{FieldgateError, Result};
use crate::gateway::Record;
use crate::rbac::Principal;

use super::alias;
use super::file::RawRow;

/// A resource the Import Pipeline can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    Farmers,
    Dealers,
    Orders,
}

impl ImportTarget {
    /// Backend collection the rows are committed to.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Farmers => "farmers",
            Self::Dealers => "dealers",
            Self::Orders => "orders",
        }
    }

    /// Permission key the importing principal must hold.
    pub fn required_permission(&self) -> &'static str {
        match self {
            Self::Farmers => "field_create",
            Self::Dealers | Self::Orders => "sales_create",
        }
    }
}

impl std::fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drafts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FarmerDraft {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub phone: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub farm_size_acres: Option<f64>,
    pub irrigation_type: Option<String>,
    pub land_type: Option<String>,
    pub soil_type: Option<String>,
    pub crops: Vec<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DealerDraft {
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub status: String,
    pub kyc_status: String,
    pub credit_limit: f64,
    pub outstanding_balance: f64,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub dealer_name: Option<String>,
    pub dealer_id: Option<String>,
    pub order_date: Option<String>,
    pub expected_delivery: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub total_amount: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub action: Option<String>,
    pub zone: Option<String>,
    pub area: Option<String>,
    pub designation: Option<String>,
}

impl OrderDraft {
    /// `net = total − discount + tax`, derived, never imported directly.
    pub fn net_amount(&self) -> f64 {
        self.total_amount - self.discount_amount + self.tax_amount
    }
}

/// Draft tagged by target resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    Farmer(FarmerDraft),
    Dealer(DealerDraft),
    Order(OrderDraft),
}

impl Draft {
    /// Build a draft from a raw row. Coercion failures become nulls here;
    /// nothing is rejected until validation.
    pub fn from_row(
        target: ImportTarget,
        row: &RawRow,
        principal: &Principal,
        list_delimiter: char,
    ) -> Self {
        match target {
            ImportTarget::Farmers => Self::Farmer(farmer_from_row(row, principal, list_delimiter)),
            ImportTarget::Dealers => Self::Dealer(dealer_from_row(row)),
            ImportTarget::Orders => Self::Order(order_from_row(row)),
        }
    }

    /// Check the target's required fields. `Err` carries the reason the row
    /// is silently dropped.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Farmer(f) => require(f.name.is_some(), "name"),
            Self::Dealer(d) => {
                require(d.name.is_some(), "name")?;
                require(d.phone.is_some(), "phone")
            }
            Self::Order(o) => {
                require(o.dealer_id.is_some(), "dealer")?;
                require(o.order_date.is_some(), "order_date")
            }
        }
    }

    /// Flatten into the record submitted to the gateway.
    pub fn into_record(self) -> Record {
        let value = match self {
            Self::Farmer(f) => json!({
                "name": f.name,
                "age": f.age,
                "phone": f.phone,
                "village": f.village,
                "district": f.district,
                "state": f.state,
                "farm_size_acres": f.farm_size_acres,
                "irrigation_type": f.irrigation_type,
                "land_type": f.land_type,
                "soil_type": f.soil_type,
                "crops": f.crops,
                "lat": f.lat,
                "lon": f.lon,
                "created_by": f.created_by,
            }),
            Self::Dealer(d) => json!({
                "name": d.name,
                "business_name": d.business_name,
                "phone": d.phone,
                "email": d.email,
                "address": d.address,
                "city": d.city,
                "state": d.state,
                "region": d.region,
                "status": d.status,
                "kyc_status": d.kyc_status,
                "credit_limit": d.credit_limit,
                "outstanding_balance": d.outstanding_balance,
                "rating": d.rating,
            }),
            Self::Order(o) => json!({
                "dealer_id": o.dealer_id,
                "order_date": o.order_date,
                "expected_delivery": o.expected_delivery,
                "status": o.status,
                "payment_status": o.payment_status,
                "total_amount": o.total_amount,
                "discount_amount": o.discount_amount,
                "tax_amount": o.tax_amount,
                "net_amount": o.net_amount(),
                "action": o.action,
                "zone": o.zone,
                "area": o.area,
                "designation": o.designation,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }
}

fn require(present: bool, field: &str) -> Result<()> {
    if present {
        Ok(())
    } else {
        Err(FieldgateError::missing_required_field(field))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-target mapping
// ─────────────────────────────────────────────────────────────────────────────

fn farmer_from_row(row: &RawRow, principal: &Principal, delimiter: char) -> FarmerDraft {
    FarmerDraft {
        name: alias::text(row, &["name", "Name"]),
        age: alias::integer(row, &["age", "Age"]),
        phone: alias::text(row, &["phone", "Phone"]),
        village: alias::text(row, &["village", "Village"]),
        district: alias::text(row, &["district", "District"]),
        state: alias::text(row, &["state", "State"]),
        farm_size_acres: alias::float(row, &["farm_size_acres", "Farm Size (acres)"]),
        irrigation_type: alias::text(row, &["irrigation_type", "Irrigation"]),
        land_type: alias::text(row, &["land_type", "Land"]),
        soil_type: alias::text(row, &["soil_type", "Soil Type"]),
        crops: alias::list(row, &["crops", "Crops"], delimiter),
        lat: alias::float(row, &["lat", "Lat"]),
        lon: alias::float(row, &["lon", "Lon"]),
        created_by: principal.id.clone(),
    }
}

fn dealer_from_row(row: &RawRow) -> DealerDraft {
    DealerDraft {
        name: alias::text(row, &["name", "Name"]),
        business_name: alias::text(row, &["business_name", "Business Name"]),
        phone: alias::text(row, &["phone", "Phone"]),
        email: alias::text(row, &["email", "Email"]),
        address: alias::text(row, &["address", "Address"]),
        city: alias::text(row, &["city", "City"]),
        state: alias::text(row, &["state", "State"]),
        region: alias::text(row, &["region", "Region"]),
        status: alias::text(row, &["status", "Status"]).unwrap_or_else(|| "active".to_string()),
        kyc_status: alias::text(row, &["kyc_status", "KYC Status"])
            .unwrap_or_else(|| "pending".to_string()),
        credit_limit: alias::float(row, &["credit_limit", "Credit Limit"]).unwrap_or(0.0),
        outstanding_balance: alias::float(row, &["outstanding_balance", "Outstanding Balance"])
            .unwrap_or(0.0),
        rating: alias::float(row, &["rating", "Rating"]),
    }
}

fn order_from_row(row: &RawRow) -> OrderDraft {
    OrderDraft {
        dealer_name: alias::text(row, &["dealer", "Dealer", "Dealer Name", "Business Name"]),
        dealer_id: None, // resolved against the dealer directory
        order_date: alias::date(row, &["order_date", "Order Date"]),
        expected_delivery: alias::date(row, &["expected_delivery", "Expected Delivery"]),
        status: alias::text(row, &["status", "Status"]).unwrap_or_else(|| "pending".to_string()),
        payment_status: alias::text(row, &["payment_status", "Payment Status"])
            .unwrap_or_else(|| "unpaid".to_string()),
        total_amount: alias::float(row, &["total_amount", "Total Amount"]).unwrap_or(0.0),
        discount_amount: alias::float(row, &["discount_amount", "Discount Amount"]).unwrap_or(0.0),
        tax_amount: alias::float(row, &["tax_amount", "Tax Amount"]).unwrap_or(0.0),
        action: alias::text(row, &["action", "Action"]),
        zone: alias::text(row, &["zone", "Zone"]),
        area: alias::text(row, &["area", "Area"]),
        designation: alias::text(row, &["designation", "Designation"]),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dealer directory
// ─────────────────────────────────────────────────────────────────────────────

/// Lookup from lowercased dealer name (and business name) to dealer id, for
/// resolving the dealer column of order imports.
#[derive(Debug, Default)]
pub struct DealerDirectory {
    by_name: HashMap<String, String>,
}

impl DealerDirectory {
    pub fn from_records(dealers: &[Record]) -> Self {
        let mut by_name = HashMap::new();
        for dealer in dealers {
            let Some(id) = dealer.get("id").and_then(Value::as_str) else {
                continue;
            };
            for column in ["name", "business_name"] {
                if let Some(name) = dealer.get(column).and_then(Value::as_str) {
                    by_name.insert(name.to_lowercase(), id.to_string());
                }
            }
        }
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.by_name.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Fill in `dealer_id` on order drafts; other drafts pass through.
    pub fn resolve(&self, draft: &mut Draft) {
        if let Draft::Order(order) = draft {
            order.dealer_id = order
                .dealer_name
                .as_deref()
                .and_then(|name| self.lookup(name))
                .map(str::to_string);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
