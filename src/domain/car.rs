//! Car listing entities
//!
//! `ListingDetails` is the transient result of extracting one detail page;
//! it becomes a `NewCar` once the seller phone has been resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived authorization token embedded in a detail page, required by
/// the phone-disclosure endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneToken {
    pub hash: String,
    pub expires: String,
}

/// Structured fields extracted from a single detail page.
///
/// Everything except the URL is optional: partial pages are still processed,
/// and missing-field handling is decided downstream. `removed` is set when
/// the page carries the "listing deleted" banner.
#[derive(Debug, Clone, Default)]
pub struct ListingDetails {
    pub url: String,
    pub title: Option<String>,
    pub price_usd: Option<i32>,
    /// Mileage in kilometers.
    pub odometer: Option<i32>,
    /// Seller or dealership name.
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub images_count: Option<i32>,
    /// License plate, uppercased with spaces stripped.
    pub car_number: Option<String>,
    pub car_vin: Option<String>,
    pub phone_token: Option<PhoneToken>,
    pub removed: bool,
}

impl ListingDetails {
    /// Finalize the details into an insertable record. A verified phone
    /// number is mandatory by this point, which is why it is taken by value
    /// here rather than carried as another optional field.
    pub fn into_new_car(self, phone_number: String, datetime_found: DateTime<Utc>) -> NewCar {
        NewCar {
            url: self.url,
            title: self.title,
            price_usd: self.price_usd,
            odometer: self.odometer,
            username: self.username,
            phone_number,
            image_url: self.image_url,
            images_count: self.images_count,
            car_number: self.car_number,
            car_vin: self.car_vin,
            datetime_found,
        }
    }
}

/// Insert payload for the `cars` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewCar {
    pub url: String,
    pub title: Option<String>,
    pub price_usd: Option<i32>,
    pub odometer: Option<i32>,
    pub username: Option<String>,
    /// Canonical `+<digits>` form, see [`crate::domain::phone::normalize_phone`].
    pub phone_number: String,
    pub image_url: Option<String>,
    pub images_count: Option<i32>,
    pub car_number: Option<String>,
    pub car_vin: Option<String>,
    pub datetime_found: DateTime<Utc>,
}
