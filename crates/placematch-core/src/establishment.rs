//! Establishment aggregate: the unit the catalog stores and search reads.
//!
//! Aggregates are created and updated by the form-submission pipeline, which
//! is out of scope here; the search engine only ever reads them. The natural
//! key is the siret, and every aggregate carries at least one user right
//! holder and one location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::geo::GeoPosition;
use crate::search::Address;

#[derive(Debug, Error)]
pub enum EstablishmentError {
    #[error("invalid siret '{0}': must be exactly 14 digits")]
    InvalidSiret(String),
    #[error("establishment {0} has no user right holder")]
    MissingUserRights(Siret),
    #[error("establishment {0} has no location")]
    MissingLocations(Siret),
}

/// Unique French business establishment identifier: exactly 14 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Siret(String);

impl Siret {
    /// Parses and validates a siret.
    ///
    /// # Errors
    ///
    /// Returns [`EstablishmentError::InvalidSiret`] unless the input is
    /// exactly 14 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, EstablishmentError> {
        if raw.len() == 14 && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(EstablishmentError::InvalidSiret(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Siret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMode {
    Email,
    Phone,
    InPerson,
}

impl std::fmt::Display for ContactMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactMode::Email => write!(f, "email"),
            ContactMode::Phone => write!(f, "phone"),
            ContactMode::InPerson => write!(f, "in_person"),
        }
    }
}

impl std::str::FromStr for ContactMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ContactMode::Email),
            "phone" => Ok(ContactMode::Phone),
            "in_person" => Ok(ContactMode::InPerson),
            other => Err(format!("unknown contact mode '{other}'")),
        }
    }
}

/// Audience opt-in flags: which populations may discover the establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableBy {
    pub job_seekers: bool,
    pub students: bool,
}

impl Default for SearchableBy {
    fn default() -> Self {
        Self {
            job_seekers: true,
            students: false,
        }
    }
}

/// One immersion offer. Immutable once created; the pipeline replaces an
/// establishment's offer list wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmersionOffer {
    pub appellation_code: String,
    pub appellation_label: String,
    pub rome_code: String,
    pub rome_label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub address: Address,
    pub position: GeoPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Contact,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Contact => write!(f, "contact"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "contact" => Ok(UserRole::Contact),
            other => Err(format!("unknown user role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentUserRight {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    pub siret: Siret,
    pub name: String,
    pub is_open: bool,
    pub score: f64,
    pub naf_code: String,
    pub contact_mode: ContactMode,
    pub max_contacts_per_period: i32,
    /// Maintained by the contact pipeline when the per-period cap is hit.
    pub is_max_discussions_reached: bool,
    pub searchable_by: SearchableBy,
    /// Tri-state: `None` means the establishment has not declared either way.
    pub fit_for_disabled_workers: Option<bool>,
    pub next_availability_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentAggregate {
    pub establishment: Establishment,
    pub offers: Vec<ImmersionOffer>,
    pub locations: Vec<Location>,
    pub user_rights: Vec<EstablishmentUserRight>,
}

impl EstablishmentAggregate {
    /// Checks the aggregate invariants before it may be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`EstablishmentError::MissingUserRights`] if no user right
    /// holder is present, or [`EstablishmentError::MissingLocations`] if the
    /// aggregate owns no location.
    pub fn validate(&self) -> Result<(), EstablishmentError> {
        if self.user_rights.is_empty() {
            return Err(EstablishmentError::MissingUserRights(
                self.establishment.siret.clone(),
            ));
        }
        if self.locations.is_empty() {
            return Err(EstablishmentError::MissingLocations(
                self.establishment.siret.clone(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn siret(&self) -> &Siret {
        &self.establishment.siret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siret_accepts_14_digits() {
        let siret = Siret::parse("12345678901234").unwrap();
        assert_eq!(siret.as_str(), "12345678901234");
    }

    #[test]
    fn siret_rejects_wrong_length() {
        assert!(Siret::parse("1234567890123").is_err());
        assert!(Siret::parse("123456789012345").is_err());
    }

    #[test]
    fn siret_rejects_non_digits() {
        assert!(Siret::parse("1234567890123A").is_err());
        assert!(Siret::parse("              ").is_err());
    }

    #[test]
    fn siret_serializes_transparently() {
        let siret = Siret::parse("12345678901234").unwrap();
        assert_eq!(
            serde_json::to_string(&siret).unwrap(),
            "\"12345678901234\""
        );
    }

    #[test]
    fn contact_mode_round_trips_through_str() {
        for mode in [ContactMode::Email, ContactMode::Phone, ContactMode::InPerson] {
            assert_eq!(mode.to_string().parse::<ContactMode>().unwrap(), mode);
        }
    }
}
