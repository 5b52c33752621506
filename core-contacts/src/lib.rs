//! # Core Contacts
//!
//! Read-only decoder for the address book database embedded in a device
//! backup. Turns the vendor schema (`ABPerson` plus `ABMultiValue` rows with
//! wrapped labels) into plain contact records and answers phone, email, and
//! mixed-handle lookups from in-memory indexes.
//!
//! The store owns nothing beyond one open database handle; callers decide
//! when to open and close it, typically once per sync run.

pub mod error;
pub mod model;
pub mod store;

pub use error::{ContactStoreError, Result};
pub use model::{
    Contact, ContactMatch, ContactStoreStats, EmailEntry, MatchKind, PhoneEntry, OTHER_LABEL,
    PHONE_KEY_DIGITS, UNKNOWN_NAME,
};
pub use store::{ContactStore, CONTACTS_DB_HASH};
