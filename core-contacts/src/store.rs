//! # Contact Store Module
//!
//! ## Overview
//!
//! Decodes the address book database embedded in a device backup into
//! in-memory contact records with phone/email lookup indexes. The database
//! lives at a fixed content-addressed path inside the backup and is opened
//! strictly read-only.
//!
//! ## Schema notes
//!
//! Contacts are rows of `ABPerson`. Phone numbers and email addresses are
//! rows of `ABMultiValue` keyed by owning record id, with the property column
//! distinguishing the two. Labels are indirected through
//! `ABMultiValueLabel` and arrive wrapped in the vendor `_$!<Label>!$_`
//! encoding.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_contacts::ContactStore;
//!
//! let store = ContactStore::new();
//! store.open(backup_path).await?;
//! let hit = store.lookup_by_handle("+1 555 123 4567").await;
//! store.close().await;
//! ```

use crate::error::{ContactStoreError, Result};
use crate::model::{
    clean_label, display_name, normalize_phone, trailing_digits_key, Contact, ContactMatch,
    ContactStoreStats, EmailEntry, MatchKind, PhoneEntry,
};
use bridge_traits::path_for_hash;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

// ============================================================================
// Constants
// ============================================================================

/// SHA1 of `"HomeDomain-Library/AddressBook/AddressBook.sqlitedb"`, the
/// fixed backup-layout address of the contacts database.
pub const CONTACTS_DB_HASH: &str = "31bb7ba8914766d4ba40d6dfb6113c8b614be442";

/// `ABMultiValue.property` value for phone numbers.
const PHONE_PROPERTY: i64 = 3;

/// `ABMultiValue.property` value for email addresses.
const EMAIL_PROPERTY: i64 = 4;

const PERSON_SQL: &str =
    "SELECT ROWID AS id, First AS first_name, Last AS last_name, Organization AS organization \
     FROM ABPerson ORDER BY ROWID";

const PERSON_BY_ID_SQL: &str =
    "SELECT ROWID AS id, First AS first_name, Last AS last_name, Organization AS organization \
     FROM ABPerson WHERE ROWID = ?";

const MULTI_VALUE_SQL: &str = "SELECT mv.record_id AS record_id, mv.property AS property, \
            mv.value AS value, l.value AS label \
     FROM ABMultiValue mv \
     LEFT JOIN ABMultiValueLabel l ON mv.label = l.ROWID \
     WHERE mv.property IN (?, ?) AND mv.value IS NOT NULL \
     ORDER BY mv.ROWID";

const MULTI_VALUE_BY_RECORD_SQL: &str = "SELECT mv.record_id AS record_id, mv.property AS property, \
            mv.value AS value, l.value AS label \
     FROM ABMultiValue mv \
     LEFT JOIN ABMultiValueLabel l ON mv.label = l.ROWID \
     WHERE mv.property IN (?, ?) AND mv.value IS NOT NULL AND mv.record_id = ? \
     ORDER BY mv.ROWID";

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct PersonRow {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    organization: Option<String>,
}

#[derive(Debug, FromRow)]
struct MultiValueRow {
    record_id: i64,
    property: i64,
    value: String,
    label: Option<String>,
}

// ============================================================================
// Contact Store
// ============================================================================

struct OpenStore {
    pool: SqlitePool,
    /// All contacts loaded at open time, plus any cached by lazy id lookups
    contacts: HashMap<i64, Contact>,
    /// Trailing phone digits -> contact id; rebuilt in full on every open
    phone_index: HashMap<String, i64>,
    /// Lowercased email -> contact id; rebuilt in full on every open
    email_index: HashMap<String, i64>,
}

/// Read-only view over the contacts database inside one backup.
pub struct ContactStore {
    state: RwLock<Option<OpenStore>>,
}

impl ContactStore {
    /// Create a closed store. Call [`open`](Self::open) before querying.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Open the contacts database inside `backup_path` and build all caches.
    ///
    /// Loads every contact with its phone/email entries and populates both
    /// lookup indexes. Re-opening an already open store closes the previous
    /// handle first.
    pub async fn open(&self, backup_path: &Path) -> Result<()> {
        self.close().await;

        let db_path = path_for_hash(backup_path, CONTACTS_DB_HASH);
        if !db_path.exists() {
            return Err(ContactStoreError::DatabaseNotFound { path: db_path });
        }

        debug!("Opening contacts database at {}", db_path.display());
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let loaded = load_all_contacts(&pool).await?;

        let mut contacts = HashMap::with_capacity(loaded.len());
        let mut phone_index = HashMap::new();
        let mut email_index = HashMap::new();
        // Indexing follows row order; a trailing-digits collision across
        // contacts keeps the most recently indexed id.
        for contact in loaded {
            for phone in &contact.phones {
                if let Some(key) = trailing_digits_key(&phone.normalized) {
                    phone_index.insert(key, contact.id);
                }
            }
            for email in &contact.emails {
                email_index.insert(email.value.trim().to_lowercase(), contact.id);
            }
            contacts.insert(contact.id, contact);
        }

        info!(
            "Contact store opened: {} contacts, {} phone keys, {} email keys",
            contacts.len(),
            phone_index.len(),
            email_index.len()
        );

        *self.state.write().await = Some(OpenStore {
            pool,
            contacts,
            phone_index,
            email_index,
        });
        Ok(())
    }

    /// Close the database handle and drop all caches. Idempotent.
    pub async fn close(&self) {
        let state = self.state.write().await.take();
        if let Some(open) = state {
            open.pool.close().await;
            debug!("Contact store closed");
        }
    }

    /// All cached contacts, ordered by source row id.
    ///
    /// Empty when the store is not open.
    pub async fn get_all_contacts(&self) -> Vec<Contact> {
        match self.state.read().await.as_ref() {
            Some(open) => {
                let mut contacts: Vec<Contact> = open.contacts.values().cloned().collect();
                contacts.sort_by_key(|contact| contact.id);
                contacts
            }
            None => Vec::new(),
        }
    }

    /// Fetch one contact by source row id.
    ///
    /// Served from cache; a miss re-queries the database while it is still
    /// open and caches any hit. The lookup indexes are not extended by lazy
    /// loads.
    pub async fn get_contact_by_id(&self, id: i64) -> Result<Option<Contact>> {
        {
            let state = self.state.read().await;
            let Some(open) = state.as_ref() else {
                return Ok(None);
            };
            if let Some(contact) = open.contacts.get(&id) {
                return Ok(Some(contact.clone()));
            }
        }

        let mut state = self.state.write().await;
        let Some(open) = state.as_mut() else {
            return Ok(None);
        };
        // Another task may have filled the cache while we waited for the
        // write lock.
        if let Some(contact) = open.contacts.get(&id) {
            return Ok(Some(contact.clone()));
        }

        let Some(contact) = load_contact(&open.pool, id).await? else {
            return Ok(None);
        };
        open.contacts.insert(id, contact.clone());
        Ok(Some(contact))
    }

    /// Look up a contact by the trailing digits of a phone number.
    pub async fn lookup_by_phone(&self, number: &str) -> Option<ContactMatch> {
        let key = trailing_digits_key(number)?;
        let state = self.state.read().await;
        let open = state.as_ref()?;
        let id = open.phone_index.get(&key)?;
        let contact = open.contacts.get(id)?.clone();
        Some(ContactMatch {
            contact,
            matched_by: MatchKind::Phone,
        })
    }

    /// Look up a contact by email, case-insensitively.
    pub async fn lookup_by_email(&self, email: &str) -> Option<ContactMatch> {
        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        let state = self.state.read().await;
        let open = state.as_ref()?;
        let id = open.email_index.get(&key)?;
        let contact = open.contacts.get(id)?.clone();
        Some(ContactMatch {
            contact,
            matched_by: MatchKind::Email,
        })
    }

    /// Look up a contact by a message handle of unknown shape.
    ///
    /// Handles containing `@` are treated as emails, everything else as a
    /// phone number. Empty or whitespace-only handles match nothing without
    /// touching either index.
    pub async fn lookup_by_handle(&self, handle: &str) -> Option<ContactMatch> {
        let trimmed = handle.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.contains('@') {
            self.lookup_by_email(trimmed).await
        } else {
            self.lookup_by_phone(trimmed).await
        }
    }

    /// Cache and index sizes; all zero when the store is not open.
    pub async fn get_stats(&self) -> ContactStoreStats {
        match self.state.read().await.as_ref() {
            Some(open) => ContactStoreStats {
                contact_count: open.contacts.len(),
                phone_index_size: open.phone_index.len(),
                email_index_size: open.email_index.len(),
            },
            None => ContactStoreStats::default(),
        }
    }
}

impl Default for ContactStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Loading
// ============================================================================

async fn load_all_contacts(pool: &SqlitePool) -> Result<Vec<Contact>> {
    let people = sqlx::query_as::<_, PersonRow>(PERSON_SQL)
        .fetch_all(pool)
        .await?;
    let values = sqlx::query_as::<_, MultiValueRow>(MULTI_VALUE_SQL)
        .bind(PHONE_PROPERTY)
        .bind(EMAIL_PROPERTY)
        .fetch_all(pool)
        .await?;

    let mut grouped: HashMap<i64, Vec<MultiValueRow>> = HashMap::new();
    for row in values {
        grouped.entry(row.record_id).or_default().push(row);
    }

    Ok(people
        .into_iter()
        .map(|person| {
            let values = grouped.remove(&person.id).unwrap_or_default();
            build_contact(person, values)
        })
        .collect())
}

async fn load_contact(pool: &SqlitePool, id: i64) -> Result<Option<Contact>> {
    let Some(person) = sqlx::query_as::<_, PersonRow>(PERSON_BY_ID_SQL)
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };
    let values = sqlx::query_as::<_, MultiValueRow>(MULTI_VALUE_BY_RECORD_SQL)
        .bind(PHONE_PROPERTY)
        .bind(EMAIL_PROPERTY)
        .bind(id)
        .fetch_all(pool)
        .await?;
    Ok(Some(build_contact(person, values)))
}

fn build_contact(person: PersonRow, values: Vec<MultiValueRow>) -> Contact {
    let mut phones = Vec::new();
    let mut emails = Vec::new();
    for row in values {
        let label = clean_label(row.label.as_deref());
        if row.property == PHONE_PROPERTY {
            let normalized = normalize_phone(&row.value);
            phones.push(PhoneEntry {
                value: row.value,
                label,
                normalized,
            });
        } else {
            emails.push(EmailEntry {
                value: row.value,
                label,
            });
        }
    }

    let display = display_name(
        person.first_name.as_deref(),
        person.last_name.as_deref(),
        person.organization.as_deref(),
    );
    Contact {
        id: person.id,
        first_name: person.first_name,
        last_name: person.last_name,
        organization: person.organization,
        phones,
        emails,
        display_name: display,
    }
}

// ============================================================================
// Tests
// ============================================================================
