//! SQLite-backed [`InstallationStore`].
//!
//! One connection behind a mutex. Every trait method locks, runs one or two
//! statements, and unlocks. Promotion runs inside an immediate transaction so
//! a concurrent process sharing the file cannot redeem the same intent.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bridge::{
    InstallationId, InstallationMapping, InstallationStore, OrganizationId, Promotion,
    PublishCredentials, SetupIntent, SetupState, StoreError, TenantProfile, Timestamp,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS installation_mappings (
    installation_id     INTEGER PRIMARY KEY,
    organization_id     INTEGER,
    organization_label  TEXT NOT NULL DEFAULT '',
    endpoint            TEXT NOT NULL,
    auth_token          TEXT NOT NULL,
    webhook_secret      TEXT NOT NULL,
    default_environment TEXT NOT NULL DEFAULT '',
    enabled             INTEGER NOT NULL DEFAULT 1,
    created_at          INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at          INTEGER NOT NULL DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_installation_mappings_org
    ON installation_mappings(organization_id);

CREATE TABLE IF NOT EXISTS setup_intents (
    state               TEXT PRIMARY KEY,
    organization_id     INTEGER,
    organization_label  TEXT NOT NULL DEFAULT '',
    endpoint            TEXT NOT NULL,
    auth_token          TEXT NOT NULL,
    webhook_secret      TEXT NOT NULL,
    default_environment TEXT NOT NULL DEFAULT '',
    expires_at          INTEGER NOT NULL,
    created_at          INTEGER NOT NULL DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_setup_intents_expires_at
    ON setup_intents(expires_at);
";

const MAPPING_COLUMNS: &str = "installation_id, organization_id, organization_label, endpoint, \
     auth_token, webhook_secret, default_environment, enabled";

const INTENT_COLUMNS: &str = "state, organization_id, organization_label, endpoint, auth_token, \
     webhook_secret, default_environment, expires_at";

const UPSERT_MAPPING: &str = "
INSERT INTO installation_mappings (
    installation_id, organization_id, organization_label, endpoint,
    auth_token, webhook_secret, default_environment, enabled
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(installation_id) DO UPDATE SET
    organization_id     = excluded.organization_id,
    organization_label  = excluded.organization_label,
    endpoint            = excluded.endpoint,
    auth_token          = excluded.auth_token,
    webhook_secret      = excluded.webhook_secret,
    default_environment = excluded.default_environment,
    enabled             = excluded.enabled,
    updated_at          = unixepoch()
";

/// Installation store persisted in a single SQLite file.
pub struct SqliteInstallStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteInstallStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteInstallStore").finish_non_exhaustive()
    }
}

impl SqliteInstallStore {
    /// Opens (creating if needed) the database at `path`, applies the schema,
    /// and discards intents already expired.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Backend(format!("create store dir {}: {err}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        Self::bootstrap(conn)
    }

    /// A private database that lives as long as the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory().map_err(backend)?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        let swept = store.sweep_expired_intents(Timestamp::now())?;
        if swept > 0 {
            tracing::info!(swept, "discarded expired setup intents");
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("store connection lock poisoned".into()))
    }
}

impl InstallationStore for SqliteInstallStore {
    fn create_intent(&self, intent: &SetupIntent) -> Result<(), StoreError> {
        let profile = &intent.profile;
        self.lock()?
            .execute(
                &format!("INSERT INTO setup_intents ({INTENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    intent.state.as_str(),
                    profile.organization_id.map(OrganizationId::as_i64),
                    profile.organization_label,
                    profile.credentials.endpoint,
                    profile.credentials.auth_token,
                    profile.credentials.webhook_secret,
                    profile.default_environment,
                    intent.expires_at.unix_seconds(),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn get_intent(&self, state: &SetupState) -> Result<SetupIntent, StoreError> {
        let conn = self.lock()?;
        select_intent(&conn, state)?.ok_or(StoreError::NotFound)
    }

    fn delete_intent(&self, state: &SetupState) -> Result<(), StoreError> {
        self.lock()?
            .execute(
                "DELETE FROM setup_intents WHERE state = ?1",
                params![state.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn upsert_mapping(&self, mapping: &InstallationMapping) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert(&conn, mapping)
    }

    fn get_mapping(&self, id: InstallationId) -> Result<InstallationMapping, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {MAPPING_COLUMNS} FROM installation_mappings WHERE installation_id = ?1"),
                params![id.as_i64()],
                MappingRow::read,
            )
            .optional()
            .map_err(backend)?;
        row.ok_or(StoreError::NotFound)?.into_mapping()
    }

    fn list_mappings(
        &self,
        organization: Option<OrganizationId>,
    ) -> Result<Vec<InstallationMapping>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM installation_mappings
                 WHERE ?1 IS NULL OR organization_id = ?1
                 ORDER BY installation_id ASC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(
                params![organization.map(OrganizationId::as_i64)],
                MappingRow::read,
            )
            .map_err(backend)?;

        let mappings = rows
            .map(|row| row.map_err(backend)?.into_mapping())
            .collect();
        mappings
    }

    fn delete_mapping(
        &self,
        id: InstallationId,
        organization: Option<OrganizationId>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = match organization {
            Some(org) => conn.execute(
                "DELETE FROM installation_mappings WHERE installation_id = ?1 AND organization_id = ?2",
                params![id.as_i64(), org.as_i64()],
            ),
            None => conn.execute(
                "DELETE FROM installation_mappings WHERE installation_id = ?1",
                params![id.as_i64()],
            ),
        }
        .map_err(backend)?;

        if deleted == 0 && organization.is_some() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn promote_intent(
        &self,
        state: &SetupState,
        installation_id: InstallationId,
        now: Timestamp,
    ) -> Result<Promotion, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;

        let intent = select_intent(&tx, state)?.ok_or(StoreError::NotFound)?;
        tx.execute(
            "DELETE FROM setup_intents WHERE state = ?1",
            params![state.as_str()],
        )
        .map_err(backend)?;

        let outcome = if intent.is_expired(now) {
            Promotion::Expired
        } else {
            let mapping = InstallationMapping::from_intent(intent, installation_id);
            upsert(&tx, &mapping)?;
            Promotion::Completed(mapping)
        };
        tx.commit().map_err(backend)?;
        Ok(outcome)
    }

    fn sweep_expired_intents(&self, now: Timestamp) -> Result<usize, StoreError> {
        self.lock()?
            .execute(
                "DELETE FROM setup_intents WHERE expires_at < ?1",
                params![now.unix_seconds()],
            )
            .map_err(backend)
    }
}

// ---------------------------------------------------------------------------
// Row plumbing
// ---------------------------------------------------------------------------

fn backend(err: rusqlite::Error) -> StoreError {
    tracing::error!(error = %err, "sqlite failure");
    StoreError::Backend(err.to_string())
}

fn upsert(conn: &Connection, mapping: &InstallationMapping) -> Result<(), StoreError> {
    let profile = &mapping.profile;
    conn.execute(
        UPSERT_MAPPING,
        params![
            mapping.installation_id.as_i64(),
            profile.organization_id.map(OrganizationId::as_i64),
            profile.organization_label,
            profile.credentials.endpoint,
            profile.credentials.auth_token,
            profile.credentials.webhook_secret,
            profile.default_environment,
            mapping.enabled,
        ],
    )
    .map_err(backend)?;
    Ok(())
}

fn select_intent(conn: &Connection, state: &SetupState) -> Result<Option<SetupIntent>, StoreError> {
    conn.query_row(
        &format!("SELECT {INTENT_COLUMNS} FROM setup_intents WHERE state = ?1"),
        params![state.as_str()],
        IntentRow::read,
    )
    .optional()
    .map_err(backend)?
    .map(IntentRow::into_intent)
    .transpose()
}

/// Tenant columns shared by both tables, in column order starting at
/// `offset`.
fn read_profile(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        organization_id: row.get(offset)?,
        organization_label: row.get(offset + 1)?,
        endpoint: row.get(offset + 2)?,
        auth_token: row.get(offset + 3)?,
        webhook_secret: row.get(offset + 4)?,
        default_environment: row.get(offset + 5)?,
    })
}

struct ProfileRow {
    organization_id: Option<i64>,
    organization_label: String,
    endpoint: String,
    auth_token: String,
    webhook_secret: String,
    default_environment: String,
}

impl ProfileRow {
    fn into_profile(self) -> TenantProfile {
        TenantProfile {
            // Non-positive ids are treated as unset.
            organization_id: self.organization_id.and_then(OrganizationId::new),
            organization_label: self.organization_label,
            credentials: PublishCredentials {
                endpoint: self.endpoint,
                auth_token: self.auth_token,
                webhook_secret: self.webhook_secret,
            },
            default_environment: self.default_environment,
        }
    }
}

struct MappingRow {
    installation_id: i64,
    profile: ProfileRow,
    enabled: bool,
}

impl MappingRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            installation_id: row.get(0)?,
            profile: read_profile(row, 1)?,
            enabled: row.get(7)?,
        })
    }

    fn into_mapping(self) -> Result<InstallationMapping, StoreError> {
        let installation_id = InstallationId::new(self.installation_id).ok_or_else(|| {
            StoreError::Backend(format!("stored installation id {} is not positive", self.installation_id))
        })?;
        Ok(InstallationMapping {
            installation_id,
            profile: self.profile.into_profile(),
            enabled: self.enabled,
        })
    }
}

struct IntentRow {
    state: String,
    profile: ProfileRow,
    expires_at: i64,
}

impl IntentRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            state: row.get(0)?,
            profile: read_profile(row, 1)?,
            expires_at: row.get(7)?,
        })
    }

    fn into_intent(self) -> Result<SetupIntent, StoreError> {
        let state = SetupState::new(self.state)
            .ok_or_else(|| StoreError::Backend("stored setup state is blank".into()))?;
        let expires_at = Timestamp::from_unix_seconds(self.expires_at).ok_or_else(|| {
            StoreError::Backend(format!("stored expiry {} is out of range", self.expires_at))
        })?;
        Ok(SetupIntent {
            state,
            profile: self.profile.into_profile(),
            expires_at,
        })
    }
}
