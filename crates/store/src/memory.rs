//! In-process [`InstallationStore`] for tests and throwaway deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use bridge::{
    InstallationId, InstallationMapping, InstallationStore, OrganizationId, Promotion,
    SetupIntent, SetupState, StoreError, Timestamp,
};

#[derive(Debug, Default)]
struct Tables {
    intents: HashMap<SetupState, SetupIntent>,
    // Ordered so listings come back by installation id.
    mappings: BTreeMap<InstallationId, InstallationMapping>,
}

/// Keeps everything in memory behind one lock. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryInstallStore {
    tables: Mutex<Tables>,
}

impl MemoryInstallStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl InstallationStore for MemoryInstallStore {
    fn create_intent(&self, intent: &SetupIntent) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.intents.contains_key(&intent.state) {
            return Err(StoreError::Backend(format!(
                "setup state {} already exists",
                intent.state
            )));
        }
        tables.intents.insert(intent.state.clone(), intent.clone());
        Ok(())
    }

    fn get_intent(&self, state: &SetupState) -> Result<SetupIntent, StoreError> {
        self.lock()?
            .intents
            .get(state)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn delete_intent(&self, state: &SetupState) -> Result<(), StoreError> {
        self.lock()?.intents.remove(state);
        Ok(())
    }

    fn upsert_mapping(&self, mapping: &InstallationMapping) -> Result<(), StoreError> {
        self.lock()?
            .mappings
            .insert(mapping.installation_id, mapping.clone());
        Ok(())
    }

    fn get_mapping(&self, id: InstallationId) -> Result<InstallationMapping, StoreError> {
        self.lock()?
            .mappings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list_mappings(
        &self,
        organization: Option<OrganizationId>,
    ) -> Result<Vec<InstallationMapping>, StoreError> {
        Ok(self
            .lock()?
            .mappings
            .values()
            .filter(|m| organization.is_none() || m.profile.organization_id == organization)
            .cloned()
            .collect())
    }

    fn delete_mapping(
        &self,
        id: InstallationId,
        organization: Option<OrganizationId>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match organization {
            None => {
                tables.mappings.remove(&id);
                Ok(())
            }
            Some(org) => match tables.mappings.get(&id) {
                Some(m) if m.profile.organization_id == Some(org) => {
                    tables.mappings.remove(&id);
                    Ok(())
                }
                _ => Err(StoreError::NotFound),
            },
        }
    }

    fn promote_intent(
        &self,
        state: &SetupState,
        installation_id: InstallationId,
        now: Timestamp,
    ) -> Result<Promotion, StoreError> {
        let mut tables = self.lock()?;
        let intent = tables.intents.remove(state).ok_or(StoreError::NotFound)?;
        if intent.is_expired(now) {
            return Ok(Promotion::Expired);
        }
        let mapping = InstallationMapping::from_intent(intent, installation_id);
        tables.mappings.insert(installation_id, mapping.clone());
        Ok(Promotion::Completed(mapping))
    }

    fn sweep_expired_intents(&self, now: Timestamp) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.intents.len();
        tables.intents.retain(|_, intent| !intent.is_expired(now));
        Ok(before - tables.intents.len())
    }
}
