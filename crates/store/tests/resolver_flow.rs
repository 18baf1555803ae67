//! Setup handshake and credential resolution through `InstallationResolver`
//! backed by real stores.

use std::sync::Arc;
use std::time::Duration;

use bridge::{
    InstallationId, InstallationMapping, InstallationResolver, InstallationStore, OrganizationId,
    PublishCredentials, PublishDefaults, SetupError, SetupSettings, StoreError, TenantProfile,
    Timestamp,
};
use store::{MemoryInstallStore, SqliteInstallStore};

fn at(secs: i64) -> Timestamp {
    Timestamp::from_unix_seconds(secs).unwrap()
}

fn request(environment: &str) -> TenantProfile {
    TenantProfile {
        organization_id: OrganizationId::new(7),
        organization_label: "  Acme  ".into(),
        credentials: PublishCredentials {
            endpoint: " https://dash.acme.example ".into(),
            auth_token: "acme-token-0001".into(),
            webhook_secret: "acme-secret-0001".into(),
        },
        default_environment: environment.into(),
    }
}

fn defaults() -> PublishDefaults {
    PublishDefaults {
        credentials: PublishCredentials {
            endpoint: "https://dash.default.example".into(),
            auth_token: "default-token".into(),
            webhook_secret: "default-secret".into(),
        },
        default_environment: "production".into(),
    }
}

fn resolver(store: Arc<dyn InstallationStore>, install_url: Option<&str>) -> InstallationResolver {
    InstallationResolver::new(
        store,
        SetupSettings {
            install_url: install_url.map(str::to_string),
            default_environment: "qa".into(),
            ..SetupSettings::default()
        },
    )
}

fn stores() -> Vec<Arc<dyn InstallationStore>> {
    vec![
        Arc::new(MemoryInstallStore::new()),
        Arc::new(SqliteInstallStore::in_memory().unwrap()),
    ]
}

#[test]
fn full_handshake_maps_installation_once() {
    for store in stores() {
        let resolver = resolver(store.clone(), None);
        let started = resolver.start_setup(request("staging"), at(1_000)).unwrap();
        assert_eq!(
            started.redirect_url,
            format!("/setup/callback?state={}", started.state)
        );
        assert_eq!(started.expires_at, at(1_000 + 15 * 60));

        let mapping = resolver
            .complete_setup(Some(started.state.as_str()), Some("12345"), at(1_001))
            .unwrap();
        assert_eq!(mapping.installation_id.as_i64(), 12345);
        assert_eq!(mapping.profile.organization_label, "Acme");
        assert_eq!(mapping.profile.credentials.endpoint, "https://dash.acme.example");
        assert_eq!(mapping.profile.default_environment, "staging");

        // A replayed callback finds nothing and leaves exactly one mapping.
        assert_eq!(
            resolver.complete_setup(Some(started.state.as_str()), Some("12345"), at(1_002)),
            Err(SetupError::UnknownState)
        );
        assert_eq!(resolver.list(None).unwrap(), vec![mapping]);
    }
}

#[test]
fn install_url_receives_state_parameter() {
    for store in stores() {
        let resolver = resolver(store, Some("https://github.com/apps/hookbridge/installations/new"));
        let started = resolver.start_setup(request(""), at(0)).unwrap();
        assert_eq!(
            started.redirect_url,
            format!(
                "https://github.com/apps/hookbridge/installations/new?state={}",
                started.state
            )
        );
    }
}

#[test]
fn blank_environment_takes_setup_default() {
    for store in stores() {
        let resolver = resolver(store, None);
        let started = resolver.start_setup(request("   "), at(0)).unwrap();
        let mapping = resolver
            .complete_setup(Some(started.state.as_str()), Some("8"), at(1))
            .unwrap();
        assert_eq!(mapping.profile.default_environment, "qa");
    }
}

#[test]
fn incomplete_credentials_are_refused() {
    for store in stores() {
        let resolver = resolver(store.clone(), None);
        let mut incomplete = request("staging");
        incomplete.credentials.webhook_secret = " ".into();
        assert_eq!(
            resolver.start_setup(incomplete, at(0)),
            Err(SetupError::MissingCredentials)
        );
        assert_eq!(store.sweep_expired_intents(at(i64::from(u32::MAX))), Ok(0));
    }
}

#[test]
fn callback_validates_raw_inputs() {
    for store in stores() {
        let resolver = resolver(store, None);
        assert_eq!(
            resolver.complete_setup(None, Some("1"), at(0)),
            Err(SetupError::MissingState)
        );
        assert_eq!(
            resolver.complete_setup(Some("  "), Some("1"), at(0)),
            Err(SetupError::MissingState)
        );
        for bad in [None, Some(""), Some("abc"), Some("0"), Some("-3")] {
            assert_eq!(
                resolver.complete_setup(Some("state"), bad, at(0)),
                Err(SetupError::InvalidInstallationId),
                "{bad:?}"
            );
        }
        assert_eq!(
            resolver.complete_setup(Some("never-issued"), Some("1"), at(0)),
            Err(SetupError::UnknownState)
        );
    }
}

#[test]
fn late_callback_is_expired_and_intent_is_gone() {
    for store in stores() {
        let resolver = InstallationResolver::new(
            store.clone(),
            SetupSettings {
                intent_ttl: Duration::from_secs(60),
                ..SetupSettings::default()
            },
        );
        let started = resolver.start_setup(request("staging"), at(1_000)).unwrap();

        assert_eq!(
            resolver.complete_setup(Some(started.state.as_str()), Some("3"), at(1_061)),
            Err(SetupError::ExpiredState)
        );
        assert_eq!(store.get_intent(&started.state), Err(StoreError::NotFound));
        assert!(resolver.list(None).unwrap().is_empty());
    }
}

#[test]
fn resolve_prefers_enabled_mapping() {
    for store in stores() {
        let resolver = resolver(store.clone(), None);
        let id = InstallationId::new(55).unwrap();
        let mut mapping = InstallationMapping {
            installation_id: id,
            profile: request("staging"),
            enabled: true,
        };
        store.upsert_mapping(&mapping).unwrap();

        let target = resolver.resolve(Some(id), &defaults()).unwrap();
        assert!(target.mapped);
        assert_eq!(target.credentials, mapping.profile.credentials);
        assert_eq!(target.default_environment, "staging");

        // Blank mapping environment falls back to the process default.
        mapping.profile.default_environment = String::new();
        store.upsert_mapping(&mapping).unwrap();
        let target = resolver.resolve(Some(id), &defaults()).unwrap();
        assert!(target.mapped);
        assert_eq!(target.default_environment, "production");

        mapping.enabled = false;
        store.upsert_mapping(&mapping).unwrap();
        let target = resolver.resolve(Some(id), &defaults()).unwrap();
        assert!(!target.mapped);
        assert_eq!(target.credentials, defaults().credentials);
    }
}

#[test]
fn resolve_without_mapping_uses_defaults() {
    for store in stores() {
        let resolver = resolver(store, None);
        for id in [None, InstallationId::new(999)] {
            let target = resolver.resolve(id, &defaults()).unwrap();
            assert!(!target.mapped);
            assert_eq!(target.credentials, defaults().credentials);
            assert_eq!(target.default_environment, "production");
        }
    }
}

#[test]
fn revoke_respects_organization_scope() {
    for store in stores() {
        let resolver = resolver(store.clone(), None);
        let id = InstallationId::new(42).unwrap();
        store
            .upsert_mapping(&InstallationMapping {
                installation_id: id,
                profile: request("staging"),
                enabled: true,
            })
            .unwrap();

        assert_eq!(
            resolver.revoke(id, OrganizationId::new(8)),
            Err(SetupError::MappingNotFound(id))
        );
        assert_eq!(resolver.list(OrganizationId::new(7)).unwrap().len(), 1);

        resolver.revoke(id, OrganizationId::new(7)).unwrap();
        assert!(resolver.list(None).unwrap().is_empty());
        // Unscoped revoke of an absent mapping is a no-op.
        resolver.revoke(id, None).unwrap();
    }
}
