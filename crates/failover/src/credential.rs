//! Same-provider credential rotation.

use crate::exhaustion::ExhaustionRegistry;
use rotakey_types::{CredentialSet, ProviderId};

/// Next credential to try for `provider` after `active`.
///
/// Scans the provider's credentials circularly in insertion order, starting
/// right after `active` (or at the first credential if `active` is not
/// stored), and returns the first one that is not `active` and whose
/// `"provider:name"` key is not in cooldown.
///
/// Returns `None` when the provider has at most one credential or every other
/// credential is exhausted.
#[must_use]
pub fn next_credential(
    provider: &ProviderId,
    credentials: &CredentialSet,
    active: &str,
    registry: &mut ExhaustionRegistry,
) -> Option<String> {
    let names = credentials.names(provider);
    if names.len() <= 1 {
        return None;
    }
    let start = names.iter().position(|n| *n == active).map_or(0, |i| i + 1);
    let len = names.len();

    (0..len)
        .map(|step| names[(start + step) % len])
        .filter(|name| *name != active)
        .find(|name| !registry.is_exhausted(&provider.credential_key(name)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rotakey_types::Credential;
    use std::sync::Arc;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn set(provider: &str, names: &[&str]) -> CredentialSet {
        let mut set = CredentialSet::new();
        for n in names {
            set.insert(provider.into(), *n, Credential::api_key(*n));
        }
        set
    }

    fn registry() -> ExhaustionRegistry {
        ExhaustionRegistry::new(Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_rotates_to_next_in_order() {
        let creds = set("p1", &["primary", "backup-1", "backup-2"]);
        let mut reg = registry();
        let next = next_credential(&"p1".into(), &creds, "primary", &mut reg);
        assert_eq!(next.as_deref(), Some("backup-1"));
    }

    #[test]
    fn test_wraps_around() {
        let creds = set("p1", &["primary", "backup-1", "backup-2"]);
        let mut reg = registry();
        let next = next_credential(&"p1".into(), &creds, "backup-2", &mut reg);
        assert_eq!(next.as_deref(), Some("primary"));
    }

    #[test]
    fn test_skips_exhausted() {
        let creds = set("p1", &["primary", "backup-1", "backup-2"]);
        let mut reg = registry();
        reg.mark_exhausted("p1:backup-1", HOUR);
        let next = next_credential(&"p1".into(), &creds, "primary", &mut reg);
        assert_eq!(next.as_deref(), Some("backup-2"));
    }

    #[test]
    fn test_all_others_exhausted() {
        let creds = set("p1", &["primary", "backup-1"]);
        let mut reg = registry();
        reg.mark_exhausted("p1:backup-1", HOUR);
        assert!(next_credential(&"p1".into(), &creds, "primary", &mut reg).is_none());
    }

    #[test]
    fn test_single_credential_has_no_alternative() {
        let creds = set("p1", &["primary"]);
        let mut reg = registry();
        assert!(next_credential(&"p1".into(), &creds, "primary", &mut reg).is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let creds = set("p1", &["primary", "backup-1"]);
        let mut reg = registry();
        assert!(next_credential(&"p2".into(), &creds, "primary", &mut reg).is_none());
    }

    #[test]
    fn test_unknown_active_starts_at_first() {
        let creds = set("p1", &["primary", "backup-1"]);
        let mut reg = registry();
        let next = next_credential(&"p1".into(), &creds, "gone", &mut reg);
        assert_eq!(next.as_deref(), Some("primary"));
    }
}
