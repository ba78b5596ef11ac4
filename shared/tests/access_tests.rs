/// Integration-level tests for the access-control core.
///
/// Each section covers one behaviour from the outside, through the public
/// API only; unit tests tied to private helpers live next to the code.
// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------
#[cfg(test)]
mod fixtures {
    use shared::access::*;
    use shared::types::server_config::{DestinationsConfig, RoutesConfig};
    use shared::types::{Claims, Role};

    pub const SECRET: &str = "integration-secret-0123456789abcdef";

    pub fn classifier() -> RouteClassifier {
        RouteClassifier::new(RouteTables::from_config(&RoutesConfig::default()).unwrap())
    }

    pub fn policy() -> AccessPolicy {
        AccessPolicy::from_config(&DestinationsConfig::default(), &classifier()).unwrap()
    }

    pub fn token(role: Role, exp: i64) -> String {
        TokenSigner::new(SECRET)
            .sign(&Claims::new("u1", role, exp))
            .unwrap()
    }

    pub fn decide(path: &str, raw: Option<&str>, subscription: SubscriptionGate) -> Decision {
        let decoder = ClaimDecoder::new(SECRET);
        let state = decoder.evaluate(raw, unix_now());
        policy().decide(&AccessRequest {
            path,
            class: classifier().classify(path),
            token: &state,
            subscription,
        })
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[cfg(test)]
mod scenario_tests {
    use super::fixtures::*;
    use shared::access::*;
    use shared::types::Role;

    fn far() -> i64 {
        unix_now() + 3600
    }

    fn unsubscribed() -> SubscriptionGate {
        SubscriptionGate::Ready(SubscriptionState::default())
    }

    #[test]
    fn unsubscribed_admin_hits_the_wall() {
        let t = token(Role::Admin, far());
        assert_eq!(
            decide("/dashboard", Some(&t), unsubscribed()),
            Decision::RedirectTo("/dashboard/subscription".into())
        );
    }

    #[test]
    fn wall_itself_is_allowed() {
        let t = token(Role::Admin, far());
        assert_eq!(
            decide("/dashboard/subscription", Some(&t), unsubscribed()),
            Decision::Allow
        );
    }

    #[test]
    fn admin_on_student_page_goes_to_dashboard() {
        let t = token(Role::Admin, far());
        assert_eq!(
            decide("/student/profile", Some(&t), SubscriptionGate::NotRequired),
            Decision::RedirectTo("/dashboard".into())
        );
    }

    #[test]
    fn anonymous_login_page_is_allowed() {
        assert_eq!(
            decide("/auth/login", None, SubscriptionGate::NotRequired),
            Decision::Allow
        );
    }

    #[test]
    fn signed_in_users_leave_public_pages() {
        let admin = token(Role::Admin, far());
        let student = token(Role::Student, far());
        assert_eq!(
            decide("/auth/login", Some(&admin), SubscriptionGate::Deferred),
            Decision::RedirectTo("/dashboard".into())
        );
        assert_eq!(
            decide("/", Some(&student), SubscriptionGate::NotRequired),
            Decision::RedirectTo("/student".into())
        );
    }

    #[test]
    fn forged_token_is_treated_as_anonymous() {
        let forged = TokenSigner::new("some-other-secret-0123456789abcdef")
            .sign(&shared::types::Claims::new("x", Role::Admin, far()))
            .unwrap();
        assert_eq!(
            decide("/dashboard", Some(&forged), SubscriptionGate::Deferred),
            Decision::RedirectTo("/auth/login?redirect=%2Fdashboard".into())
        );
    }
}

// ---------------------------------------------------------------------------
// Token store reconciliation
// ---------------------------------------------------------------------------

#[cfg(test)]
mod reconciliation_tests {
    use super::fixtures::*;
    use shared::access::*;
    use shared::types::Role;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn cookie_only_store_heals_and_keeps_the_outcome() {
        let raw = token(Role::Student, unix_now() + 600);
        let store = MirroredTokenStore::new(MemorySlot::new(), MemorySlot::holding(raw.clone(), TTL), TTL);

        let before = decide(
            "/student",
            store.read().unwrap().as_ref().map(RawToken::as_str),
            SubscriptionGate::NotRequired,
        );

        assert_eq!(store.reconcile().unwrap(), Reconciliation::CopiedToDurable);
        let durable = store.durable().load().unwrap();
        let cookie = store.cookie().load().unwrap();
        assert_eq!(durable.as_ref().map(RawToken::as_str), Some(raw.as_str()));
        assert_eq!(durable, cookie);

        let from_durable = decide(
            "/student",
            durable.as_ref().map(RawToken::as_str),
            SubscriptionGate::NotRequired,
        );
        assert_eq!(before, from_durable);
        assert_eq!(before, Decision::Allow);
    }

    #[test]
    fn write_then_read_round_trips_in_both_views() {
        let store = MirroredTokenStore::new(MemorySlot::new(), MemorySlot::new(), TTL);
        let t = RawToken::new("header.payload.sig");
        store.write(&t, TTL).unwrap();
        assert_eq!(store.read().unwrap(), Some(t.clone()));
        assert_eq!(store.durable().load().unwrap(), Some(t.clone()));
        assert_eq!(store.cookie().load().unwrap(), Some(t));
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[cfg(test)]
mod property_tests {
    use super::fixtures::*;
    use proptest::prelude::*;
    use shared::access::*;
    use shared::types::Role;

    fn protected_path() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("/dashboard".to_string()),
            Just("/configure/seats".to_string()),
            Just("/student".to_string()),
            "[a-z]{1,8}".prop_map(|s| format!("/student/{}", s)),
            "[a-z]{1,8}".prop_map(|s| format!("/settings/{}", s)),
        ]
    }

    fn gate() -> impl Strategy<Value = SubscriptionGate> {
        prop_oneof![
            Just(SubscriptionGate::NotRequired),
            Just(SubscriptionGate::Deferred),
            Just(SubscriptionGate::Loading),
            Just(SubscriptionGate::Unavailable),
            (any::<bool>(), any::<bool>(), 0usize..3).prop_map(|(s, m, p)| {
                SubscriptionGate::Ready(SubscriptionState {
                    is_subscribed: s,
                    is_master: m,
                    pending_subscriptions: p,
                })
            }),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_total(path in ".*") {
            let class = classifier().classify(&path);
            prop_assert!(matches!(
                class,
                RouteClass::Public
                    | RouteClass::AdminProtected
                    | RouteClass::StudentProtected
                    | RouteClass::Unclassified
            ));
        }

        #[test]
        fn expired_tokens_go_to_login(
            path in protected_path(),
            admin in any::<bool>(),
            age in 1i64..1_000_000,
            sub in gate(),
        ) {
            let role = if admin { Role::Admin } else { Role::Student };
            let raw = token(role, unix_now() - age);
            let decision = decide(&path, Some(&raw), sub);
            match decision {
                Decision::RedirectTo(target) => {
                    prop_assert!(target.starts_with("/auth/login?redirect="), "{}", target)
                }
                other => prop_assert!(false, "expected login redirect, got {:?}", other),
            }
        }

        #[test]
        fn decide_is_pure(path in "/[a-z/]{0,20}", admin in any::<bool>(), sub in gate()) {
            let role = if admin { Role::Admin } else { Role::Student };
            let raw = token(role, unix_now() + 3600);
            let first = decide(&path, Some(&raw), sub);
            let second = decide(&path, Some(&raw), sub);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn valid_sessions_never_see_public_pages(admin in any::<bool>(), sub in gate()) {
            let (role, home) = if admin {
                (Role::Admin, "/dashboard")
            } else {
                (Role::Student, "/student")
            };
            let raw = token(role, unix_now() + 3600);
            for path in ["/", "/auth/login", "/auth/signup", "/auth/forgot-password"] {
                prop_assert_eq!(
                    decide(path, Some(&raw), sub),
                    Decision::RedirectTo(home.to_string())
                );
            }
        }
    }
}
