//! Request dispatch, ownership checks and registry bookkeeping.

use proptest::prelude::*;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use ua_subscriptions::{
    AuthToken, CreateMonitoredItemsRequest, CreateSubscriptionRequest, DeleteMonitoredItemsRequest,
    DeleteSubscriptionsRequest, EngineConfig, EngineError, MemoryNamespace, MonitoredItemCreateRequest,
    MonitoredItemId, MonitoringMode, NamespaceRouter, NodeId, PublishRequest, Request, RequestHeader,
    Response, ServerStats, SetMonitoringModeRequest, StatusCode, SubscriptionId, SubscriptionServer, Transport,
};

struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _request_id: u32, _response: Response) -> ua_subscriptions::Result<()> {
        Ok(())
    }
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        initial_value_fetch: false,
        ..EngineConfig::default()
    }
}

fn test_server() -> (SubscriptionServer, Arc<MemoryNamespace>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let namespace = Arc::new(MemoryNamespace::new(2));
    let server = SubscriptionServer::new(quiet_config(), namespace.clone(), Arc::new(NullTransport));
    (server, namespace)
}

fn create_subscription(server: &SubscriptionServer, token: AuthToken) -> SubscriptionId {
    let request = CreateSubscriptionRequest {
        header: RequestHeader::new(token, 1),
        requested_publishing_interval: 500.0,
        requested_lifetime_count: 10_000,
        requested_max_keep_alive_count: 10_000,
    };
    match server.handle(Request::CreateSubscription(request), 1).unwrap() {
        Some(Response::CreateSubscription(r)) => r.subscription_id,
        other => panic!("unexpected response: {:?}", other),
    }
}

fn create_items(
    server: &SubscriptionServer,
    token: AuthToken,
    sub: SubscriptionId,
    keys: &[&str],
) -> Vec<MonitoredItemId> {
    let items: Vec<_> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| MonitoredItemCreateRequest::value(NodeId::string(2, *key), i as u32))
        .collect();
    let request = CreateMonitoredItemsRequest {
        header: RequestHeader::new(token, 2),
        subscription_id: sub,
        items_to_create: items,
    };
    match server.handle(Request::CreateMonitoredItems(request), 2).unwrap() {
        Some(Response::CreateMonitoredItems(r)) => r.results.iter().map(|r| r.monitored_item_id).collect(),
        other => panic!("unexpected response: {:?}", other),
    }
}

// --- Dispatch ---

#[test]
fn test_every_response_echoes_request_handle() {
    let (server, _ns) = test_server();
    let session = server.create_session();
    let sub = create_subscription(&server, session.auth_token);

    let requests = vec![
        Request::DeleteMonitoredItems(DeleteMonitoredItemsRequest {
            header: RequestHeader::new(session.auth_token, 31),
            subscription_id: sub,
            monitored_item_ids: vec![],
        }),
        Request::SetMonitoringMode(SetMonitoringModeRequest {
            header: RequestHeader::new(session.auth_token, 32),
            subscription_id: sub,
            monitoring_mode: MonitoringMode::Sampling,
            monitored_item_ids: vec![],
        }),
        Request::SetTriggering(RequestHeader::new(session.auth_token, 33)),
        Request::DeleteSubscriptions(DeleteSubscriptionsRequest {
            header: RequestHeader::new(session.auth_token, 34),
            subscription_ids: vec![sub],
        }),
    ];

    for (expected, request) in (31..).zip(requests) {
        let response = server.handle(request, expected).unwrap().unwrap();
        assert_eq!(response.header().request_handle, expected);
    }
}

#[test]
fn test_create_items_on_foreign_subscription_fails_whole_call() {
    let (server, _ns) = test_server();
    let owner = server.create_session();
    let intruder = server.create_session();
    let sub = create_subscription(&server, owner.auth_token);

    let request = CreateMonitoredItemsRequest {
        header: RequestHeader::new(intruder.auth_token, 1),
        subscription_id: sub,
        items_to_create: vec![MonitoredItemCreateRequest::value(
            NodeId::string(2, "A"),
            1,
        )],
    };
    let result = server.handle(Request::CreateMonitoredItems(request), 1);
    assert!(matches!(result, Err(EngineError::SessionMismatch { .. })));
    assert!(server.monitored_items().is_empty());
}

// --- Ownership ---

#[test]
fn test_delete_subscriptions_batch_statuses() {
    let (server, _ns) = test_server();
    let alice = server.create_session();
    let bob = server.create_session();
    let a = create_subscription(&server, alice.auth_token);
    let b = create_subscription(&server, bob.auth_token);
    create_items(&server, alice.auth_token, a, &["A", "B"]);
    create_items(&server, bob.auth_token, b, &["A"]);

    let response = server
        .delete_subscriptions(&DeleteSubscriptionsRequest {
            header: RequestHeader::new(alice.auth_token, 1),
            subscription_ids: vec![b, SubscriptionId(123_456), a],
        })
        .unwrap();
    assert_eq!(
        response.results,
        vec![
            StatusCode::BAD_SESSION_ID_INVALID,
            StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            StatusCode::GOOD,
        ]
    );

    // Removal has completed by the time the response exists.
    assert!(!server.subscriptions().contains(a));
    assert!(server.subscriptions().contains(b));
    assert_eq!(server.monitored_items().len(), 1);
    assert!(server.monitored_items().items_for_subscription(a).is_empty());
    assert!(server.monitored_items().is_consistent());
}

#[test]
fn test_delete_monitored_items_batch_statuses() {
    let (server, _ns) = test_server();
    let alice = server.create_session();
    let bob = server.create_session();
    let a = create_subscription(&server, alice.auth_token);
    let b = create_subscription(&server, bob.auth_token);
    let mine = create_items(&server, alice.auth_token, a, &["A"]);
    let theirs = create_items(&server, bob.auth_token, b, &["A"]);

    let response = server
        .delete_monitored_items(&DeleteMonitoredItemsRequest {
            header: RequestHeader::new(alice.auth_token, 1),
            subscription_id: a,
            monitored_item_ids: vec![theirs[0], mine[0], MonitoredItemId(77_777)],
        })
        .unwrap();
    assert_eq!(
        response.results,
        vec![
            StatusCode::BAD_SESSION_ID_INVALID,
            StatusCode::GOOD,
            StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
        ]
    );
    assert!(server.monitored_items().get(mine[0]).is_none());
    assert!(server.monitored_items().get(theirs[0]).is_some());
}

#[test]
fn test_set_monitoring_mode_statuses() {
    let (server, _ns) = test_server();
    let alice = server.create_session();
    let bob = server.create_session();
    let a = create_subscription(&server, alice.auth_token);
    let ids = create_items(&server, alice.auth_token, a, &["A", "B"]);

    let response = server
        .set_monitoring_mode(&SetMonitoringModeRequest {
            header: RequestHeader::new(bob.auth_token, 1),
            subscription_id: a,
            monitoring_mode: MonitoringMode::Disabled,
            monitored_item_ids: ids.clone(),
        })
        .unwrap();
    assert_eq!(response.results, vec![StatusCode::BAD_SESSION_ID_INVALID; 2]);

    let response = server
        .set_monitoring_mode(&SetMonitoringModeRequest {
            header: RequestHeader::new(alice.auth_token, 2),
            subscription_id: a,
            monitoring_mode: MonitoringMode::Disabled,
            monitored_item_ids: ids.clone(),
        })
        .unwrap();
    assert_eq!(response.results, vec![StatusCode::GOOD; 2]);
    for id in ids {
        assert_eq!(server.monitored_items().get(id).unwrap().mode, MonitoringMode::Disabled);
    }
}

// --- Registry bookkeeping ---

#[test]
fn test_subscription_ids_are_not_reused() {
    let (server, _ns) = test_server();
    let session = server.create_session();

    let first = create_subscription(&server, session.auth_token);
    server.subscriptions().delete_subscription(first);
    let second = create_subscription(&server, session.auth_token);
    assert_ne!(first, second);
    assert_ne!(second, SubscriptionId(0));
}

#[test]
fn test_router_dispatches_by_namespace() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let plant = Arc::new(MemoryNamespace::new(3));
    let router = Arc::new(NamespaceRouter::new());
    router.register(3, plant.clone());

    let server = SubscriptionServer::new(quiet_config(), router, Arc::new(NullTransport));
    let session = server.create_session();
    let sub = create_subscription(&server, session.auth_token);

    let known = plant.set_value("Line1.Rate", 12i32);
    let request = CreateMonitoredItemsRequest {
        header: RequestHeader::new(session.auth_token, 1),
        subscription_id: sub,
        items_to_create: vec![
            MonitoredItemCreateRequest::value(known.clone(), 1),
            MonitoredItemCreateRequest::value(NodeId::numeric(9, 1), 2),
        ],
    };
    let response = server.create_monitored_items(&request).unwrap();
    assert!(response.results.iter().all(|r| r.status_code.is_good()));

    assert_eq!(server.change_notification(&known), 1);
    assert_eq!(
        server.change_notification(&NodeId::numeric(9, 1)),
        1
    );
}

#[test]
fn test_stats_and_shutdown() {
    let (server, _ns) = test_server();
    let alice = server.create_session();
    let bob = server.create_session();
    let a = create_subscription(&server, alice.auth_token);
    create_subscription(&server, bob.auth_token);
    create_items(&server, alice.auth_token, a, &["A", "B", "C"]);

    assert_eq!(
        server.stats(),
        ServerStats {
            sessions: 2,
            subscriptions: 2,
            monitored_items: 3,
        }
    );

    let stopped = server.shutdown();
    assert_eq!(stopped.subscriptions, 2);
    assert_eq!(stopped.sessions, 2);
    assert_eq!(server.stats(), ServerStats::default());
}

#[test]
fn test_config_from_file_drives_queue_capacity() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "publish_request_queue_capacity": 2, "initial_value_fetch": false }}"#).unwrap();
    let config = EngineConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.notification_queue_capacity, 100);

    let server = SubscriptionServer::new(
        config,
        Arc::new(MemoryNamespace::new(2)),
        Arc::new(NullTransport),
    );
    let session = server.create_session();
    for handle in 0..5 {
        let request = PublishRequest::new(RequestHeader::new(session.auth_token, handle));
        assert!(server.publish(request, handle).is_none());
    }
    assert_eq!(session.pending_publish_requests(), 2);
}

// --- Index consistency ---

#[derive(Clone, Debug)]
enum Op {
    CreateItems { sub: usize, keys: Vec<u8> },
    DeleteItems { picks: Vec<usize> },
    DeleteSubscription { sub: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, prop::collection::vec(0u8..4, 1..4))
            .prop_map(|(sub, keys)| Op::CreateItems { sub, keys }),
        prop::collection::vec(0usize..32, 1..4).prop_map(|picks| Op::DeleteItems { picks }),
        (0usize..3).prop_map(|sub| Op::DeleteSubscription { sub }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_registries_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let (server, _ns) = test_server();
        let session = server.create_session();
        let token = session.auth_token;
        let subs: Vec<SubscriptionId> = (0..3).map(|_| create_subscription(&server, token)).collect();
        let mut created: Vec<MonitoredItemId> = Vec::new();

        for op in ops {
            match op {
                Op::CreateItems { sub, keys } => {
                    let keys: Vec<String> = keys.iter().map(|k| format!("N{}", k)).collect();
                    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                    let request = CreateMonitoredItemsRequest {
                        header: RequestHeader::new(token, 1),
                        subscription_id: subs[sub],
                        items_to_create: keys
                            .iter()
                            .enumerate()
                            .map(|(i, k)| MonitoredItemCreateRequest::value(NodeId::string(2, *k), i as u32))
                            .collect(),
                    };
                    match server.create_monitored_items(&request) {
                        Ok(response) => {
                            created.extend(response.results.iter().map(|r| r.monitored_item_id));
                        }
                        Err(e) => prop_assert!(matches!(e, EngineError::SubscriptionNotFound(_))),
                    }
                }
                Op::DeleteItems { picks } => {
                    let ids: Vec<_> = picks
                        .iter()
                        .filter_map(|p| created.get(*p).copied())
                        .collect();
                    server.monitored_items().delete_monitored_items(&ids, &token);
                }
                Op::DeleteSubscription { sub } => {
                    server.subscriptions().delete_subscription(subs[sub]);
                }
            }
            prop_assert!(server.monitored_items().is_consistent());
        }

        for sub in &subs {
            if !server.subscriptions().contains(*sub) {
                prop_assert!(server.monitored_items().items_for_subscription(*sub).is_empty());
            }
        }
    }
}
