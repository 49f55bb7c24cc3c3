mod common;

use common::*;
use sip_registrator::registration::{spawn, RegistrationState, TransactionEvent, UserAgentEvent};
use sip_registrator::RegistrationCause;
use std::time::Duration;

#[tokio::test]
async fn test_initial_registration() {
    let mut f = fixture();
    f.registrator.register();

    assert_eq!(f.sender.count(), 1);
    assert_eq!(f.sender.last_header("CSeq").as_deref(), Some("1 REGISTER"));
    assert_eq!(f.sender.last_header("Expires").as_deref(), Some("600"));
    let sent = f.sender.last_header("Contact").unwrap();
    assert!(sent.starts_with("<sip:alice@192.168.1.10:5060>;+sip.ice;reg-id=1;"));
    assert!(sent.ends_with(";expires=600"));

    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    assert!(f.registrator.next_event().await);

    assert!(f.registrator.registered());
    assert!(!f.registrator.registering());
    assert_eq!(f.registrator.state(), RegistrationState::RenewScheduled);
    assert_eq!(f.scheduler.scheduled(), vec![Duration::from_millis(295_000)]);
    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Registered { .. })
    ));
    assert!(f.events.try_recv().is_err());
}

#[tokio::test]
async fn test_renewal_uses_expires_header() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![
            contact("<sip:alice@192.168.1.10:5060>"),
            expires(120),
        ],
    )));
    f.registrator.next_event().await;

    assert_eq!(f.scheduler.scheduled(), vec![Duration::from_millis(115_000)]);

    // 定时器到期后重新注册，不再重复通知 registered
    assert!(f.scheduler.fire_latest());
    assert!(f.registrator.next_event().await);
    assert_eq!(f.sender.count(), 2);
    assert_eq!(f.sender.last_header("CSeq").as_deref(), Some("2 REGISTER"));
    assert_eq!(f.registrator.state(), RegistrationState::Registering);

    f.sender.reply(TransactionEvent::Response(response(
        200,
        2,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=120")],
    )));
    f.registrator.next_event().await;

    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Registered { .. })
    ));
    assert!(f.events.try_recv().is_err());
    assert_eq!(f.scheduler.pending(), 1);
}

#[tokio::test]
async fn test_interval_too_brief_retries_with_min_expires() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        423,
        1,
        vec![min_expires("1800")],
    )));
    f.registrator.next_event().await;

    assert_eq!(f.registrator.expires(), 1800);
    assert_eq!(f.registrator.cseq(), 2);
    assert!(f.registrator.registering());

    // 重试请求确实已发出
    assert_eq!(f.sender.count(), 2);
    assert_eq!(f.sender.last_header("CSeq").as_deref(), Some("2 REGISTER"));
    assert_eq!(f.sender.last_header("Expires").as_deref(), Some("1800"));
    assert!(f
        .sender
        .last_header("Contact")
        .unwrap()
        .ends_with(";expires=1800"));
    assert!(f.events.try_recv().is_err());
}

#[tokio::test]
async fn test_interval_too_brief_without_min_expires() {
    let mut f = fixture();
    f.registrator.register();
    f.sender
        .reply(TransactionEvent::Response(response(423, 1, vec![])));
    f.registrator.next_event().await;

    assert_eq!(f.sender.count(), 1);
    assert!(!f.registrator.registering());
    assert_eq!(f.registrator.expires(), 600);
    match f.events.try_recv() {
        Ok(UserAgentEvent::RegistrationFailed { cause, .. }) => {
            assert_eq!(cause, RegistrationCause::SipFailureCode)
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_cause_mapping() {
    let mut f = fixture();
    f.registrator.register();
    f.sender
        .reply(TransactionEvent::Response(response(403, 1, vec![])));
    f.registrator.next_event().await;

    match f.events.try_recv() {
        Ok(UserAgentEvent::RegistrationFailed { response, cause }) => {
            assert_eq!(cause, RegistrationCause::Rejected);
            assert_eq!(u16::from(response.status_code), 403);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(f.registrator.state(), RegistrationState::Idle);
}

#[tokio::test]
async fn test_transport_closed_while_registered() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    f.registrator.next_event().await;
    let _ = f.events.try_recv();

    f.registrator.on_transport_closed();

    assert!(!f.registrator.registered());
    assert!(!f.registrator.has_renewal_timer());
    assert_eq!(f.scheduler.pending(), 0);
    assert_eq!(f.sender.count(), 1);
    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Unregistered {
            response: None,
            cause: None,
        })
    ));
}

#[tokio::test]
async fn test_transport_closed_while_idle_is_silent() {
    let mut f = fixture();
    f.registrator.on_transport_closed();

    assert_eq!(f.registrator.state(), RegistrationState::Idle);
    assert!(f.events.try_recv().is_err());
    assert!(!f.registrator.next_event().await);
}

#[tokio::test]
async fn test_unregister_all() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    f.registrator.next_event().await;
    let _ = f.events.try_recv();

    f.registrator.unregister(true);

    assert_eq!(f.registrator.state(), RegistrationState::Unregistering);
    assert_eq!(f.scheduler.pending(), 0);
    assert_eq!(f.sender.count(), 2);
    assert_eq!(f.sender.last_header("Contact").as_deref(), Some("*"));
    assert_eq!(f.sender.last_header("Expires").as_deref(), Some("0"));
    assert_eq!(f.sender.last_header("CSeq").as_deref(), Some("2 REGISTER"));

    f.sender
        .reply(TransactionEvent::Response(response(200, 2, vec![])));
    f.registrator.next_event().await;

    match f.events.try_recv() {
        Ok(UserAgentEvent::Unregistered { response, cause }) => {
            assert!(response.is_some());
            assert!(cause.is_none());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(f.registrator.state(), RegistrationState::Idle);
}

#[tokio::test]
async fn test_unregister_timeout_reports_cause() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    f.registrator.next_event().await;
    let _ = f.events.try_recv();

    f.registrator.unregister(false);
    assert!(f
        .sender
        .last_header("Contact")
        .unwrap()
        .ends_with(";expires=0"));

    f.sender.reply(TransactionEvent::Timeout);
    f.registrator.next_event().await;

    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Unregistered {
            response: None,
            cause: Some(RegistrationCause::RequestTimeout),
        })
    ));
}

#[tokio::test]
async fn test_stale_cseq_does_not_mutate_state() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        423,
        0,
        vec![min_expires("1800")],
    )));
    f.registrator.next_event().await;

    assert_eq!(f.registrator.expires(), 600);
    assert_eq!(f.registrator.cseq(), 1);
    assert!(f.registrator.registering());
    assert_eq!(f.sender.count(), 1);
    assert!(f.events.try_recv().is_err());
}

#[tokio::test]
async fn test_success_without_contact_is_ignored() {
    let mut f = fixture();
    f.registrator.register();
    f.sender
        .reply(TransactionEvent::Response(response(200, 1, vec![])));
    f.registrator.next_event().await;

    assert!(!f.registrator.registered());
    assert!(!f.registrator.registering());
    assert!(f.scheduler.scheduled().is_empty());
    assert!(f.events.try_recv().is_err());
}

#[tokio::test]
async fn test_expires_floor() {
    let config = config().with_expires(3);
    let mut f = fixture_with(config, false);
    assert_eq!(f.registrator.expires(), 10);

    f.registrator.register();
    assert_eq!(f.sender.last_header("Expires").as_deref(), Some("10"));

    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=1")],
    )));
    f.registrator.next_event().await;

    assert_eq!(f.scheduler.scheduled(), vec![Duration::from_millis(5_000)]);
}

#[tokio::test]
async fn test_gruu_is_reported_to_user_agent() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact(
            "<sip:alice@192.168.1.10:5060>;expires=300;temp-gruu=\"sip:tgruu.7hs==jd7vnzga5w7fajsc7-ajd6fabz0f8g5@example.com;gr\";pub-gruu=\"sip:alice@example.com;gr=urn:uuid:f81d4fae-7dec-11d0-a765-00a0c91e6bf6\"",
        )],
    )));
    f.registrator.next_event().await;

    assert!(f.registrator.registered());
    let contact = f.user_agent.contact();
    assert_eq!(
        contact.temp_gruu.as_deref(),
        Some("sip:tgruu.7hs==jd7vnzga5w7fajsc7-ajd6fabz0f8g5@example.com;gr")
    );
    assert_eq!(
        contact.pub_gruu.as_deref(),
        Some("sip:alice@example.com;gr=urn:uuid:f81d4fae-7dec-11d0-a765-00a0c91e6bf6")
    );
}

#[tokio::test]
async fn test_expiring_listener_defers_renewal() {
    let mut f = fixture_with(config(), true);
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    f.registrator.next_event().await;
    let _ = f.events.try_recv();

    assert!(f.scheduler.fire_latest());
    f.registrator.next_event().await;

    assert_eq!(f.sender.count(), 1);
    assert!(!f.registrator.has_renewal_timer());
    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::RegistrationExpiring)
    ));
}

#[tokio::test]
async fn test_transaction_dropped_is_transport_error() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.drop_last();
    f.registrator.next_event().await;

    match f.events.try_recv() {
        Ok(UserAgentEvent::RegistrationFailed { response, cause }) => {
            assert_eq!(cause, RegistrationCause::ConnectionError);
            assert_eq!(u16::from(response.status_code), 500);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_spawned_registrator_lifecycle() {
    let f = fixture();
    let sender = f.sender.clone();
    let mut events = f.events;
    let handle = spawn(f.registrator);
    let mut registered = handle.watch_registered();

    handle.register().unwrap();
    wait_for_requests(&sender, 1).await;
    sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));

    registered.wait_for(|registered| *registered).await.unwrap();
    assert!(handle.is_registered());
    assert!(matches!(
        events.recv().await,
        Some(UserAgentEvent::Registered { .. })
    ));

    // 关闭时发送注销并等待其结束
    let close = tokio::spawn(handle.close());
    wait_for_requests(&sender, 2).await;
    assert!(sender
        .last_header("Contact")
        .unwrap()
        .ends_with(";expires=0"));
    sender.reply(TransactionEvent::Response(response(200, 2, vec![])));
    close.await.unwrap();

    assert!(matches!(
        events.recv().await,
        Some(UserAgentEvent::Unregistered { cause: None, .. })
    ));
}

async fn wait_for_requests(sender: &RecordingSender, count: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while sender.count() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request not sent in time");
}

/// 已注册（CSeq 1 收到 200）且已取走 Registered 事件的夹具
async fn registered_fixture() -> Fixture {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
    )));
    f.registrator.next_event().await;
    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Registered { .. })
    ));
    f
}

#[tokio::test]
async fn test_register_during_unregister_keeps_both_transactions() {
    let mut f = registered_fixture().await;
    f.registrator.unregister(false);
    f.registrator.register();

    assert_eq!(f.sender.count(), 3);
    assert_eq!(f.registrator.state(), RegistrationState::Registering);
    assert!(f.registrator.unregistering());

    // 注销事务的响应仍然结束注销流程
    f.sender
        .reply_to(1, TransactionEvent::Response(response(200, 2, vec![])));
    assert!(f.registrator.next_event().await);

    match f.events.try_recv() {
        Ok(UserAgentEvent::Unregistered { response, cause }) => {
            assert!(response.is_some());
            assert!(cause.is_none());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(!f.registrator.unregistering());
    assert!(f.registrator.registering());

    // 新的 REGISTER 照常完成
    f.sender.reply_to(
        2,
        TransactionEvent::Response(response(
            200,
            3,
            vec![contact("<sip:alice@192.168.1.10:5060>;expires=300")],
        )),
    );
    f.registrator.next_event().await;

    assert!(f.registrator.registered());
    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Registered { .. })
    ));
}

#[tokio::test]
async fn test_unregister_rejected_reports_response_and_cause() {
    let mut f = registered_fixture().await;
    f.registrator.unregister(false);
    f.sender
        .reply(TransactionEvent::Response(response(403, 2, vec![])));
    f.registrator.next_event().await;

    match f.events.try_recv() {
        Ok(UserAgentEvent::Unregistered {
            response: Some(response),
            cause,
        }) => {
            assert_eq!(u16::from(response.status_code), 403);
            assert_eq!(cause, Some(RegistrationCause::Rejected));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(f.registrator.state(), RegistrationState::Idle);
}

#[tokio::test]
async fn test_unregister_transport_error() {
    let mut f = registered_fixture().await;
    f.registrator.unregister(true);
    f.sender.reply(TransactionEvent::TransportError);
    f.registrator.next_event().await;

    assert!(matches!(
        f.events.try_recv(),
        Ok(UserAgentEvent::Unregistered {
            response: None,
            cause: Some(RegistrationCause::ConnectionError),
        })
    ));
    assert!(!f.registrator.unregistering());
}

#[tokio::test]
async fn test_unregister_authenticated_increments_cseq() {
    let mut f = registered_fixture().await;
    f.registrator.unregister(false);
    assert_eq!(f.registrator.cseq(), 2);

    f.sender.reply(TransactionEvent::Authenticated);
    f.registrator.next_event().await;

    assert_eq!(f.registrator.cseq(), 3);
    assert_eq!(f.registrator.state(), RegistrationState::Unregistering);
    assert!(f.events.try_recv().is_err());

    // 1xx 不结束注销
    f.sender
        .reply(TransactionEvent::Response(response(100, 3, vec![])));
    f.registrator.next_event().await;
    assert!(f.registrator.unregistering());
    assert!(f.events.try_recv().is_err());
}

#[tokio::test]
async fn test_matching_contact_is_not_first() {
    let mut f = fixture();
    f.registrator.register();
    f.sender.reply(TransactionEvent::Response(response(
        200,
        1,
        vec![
            contact("<sip:bob@10.0.0.2:5060>;expires=60, <sip:alice@192.168.1.10:5060>;expires=900"),
            expires(120),
        ],
    )));
    f.registrator.next_event().await;

    assert!(f.registrator.registered());
    assert_eq!(f.scheduler.scheduled(), vec![Duration::from_millis(895_000)]);
}
