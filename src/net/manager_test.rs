use std::cell::RefCell;

use envelopes::{ChannelAction, ChannelInfo, ChannelUpdate, Content, SystemUserStatus};

use super::*;
use crate::net::mock::MockConnector;
use crate::net::socket::ABNORMAL_CLOSURE;
use crate::timers::ManualTimers;

struct Harness {
    manager: ConnectionManager,
    connector: Rc<MockConnector>,
    timers: Rc<ManualTimers>,
}

fn harness() -> Harness {
    harness_with(&SyncConfig::default())
}

fn harness_with(config: &SyncConfig) -> Harness {
    let connector = MockConnector::new();
    let timers = Rc::new(ManualTimers::new());
    let manager = ConnectionManager::new(config, connector.clone(), timers.clone());
    Harness { manager, connector, timers }
}

fn text(body: &str) -> Envelope {
    Envelope::new("general", "alice", Content::Text(body.to_owned()))
}

fn recorder() -> (Rc<RefCell<Vec<String>>>, Rc<RefCell<Vec<String>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    (Rc::clone(&log), log)
}

const LONG_ENOUGH: Duration = Duration::from_secs(2);

#[test]
fn connect_opens_scope_endpoint_with_token_in_header() {
    let h = harness();
    h.manager.connect_channel("tok", "general");

    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Connecting);
    let request = &h.connector.last().request;
    assert_eq!(request.url, "ws://127.0.0.1:8080/ws/general");
    assert_eq!(request.token, "tok");

    h.connector.last().open();
    assert!(h.manager.is_connected(ConnectionScope::Channel));
    assert_eq!(h.manager.channel_name().as_deref(), Some("general"));
}

#[test]
fn identical_connect_is_a_noop_while_connecting_or_connected() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.manager.connect_channel("tok", "general");
    assert_eq!(h.connector.opened(), 1);

    h.connector.last().open();
    h.manager.connect_channel("tok", "general");
    assert_eq!(h.connector.opened(), 1);
    assert!(h.manager.is_connected(ConnectionScope::Channel));
}

#[test]
fn switching_channels_closes_the_old_socket_normally() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();

    h.manager.connect_channel("tok", "art");
    let old = h.connector.socket(0);
    assert_eq!(old.closed_with(), Some(NORMAL_CLOSURE));
    assert_eq!(h.connector.opened(), 2);
    assert_eq!(h.connector.last().request.url, "ws://127.0.0.1:8080/ws/art");
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Connecting);

    // Late close from the retired socket changes nothing.
    h.timers.advance(LONG_ENOUGH);
    old.drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Connecting);
    assert_eq!(h.timers.pending(), 0);
}

#[test]
fn fast_failure_never_reconnects() {
    let h = harness();
    h.manager.connect_channel("bad-token", "general");
    h.timers.advance(Duration::from_millis(200));
    h.connector.last().drop_with(ABNORMAL_CLOSURE);

    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Disconnected);
    assert_eq!(h.timers.pending(), 0);
    h.timers.advance(Duration::from_secs(120));
    assert_eq!(h.connector.opened(), 1);
}

#[test]
fn abnormal_close_backs_off_exponentially_then_gives_up() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();

    let mut delays = Vec::new();
    for attempt in 1..=5u32 {
        h.timers.advance(LONG_ENOUGH);
        h.connector.last().drop_with(ABNORMAL_CLOSURE);
        assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Reconnecting(attempt));

        let delay = h.timers.next_delay().expect("reconnect should be scheduled");
        delays.push(delay);
        h.timers.advance(delay);
        assert_eq!(h.connector.opened(), attempt as usize + 1);
    }

    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Disconnected);
    assert_eq!(h.timers.pending(), 0);
    assert_eq!(h.connector.opened(), 6);

    let expected: Vec<Duration> = [1, 2, 4, 8, 16].into_iter().map(Duration::from_secs).collect();
    assert_eq!(delays, expected);
}

#[test]
fn counter_resets_after_giving_up() {
    let config = SyncConfig {
        backoff: BackoffPolicy { max_attempts: 1, ..BackoffPolicy::default() },
        ..SyncConfig::default()
    };
    let h = harness_with(&config);
    h.manager.connect_channel("tok", "general");
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    h.timers.advance(Duration::from_secs(1));
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Disconnected);

    h.manager.connect_channel("tok", "general");
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Reconnecting(1));
    assert_eq!(h.timers.next_delay(), Some(Duration::from_secs(1)));
}

#[test]
fn delays_never_exceed_the_cap() {
    let config = SyncConfig {
        backoff: BackoffPolicy {
            base: Duration::from_secs(10),
            cap: Duration::from_secs(25),
            max_attempts: 4,
            fast_failure: Duration::from_secs(1),
        },
        ..SyncConfig::default()
    };
    let h = harness_with(&config);
    h.manager.connect_system("tok");

    let mut delays = Vec::new();
    for _ in 0..4 {
        h.timers.advance(LONG_ENOUGH);
        h.connector.last().drop_with(ABNORMAL_CLOSURE);
        let delay = h.timers.next_delay().expect("reconnect should be scheduled");
        delays.push(delay.as_secs());
        h.timers.advance(delay);
    }
    assert_eq!(delays, vec![10, 20, 25, 25]);
}

#[test]
fn normal_close_does_not_reconnect() {
    let h = harness();
    h.manager.connect_system("tok");
    h.connector.last().open();
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(NORMAL_CLOSURE);

    assert_eq!(h.manager.state(ConnectionScope::System), ConnectionState::Disconnected);
    assert_eq!(h.timers.pending(), 0);
}

#[test]
fn disconnect_cancels_pending_reconnect() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.timers.pending(), 1);

    h.manager.disconnect(ConnectionScope::Channel);
    assert_eq!(h.timers.pending(), 0);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Disconnected);
    assert_eq!(h.manager.channel_name(), None);
    h.timers.advance(Duration::from_secs(60));
    assert_eq!(h.connector.opened(), 1);
}

#[test]
fn disconnect_closes_socket_with_normal_code() {
    let h = harness();
    h.manager.connect_system("tok");
    h.connector.last().open();
    h.manager.disconnect(ConnectionScope::System);
    assert_eq!(h.connector.last().closed_with(), Some(NORMAL_CLOSURE));
}

#[test]
fn manual_connect_replaces_pending_reconnect() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);

    h.manager.connect_channel("tok", "general");
    assert_eq!(h.connector.opened(), 2);
    assert_eq!(h.timers.pending(), 0);
    assert_eq!(h.manager.state(ConnectionScope::Channel), ConnectionState::Connecting);
}

#[test]
fn channel_update_is_never_sent() {
    let h = harness();
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();

    let update = Envelope::new(
        "general",
        "alice",
        Content::ChannelUpdate(ChannelUpdate {
            action: ChannelAction::Deleted,
            channel: ChannelInfo { name: "general".into(), description: None, created_by: None },
        }),
    );
    assert!(!h.manager.send(&update));
    assert!(h.connector.last().sent().is_empty());
}

#[test]
fn send_fails_unless_channel_socket_is_open() {
    let h = harness();
    assert!(!h.manager.send(&text("nobody home")));

    h.manager.connect_channel("tok", "general");
    assert!(!h.manager.send(&text("too early")));

    h.connector.last().open();
    assert!(h.manager.send(&text("hello")));
    assert_eq!(h.connector.last().sent().len(), 1);
}

#[test]
fn send_goes_to_the_channel_socket_only() {
    let h = harness();
    h.manager.connect_system("tok");
    let system = h.connector.last();
    system.open();
    h.manager.connect_channel("tok", "general");
    let channel = h.connector.last();
    channel.open();

    assert!(h.manager.send(&text("hello")));
    assert!(system.sent().is_empty());
    assert_eq!(channel.sent()[0].content, Content::Text("hello".into()));
}

#[test]
fn incoming_envelopes_reach_only_their_scope_handlers() {
    let h = harness();
    let (log, sink) = recorder();
    let (system_sink, channel_sink) = (Rc::clone(&sink), Rc::clone(&sink));
    h.manager.add_handlers(
        ConnectionScope::System,
        "presence",
        HandlerSet::new()
            .on_system_user_status(move |_, status| system_sink.borrow_mut().push(format!("system:{}", status.count)))
            .on_chat(|_, _| panic!("chat must not reach the system scope")),
    );
    h.manager.add_handlers(
        ConnectionScope::Channel,
        "chat",
        HandlerSet::new().on_chat(move |env, body| channel_sink.borrow_mut().push(format!("{}:{body}", env.username))),
    );

    h.manager.connect_system("tok");
    let system = h.connector.last();
    system.open();
    h.manager.connect_channel("tok", "general");
    let channel = h.connector.last();
    channel.open();

    channel.deliver(&Envelope::new("general", "bob", Content::Text("hi".into())));
    system.deliver(&Envelope::new("", "", Content::SystemUserStatus(SystemUserStatus { count: 4 })));

    assert_eq!(*log.borrow(), vec!["bob:hi", "system:4"]);
}

#[test]
fn invalid_frames_never_reach_handlers() {
    let h = harness();
    let (log, sink) = recorder();
    h.manager.add_handlers(
        ConnectionScope::Channel,
        "chat",
        HandlerSet::new().on_chat(move |_, body| sink.borrow_mut().push(body.to_owned())),
    );
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();

    h.connector.last().deliver_text("{not json");
    h.connector.last().deliver_text(r#"{"type":"SKETCH","content":{"commandType":"UPDATE","sketchId":"s1"}}"#);
    assert!(log.borrow().is_empty());
    assert!(h.manager.is_connected(ConnectionScope::Channel));
}

#[test]
fn handler_can_unregister_itself_during_dispatch() {
    let h = harness();
    let (log, sink) = recorder();
    let (once_sink, after_sink) = (Rc::clone(&sink), Rc::clone(&sink));
    let manager = h.manager.clone();
    h.manager.add_handlers(
        ConnectionScope::Channel,
        "once",
        HandlerSet::new().on_chat(move |_, body| {
            once_sink.borrow_mut().push(format!("once:{body}"));
            manager.remove_handlers(ConnectionScope::Channel, "once");
        }),
    );
    h.manager.add_handlers(
        ConnectionScope::Channel,
        "after",
        HandlerSet::new().on_chat(move |_, body| after_sink.borrow_mut().push(format!("after:{body}"))),
    );
    h.manager.connect_channel("tok", "general");
    h.connector.last().open();

    h.connector.last().deliver(&text("1"));
    h.connector.last().deliver(&text("2"));

    assert_eq!(*log.borrow(), vec!["once:1", "after:1", "after:2"]);
    assert_eq!(h.manager.handler_count(ConnectionScope::Channel), 1);
}

#[test]
fn connection_changes_are_reported_to_scope_handlers() {
    let h = harness();
    let (log, sink) = recorder();
    h.manager.add_handlers(
        ConnectionScope::Channel,
        "status",
        HandlerSet::new().on_connection_change(move |up| sink.borrow_mut().push(up.to_string())),
    );

    h.manager.connect_channel("tok", "general");
    h.connector.last().open();
    h.timers.advance(LONG_ENOUGH);
    h.connector.last().drop_with(ABNORMAL_CLOSURE);
    h.timers.advance(Duration::from_secs(1));
    h.connector.last().open();
    h.manager.disconnect(ConnectionScope::Channel);

    assert_eq!(*log.borrow(), vec!["true", "false", "true", "false"]);
}

#[test]
fn scopes_connect_independently() {
    let h = harness();
    h.manager.connect_system("tok");
    let system = h.connector.last();
    h.manager.connect_channel("tok", "general");
    let channel = h.connector.last();
    assert_eq!(h.connector.opened(), 2);

    channel.open();
    assert!(h.manager.is_connected(ConnectionScope::Channel));
    assert_eq!(h.manager.state(ConnectionScope::System), ConnectionState::Connecting);

    system.drop_with(ABNORMAL_CLOSURE);
    assert_eq!(h.manager.state(ConnectionScope::System), ConnectionState::Disconnected);
    assert!(h.manager.is_connected(ConnectionScope::Channel));
}

#[test]
fn dropped_manager_ignores_late_events() {
    let connector = MockConnector::new();
    let timers = Rc::new(ManualTimers::new());
    let manager = ConnectionManager::new(&SyncConfig::default(), connector.clone(), timers.clone());
    manager.connect_system("tok");
    drop(manager);

    connector.last().open();
    connector.last().drop_with(ABNORMAL_CLOSURE);
    assert_eq!(timers.pending(), 0);
}
