mod common;

use std::time::{Duration, Instant};

use common::{spawn_dut, unused_addr, Behaviour};
use onlog_probe::{
    probe::{self, ReceiveError, LOG_COMMAND},
    protocol::frame::codec::{Control, Data, OpCode},
    Error, ProbeConfig, ProbeError, ProbeEvent, Reply, Session, SessionState, Target
};

fn config() -> ProbeConfig {
    ProbeConfig::default().with_timeout(Duration::from_secs(5))
}

/// Runs a probe and records the progress events as the CLI would print them.
fn run(host: &str, config: &ProbeConfig) -> (Result<Reply, ProbeError>, Vec<String>) {
    let mut events = Vec::new();
    let result = probe::run(Some(host), config, |event| {
        events.push(match event {
            ProbeEvent::Connecting(target) => format!("Connecting to {target}"),
            ProbeEvent::Sent => "Sent".to_owned(),
            ProbeEvent::Receiving => "Receiving...".to_owned(),
            ProbeEvent::Received(reply) => format!("Received '{reply}'")
        })
    });
    (result, events)
}

#[test]
fn fetches_log_from_dut() {
    let (addr, dut) = spawn_dut(Behaviour::Reply("log-contents".into()));

    let (result, events) = run(&addr.to_string(), &config());

    assert_eq!(result.ok(), Some(Reply::Text("log-contents".into())));
    assert_eq!(
        events,
        [
            format!("Connecting to ws://{addr}/ws"),
            "Sent".to_owned(),
            "Receiving...".to_owned(),
            "Received 'log-contents'".to_owned()
        ]
    );

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    assert_eq!(transcript.request_path, "/ws");
    assert!(transcript.saw_close(), "probe did not close the connection");
}

#[test]
fn sends_exactly_the_getlog_text_frame() {
    let (addr, dut) = spawn_dut(Behaviour::Reply("ok".into()));
    let (result, _) = run(&addr.to_string(), &config());
    assert!(result.is_ok());

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    let data = transcript.data_frames();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].0, OpCode::Data(Data::Text));
    assert_eq!(data[0].1, LOG_COMMAND.as_bytes());
    assert_eq!(data[0].1.len(), 6);
}

#[test]
fn binary_reply_is_accepted() {
    let (addr, dut) = spawn_dut(Behaviour::ReplyBinary(vec![1, 2, 3]));
    let (result, _) = run(&addr.to_string(), &config());

    assert_eq!(result.ok(), Some(Reply::Binary(vec![1, 2, 3])));
    let _ = dut.join();
}

#[test]
fn ping_before_reply_is_answered_and_skipped() {
    let (addr, dut) = spawn_dut(Behaviour::PingThenReply("after ping".into()));
    let (result, _) = run(&addr.to_string(), &config());
    assert_eq!(result.ok(), Some(Reply::Text("after ping".into())));

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    assert!(transcript
        .frames
        .iter()
        .any(|(op, payload)| *op == OpCode::Control(Control::Pong) && payload == b"alive?"));
}

#[test]
fn unreachable_host_is_a_connection_failure() {
    let addr = unused_addr();
    let (result, events) = run(&addr.to_string(), &config());

    let err = result.err().unwrap_or_else(|| panic!("probe succeeded"));
    assert_eq!(err.kind(), "ConnectionFailure");
    assert_eq!(err.exit_code(), 3);
    assert!(!events.iter().any(|e| e.starts_with("Received")));
}

#[test]
fn silent_dut_times_out() {
    let (addr, dut) = spawn_dut(Behaviour::Silent);
    let config = ProbeConfig::default().with_timeout(Duration::from_secs(1));

    let started = Instant::now();
    let (result, events) = run(&addr.to_string(), &config);
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(ProbeError::ReceiveFailure { source: ReceiveError::TimedOut(d) }) if d == Duration::from_secs(1)
    ));
    assert!(elapsed >= Duration::from_millis(900), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(!events.iter().any(|e| e.starts_with("Received")));

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    assert!(transcript.saw_close(), "probe did not close after the timeout");
}

#[test]
fn close_before_reply_is_a_receive_failure() {
    let (addr, dut) = spawn_dut(Behaviour::CloseFirst);
    let (result, _) = run(&addr.to_string(), &config());

    match result {
        Err(ProbeError::ReceiveFailure { source: ReceiveError::PeerClosed(Some(close)) }) => {
            assert_eq!(u16::from(close.code), 1001);
            assert_eq!(close.reason, "rebooting");
        },
        other => panic!("unexpected result: {other:?}")
    }
    let _ = dut.join();
}

#[test]
fn refused_upgrade_is_a_handshake_failure() {
    let (addr, dut) = spawn_dut(Behaviour::NotFound);
    let (result, _) = run(&addr.to_string(), &config());

    match result {
        Err(ProbeError::HandshakeFailure { source: Error::Http(res), .. }) => assert_eq!(res.status().as_u16(), 404),
        other => panic!("unexpected result: {other:?}")
    }
    let _ = dut.join();
}

#[test]
fn session_state_ends_closed() {
    let (addr, dut) = spawn_dut(Behaviour::Reply("done".into()));
    let target = Target::from_host(&addr.to_string(), "/ws").unwrap_or_else(|e| panic!("{e}"));

    let mut session = Session::new(target, config());
    assert_eq!(session.state(), SessionState::Unconnected);

    let result = session.run(|_| ());
    assert!(result.is_ok());
    assert_eq!(session.state(), SessionState::Closed);
    let _ = dut.join();
}

#[test]
fn missing_host_never_connects() {
    let mut called = false;
    let result = probe::run(None, &config(), |_| called = true);

    assert!(matches!(result, Err(ProbeError::MissingArgument)));
    assert!(!called);
}

#[test]
fn pings_do_not_extend_the_reply_timeout() {
    let (addr, dut) = spawn_dut(Behaviour::PingEvery(Duration::from_millis(300)));
    let config = ProbeConfig::default().with_timeout(Duration::from_secs(1));

    let started = Instant::now();
    let (result, _) = run(&addr.to_string(), &config);
    let elapsed = started.elapsed();

    assert!(
        matches!(result, Err(ProbeError::ReceiveFailure { source: ReceiveError::TimedOut(_) })),
        "unexpected result: {result:?}"
    );
    assert!(elapsed < Duration::from_millis(2500), "gave up after {elapsed:?}");

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    assert!(transcript
        .frames
        .iter()
        .any(|(op, _)| *op == OpCode::Control(Control::Pong)));
    assert!(transcript.saw_close());
}

#[test]
fn configured_path_is_requested() {
    let (addr, dut) = spawn_dut(Behaviour::Reply("elsewhere".into()));
    let config = config().with_path("/debug/ws");

    let (result, events) = run(&addr.to_string(), &config);
    assert_eq!(result.ok(), Some(Reply::Text("elsewhere".into())));
    assert_eq!(events[0], format!("Connecting to ws://{addr}/debug/ws"));

    let transcript = dut.join().unwrap_or_else(|_| panic!("dut panicked"));
    assert_eq!(transcript.request_path, "/debug/ws");
}
