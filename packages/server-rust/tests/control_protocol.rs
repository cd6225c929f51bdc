//! End-to-end tests of the control channel over real TCP connections.

mod common;

use std::time::Duration;

use cmdserver_core::reply;
use common::{login, server_with_control, LineClient, PASSWORD};
use tokio::net::TcpStream;

#[tokio::test]
async fn authentication_flow() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = LineClient::connect(control_port).await;

    assert_eq!(client.ask("STATUS").await, reply::PASSWORD_REQUIRED);
    assert_eq!(client.ask("PASSWORD wrongpw").await, reply::INVALID_PASSWORD);
    assert_eq!(client.ask("status").await, reply::PASSWORD_REQUIRED);
    assert_eq!(
        client.ask(&format!("password {PASSWORD}")).await,
        reply::LOGGED_IN
    );

    let status = client.ask_block("STATUS").await;
    let control_line = format!("SERVICE control ON PORT {control_port}");
    assert!(status.contains(&control_line), "status was {status:?}");
    assert!(
        status
            .iter()
            .any(|line| line.starts_with("  CONNECTED TO 127.0.0.1:")),
        "status should list this session: {status:?}"
    );
    assert!(status.last().unwrap().ends_with("MAX CONNECTIONS: 10"));

    server.shutdown().await;
}

#[tokio::test]
async fn privileged_commands_require_password() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = LineClient::connect(control_port).await;

    for command in ["ADD echo:0", "REMOVE 1", "MAX 1", "SHUTDOWN", "STOP"] {
        assert_eq!(client.ask(command).await, reply::PASSWORD_REQUIRED, "{command}");
    }
    assert_eq!(server.manager().max_connections(), 10);
    assert_eq!(server.ports().await, vec![control_port]);

    server.shutdown().await;
}

#[tokio::test]
async fn help_and_quit_work_without_password() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = LineClient::connect(control_port).await;

    let help = client.ask_block("?").await;
    assert_eq!(help.first().map(String::as_str), Some("supported commands:"));

    client.send("QUIT").await;
    client.expect(reply::BYE).await;
    client.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_and_malformed_commands_are_reported() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = login(control_port).await;

    assert_eq!(client.ask("frobnicate").await, reply::UNRECOGNIZED);
    assert!(client.ask("MAX lots").await.starts_with("error: "));
    assert!(client.ask("ADD echo").await.starts_with("error: "));
    // Blank lines are ignored; the next reply belongs to HELP.
    client.send("").await;
    let help = client.ask_block("HELP").await;
    assert_eq!(help.first().map(String::as_str), Some("supported commands:"));

    server.shutdown().await;
}

#[tokio::test]
async fn invalid_utf8_line_is_answered_and_session_continues() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = login(control_port).await;

    client.send_raw(b"STATUS \xff\xfe\n").await;
    let answer = client.recv().await.expect("reply to invalid line");
    assert!(answer.starts_with("error: "), "got {answer:?}");

    // Still authenticated on the same session.
    assert_eq!(client.ask("MAX 6").await, reply::max_set(6));

    server.shutdown().await;
}

#[tokio::test]
async fn only_one_control_session_at_a_time() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut first = login(control_port).await;

    let mut second = LineClient::connect(control_port).await;
    second.expect(reply::ONLY_ONE_SESSION).await;
    second.expect_closed().await;

    // The first session is unaffected.
    assert_eq!(first.ask("MAX 7").await, reply::max_set(7));

    // Once it quits, a new session may start.
    first.send("QUIT").await;
    first.expect(reply::BYE).await;
    first.expect_closed().await;

    let mut third = login(control_port).await;
    assert_eq!(third.ask("MAX 8").await, reply::max_set(8));

    server.shutdown().await;
}

#[tokio::test]
async fn add_remove_and_max_reconfigure_the_server() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let mut client = login(control_port).await;

    let added = client.ask("ADD echo:0").await;
    let echo_port: u16 = added
        .strip_prefix("echo service added on port ")
        .and_then(|port| port.parse().ok())
        .unwrap_or_else(|| panic!("unexpected reply {added:?}"));

    let mut echo = LineClient::connect(echo_port).await;
    assert_eq!(echo.ask("hi").await, "echo-> hi");

    assert_eq!(
        client.ask(&format!("ADD time:{control_port}")).await,
        reply::error(format!("port {control_port} already in use"))
    );
    assert_eq!(
        client.ask("ADD gopher:0").await,
        reply::error("unknown service: gopher")
    );

    assert_eq!(client.ask("MAX 5").await, reply::max_set(5));
    assert_eq!(server.manager().max_connections(), 5);

    assert_eq!(
        client.ask(&format!("REMOVE {echo_port}")).await,
        reply::service_removed(echo_port)
    );
    assert!(TcpStream::connect(("127.0.0.1", echo_port)).await.is_err());
    assert_eq!(
        client.ask(&format!("REMOVE {echo_port}")).await,
        reply::error(format!("no service bound to port {echo_port}"))
    );

    // Removing a listener does not cut connections it already accepted.
    assert_eq!(echo.ask("still here").await, "echo-> still here");

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_command_stops_every_listener() {
    let (server, control_port) = server_with_control(common::local_config()).await;
    let echo_port = server.add_named_service("echo", 0).await.unwrap();
    let mut idle_echo = LineClient::connect(echo_port).await;
    assert_eq!(idle_echo.ask("ping").await, "echo-> ping");

    let mut client = login(control_port).await;
    client.send("SHUTDOWN").await;
    client.expect(reply::TERMINATING).await;
    client.expect_closed().await;

    tokio::time::timeout(Duration::from_secs(5), server.wait_for_shutdown())
        .await
        .expect("server should finish shutting down");

    // Running sessions observe the shutdown signal.
    idle_echo.expect_closed().await;

    for port in [control_port, echo_port] {
        assert!(
            TcpStream::connect(("127.0.0.1", port)).await.is_err(),
            "port {port} still accepting"
        );
    }
}
