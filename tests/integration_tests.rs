//! Integration tests for the trading simulation workspace
//!
//! These tests validate cross-component flows and real network behavior:
//! wire-protocol compatibility, order settlement against live prices, the
//! broadcast fan-out, and full client/server round trips over sockets.

use assert_approx_eq::assert_approx_eq;
use client::network::Client;
use server::game::Game;
use server::network::{self, GameCommand};
use server::pricing::PriceEngine;
use server::sessions::SessionRegistry;
use shared::{
    ClientMessage, Order, OrderSide, Phase, Role, ServerMessage, DEFAULT_TIME_REMAINING,
    STARTING_CASH,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Parses the exact frames the browser clients put on the wire.
    #[test]
    fn client_message_wire_compatibility() {
        let frames = vec![
            "{\"type\":\"getInitialData\"}",
            "{\"type\":\"startGame\"}",
            "{\"type\":\"endGame\"}",
            "{\"type\":\"resetGame\"}",
            "{\"type\":\"updatePhase\",\"phase\":\"Buying\",\"timeRemaining\":60}",
            "{\"type\":\"marketEvent\",\"eventType\":\"boeing_doors_off\",\"fundId\":\"boeing\"}",
            "{\"type\":\"newOrder\",\"order\":{\"playerName\":\"Alice\",\"orderType\":\"buy\",\"fundId\":\"boeing\",\"shares\":10}}",
        ];

        for frame in frames {
            let parsed: ClientMessage = serde_json::from_str(frame).unwrap();
            let reencoded = serde_json::to_string(&parsed).unwrap();
            let reparsed: ClientMessage = serde_json::from_str(&reencoded).unwrap();
            assert_eq!(parsed, reparsed, "frame did not survive a round trip: {}", frame);
        }
    }

    /// Outbound frames must keep the field names the views render from.
    #[test]
    fn server_message_wire_shapes() {
        let message = ServerMessage::MarketEvent {
            event: "Doors Fall Off (-20%)".to_string(),
            fund_id: "boeing".to_string(),
            new_price: 160.0,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"marketEvent\""));
        assert!(json.contains("\"fundId\":\"boeing\""));
        assert!(json.contains("\"newPrice\":160.0"));

        let message = ServerMessage::GameStarted {
            phase: Phase::MarketsClosed,
            time_remaining: 60,
            funds: shared::default_funds(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"gameStarted\""));
        assert!(json.contains("\"phase\":\"Markets Closed\""));
        assert!(json.contains("\"timeRemaining\":60"));
    }

    /// Anything outside the closed message union is rejected at the
    /// boundary, not passed through duck-typed.
    #[test]
    fn malformed_messages_fail_validation() {
        let bad_frames = vec![
            "",
            "not json",
            "{\"type\":\"dropTables\"}",
            "{\"type\":\"updatePhase\"}",
            "{\"type\":\"newOrder\",\"order\":{\"playerName\":\"Alice\"}}",
            "{\"type\":\"newOrder\",\"order\":{\"playerName\":\"Alice\",\"orderType\":\"short\",\"fundId\":\"boeing\",\"shares\":10}}",
        ];

        for frame in bad_frames {
            let result: Result<ClientMessage, _> = serde_json::from_str(frame);
            assert!(result.is_err(), "should have rejected: {}", frame);
        }
    }
}

/// ORDER SETTLEMENT TESTS
mod settlement_tests {
    use super::*;

    fn order(player: &str, side: OrderSide, fund: &str, shares: u32) -> Order {
        Order {
            player_name: player.to_string(),
            side,
            fund_id: fund.to_string(),
            shares,
        }
    }

    /// Alice starts with 100,000, buys 10 shares at 150: cash 98,500 and
    /// ten shares held.
    #[test]
    fn buy_settlement_scenario() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        let buy = order("Alice", OrderSide::Buy, "taylor", 10);
        game.submit_order(buy.clone()).unwrap();
        game.settle_order(&buy).unwrap();

        let alice = game.player("Alice").unwrap();
        assert_approx_eq!(alice.cash, 98_500.0, 1e-9);
        assert_eq!(alice.holdings["taylor"], 10);
    }

    /// Settlement floats with the market: a buy that was affordable at
    /// submission time fails cleanly after the price moves up.
    #[test]
    fn price_movement_between_submission_and_settlement() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        // 500 shares at 200 costs exactly the starting cash
        let buy = order("Alice", OrderSide::Buy, "boeing", 500);
        game.submit_order(buy.clone()).unwrap();

        // Market moves +30% before the admin settles
        game.market_event("boeing_no_chairs", "boeing");

        let result = game.settle_order(&buy);
        assert!(result.is_err(), "slippage must surface as a rejection");
        // The order stays queued and the player was never created
        assert_eq!(game.pending_order_count(), 1);
        assert!(game.player("Alice").is_none());
    }

    #[test]
    fn sell_settlement_round_trip() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        let buy = order("Bob", OrderSide::Buy, "checkpoint", 20);
        game.submit_order(buy.clone()).unwrap();
        game.settle_order(&buy).unwrap();

        let sell = order("Bob", OrderSide::Sell, "checkpoint", 5);
        game.submit_order(sell.clone()).unwrap();
        game.settle_order(&sell).unwrap();

        let bob = game.player("Bob").unwrap();
        // 20 bought at 50, 5 sold back at 50
        assert_approx_eq!(bob.cash, STARTING_CASH - 750.0, 1e-9);
        assert_eq!(bob.holdings["checkpoint"], 15);
    }

    #[test]
    fn rejected_orders_leave_no_trace() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        let buy = order("Carol", OrderSide::Buy, "luigi", 3);
        game.submit_order(buy.clone()).unwrap();
        game.reject_order(&buy).unwrap();

        assert_eq!(game.pending_order_count(), 0);
        assert!(game.player("Carol").is_none());
    }

    #[test]
    fn orders_after_game_end_are_rejected() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();
        game.end();

        let result = game.submit_order(order("Dave", OrderSide::Buy, "boeing", 1));
        assert!(result.is_err());
    }
}

/// GAME LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Boeing at 200, doors fall off (x0.8): the broadcast carries 160.
    #[test]
    fn market_event_broadcast_carries_new_price() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        let messages = game.market_event("boeing_doors_off", "boeing");

        match &messages[0] {
            ServerMessage::MarketEvent { new_price, .. } => {
                assert_approx_eq!(*new_price, 160.0, 1e-9)
            }
            other => panic!("expected MarketEvent, got {:?}", other),
        }
    }

    #[test]
    fn repeated_events_compound() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();

        game.market_event("boeing_doors_off", "boeing");
        game.market_event("boeing_doors_off", "boeing");

        let boeing = game.funds().iter().find(|f| f.id == "boeing").unwrap();
        assert_approx_eq!(boeing.price, 128.0, 1e-9);
    }

    #[test]
    fn reset_restores_initial_state_from_any_phase() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();
        game.market_event("trump_rug_pull", "trump_coin");
        game.set_phase(Phase::Selling, 15);
        for _ in 0..20 {
            game.price_tick();
        }

        game.reset();

        assert_eq!(game.phase(), Phase::MarketsClosed);
        assert_eq!(game.time_remaining(), DEFAULT_TIME_REMAINING);
        for fund in game.funds() {
            assert_eq!(fund.price, fund.initial_price);
        }
    }

    #[test]
    fn price_ticks_only_move_markets_while_closed() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        game.start();
        game.set_phase(Phase::Buying, 60);

        let before: Vec<f64> = game.funds().iter().map(|f| f.price).collect();
        assert!(game.price_tick().is_empty());
        let after: Vec<f64> = game.funds().iter().map(|f| f.price).collect();

        assert_eq!(before, after);
    }
}

/// BROADCAST FAN-OUT TESTS
mod broadcast_tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    /// Three sessions, one dead: the other two still get the message.
    #[test]
    fn one_failing_recipient_does_not_stop_the_fan_out() {
        let mut game = Game::with_engine(PriceEngine::with_seed(1));
        let mut sessions = SessionRegistry::new();

        let (admin_tx, mut admin_rx) = unbounded_channel();
        let (public_tx, public_rx) = unbounded_channel();
        let (player_tx, mut player_rx) = unbounded_channel();
        let admin_id = sessions.register(Role::Admin, admin_tx);
        sessions.register(Role::Public, public_tx);
        sessions.register(Role::Player, player_tx);

        // Kill the public display's receive side
        drop(public_rx);

        network::process_command(
            &mut game,
            &mut sessions,
            GameCommand::Inbound {
                session_id: admin_id,
                role: Role::Admin,
                message: ClientMessage::StartGame,
            },
        );

        assert!(admin_rx.try_recv().unwrap().contains("gameStarted"));
        assert!(player_rx.try_recv().unwrap().contains("gameStarted"));
    }
}

/// CLIENT-SERVER TESTS OVER REAL SOCKETS
mod client_server_tests {
    use super::*;

    /// Boots the full server (HTTP surface + game loop) on an ephemeral
    /// port and returns its address.
    async fn start_server() -> String {
        let (cmd_tx, cmd_rx) = mpsc::channel::<GameCommand>(100);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(network::serve(listener, cmd_tx));
        tokio::spawn(network::run_game_loop(
            Game::with_engine(PriceEngine::with_seed(7)),
            SessionRegistry::new(),
            cmd_rx,
            5,
        ));

        addr.to_string()
    }

    /// A fresh connection converges without waiting for any tick.
    #[tokio::test]
    async fn initial_snapshot_on_connect() {
        let addr = start_server().await;

        let mut public = Client::new(&addr, Role::Public);
        let _ = timeout(Duration::from_millis(800), public.drive_connection()).await;

        assert!(public.state().is_synced());
        assert_eq!(public.state().phase, Phase::Setup);
        assert_eq!(public.state().funds.len(), 5);
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let addr = start_server().await;
        let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();

        let request = format!(
            "GET /health HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }

    /// The pull endpoint serves the same snapshot shape the socket pushes.
    #[tokio::test]
    async fn polling_fallback_returns_full_snapshot() {
        let addr = start_server().await;

        let mut client = Client::new(&addr, Role::Public);
        client.poll_once().await.unwrap();

        assert!(client.state().is_synced());
        assert_eq!(client.state().funds.len(), 5);
    }

    /// A message queued while disconnected is flushed on connect and its
    /// effect reaches the other session.
    #[tokio::test]
    async fn queued_admin_start_reaches_public_display() {
        let addr = start_server().await;

        let mut public = Client::new(&addr, Role::Public);
        let public_task = tokio::spawn(async move {
            let _ = timeout(Duration::from_millis(1200), public.drive_connection()).await;
            public
        });

        sleep(Duration::from_millis(200)).await;

        let mut admin = Client::new(&addr, Role::Admin);
        admin.sender().send(ClientMessage::StartGame);
        let admin_task = tokio::spawn(async move {
            let _ = timeout(Duration::from_millis(900), admin.drive_connection()).await;
            admin
        });

        let public = public_task.await.unwrap();
        let admin = admin_task.await.unwrap();

        assert_eq!(public.state().phase, Phase::MarketsClosed);
        assert_eq!(admin.state().phase, Phase::MarketsClosed);
    }

    /// Registering a second admin closes the first connection instead of
    /// leaving it half-alive.
    #[tokio::test]
    async fn superseded_admin_connection_is_closed() {
        let addr = start_server().await;

        let mut admin1 = Client::new(&addr, Role::Admin);
        let first = tokio::spawn(async move {
            timeout(Duration::from_secs(3), admin1.drive_connection()).await
        });

        sleep(Duration::from_millis(300)).await;

        let mut admin2 = Client::new(&addr, Role::Admin);
        let _second = tokio::spawn(async move {
            let _ = timeout(Duration::from_millis(900), admin2.drive_connection()).await;
        });

        // The first admin sees a clean close, not a timeout
        let outcome = first.await.unwrap();
        let drive_result = outcome.expect("first admin should be closed by the server");
        assert!(drive_result.is_ok());
    }
}
