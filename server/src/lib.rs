//! # Trading Game Server Library
//!
//! This library provides the authoritative server for the live multiplayer
//! trading simulation. It owns the canonical game state (funds, players,
//! phase, pending orders), processes admin and player messages, and pushes
//! updates so every connected view converges on the same truth.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the only real copy of the game. Fund prices evolve here,
//! orders settle here, and market events apply here; clients merely render
//! whatever the server broadcasts.
//!
//! ### Session Management
//! Connections declare a role at connect time (`admin`, `public`, or
//! `player`). Admin and public are singleton slots; a newer connection of
//! the same role supersedes the old one and the old channel is closed.
//!
//! ### State Broadcasting
//! Every state change is serialized once and fanned out to all live
//! sessions on a best-effort basis. One slow or dead recipient never blocks
//! the others; clients that miss a frame converge on the next one or by
//! requesting a fresh snapshot.
//!
//! ## Architecture Design
//!
//! All mutable state lives on a single game-loop task. Connection handlers
//! translate socket traffic into typed commands on an mpsc channel, and the
//! loop interleaves those commands with the five-second price clock and the
//! one-second countdown clock. There is no locking because there is no
//! parallel mutation, only turn-based interleaving.
//!
//! ## Module Organization
//!
//! - [`game`] — the aggregate game state and phase/timer state machine
//! - [`pricing`] — trend/volatility price evolution with a hard price floor
//! - [`orders`] — order validation and live-price settlement
//! - [`events`] — the scripted market-shock catalog
//! - [`sessions`] — role-tagged session registry and broadcast fan-out
//! - [`network`] — axum HTTP/WebSocket surface and the game loop itself

pub mod events;
pub mod game;
pub mod network;
pub mod orders;
pub mod pricing;
pub mod sessions;
