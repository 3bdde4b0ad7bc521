//! Transit Pulse - Real-Time Bus Tracking
//!
//! This crate implements the real-time location synchronization layer for a
//! consumer transit-tracking application: the client-side session manager
//! (transport session, identification handshake, driver and passenger room
//! sessions, geolocation acquisition) and the relay server that fans
//! location telemetry out to bus rooms.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
