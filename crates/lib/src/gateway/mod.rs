//! Gateway: the HTTP surface the messaging platform talks to.
//!
//! `GET /webhook` answers subscription verification, `POST /webhook` receives change
//! notifications and hands messages to the dispatcher, `GET /` serves a static info page and
//! `GET /health` reports liveness.

mod server;

pub use server::{app, build_state, run_gateway, verify_subscription, GatewayState, VerifyParams};
