//! A P4Runtime controller for ECN-style congestion reporting.
//!
//! The write path loads a [`SchemaIndex`](p4rt::schema::SchemaIndex), turns
//! configured intents into table and clone-session entries with [`rules`] and
//! pushes them through a [`SessionPool`](p4rt::pool::SessionPool). The read
//! path drains every session's stream channel in a [`monitor`] task and hands
//! decoded congestion telemetry to a [`Reporter`](report::Reporter).

pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod event;
pub mod monitor;
pub mod p4rt;
pub mod proto;
pub mod report;
pub mod representation;
pub mod rules;
pub mod util;

pub use rusty_p4_ecn_packet as packet;
