// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, aggregates and validation rules of the decision engine.
//! Nothing in this layer performs I/O.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Identity, roles, decisions, audit records, SLO definitions

pub mod audit;
pub mod decision;
pub mod engine_config;
pub mod events;
pub mod identity;
pub mod matrix;
pub mod policy_config;
pub mod redaction;
pub mod role;
pub mod slo;
