// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Decision Engine core
//!
//! Tenant, workspace and resource scoped authorization decisions with
//! structured, redacted audit emission and SLO burn-rate monitoring.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, use cases, adapters and HTTP surface of the engine

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
