// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without network access.
//!
//! # Components
//!
//! - [`MemoryStorage`] - In-process store with the SQLite pool semantics
//! - [`MockProvider`] - Mock AI provider with scripted replies and failures
//! - [`MockChannel`] - Mock chat channel with message injection and capture
//! - [`TestHarness`] - The real dispatcher and worker registry over the mocks

pub mod harness;
pub mod memory_storage;
pub mod mock_channel;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_storage::MemoryStorage;
pub use mock_channel::{EditedMessage, MockChannel, SentReply};
pub use mock_provider::MockProvider;
