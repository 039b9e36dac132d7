// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket workflow engine for the Parley relay.
//!
//! - [`Dispatcher`] turns inbound chat messages into tickets and enqueues them
//! - [`WorkerRegistry`] starts exactly one [`ConversationWorker`] per conversation
//! - [`ConversationWorker`] pops tickets in message-id order and runs the
//!   matching step of [`StepHandlers`]
//! - [`shutdown`] wires OS signals to a cancellation token
//!
//! ```text
//! Validate -> CollectContext -> SendAiRequest -> SendReply -> (deleted)
//! ```

pub mod dispatcher;
pub mod registry;
pub mod shutdown;
pub mod steps;
pub mod worker;

use std::sync::Arc;

use parley_core::{ChannelAdapter, ProviderAdapter, StorageAdapter};

pub use dispatcher::Dispatcher;
pub use registry::WorkerRegistry;
pub use steps::{AiDisposition, StepHandlers};
pub use worker::{ConversationWorker, StepOutcome, WorkerEvent};

/// The three external collaborators shared by every worker.
#[derive(Clone)]
pub struct Adapters {
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub provider: Arc<dyn ProviderAdapter + Send + Sync>,
    pub channel: Arc<dyn ChannelAdapter + Send + Sync>,
}
