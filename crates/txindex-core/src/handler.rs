//! Observer traits + registry.
//!
//! Handlers never influence what gets indexed: the engine commits first and
//! notifies afterwards. A failing block handler is reported to the error
//! handlers and otherwise ignored.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::IndexerError;
use crate::meta::BlockMeta;
use crate::types::Block;

/// What happened to a block's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAction {
    /// The block's records were committed and the tip advanced to it.
    Indexed,
    /// The block's records were removed and the tip moved to its parent.
    Unindexed,
}

/// Receives every error the engine observes, fatal or not.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn on_error(&self, err: &IndexerError);
}

/// Called after each committed block transition.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn on_block(
        &self,
        action: BlockAction,
        meta: &BlockMeta,
        block: &Block,
    ) -> Result<(), IndexerError>;
}

/// Called when the chain source reset and the engine rolled back to `tip`.
#[async_trait]
pub trait ResetHandler: Send + Sync {
    async fn on_reset(&self, tip: &BlockMeta);
}

/// Registry of error + block + reset handlers.
pub struct HandlerRegistry {
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    block_handlers: Vec<Arc<dyn BlockHandler>>,
    reset_handlers: Vec<Arc<dyn ResetHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            error_handlers: vec![],
            block_handlers: vec![],
            reset_handlers: vec![],
        }
    }

    pub fn on_error(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.error_handlers.push(handler);
    }

    pub fn on_block(&mut self, handler: Arc<dyn BlockHandler>) {
        self.block_handlers.push(handler);
    }

    pub fn on_reset(&mut self, handler: Arc<dyn ResetHandler>) {
        self.reset_handlers.push(handler);
    }

    pub async fn dispatch_error(&self, err: &IndexerError) {
        for handler in &self.error_handlers {
            handler.on_error(err).await;
        }
    }

    /// Dispatch to every block handler; stops at the first failure.
    pub async fn dispatch_block(
        &self,
        action: BlockAction,
        meta: &BlockMeta,
        block: &Block,
    ) -> Result<(), IndexerError> {
        for handler in &self.block_handlers {
            handler.on_block(action, meta, block).await?;
        }
        Ok(())
    }

    pub async fn dispatch_reset(&self, tip: &BlockMeta) {
        for handler in &self.reset_handlers {
            handler.on_reset(tip).await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.error_handlers.is_empty()
            && self.block_handlers.is_empty()
            && self.reset_handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
