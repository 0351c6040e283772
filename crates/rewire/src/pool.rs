// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine pooling.
//!
//! Throughput under concurrency comes from checking out whole engine
//! instances - each with its own registry and caches - rather than sharing
//! one mutable session. The pool is a fixed-capacity lock-free queue;
//! checkout on an empty pool builds a fresh engine, and an engine returned
//! to a full pool is simply dropped.

use crate::engine::Engine;
use crossbeam::queue::ArrayQueue;
use std::ops::Deref;

pub struct EnginePool {
    queue: ArrayQueue<Engine>,
    factory: Box<dyn Fn() -> Engine + Send + Sync>,
}

impl EnginePool {
    /// Pool holding up to `capacity` idle engines, built by `factory`.
    /// The factory typically performs the shared registrations so checked
    /// out engines are warm.
    pub fn new(capacity: usize, factory: impl Fn() -> Engine + Send + Sync + 'static) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            factory: Box::new(factory),
        }
    }

    /// Check out an engine; it returns to the pool when the guard drops.
    /// No session state crosses pool boundaries - sessions live and die
    /// inside single serialize/deserialize calls.
    pub fn checkout(&self) -> PooledEngine<'_> {
        let engine = self.queue.pop().unwrap_or_else(|| {
            log::debug!("[pool] empty, building a fresh engine");
            (self.factory)()
        });
        PooledEngine {
            pool: self,
            engine: Some(engine),
        }
    }

    /// Idle engines currently parked in the pool.
    pub fn idle(&self) -> usize {
        self.queue.len()
    }
}

/// Checkout guard; derefs to [`Engine`] and returns it on drop.
pub struct PooledEngine<'a> {
    pool: &'a EnginePool,
    engine: Option<Engine>,
}

impl Deref for PooledEngine<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        // Present from checkout until drop.
        self.engine.as_ref().expect("engine taken")
    }
}

impl Drop for PooledEngine<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            // A full pool drops the surplus engine.
            let _ = self.pool.queue.push(engine);
        }
    }
}
