//! Treasury Engine Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the treasury agent
//! engine to run in both **Production** (tokio) and **Simulation** (virtual
//! clock) environments.
//!
//! # Core Concept
//!
//! Every source of non-determinism the engine touches is routed through
//! [`EngineContext`]:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task scheduling (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! By deriving all entropy from a single 64-bit seed, any decision sequence
//! becomes reproducible from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use treasury_env::EngineContext;
//!
//! async fn tick_loop<Ctx: EngineContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(5)).await;
//!         tick();
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::{EngineContext, mix_seed};
pub use types::{AgentId, RunId};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
