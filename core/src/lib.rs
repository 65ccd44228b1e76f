//! # Composable Fetch Core
//!
//! Core types for the Composable Fetch request engine.
//!
//! This crate provides the pure, I/O-free half of the engine: the observable
//! state, the state machine that drives it, the configuration a host supplies
//! and the transport contract the runtime calls through.
//!
//! ## Core Concepts
//!
//! - **State**: [`FetchState`], one per engine, published to the host on change
//! - **Transition**: Inputs to the state machine (`Cancel`, `Start`, `Settle`)
//! - **Reducer**: Pure function `(State, Transition) → (State, Effects)`
//! - **Config**: Request descriptor, result/error projectors, outcome callbacks
//! - **Transport**: The injected primitive that actually performs a request
//!
//! ## Example
//!
//! ```ignore
//! use composable_fetch_core::*;
//!
//! #[derive(Deserialize)]
//! struct Quote { symbol: String, price: f64 }
//!
//! #[derive(Deserialize)]
//! struct ApiError { message: String }
//!
//! let config = FetchConfig::<String, Quote, ApiError>::json(|symbol| {
//!     FetchRequest::get(format!("/quotes/{symbol}"))
//! });
//!
//! // Hand `config` and a `Transport` to `FetchEngine` in the runtime crate.
//! ```

pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod config;
pub mod error;
pub mod machine;
pub mod presets;
pub mod state;
pub mod transport;

pub use config::FetchConfig;
pub use error::FetchError;
pub use machine::{FetchEffect, FetchReducer, Transition};
pub use presets::{FilePart, FormData, FormValue};
pub use state::FetchState;
pub use transport::{
    Credentials, FetchRequest, FetchResponse, RequestBody, RequestInit, Transport, TransportFuture,
};

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all transition logic and are deterministic and testable.
/// The runtime owns the state and executes the returned effects.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The input this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Effect`: Descriptions of work for the runtime to perform
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// The effect descriptions this reducer emits
        type Effect;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// An action that is illegal in the current state leaves the state
        /// untouched and returns no effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Self::Effect; 2]>;
    }
}
