//! SkyCopilot - AI autopilot core for general-aviation flight simulators
//!
//! This library implements the closed-loop controller behind the copilot:
//! a flight-phase classifier, a per-phase rule engine with PD feedback and
//! envelope protection, a ground ATC controller gating takeoff on a taxi
//! route, and a rate-limited command queue dispatching to the simulator
//! bridge.
//!
//! # Architecture
//!
//! ```text
//! Telemetry ──► Classifier ──► (Phase, ATC state) ──► RuleEngine
//!                                                          │
//!                                                      Commands
//!                                                          ▼
//!                             Bridge ◄── CommandQueue (clamp/dedup/rate)
//! ```
//!
//! A single driver advances the whole pipeline once per telemetry tick via
//! [`supervisor::Supervisor::tick`]; the asynchronous collaborators (taxi
//! planner, LLM advisory) merge their completions back into that
//! single-threaded context.

pub mod advisory;
pub mod atc;
pub mod command;
pub mod config;
pub mod envelope;
pub mod engine;
pub mod geo;
pub mod log;
pub mod phase;
pub mod profile;
pub mod supervisor;
pub mod telemetry;
pub mod terrain;
pub mod wind;

pub use supervisor::{CopilotStatus, Supervisor, SupervisorConfig};
