// src/link/mod.rs

//! The Orchestrator link.
//!
//! - [`frame`]: marker byte + length prefix framing with resynchronisation.
//! - [`message`]: the request and signal payloads.
//! - [`session`]: the per-connection receive loop and the serialized send
//!   path shared by every worker.
//! - [`server`]: TCP / Unix socket accept loop.

pub mod frame;
pub mod message;
pub mod server;
pub mod session;

pub use frame::{FRAME_MARKER, FrameError, read_frame, write_frame};
pub use message::{Credentials, ParameterAssignment, Request, Signal, decode, encode};
pub use server::{Listener, serve};
pub use session::{BoxedWriter, OrchestratorLink, SessionHandle, serve_connection};
