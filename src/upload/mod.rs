//! Chunked Upload Module
//!
//! Collects files uploaded in chunks under a client-chosen session ID:
//! - Chunks may arrive in any order; slot index decides byte position
//! - Every file in a session is published together in one commit
//!
//! Protocol Flow:
//! 1. Client posts each chunk with session, file, index and total
//! 2. Server stores the chunk in the file's slot for that index
//! 3. Client requests a commit for the session
//! 4. Server assembles every file and publishes them as one commit

pub mod assembler;
pub mod session;
pub mod types;

pub use assembler::{assemble, encode_base64};
pub use session::{SessionGuard, SessionHandle, SessionStore};
pub use types::*;
