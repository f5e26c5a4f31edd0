//! fragpatch - format-aware mutation engine for editable document fragments
//!
//! Lets an editor change small human-visible fragments (text, links, images,
//! attributes) embedded in structured source documents without corrupting
//! the surrounding syntax and without losing the ability to undo. Documents
//! are located by loose references (content hints, selectors, identifiers,
//! line numbers); a stale reference is a safe no-op, never a guess.
//!
//! # Example
//!
//! ```ignore
//! use fragpatch::config::EngineConfig;
//! use fragpatch::engine::{MutationEngine, UpdateOptions};
//!
//! let config = EngineConfig::load(None)?;
//! let engine = MutationEngine::new(&config)?;
//!
//! let result = engine.update_content(
//!     "pages/home.blade.php".as_ref(),
//!     "Welcome to our site",
//!     "Welcome back",
//!     &UpdateOptions::default(),
//! )?;
//! assert!(result.success);
//! ```

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod locator;
pub mod lock;
pub mod logging;
pub mod policy;
pub mod strategy;

pub use engine::{MutationEngine, MutationRequest, MutationResult, UpdateOptions};
pub use error::EngineError;
pub use locator::ElementReference;
