//! # VC Test Utilities
//!
//! Shared test utilities for the voice chat service.
//!
//! This crate provides:
//! - Server test harness (`TestVcServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestVcServer::spawn(RealtimeMode::Mock).await?;
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/sessions", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
