//! # Curriculum Content
//!
//! An HTTP service that serves curriculum concepts, organised by grade, term,
//! and subject, from a Google Cloud Storage bucket, degrading to bundled
//! JSON files when the bucket cannot answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌───────────────┐
//! │   HTTP   │──▶│  CurriculumResolver  │──▶│  ObjectStore  │  GCS / memory
//! │  (axum)  │   │  keys, parse, search │   └───────────────┘
//! └──────────┘   └──────────┬───────────┘
//! ┌──────────┐              │ on failure
//! │   CLI    │──────────────┤
//! │ (clap)   │              ▼
//! └──────────┘   ┌──────────────────────┐
//!                │  FallbackLibrary     │  data/fallback/{GRADE}.json
//!                └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! curriculum map-grade 5                 # P5
//! curriculum grades
//! curriculum concepts 5 Term1 Mathematics
//! curriculum search "fraction" --grade 5
//! curriculum serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`grade`] | Grade/term codes and the informal-grade mapper |
//! | [`models`] | Concept and response types |
//! | [`storage`] | Object-store trait, GCS and in-memory backends |
//! | [`credentials`] | OAuth2 bearer tokens for GCS |
//! | [`fallback`] | Bundled fallback files |
//! | [`curriculum`] | Storage-first resolution with fallback |
//! | [`search`] | Substring concept search |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod credentials;
pub mod curriculum;
pub mod error;
pub mod fallback;
pub mod grade;
pub mod models;
pub mod search;
pub mod server;
pub mod storage;
