//! Space submission and review workflow.
//!
//! ## Overview
//!
//! Venue owners register spaces; admins claim them, review them and either
//! verify, reject or send them back with field-level issues. Owners answer
//! issues by editing the flagged fields, which resolves them. Every admin
//! decision is kept as an immutable review record.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, Principal)        │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         v                                        │
//!                       │  orchestrator.rs  (ReviewService)                │
//!                       │    │  per-space lock (locks.rs)                  │
//!                       │    │  one transaction per operation:             │
//!                       │    ├─ state_machine.rs  (pure transitions)       │
//!                       │    ├─ records.rs        (append-only decisions)  │
//!                       │    ├─ ledger.rs         (open issue per field)   │
//!                       │    └─ reconciler.rs     (edits resolve issues)   │
//!                       │         │                                        │
//!                       │         │ after commit                           │
//!                       │         v                                        │
//!                       │  notify.rs  (Notifier) ──> ws.rs (fan-out)       │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                           |
//! |----------|----------------------------------------------------------|
//! | `fields` | Closed `FieldKey` set and the `SpaceFields` bag          |
//! | `models` | `Space`, `ReviewRecord`, `Issue`, `Principal`, requests  |
//! | `db`     | SQLite schema, `DbHandle`, space rows                    |
//!
//! ## Typical Request Flow (request changes)
//!
//! 1. `POST /api/spaces/{id}/reviews` → `ReviewService::submit_review()`
//! 2. The payload is validated without touching storage.
//! 3. The space lock is taken; inside one transaction the state machine
//!    checks the status, the record is appended, each issue is raised
//!    through the ledger and the status is written back. A duplicate
//!    field rolls everything back.
//! 4. A `ReviewSubmitted` event is queued for the notifier and reaches
//!    `/ws` subscribers once delivered.

pub mod api;
pub mod db;
pub mod fields;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod reconciler;
pub mod records;
pub mod server;
pub mod state_machine;
pub mod ws;

pub use orchestrator::ReviewService;
