//! Administrative request channel.
//!
//! Callers talk to the cache through an [`AdminHandle`]. Each request travels
//! to the [`AdminWorker`] as an envelope carrying its own reply channel and is
//! served on a dedicated task, so a long bulk download never holds up a
//! status query.
//!
//! ```text
//! ┌──────────────┐   AdminEnvelope    ┌─────────────┐
//! │ POST /admin  │──┐  (mpsc)         │             │──► task: CACHE_STATUS
//! └──────────────┘  ├───────────────► │ AdminWorker │──► task: CLEAR_CACHE
//! ┌──────────────┐  │                 │             │──► task: BULK_DOWNLOAD
//! │ AdminHandle  │──┘                 └─────────────┘
//! └──────────────┘        ◄──── AdminReply (oneshot) ────┘
//! ```

mod protocol;
mod worker;

pub use protocol::{AdminMessage, AdminReply, AdminRequest, BulkDownload};
pub use worker::{AdminEnvelope, AdminHandle, AdminWorker, DEFAULT_ADMIN_QUEUE};
