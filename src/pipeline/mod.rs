//! Pipeline stages for PDF → Drive → Sheets.
//!
//! Each submodule implements exactly one step, and the two remote stages
//! talk to their service through a trait so they can be tested with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ locate ──▶ render ──▶ extract ──▶ upload ──▶ sheet
//! (stage)   (lopdf)    (pdfium)   (PNGs)      (Drive)    (Sheets)
//! ```
//!
//! 1. [`input`]  : validate the submission and give it a private working directory
//! 2. [`locate`] : find every image XObject and where each page paints it
//! 3. [`render`] : rasterise placement boxes; blocking, run in `spawn_blocking`
//! 4. [`extract`]: pick render or raw bytes per image, write `image_<n>.png`
//! 5. [`upload`] : push the PNGs to Drive with bounded retries, share them
//! 6. [`sheet`]  : append the rows, resuming on HTTP 429

pub mod extract;
pub mod input;
pub mod locate;
pub mod render;
pub mod sheet;
pub mod upload;
