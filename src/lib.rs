//! # DAQ Writeout Library
//!
//! This crate implements the writeout stage of a simulated detector readout: a
//! time-windowed digit buffer that accumulates simulated signal contributions
//! into discrete time bins, runs the trigger/pre-trigger state machine deciding
//! which bins are recorded, and streams every completed readout window to a
//! persistence sink.
//!
//! ## Crate Structure
//!
//! - **`buffer`**: the `WriteoutBuffer` itself: future/past queues, deposits,
//!   time advance, window flush and end-of-run handling.
//! - **`ring`**: fixed-capacity circular queue backing both bin queues.
//! - **`timebin`**: the `TimeBin` type and bin-width arithmetic.
//! - **`digit`**: the `Contribution` trait and the labeled digit payload.
//! - **`record`**: time records (`InteractionRecord`) driving the clock.
//! - **`sink`**: the `WindowSink` contract and JSON-lines, CSV, in-memory and
//!   collapsing stream implementations.
//! - **`config`**: Figment-based configuration, including the trigger timing.
//! - **`error`**: the `WriteoutError` enum shared by every module.
//! - **`logging`**: tracing subscriber initialisation.
//! - **`replay`**: scripted driver used by the command-line tool.

pub mod buffer;
pub mod config;
pub mod digit;
pub mod error;
pub mod logging;
pub mod record;
pub mod replay;
pub mod ring;
pub mod sink;
pub mod timebin;

pub use buffer::{WriteoutBuffer, WriteoutStats};
pub use config::{ParameterSource, SimParams, WriteoutConfig};
pub use digit::{Contribution, Digit, LabeledDigit, McLabel};
pub use error::{WriteoutError, WriteoutResult};
pub use record::{InteractionRecord, TimeRecord};
pub use sink::{MemorySink, WindowSink, WindowView};
pub use timebin::{TimeBin, BIN_WIDTH};
