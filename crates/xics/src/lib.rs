#![forbid(unsafe_code)]

//! sPAPR "XICS" virtual interrupt controller.
//!
//! The controller is split the way PAPR splits it:
//! - [`ics`]: the interrupt source layer (per-source routing, priority and delivery status);
//! - [`icp`]: the presentation layer (one server per virtual CPU, XIRR/CPPR/MFRR);
//! - [`Xics`]: the delivery protocol that ties them together.
//!
//! Guests reach it through the [`hcall`] and [`rtas`] entry points; devices through
//! [`IrqLine`]s. The controller does no locking of its own and expects its owner to serialize
//! calls (see [`SharedXics`]).

pub mod config;
pub mod controller;
pub mod error;
pub mod hcall;
pub mod icp;
pub mod ics;
pub mod irq_line;
pub mod rtas;

pub use config::{XicsConfig, DEFAULT_IRQ_OFFSET};
pub use controller::{SharedXics, Xics};
pub use error::{Result, XicsError};
pub use hcall::{HcallError, XicsHcall};
pub use icp::{CpuIrqLatch, CpuIrqOutput, PendingIrq, Xirr, PRIORITY_MASKED, XICS_IPI};
pub use ics::{IrqStatus, TriggerMode};
pub use irq_line::{IrqLine, XicsIrqLine};
pub use rtas::RtasCall;
