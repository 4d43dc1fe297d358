//! ICP: the per-server presentation layer.
//!
//! Each server presents at most one interrupt at a time. The state the guest sees is the
//! packed XIRR register (pending source number + current processor priority) and the MFRR
//! used to raise inter-processor interrupts.

use std::cell::Cell;
use std::rc::Rc;

/// XISR value meaning "no interrupt pending".
pub const XICS_IRQ_NONE: u32 = 0;
/// Source number presented for an inter-processor interrupt.
pub const XICS_IPI: u32 = 2;

pub const XISR_MASK: u32 = 0x00ff_ffff;
pub const CPPR_MASK: u32 = 0xff00_0000;

/// Priority value meaning "masked". Nothing is ever presented at this priority.
pub const PRIORITY_MASKED: u8 = 0xff;

/// Packed External Interrupt Request Register.
///
/// Bits 0..24 hold the XISR (source number), bits 24..32 the CPPR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xirr(u32);

impl Xirr {
    pub const fn new(xisr: u32, cppr: u8) -> Self {
        Self(((cppr as u32) << 24) | (xisr & XISR_MASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn xisr(self) -> u32 {
        self.0 & XISR_MASK
    }

    pub const fn cppr(self) -> u8 {
        ((self.0 & CPPR_MASK) >> 24) as u8
    }
}

/// The interrupt currently presented to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingIrq {
    pub irq: u32,
    pub priority: u8,
}

/// External-interrupt input of a virtual CPU, driven by its ICP server.
pub trait CpuIrqOutput {
    fn set_level(&mut self, level: bool);
}

impl<F> CpuIrqOutput for F
where
    F: FnMut(bool),
{
    fn set_level(&mut self, level: bool) {
        self(level);
    }
}

/// A cloneable level latch bridging an ICP output into a vCPU run loop.
///
/// The controller keeps one clone as its output; the vCPU keeps another and polls
/// [`CpuIrqLatch::is_asserted`] between instructions.
#[derive(Debug, Clone, Default)]
pub struct CpuIrqLatch {
    level: Rc<Cell<bool>>,
}

impl CpuIrqLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asserted(&self) -> bool {
        self.level.get()
    }
}

impl CpuIrqOutput for CpuIrqLatch {
    fn set_level(&mut self, level: bool) {
        self.level.set(level);
    }
}

/// Presentation state of one server.
pub struct IcpServer {
    cppr: u8,
    mfrr: u8,
    pending: Option<PendingIrq>,
    output: Box<dyn CpuIrqOutput>,
    output_asserted: bool,
}

impl std::fmt::Debug for IcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcpServer")
            .field("cppr", &self.cppr)
            .field("mfrr", &self.mfrr)
            .field("pending", &self.pending)
            .field("output_asserted", &self.output_asserted)
            .finish_non_exhaustive()
    }
}

impl IcpServer {
    pub(crate) fn new(output: Box<dyn CpuIrqOutput>) -> Self {
        let mut server = Self {
            cppr: 0,
            mfrr: PRIORITY_MASKED,
            pending: None,
            output,
            output_asserted: false,
        };
        server.reset();
        server
    }

    /// Power-on state. CPPR resets to 0, so nothing is presented until the guest opens the
    /// priority window with `H_CPPR`.
    pub(crate) fn reset(&mut self) {
        self.cppr = 0;
        self.mfrr = PRIORITY_MASKED;
        self.pending = None;
        self.lower();
    }

    pub fn cppr(&self) -> u8 {
        self.cppr
    }

    pub fn mfrr(&self) -> u8 {
        self.mfrr
    }

    pub fn pending(&self) -> Option<PendingIrq> {
        self.pending
    }

    pub fn xirr(&self) -> Xirr {
        let xisr = self.pending.map_or(XICS_IRQ_NONE, |p| p.irq);
        Xirr::new(xisr, self.cppr)
    }

    pub fn output_asserted(&self) -> bool {
        self.output_asserted
    }

    pub(crate) fn set_cppr(&mut self, cppr: u8) {
        self.cppr = cppr;
    }

    pub(crate) fn set_mfrr(&mut self, mfrr: u8) {
        self.mfrr = mfrr;
    }

    /// Whether `priority` would be refused by this server right now.
    pub(crate) fn refuses(&self, priority: u8) -> bool {
        priority >= self.cppr || self.pending.is_some_and(|p| p.priority <= priority)
    }

    /// Installs `next` as the presented interrupt and raises the output, returning the
    /// displaced interrupt (if any) for the caller to reject at its source.
    pub(crate) fn present(&mut self, next: PendingIrq) -> Option<PendingIrq> {
        let displaced = self.pending.replace(next);
        self.raise();
        displaced
    }

    /// Drops the presented interrupt and lowers the output.
    pub(crate) fn withdraw(&mut self) -> Option<PendingIrq> {
        let taken = self.pending.take();
        self.lower();
        taken
    }

    fn raise(&mut self) {
        self.output_asserted = true;
        self.output.set_level(true);
    }

    fn lower(&mut self) {
        self.output_asserted = false;
        self.output.set_level(false);
    }
}
