//! ICS: the interrupt source layer.
//!
//! The source table never talks to a server directly. Operations that decide an interrupt
//! should be presented return an [`IcsDelivery`], and the controller routes it to the ICP.

use bitflags::bitflags;

use crate::icp::PRIORITY_MASKED;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerMode {
    /// Message-signalled (edge) source.
    #[default]
    Msi,
    /// Level-sensitive source.
    Lsi,
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct IrqStatus: u8 {
        /// LSI input is currently high.
        const ASSERTED = 1 << 0;
        /// LSI has been handed to a server and not yet EOI'd.
        const SENT = 1 << 1;
        /// A server refused the interrupt; retried by the resend sweep.
        const REJECTED = 1 << 2;
        /// MSI edge arrived while the source was masked.
        const MASKED_PENDING = 1 << 3;
    }
}

/// Per-source routing and status ("XIVE" plus delivery flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcsIrqState {
    pub server: u32,
    pub priority: u8,
    pub saved_priority: u8,
    pub status: IrqStatus,
    pub trigger: TriggerMode,
}

impl IcsIrqState {
    fn new(trigger: TriggerMode) -> Self {
        Self {
            server: 0,
            priority: PRIORITY_MASKED,
            saved_priority: PRIORITY_MASKED,
            status: IrqStatus::empty(),
            trigger,
        }
    }

    pub fn is_masked(&self) -> bool {
        self.priority == PRIORITY_MASKED
    }

    pub fn is_lsi(&self) -> bool {
        self.trigger == TriggerMode::Lsi
    }
}

/// A request to present `irq` at `priority` on `server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcsDelivery {
    pub server: u32,
    pub irq: u32,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct Ics {
    offset: u32,
    irqs: Vec<IcsIrqState>,
}

impl Ics {
    pub fn new(offset: u32, nr_irqs: u32) -> Self {
        Self {
            offset,
            irqs: vec![IcsIrqState::new(TriggerMode::Msi); nr_irqs as usize],
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn nr_irqs(&self) -> u32 {
        self.irqs.len() as u32
    }

    pub fn is_valid_irq(&self, nr: u64) -> bool {
        nr >= u64::from(self.offset) && nr < u64::from(self.offset) + self.irqs.len() as u64
    }

    pub fn irq(&self, nr: u32) -> &IcsIrqState {
        &self.irqs[self.srcno(nr)]
    }

    /// Resets routing and status of every source. Trigger modes are board wiring and
    /// survive reset.
    pub fn reset(&mut self) {
        for irq in &mut self.irqs {
            *irq = IcsIrqState::new(irq.trigger);
        }
    }

    pub fn set_irq_type(&mut self, nr: u32, trigger: TriggerMode) {
        let srcno = self.srcno(nr);
        self.irqs[srcno].trigger = trigger;
    }

    /// Input level change on source `nr`.
    pub fn set_irq(&mut self, nr: u32, level: bool) -> Option<IcsDelivery> {
        let srcno = self.srcno(nr);
        if self.irqs[srcno].is_lsi() {
            self.set_irq_lsi(srcno, level)
        } else {
            self.set_irq_msi(srcno, level)
        }
    }

    fn set_irq_msi(&mut self, srcno: usize, level: bool) -> Option<IcsDelivery> {
        if !level {
            return None;
        }
        let irq = &mut self.irqs[srcno];
        if irq.is_masked() {
            irq.status.insert(IrqStatus::MASKED_PENDING);
            return None;
        }
        Some(self.delivery(srcno))
    }

    fn set_irq_lsi(&mut self, srcno: usize, level: bool) -> Option<IcsDelivery> {
        self.irqs[srcno].status.set(IrqStatus::ASSERTED, level);
        self.resend_lsi(srcno)
    }

    /// Writes the XIVE of source `nr` and returns a delivery if the new routing makes a
    /// deferred interrupt presentable.
    pub fn write_xive(
        &mut self,
        nr: u32,
        server: u32,
        priority: u8,
        saved_priority: u8,
    ) -> Option<IcsDelivery> {
        let srcno = self.srcno(nr);
        let irq = &mut self.irqs[srcno];
        irq.server = server;
        irq.priority = priority;
        irq.saved_priority = saved_priority;

        if irq.is_lsi() {
            return self.resend_lsi(srcno);
        }

        // A deferred edge or an outstanding refusal fires once the source is unmasked.
        let deferred = IrqStatus::MASKED_PENDING | IrqStatus::REJECTED;
        if irq.is_masked() || !irq.status.intersects(deferred) {
            return None;
        }
        irq.status.remove(deferred);
        Some(self.delivery(srcno))
    }

    /// Marks source `nr` as refused by its server.
    pub fn reject(&mut self, nr: u32) {
        let srcno = self.srcno(nr);
        let status = &mut self.irqs[srcno].status;
        // REJECTED only matters for MSIs and SENT only for LSIs; setting both keeps this
        // independent of the trigger mode.
        status.insert(IrqStatus::REJECTED);
        status.remove(IrqStatus::SENT);
    }

    /// Re-evaluates one source for the resend sweep.
    pub fn resend(&mut self, srcno: usize) -> Option<IcsDelivery> {
        if self.irqs[srcno].is_lsi() {
            self.resend_lsi(srcno)
        } else {
            self.resend_msi(srcno)
        }
    }

    fn resend_msi(&mut self, srcno: usize) -> Option<IcsDelivery> {
        let irq = &mut self.irqs[srcno];
        // A masked source keeps its refusal until it is unmasked.
        if !irq.status.contains(IrqStatus::REJECTED) || irq.is_masked() {
            return None;
        }
        irq.status.remove(IrqStatus::REJECTED);
        Some(self.delivery(srcno))
    }

    fn resend_lsi(&mut self, srcno: usize) -> Option<IcsDelivery> {
        let irq = &mut self.irqs[srcno];
        if irq.is_masked()
            || !irq.status.contains(IrqStatus::ASSERTED)
            || irq.status.contains(IrqStatus::SENT)
        {
            return None;
        }
        irq.status.insert(IrqStatus::SENT);
        Some(self.delivery(srcno))
    }

    /// End-of-interrupt for source `nr`. Only LSIs track an outstanding presentation.
    pub fn eoi(&mut self, nr: u32) {
        let srcno = self.srcno(nr);
        let irq = &mut self.irqs[srcno];
        if irq.is_lsi() {
            irq.status.remove(IrqStatus::SENT);
        }
    }

    fn delivery(&self, srcno: usize) -> IcsDelivery {
        let irq = &self.irqs[srcno];
        IcsDelivery {
            server: irq.server,
            irq: self.offset + srcno as u32,
            priority: irq.priority,
        }
    }

    fn srcno(&self, nr: u32) -> usize {
        assert!(
            self.is_valid_irq(u64::from(nr)),
            "irq {nr} is not an ICS source (offset={}, nr_irqs={})",
            self.offset,
            self.irqs.len()
        );
        (nr - self.offset) as usize
    }
}
