//! The XICS controller: ICP servers and the ICS wired together by the delivery protocol.
//!
//! Presentation is O(1) per server: a server holds at most one interrupt, and anything it
//! refuses or displaces is marked rejected at its source. Nothing is lost as long as every
//! transition that can make a refused source presentable again runs the resend sweep
//! (EOI, raising CPPR, unmasking a source).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::XicsConfig;
use crate::error::{Result, XicsError};
use crate::icp::{
    CpuIrqLatch, CpuIrqOutput, IcpServer, PendingIrq, Xirr, XICS_IPI, XICS_IRQ_NONE,
};
use crate::ics::{Ics, IcsDelivery, TriggerMode};

/// Shared handle used by device IRQ lines and the vCPU glue.
///
/// The emulator runs device callbacks and hypercalls on one thread, so `RefCell` is enough to
/// serialize access.
pub type SharedXics = Rc<RefCell<Xics>>;

pub struct Xics {
    servers: Vec<IcpServer>,
    ics: Ics,
}

impl std::fmt::Debug for Xics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xics")
            .field("servers", &self.servers.len())
            .field("irq_offset", &self.ics.offset())
            .field("nr_irqs", &self.ics.nr_irqs())
            .finish_non_exhaustive()
    }
}

impl Xics {
    /// Builds a controller in its power-on state. `outputs[n]` is the external-interrupt
    /// input of the CPU served by server `n`.
    pub fn new(config: &XicsConfig, outputs: Vec<Box<dyn CpuIrqOutput>>) -> Result<Self> {
        config.validate()?;
        if outputs.len() != config.nr_servers as usize {
            return Err(XicsError::OutputCountMismatch {
                outputs: outputs.len(),
                nr_servers: config.nr_servers,
            });
        }

        let servers = outputs.into_iter().map(IcpServer::new).collect();
        let mut ics = Ics::new(config.irq_offset, config.nr_irqs);
        for &irq in &config.lsi_irqs {
            ics.set_irq_type(irq, TriggerMode::Lsi);
        }

        Ok(Self { servers, ics })
    }

    /// Builds a controller whose CPU outputs are [`CpuIrqLatch`]es, returning the vCPU side
    /// of each latch indexed by server.
    pub fn with_latches(config: &XicsConfig) -> Result<(Self, Vec<CpuIrqLatch>)> {
        let latches: Vec<CpuIrqLatch> = (0..config.nr_servers)
            .map(|_| CpuIrqLatch::new())
            .collect();
        let outputs = latches
            .iter()
            .cloned()
            .map(|latch| Box::new(latch) as Box<dyn CpuIrqOutput>)
            .collect();
        let xics = Self::new(config, outputs)?;
        Ok((xics, latches))
    }

    pub fn into_shared(self) -> SharedXics {
        Rc::new(RefCell::new(self))
    }

    pub fn nr_servers(&self) -> u32 {
        self.servers.len() as u32
    }

    pub fn ics(&self) -> &Ics {
        &self.ics
    }

    pub fn server(&self, server: u32) -> &IcpServer {
        assert!(
            (server as usize) < self.servers.len(),
            "server {server} out of range (nr_servers={})",
            self.servers.len()
        );
        &self.servers[server as usize]
    }

    fn server_mut(&mut self, server: u32) -> &mut IcpServer {
        assert!(
            (server as usize) < self.servers.len(),
            "server {server} out of range (nr_servers={})",
            self.servers.len()
        );
        &mut self.servers[server as usize]
    }

    /// Board wiring: selects the trigger mode of source `irq`.
    pub fn set_irq_type(&mut self, irq: u32, trigger: TriggerMode) {
        self.ics.set_irq_type(irq, trigger);
    }

    /// Machine reset. Servers go back to CPPR 0 / MFRR 0xff with their outputs lowered; all
    /// sources are masked and routed to server 0.
    pub fn reset(&mut self) {
        debug!(
            servers = self.servers.len(),
            irqs = self.ics.nr_irqs(),
            "xics reset"
        );
        for ss in &mut self.servers {
            ss.reset();
        }
        self.ics.reset();
    }

    // ICP

    /// Presents `irq` at `priority` on `server`, or rejects it at its source.
    ///
    /// Ties favour the interrupt already pending.
    pub fn deliver(&mut self, server: u32, irq: u32, priority: u8) {
        let ss = self.server_mut(server);
        if ss.refuses(priority) {
            trace!(server, irq, priority, cppr = ss.cppr(), "xics: refused");
            self.reject_source(irq);
            return;
        }

        trace!(server, irq, priority, "xics: presented");
        if let Some(displaced) = ss.present(PendingIrq { irq, priority }) {
            trace!(server, irq = displaced.irq, "xics: displaced");
            self.reject_source(displaced.irq);
        }
    }

    /// Guest read of XIRR (`H_XIRR`). Returns the register as it was before the read; the
    /// presented interrupt (if any) becomes in-service and its priority the new CPPR.
    pub fn accept(&mut self, server: u32) -> Xirr {
        let ss = self.server_mut(server);
        let xirr = ss.xirr();
        if let Some(accepted) = ss.withdraw() {
            ss.set_cppr(accepted.priority);
        }
        trace!(server, xirr = xirr.raw(), "xics: accept");
        xirr
    }

    /// Guest write of XIRR (`H_EOI`): restores the CPPR from the top byte and completes the
    /// source in the low 24 bits.
    pub fn eoi(&mut self, server: u32, xirr: Xirr) {
        self.server_mut(server).set_cppr(xirr.cppr());

        let nr = xirr.xisr();
        if self.ics.is_valid_irq(u64::from(nr)) {
            self.ics.eoi(nr);
        } else if nr != XICS_IPI && nr != XICS_IRQ_NONE {
            debug!(server, irq = nr, "xics: EOI for unknown source ignored");
        }
        trace!(server, xirr = xirr.raw(), "xics: eoi");

        if self.server(server).pending().is_none() {
            self.icp_resend(server);
        }
    }

    /// Guest write of CPPR (`H_CPPR`).
    pub fn set_cppr(&mut self, server: u32, cppr: u8) {
        let ss = self.server_mut(server);
        let old_cppr = ss.cppr();
        ss.set_cppr(cppr);

        if cppr < old_cppr {
            if let Some(pending) = ss.pending() {
                if cppr <= pending.priority {
                    ss.withdraw();
                    trace!(server, irq = pending.irq, cppr, "xics: masked by CPPR");
                    self.reject_source(pending.irq);
                }
            }
        } else if ss.pending().is_none() {
            self.icp_resend(server);
        }
    }

    /// Guest write of MFRR (`H_IPI`).
    pub fn set_mfrr(&mut self, server: u32, mfrr: u8) {
        let ss = self.server_mut(server);
        ss.set_mfrr(mfrr);
        if mfrr < ss.cppr() {
            self.check_ipi(server);
        }
    }

    fn check_ipi(&mut self, server: u32) {
        let ss = self.server_mut(server);
        let mfrr = ss.mfrr();
        if ss.pending().is_some_and(|p| p.priority <= mfrr) {
            return;
        }

        trace!(server, mfrr, "xics: IPI presented");
        if let Some(displaced) = ss.present(PendingIrq {
            irq: XICS_IPI,
            priority: mfrr,
        }) {
            self.reject_source(displaced.irq);
        }
    }

    fn icp_resend(&mut self, server: u32) {
        let ss = self.server(server);
        if ss.mfrr() < ss.cppr() {
            self.check_ipi(server);
        }
        self.resend();
    }

    /// The IPI is regenerated from MFRR on resend, so it has no source state to update.
    fn reject_source(&mut self, irq: u32) {
        if irq != XICS_IPI {
            self.ics.reject(irq);
        }
    }

    // ICS

    /// Input level change on source `irq`. MSIs act on the rising edge only.
    pub fn set_irq(&mut self, irq: u32, level: bool) {
        let delivery = self.ics.set_irq(irq, level);
        self.dispatch(delivery);
    }

    /// Writes routing and priority of source `irq` (the XIVE).
    pub fn write_xive(&mut self, irq: u32, server: u32, priority: u8, saved_priority: u8) {
        trace!(irq, server, priority, saved_priority, "xics: write xive");
        let delivery = self.ics.write_xive(irq, server, priority, saved_priority);
        self.dispatch(delivery);
    }

    /// Resend sweep over every source.
    ///
    /// Sources are not filtered by server: a refusal on one server may have been caused by
    /// state that changed on another.
    pub fn resend(&mut self) {
        for srcno in 0..self.ics.nr_irqs() as usize {
            let delivery = self.ics.resend(srcno);
            self.dispatch(delivery);
        }
    }

    fn dispatch(&mut self, delivery: Option<IcsDelivery>) {
        if let Some(IcsDelivery {
            server,
            irq,
            priority,
        }) = delivery
        {
            self.deliver(server, irq, priority);
        }
    }

    // Guest argument validation. Runs before any state is touched.

    pub(crate) fn check_server(&self, server: u64) -> Result<u32> {
        match u32::try_from(server) {
            Ok(s) if s < self.nr_servers() => Ok(s),
            _ => Err(XicsError::InvalidServer {
                server,
                nr_servers: self.nr_servers(),
            }),
        }
    }

    pub(crate) fn check_irq(&self, irq: u64) -> Result<u32> {
        if self.ics.is_valid_irq(irq) {
            // In range implies it fits in u32.
            Ok(irq as u32)
        } else {
            Err(XicsError::InvalidIrq {
                irq,
                first: self.ics.offset(),
                end: self.ics.offset() + self.ics.nr_irqs(),
            })
        }
    }

    pub(crate) fn check_priority(priority: u64) -> Result<u8> {
        u8::try_from(priority).map_err(|_| XicsError::InvalidPriority(priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::PRIORITY_MASKED;

    fn xics(nr_servers: u32) -> (Xics, Vec<CpuIrqLatch>) {
        Xics::with_latches(&XicsConfig::new(nr_servers, 8)).unwrap()
    }

    #[test]
    fn output_count_must_match_servers() {
        let err = Xics::new(&XicsConfig::new(2, 8), Vec::new()).unwrap_err();
        assert_eq!(
            err,
            XicsError::OutputCountMismatch {
                outputs: 0,
                nr_servers: 2
            }
        );
    }

    #[test]
    fn ipi_is_presented_when_mfrr_beats_cppr() {
        let (mut xics, latches) = xics(2);
        xics.set_cppr(1, 0xff);

        xics.set_mfrr(1, 4);
        assert!(latches[1].is_asserted());
        assert!(!latches[0].is_asserted());
        assert_eq!(xics.accept(1), Xirr::new(XICS_IPI, 0xff));
        assert_eq!(xics.server(1).cppr(), 4);

        // Clearing MFRR before EOI keeps the IPI from coming back.
        xics.set_mfrr(1, PRIORITY_MASKED);
        xics.eoi(1, Xirr::new(XICS_IPI, 0xff));
        assert_eq!(xics.server(1).pending(), None);
        assert!(!latches[1].is_asserted());
    }

    #[test]
    fn ipi_is_regenerated_after_rejection() {
        let (mut xics, latches) = xics(1);
        xics.set_cppr(0, 0xff);
        xics.set_mfrr(0, 6);
        assert_eq!(
            xics.server(0).pending(),
            Some(PendingIrq {
                irq: XICS_IPI,
                priority: 6
            })
        );

        // Masking the IPI through CPPR withdraws it without touching any source.
        xics.set_cppr(0, 6);
        assert_eq!(xics.server(0).pending(), None);
        assert!(!latches[0].is_asserted());

        xics.set_cppr(0, 7);
        assert_eq!(xics.server(0).xirr(), Xirr::new(XICS_IPI, 7));
        assert!(latches[0].is_asserted());
    }

    #[test]
    fn ipi_displaces_less_favoured_source() {
        let (mut xics, _latches) = xics(1);
        xics.set_cppr(0, 0xff);
        xics.write_xive(16, 0, 9, 9);
        xics.set_irq(16, true);
        assert_eq!(xics.server(0).xirr().xisr(), 16);

        xics.set_mfrr(0, 3);
        assert_eq!(xics.server(0).xirr().xisr(), XICS_IPI);
        assert!(xics
            .ics()
            .irq(16)
            .status
            .contains(crate::ics::IrqStatus::REJECTED));
    }

    #[test]
    fn accept_with_nothing_pending_keeps_cppr() {
        let (mut xics, latches) = xics(1);
        xics.set_cppr(0, 0x80);
        assert_eq!(xics.accept(0), Xirr::new(XICS_IRQ_NONE, 0x80));
        assert_eq!(xics.server(0).cppr(), 0x80);
        assert!(!latches[0].is_asserted());
    }

    #[test]
    fn check_helpers_reject_out_of_range_arguments() {
        let (xics, _latches) = xics(2);
        assert_eq!(xics.check_server(1), Ok(1));
        assert!(xics.check_server(2).is_err());
        assert!(xics.check_server(u64::MAX).is_err());
        assert_eq!(xics.check_irq(23), Ok(23));
        assert!(xics.check_irq(24).is_err());
        assert!(xics.check_irq(XICS_IPI.into()).is_err());
        assert_eq!(Xics::check_priority(0xff), Ok(0xff));
        assert_eq!(
            Xics::check_priority(0x100),
            Err(XicsError::InvalidPriority(0x100))
        );
    }
}
