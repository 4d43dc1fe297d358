//! RTAS services for source configuration: `ibm,set-xive`, `ibm,get-xive`, `ibm,int-off`
//! and `ibm,int-on`.

use tracing::debug;

use crate::controller::Xics;
use crate::error::{Result, XicsError};
use crate::icp::PRIORITY_MASKED;

pub const RTAS_SUCCESS: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtasCall {
    SetXive,
    GetXive,
    IntOff,
    IntOn,
}

impl RtasCall {
    pub const ALL: [RtasCall; 4] = [Self::SetXive, Self::GetXive, Self::IntOff, Self::IntOn];

    pub fn name(self) -> &'static str {
        match self {
            Self::SetXive => "ibm,set-xive",
            Self::GetXive => "ibm,get-xive",
            Self::IntOff => "ibm,int-off",
            Self::IntOn => "ibm,int-on",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|call| call.name() == name)
    }

    /// `(nargs, nret)` the guest must pass.
    fn arity(self) -> (usize, usize) {
        match self {
            Self::SetXive => (3, 1),
            Self::GetXive => (1, 3),
            Self::IntOff | Self::IntOn => (1, 1),
        }
    }
}

impl Xics {
    /// `ibm,set-xive`: route source `irq` to `server` at `priority`.
    pub fn set_xive(&mut self, irq: u64, server: u64, priority: u64) -> Result<()> {
        let irq = self.check_irq(irq)?;
        let server = self.check_server(server)?;
        let priority = Self::check_priority(priority)?;
        self.write_xive(irq, server, priority, priority);
        Ok(())
    }

    /// `ibm,get-xive`: returns `(server, priority)` of source `irq`.
    pub fn get_xive(&self, irq: u64) -> Result<(u32, u8)> {
        let irq = self.check_irq(irq)?;
        let state = self.ics().irq(irq);
        Ok((state.server, state.priority))
    }

    /// `ibm,int-off`: mask source `irq`, remembering its current priority.
    pub fn int_off(&mut self, irq: u64) -> Result<()> {
        let irq = self.check_irq(irq)?;
        let state = *self.ics().irq(irq);
        self.write_xive(irq, state.server, PRIORITY_MASKED, state.priority);
        Ok(())
    }

    /// `ibm,int-on`: unmask source `irq` at the priority saved by `ibm,int-off`.
    pub fn int_on(&mut self, irq: u64) -> Result<()> {
        let irq = self.check_irq(irq)?;
        let state = *self.ics().irq(irq);
        self.write_xive(irq, state.server, state.saved_priority, state.saved_priority);
        Ok(())
    }

    /// Runs an RTAS call with firmware argument/return arrays. `rets[0]` receives the
    /// status (`0` or `-3`); `ibm,get-xive` fills `rets[1..3]` with server and priority.
    ///
    /// A call with the wrong `nargs`/`nret` only gets a status when `rets` is non-empty.
    pub fn rtas(&mut self, call: RtasCall, args: &[u32], rets: &mut [u32]) {
        let status = match self.rtas_inner(call, args, rets) {
            Ok(()) => RTAS_SUCCESS,
            Err(err) => {
                debug!(call = call.name(), %err, "RTAS call failed");
                err.rtas_status()
            }
        };
        if let Some(ret0) = rets.first_mut() {
            *ret0 = status as u32;
        }
    }

    fn rtas_inner(&mut self, call: RtasCall, args: &[u32], rets: &mut [u32]) -> Result<()> {
        let (expected_args, expected_rets) = call.arity();
        if args.len() != expected_args || rets.len() != expected_rets {
            return Err(XicsError::BadArgCount {
                nargs: args.len(),
                nret: rets.len(),
                expected_args,
                expected_rets,
            });
        }

        let arg = |n: usize| u64::from(args[n]);
        match call {
            RtasCall::SetXive => self.set_xive(arg(0), arg(1), arg(2)),
            RtasCall::GetXive => {
                let (server, priority) = self.get_xive(arg(0))?;
                rets[1] = server;
                rets[2] = u32::from(priority);
                Ok(())
            }
            RtasCall::IntOff => self.int_off(arg(0)),
            RtasCall::IntOn => self.int_on(arg(0)),
        }
    }
}
