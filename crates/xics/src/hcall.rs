//! PAPR hypercalls served by the XICS: `H_CPPR`, `H_IPI`, `H_XIRR` and `H_EOI`.
//!
//! Arguments arrive as raw machine words. Priorities are truncated to their low byte the
//! same way the hardware registers would; the only argument that can fail validation is the
//! target server of `H_IPI`.

use tracing::debug;

use crate::controller::Xics;
use crate::icp::Xirr;

pub const H_EOI: u64 = 0x64;
pub const H_CPPR: u64 = 0x68;
pub const H_IPI: u64 = 0x6c;
pub const H_XIRR: u64 = 0x74;

pub const H_SUCCESS: i64 = 0;
pub const H_PARAMETER: i64 = -4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XicsHcall {
    Cppr { cppr: u64 },
    Ipi { server: u64, mfrr: u64 },
    Xirr,
    Eoi { xirr: u64 },
}

impl XicsHcall {
    pub fn opcode(&self) -> u64 {
        match self {
            Self::Cppr { .. } => H_CPPR,
            Self::Ipi { .. } => H_IPI,
            Self::Xirr => H_XIRR,
            Self::Eoi { .. } => H_EOI,
        }
    }

    /// Decodes a hypercall from its opcode and argument registers. Returns `None` for
    /// opcodes the XICS does not serve.
    pub fn decode(opcode: u64, args: &[u64]) -> Option<Self> {
        let arg = |n: usize| args.get(n).copied().unwrap_or(0);
        match opcode {
            H_CPPR => Some(Self::Cppr { cppr: arg(0) }),
            H_IPI => Some(Self::Ipi {
                server: arg(0),
                mfrr: arg(1),
            }),
            H_XIRR => Some(Self::Xirr),
            H_EOI => Some(Self::Eoi { xirr: arg(0) }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HcallError {
    #[error("invalid hypercall parameter")]
    Parameter,
}

impl HcallError {
    pub fn status(self) -> i64 {
        match self {
            Self::Parameter => H_PARAMETER,
        }
    }
}

impl Xics {
    /// Executes `call` on behalf of the CPU served by `cpu`.
    ///
    /// On success returns the value for the first return register (the XIRR for `H_XIRR`,
    /// otherwise 0); the status itself is `H_SUCCESS`.
    pub fn hcall(&mut self, cpu: u32, call: XicsHcall) -> Result<u64, HcallError> {
        match call {
            XicsHcall::Cppr { cppr } => {
                self.set_cppr(cpu, cppr as u8);
                Ok(0)
            }
            XicsHcall::Ipi { server, mfrr } => {
                let server = self.check_server(server).map_err(|err| {
                    debug!(cpu, %err, "H_IPI rejected");
                    HcallError::Parameter
                })?;
                self.set_mfrr(server, mfrr as u8);
                Ok(0)
            }
            XicsHcall::Xirr => Ok(u64::from(self.accept(cpu).raw())),
            XicsHcall::Eoi { xirr } => {
                self.eoi(cpu, Xirr::from_raw(xirr as u32));
                Ok(0)
            }
        }
    }
}
