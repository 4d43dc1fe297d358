use serde::{Deserialize, Serialize};

use crate::error::{Result, XicsError};
use crate::icp::{XICS_IPI, XISR_MASK};

/// First ICS source number used by sPAPR machines.
pub const DEFAULT_IRQ_OFFSET: u32 = 16;

fn default_irq_offset() -> u32 {
    DEFAULT_IRQ_OFFSET
}

/// Board topology of an XICS controller.
///
/// The topology is fixed for the lifetime of the controller: lines and servers are never
/// added or removed after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XicsConfig {
    /// Number of presentation servers (one per virtual CPU).
    pub nr_servers: u32,
    /// Number of interrupt sources in the ICS.
    pub nr_irqs: u32,
    /// Source number of the first ICS line.
    #[serde(default = "default_irq_offset")]
    pub irq_offset: u32,
    /// Source numbers wired as level-triggered (LSI). Every other line is MSI.
    #[serde(default)]
    pub lsi_irqs: Vec<u32>,
}

impl XicsConfig {
    pub fn new(nr_servers: u32, nr_irqs: u32) -> Self {
        Self {
            nr_servers,
            nr_irqs,
            irq_offset: DEFAULT_IRQ_OFFSET,
            lsi_irqs: Vec::new(),
        }
    }

    /// Sizes the server table from the CPU indices present on the machine.
    ///
    /// Servers are addressed by CPU index, so sparse indices still get a slot up to the
    /// largest one.
    pub fn from_cpu_indices(cpu_indices: impl IntoIterator<Item = u32>, nr_irqs: u32) -> Self {
        let nr_servers = cpu_indices
            .into_iter()
            .max()
            .map_or(0, |max| max.saturating_add(1));
        Self::new(nr_servers, nr_irqs)
    }

    pub fn with_lsi(mut self, irq: u32) -> Self {
        self.lsi_irqs.push(irq);
        self
    }

    /// One past the last valid ICS source number.
    pub fn irq_end(&self) -> u32 {
        self.irq_offset.saturating_add(self.nr_irqs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nr_servers == 0 {
            return Err(XicsError::NoServers);
        }
        if self.irq_offset <= XICS_IPI {
            return Err(XicsError::IrqOffsetTooLow(self.irq_offset));
        }
        let end = u64::from(self.irq_offset) + u64::from(self.nr_irqs);
        if end > u64::from(XISR_MASK) + 1 {
            return Err(XicsError::IrqRangeTooLarge {
                offset: self.irq_offset,
                nr_irqs: self.nr_irqs,
            });
        }
        if let Some(&bad) = self
            .lsi_irqs
            .iter()
            .find(|&&irq| irq < self.irq_offset || irq >= self.irq_end())
        {
            return Err(XicsError::InvalidLsi(bad));
        }
        Ok(())
    }
}
