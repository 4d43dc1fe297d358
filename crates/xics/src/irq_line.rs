use crate::controller::SharedXics;

/// A device-facing interrupt line.
///
/// Level-triggered devices drive the level directly. Message-signalled devices only need
/// [`IrqLine::pulse`].
pub trait IrqLine {
    fn set_level(&mut self, level: bool);

    fn raise(&mut self) {
        self.set_level(true);
    }

    fn lower(&mut self) {
        self.set_level(false);
    }

    fn pulse(&mut self) {
        self.raise();
        self.lower();
    }
}

/// One ICS input, holding a shared handle to the controller.
#[derive(Clone)]
pub struct XicsIrqLine {
    xics: SharedXics,
    irq: u32,
}

impl std::fmt::Debug for XicsIrqLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XicsIrqLine")
            .field("irq", &self.irq)
            .finish_non_exhaustive()
    }
}

impl XicsIrqLine {
    /// Returns the input for source `irq`, or `None` if the ICS has no such source.
    pub fn new(xics: &SharedXics, irq: u32) -> Option<Self> {
        if !xics.borrow().ics().is_valid_irq(u64::from(irq)) {
            return None;
        }
        Some(Self {
            xics: xics.clone(),
            irq,
        })
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }
}

impl IrqLine for XicsIrqLine {
    fn set_level(&mut self, level: bool) {
        self.xics.borrow_mut().set_irq(self.irq, level);
    }
}

impl<F> IrqLine for F
where
    F: FnMut(bool),
{
    fn set_level(&mut self, level: bool) {
        self(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XicsConfig;
    use crate::controller::Xics;

    #[test]
    fn lines_exist_only_for_ics_sources() {
        let (xics, _latches) = Xics::with_latches(&XicsConfig::new(1, 4)).unwrap();
        let xics = xics.into_shared();
        assert!(XicsIrqLine::new(&xics, 15).is_none());
        assert_eq!(XicsIrqLine::new(&xics, 19).map(|l| l.irq()), Some(19));
        assert!(XicsIrqLine::new(&xics, 20).is_none());
    }

    #[test]
    fn closure_lines_see_pulse_as_raise_then_lower() {
        let mut levels = Vec::new();
        {
            let mut line = |level: bool| levels.push(level);
            line.pulse();
        }
        assert_eq!(levels, [true, false]);
    }
}
