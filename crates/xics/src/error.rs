use thiserror::Error;

pub type Result<T> = std::result::Result<T, XicsError>;

/// RTAS status for "parameter error".
pub const RTAS_PARAMETER_ERROR: i32 = -3;

/// Errors reported by the guest-facing entry points and by controller construction.
///
/// A refused delivery is *not* an error: it is tracked by the source's `REJECTED` status and
/// retried by the resend sweep.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XicsError {
    #[error("server {server} is out of range (nr_servers={nr_servers})")]
    InvalidServer { server: u64, nr_servers: u32 },

    #[error("irq {irq} is not an ICS source (valid range is {first}..{end})")]
    InvalidIrq { irq: u64, first: u32, end: u32 },

    #[error("priority {0} does not fit in 8 bits")]
    InvalidPriority(u64),

    #[error("bad argument count: nargs={nargs} nret={nret} (expected {expected_args}/{expected_rets})")]
    BadArgCount {
        nargs: usize,
        nret: usize,
        expected_args: usize,
        expected_rets: usize,
    },

    #[error("controller needs at least one server")]
    NoServers,

    #[error("got {outputs} CPU outputs for {nr_servers} servers")]
    OutputCountMismatch { outputs: usize, nr_servers: u32 },

    #[error("irq offset {0} overlaps the reserved IPI/none source numbers")]
    IrqOffsetTooLow(u32),

    #[error("irq range {offset}+{nr_irqs} does not fit in the 24-bit XISR field")]
    IrqRangeTooLarge { offset: u32, nr_irqs: u32 },

    #[error("level-triggered irq {0} is outside the configured source range")]
    InvalidLsi(u32),
}

impl XicsError {
    /// Status word stored in `rets[0]` of a failed RTAS call.
    pub fn rtas_status(&self) -> i32 {
        RTAS_PARAMETER_ERROR
    }
}
