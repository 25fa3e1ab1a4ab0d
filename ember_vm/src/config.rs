//! Machine configuration.

use ember_gc::GcConfig;

/// Tunable parameters and trace switches of the machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Script-visible argument vector.
    pub argv: Vec<String>,

    /// Instructions a fiber may run before the dispatch loop considers
    /// handing control to another queued task.
    ///
    /// Default: 10 000
    pub timeslice: u32,

    /// Frame depth limit before a stack-overflow error is raised.
    ///
    /// Default: 1000
    pub max_frame_depth: usize,

    /// Log every executed opcode to stderr.
    pub trace_opcodes: bool,

    /// Log frame pushes and pops to stderr.
    pub trace_frames: bool,

    /// Log catch-table pushes and pops to stderr.
    pub trace_catchtables: bool,

    /// Collector configuration.
    pub gc: GcConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            argv: Vec::new(),
            timeslice: 10_000,
            max_frame_depth: 1000,
            trace_opcodes: false,
            trace_frames: false,
            trace_catchtables: false,
            gc: GcConfig::default(),
        }
    }
}
